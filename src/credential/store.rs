//! Persistence of credentials and their versions.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;
use vaultcrypt::Encryptor;
use zeroize::Zeroizing;

use super::{
    CertificateDetails, CredentialType, CredentialValue, CredentialVersion, VersionDetails, name,
};
use crate::{
    actor::Actor,
    error::{Result, StateConflict, ValidationError, VaultError},
    generate::PasswordParameters,
    permission,
    store::{
        Store, delete_encrypted_values, encrypted_value_cols, insert_encrypted_value,
        opt_time_col, opt_uuid_col, time_col, uuid_col,
    },
};

/// Everything `save` needs besides the name and the value.
#[derive(Clone, Debug)]
pub struct SaveRequest {
    /// Receives full control when the credential is created.
    pub actor: Actor,
    pub generation_parameters: Option<PasswordParameters>,
    pub metadata: Option<serde_json::Value>,
    /// Only meaningful for certificates.
    pub transitional: bool,
}

impl SaveRequest {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            generation_parameters: None,
            metadata: None,
            transitional: false,
        }
    }
}

const SELECT_VERSION: &str = r#"
    SELECT v.uuid, v.credential_uuid, c.name, v.seq, v.type, v.version_created_at,
           ev.uuid, ev.encryption_key_uuid, ev.encrypted_value, ev.nonce,
           pv.uuid, pv.encryption_key_uuid, pv.encrypted_value, pv.nonce,
           v.expiry_date, v.metadata,
           cc.certificate, cc.ca, cc.ca_name, cc.transitional, cc.certificate_authority, cc.self_signed,
           pk.public_key, uc.username, uc.salt
    FROM credential_version v
    JOIN credential c ON c.uuid = v.credential_uuid
    JOIN encrypted_value ev ON ev.uuid = v.encrypted_value_uuid
    LEFT JOIN encrypted_value pv ON pv.uuid = v.parameters_uuid
    LEFT JOIN certificate_credential cc ON cc.uuid = v.uuid
    LEFT JOIN public_key_credential pk ON pk.uuid = v.uuid
    LEFT JOIN user_credential uc ON uc.uuid = v.uuid
"#;

const NEWEST_FIRST: &str = "ORDER BY v.version_created_at DESC, v.seq DESC";

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<CredentialVersion> {
    let type_text: String = row.get(4)?;
    let credential_type: CredentialType = type_text.parse().map_err(|e| conversion_error(4, e))?;

    let parameters = match row.get::<_, Option<String>>(10)? {
        Some(_) => Some(encrypted_value_cols(row, 10)?),
        None => None,
    };
    let metadata = match row.get::<_, Option<String>>(15)? {
        Some(text) => Some(serde_json::from_str(&text).map_err(|e| conversion_error(15, e.to_string()))?),
        None => None,
    };

    let details = match credential_type {
        CredentialType::Certificate => VersionDetails::Certificate(CertificateDetails {
            certificate: row.get(16)?,
            ca: row.get(17)?,
            ca_name: row.get(18)?,
            transitional: row.get(19)?,
            certificate_authority: row.get(20)?,
            self_signed: row.get(21)?,
        }),
        CredentialType::Ssh | CredentialType::Rsa => VersionDetails::PublicKey {
            public_key: row.get(22)?,
        },
        CredentialType::User => VersionDetails::User {
            username: row.get(23)?,
            salt: row.get(24)?,
        },
        CredentialType::Password | CredentialType::Json | CredentialType::Value => {
            VersionDetails::Plain
        }
    };

    Ok(CredentialVersion {
        uuid: uuid_col(row, 0)?,
        credential_uuid: uuid_col(row, 1)?,
        name: row.get(2)?,
        seq: row.get(3)?,
        credential_type,
        created_at: time_col(row, 5)?,
        encrypted_value: encrypted_value_cols(row, 6)?,
        parameters,
        expiry_date: opt_time_col(row, 14)?,
        metadata,
        details,
    })
}

fn query_versions(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<CredentialVersion>> {
    let mut stmt = conn.prepare(&format!("{SELECT_VERSION} {filter}"))?;
    let versions = stmt
        .query_map(params, version_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(versions)
}

fn find_credential_uuid(conn: &Connection, checksum: &str) -> rusqlite::Result<Option<Uuid>> {
    conn.query_row(
        "SELECT uuid FROM credential WHERE checksum = ?1",
        [checksum],
        |row| uuid_col(row, 0),
    )
    .optional()
}

/// The append-only ledger of credentials and versions.
pub struct CredentialVersionStore {
    store: Arc<Store>,
    encryptor: Arc<Encryptor>,
}

impl CredentialVersionStore {
    pub fn new(store: Arc<Store>, encryptor: Arc<Encryptor>) -> Self {
        Self { store, encryptor }
    }

    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    /// Append a version of `name`, creating the credential on first write.
    ///
    /// `existing` is the caller's view of the current version. When it is
    /// `None` the writer is granted every operation on the name.
    pub fn save(
        &self,
        existing: Option<&CredentialVersion>,
        name: &str,
        value: &CredentialValue,
        request: &SaveRequest,
    ) -> Result<CredentialVersion> {
        let name = name::normalize(name)?;
        let checksum = name::checksum(&name);
        let credential_type = value.credential_type();
        let transitional = request.transitional && credential_type == CredentialType::Certificate;

        // Provider calls may block on the network; keep them outside the lock.
        let secret = value.secret_bytes()?;
        let encrypted_value = self.encryptor.encrypt(&secret)?;
        let parameters = match &request.generation_parameters {
            Some(params) => {
                let bytes = Zeroizing::new(serde_json::to_vec(params)?);
                Some(self.encryptor.encrypt(&bytes)?)
            }
            None => None,
        };
        let details = value.details(transitional);
        let expiry_date = value.expiry_date();
        let created_at = Utc::now().trunc_subsecs(6);
        let version_uuid = Uuid::new_v4();
        let metadata = request
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut conn = self.store.lock();
        let tx = conn.transaction()?;

        let credential_uuid = match find_credential_uuid(&tx, &checksum)? {
            Some(uuid) => uuid,
            None => {
                let uuid = Uuid::new_v4();
                tx.execute(
                    "INSERT INTO credential (uuid, name, checksum) VALUES (?1, ?2, ?3)",
                    params![uuid.to_string(), name, checksum],
                )?;
                log::info!("created credential {name}");
                uuid
            }
        };

        insert_encrypted_value(&tx, &encrypted_value)?;
        if let Some(params) = &parameters {
            insert_encrypted_value(&tx, params)?;
        }

        tx.execute(
            r#"
            INSERT INTO credential_version
                (uuid, credential_uuid, type, version_created_at, encrypted_value_uuid,
                 parameters_uuid, expiry_date, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                version_uuid.to_string(),
                credential_uuid.to_string(),
                credential_type.as_str(),
                created_at.timestamp_micros(),
                encrypted_value.uuid.to_string(),
                parameters.as_ref().map(|p| p.uuid.to_string()),
                expiry_date.map(|d| d.timestamp_micros()),
                metadata,
            ],
        )?;
        let seq = tx.last_insert_rowid();

        match &details {
            VersionDetails::Plain => {}
            VersionDetails::Certificate(cert) => {
                if cert.transitional {
                    clear_transitional(&tx, &credential_uuid)?;
                }
                tx.execute(
                    r#"
                    INSERT INTO certificate_credential
                        (uuid, credential_uuid, certificate, ca, ca_name, transitional,
                         certificate_authority, self_signed)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    params![
                        version_uuid.to_string(),
                        credential_uuid.to_string(),
                        cert.certificate,
                        cert.ca,
                        cert.ca_name,
                        cert.transitional,
                        cert.certificate_authority,
                        cert.self_signed,
                    ],
                )?;
            }
            VersionDetails::PublicKey { public_key } => {
                tx.execute(
                    "INSERT INTO public_key_credential (uuid, public_key) VALUES (?1, ?2)",
                    params![version_uuid.to_string(), public_key],
                )?;
            }
            VersionDetails::User { username, salt } => {
                tx.execute(
                    "INSERT INTO user_credential (uuid, username, salt) VALUES (?1, ?2, ?3)",
                    params![version_uuid.to_string(), username, salt],
                )?;
            }
        }

        if existing.is_none() {
            permission::store::grant_creator(&tx, &name, &request.actor)?;
        }
        tx.commit()?;

        Ok(CredentialVersion {
            uuid: version_uuid,
            credential_uuid,
            name,
            seq,
            created_at,
            credential_type,
            encrypted_value,
            parameters,
            expiry_date,
            metadata: request.metadata.clone(),
            details,
        })
    }

    pub fn find_most_recent(&self, name: &str) -> Result<Option<CredentialVersion>> {
        Ok(self.find_n_by_name(name, 1)?.into_iter().next())
    }

    /// Full history, newest first.
    pub fn find_all_by_name(&self, name: &str) -> Result<Vec<CredentialVersion>> {
        let checksum = name::checksum(&name::normalize(name)?);
        let conn = self.store.lock();
        Ok(query_versions(
            &conn,
            &format!("WHERE c.checksum = ?1 {NEWEST_FIRST}"),
            [checksum],
        )?)
    }

    pub fn find_n_by_name(&self, name: &str, n: usize) -> Result<Vec<CredentialVersion>> {
        let checksum = name::checksum(&name::normalize(name)?);
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let conn = self.store.lock();
        Ok(query_versions(
            &conn,
            &format!("WHERE c.checksum = ?1 {NEWEST_FIRST} LIMIT ?2"),
            params![checksum, limit],
        )?)
    }

    /// History without transitional certificate versions, newest first.
    pub fn find_active_by_name(&self, name: &str) -> Result<Vec<CredentialVersion>> {
        let checksum = name::checksum(&name::normalize(name)?);
        let conn = self.store.lock();
        Ok(query_versions(
            &conn,
            &format!("WHERE c.checksum = ?1 AND COALESCE(cc.transitional, 0) = 0 {NEWEST_FIRST}"),
            [checksum],
        )?)
    }

    /// The current value: the newest non-transitional version.
    pub fn find_active(&self, name: &str) -> Result<Option<CredentialVersion>> {
        let checksum = name::checksum(&name::normalize(name)?);
        let conn = self.store.lock();
        Ok(query_versions(
            &conn,
            &format!(
                "WHERE c.checksum = ?1 AND COALESCE(cc.transitional, 0) = 0 {NEWEST_FIRST} LIMIT 1"
            ),
            [checksum],
        )?
        .into_iter()
        .next())
    }

    /// The active version followed by the transitional one, if any.
    pub fn find_active_with_transitional(&self, name: &str) -> Result<Vec<CredentialVersion>> {
        let checksum = name::checksum(&name::normalize(name)?);
        let conn = self.store.lock();
        let mut versions = query_versions(
            &conn,
            &format!(
                "WHERE c.checksum = ?1 AND COALESCE(cc.transitional, 0) = 0 {NEWEST_FIRST} LIMIT 1"
            ),
            [&checksum],
        )?;
        versions.extend(query_versions(
            &conn,
            "WHERE c.checksum = ?1 AND cc.transitional = 1",
            [&checksum],
        )?);
        Ok(versions)
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<CredentialVersion>> {
        let conn = self.store.lock();
        Ok(query_versions(&conn, "WHERE v.uuid = ?1", [uuid.to_string()])?
            .into_iter()
            .next())
    }

    /// The active version of every certificate credential, by name.
    pub fn find_all_certificates(&self) -> Result<Vec<CredentialVersion>> {
        let names = {
            let conn = self.store.lock();
            let mut stmt = conn.prepare(
                r#"
                SELECT DISTINCT c.name FROM credential c
                JOIN credential_version v ON v.credential_uuid = c.uuid
                WHERE v.type = 'certificate'
                ORDER BY c.name
                "#,
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            names
        };
        let mut versions = Vec::with_capacity(names.len());
        for name in names {
            if let Some(version) = self.find_active(&name)? {
                versions.push(version);
            }
        }
        Ok(versions)
    }

    /// Certificate versions issued by the CA stored under `ca_name`.
    pub fn find_by_ca_name(&self, ca_name: &str) -> Result<Vec<CredentialVersion>> {
        let ca_name = name::normalize(ca_name)?;
        let conn = self.store.lock();
        Ok(query_versions(
            &conn,
            "WHERE cc.ca_name = ?1 AND c.name != ?1 ORDER BY c.name, v.version_created_at DESC, v.seq DESC",
            [ca_name],
        )?)
    }

    /// Remove the credential, its versions, their encrypted values and all
    /// grants on its path. Returns false if it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let name = name::normalize(name)?;
        let checksum = name::checksum(&name);
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;

        let Some(credential_uuid) = find_credential_uuid(&tx, &checksum)? else {
            return Ok(false);
        };
        let owned = owned_values(&tx, "credential_uuid", &credential_uuid)?;

        tx.execute(
            "DELETE FROM credential WHERE uuid = ?1",
            [credential_uuid.to_string()],
        )?;
        delete_encrypted_values(&tx, &owned)?;
        let grants = permission::store::delete_by_path(&tx, &name)?;
        tx.commit()?;

        log::info!(
            "deleted credential {name} ({} encrypted values, {grants} grants)",
            owned.len()
        );
        Ok(true)
    }

    /// Remove a single version of `name`. The last remaining version
    /// cannot be removed this way; delete the credential instead.
    pub fn delete_version(&self, name: &str, version_uuid: &Uuid) -> Result<CredentialVersion> {
        let name = name::normalize(name)?;
        let version = self
            .find_by_uuid(version_uuid)?
            .ok_or(VaultError::NotFound)?;
        if version.name != name {
            return Err(ValidationError::MismatchedCredentialAndVersion.into());
        }

        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM credential_version WHERE credential_uuid = ?1",
            [version.credential_uuid.to_string()],
            |row| row.get(0),
        )?;
        if remaining <= 1 {
            return Err(StateConflict::CannotDeleteLastVersion.into());
        }

        let owned = owned_values(&tx, "uuid", version_uuid)?;
        tx.execute(
            "DELETE FROM credential_version WHERE uuid = ?1",
            [version_uuid.to_string()],
        )?;
        delete_encrypted_values(&tx, &owned)?;
        tx.commit()?;

        log::info!("deleted version {version_uuid} of {name}");
        Ok(version)
    }

    /// Mark `version_uuid` as the transitional version of `name`, clearing
    /// any previous one in the same transaction.
    pub fn set_transitional_version(&self, name: &str, version_uuid: &Uuid) -> Result<()> {
        let name = name::normalize(name)?;
        let checksum = name::checksum(&name);
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;

        let credential_uuid = find_credential_uuid(&tx, &checksum)?.ok_or(VaultError::NotFound)?;
        let target: Option<(Uuid, String)> = tx
            .query_row(
                "SELECT credential_uuid, type FROM credential_version WHERE uuid = ?1",
                [version_uuid.to_string()],
                |row| Ok((uuid_col(row, 0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((owner, type_text)) = target else {
            return Err(ValidationError::MismatchedCredentialAndVersion.into());
        };
        if owner != credential_uuid {
            return Err(ValidationError::MismatchedCredentialAndVersion.into());
        }
        if type_text != CredentialType::Certificate.as_str() {
            return Err(StateConflict::NotACertificate.into());
        }

        clear_transitional(&tx, &credential_uuid)?;
        tx.execute(
            "UPDATE certificate_credential SET transitional = 1 WHERE uuid = ?1",
            [version_uuid.to_string()],
        )?;
        tx.commit()?;

        log::info!("version {version_uuid} of {name} is now transitional");
        Ok(())
    }

    /// Clear the transitional flag on `name`, if any version holds it.
    pub fn unset_transitional_version(&self, name: &str) -> Result<()> {
        let checksum = name::checksum(&name::normalize(name)?);
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        let credential_uuid = find_credential_uuid(&tx, &checksum)?.ok_or(VaultError::NotFound)?;
        clear_transitional(&tx, &credential_uuid)?;
        tx.commit()?;
        Ok(())
    }

    pub fn decrypt_value(&self, version: &CredentialVersion) -> Result<CredentialValue> {
        let secret = Zeroizing::new(self.encryptor.decrypt(&version.encrypted_value)?);
        CredentialValue::from_parts(
            version.credential_type,
            &secret,
            &version.details,
            version.expiry_date,
        )
    }

    /// The parameters a password or user version was generated with.
    pub fn generation_parameters(
        &self,
        version: &CredentialVersion,
    ) -> Result<Option<PasswordParameters>> {
        let Some(encrypted) = &version.parameters else {
            return Ok(None);
        };
        let bytes = Zeroizing::new(self.encryptor.decrypt(encrypted)?);
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

fn clear_transitional(conn: &Connection, credential_uuid: &Uuid) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE certificate_credential SET transitional = 0 WHERE credential_uuid = ?1 AND transitional = 1",
        [credential_uuid.to_string()],
    )
}

/// Encrypted value UUIDs (payloads and parameters) owned by the versions
/// matching `column = key`.
fn owned_values(conn: &Connection, column: &str, key: &Uuid) -> rusqlite::Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT encrypted_value_uuid, parameters_uuid FROM credential_version WHERE {column} = ?1"
    ))?;
    let pairs = stmt
        .query_map([key.to_string()], |row| {
            Ok((uuid_col(row, 0)?, opt_uuid_col(row, 1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(pairs
        .into_iter()
        .flat_map(|(value, params)| std::iter::once(value).chain(params))
        .collect())
}
