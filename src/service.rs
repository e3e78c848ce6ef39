//! The authorized entry point for every credential operation.

use std::sync::Arc;

use uuid::Uuid;
use vaultcrypt::Encryptor;

use crate::{
    actor::Actor,
    certificate::{
        CaResolver, Capabilities, CertificateRequest, CertificateService, DEFAULT_KEY_LENGTH,
        KEY_LENGTHS,
    },
    credential::{
        CredentialType, CredentialValue, CredentialVersion, CredentialVersionStore, SaveRequest,
        name,
    },
    error::{Result, StateConflict, ValidationError, VaultError},
    generate::{self, PasswordParameters},
    permission::{PermissionEntry, PermissionOperation, PermissionService},
    store::Store,
};

/// A version together with its decrypted value.
#[derive(Clone, Debug, PartialEq)]
pub struct CredentialView {
    pub version: CredentialVersion,
    pub value: CredentialValue,
}

/// What to generate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerateRequest {
    Password(PasswordParameters),
    User {
        username: Option<String>,
        parameters: PasswordParameters,
    },
    Certificate(CertificateRequest),
    Ssh {
        key_length: u32,
        comment: Option<String>,
    },
    Rsa {
        key_length: u32,
    },
}

impl GenerateRequest {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            GenerateRequest::Password(_) => CredentialType::Password,
            GenerateRequest::User { .. } => CredentialType::User,
            GenerateRequest::Certificate(_) => CredentialType::Certificate,
            GenerateRequest::Ssh { .. } => CredentialType::Ssh,
            GenerateRequest::Rsa { .. } => CredentialType::Rsa,
        }
    }
}

/// Gates every read with READ, every write with WRITE and deletion with
/// DELETE. A denied check is indistinguishable from a missing credential.
pub struct CredentialService {
    versions: Arc<CredentialVersionStore>,
    permissions: Arc<PermissionService>,
    certificates: CertificateService,
    caps: Capabilities,
}

impl CredentialService {
    pub fn new(
        store: Arc<Store>,
        encryptor: Arc<Encryptor>,
        caps: Capabilities,
        acls_enabled: bool,
    ) -> Self {
        let versions = Arc::new(CredentialVersionStore::new(store.clone(), encryptor));
        let permissions = Arc::new(PermissionService::new(store, acls_enabled));
        let resolver = CaResolver::new(versions.clone(), permissions.clone(), caps.parser.clone());
        let certificates = CertificateService::new(versions.clone(), resolver, caps.clone());
        Self {
            versions,
            permissions,
            certificates,
            caps,
        }
    }

    pub fn versions(&self) -> &CredentialVersionStore {
        &self.versions
    }

    pub fn permissions(&self) -> &PermissionService {
        &self.permissions
    }

    // ── writes ───────────────────────────────────────────────────────

    /// Store `value` as the new version of `name`.
    pub fn set(
        &self,
        actor: &Actor,
        name: &str,
        value: CredentialValue,
        metadata: Option<serde_json::Value>,
    ) -> Result<CredentialView> {
        let name = name::normalize(name)?;
        let existing = self.authorize_write(actor, &name, value.credential_type())?;

        let value = match value {
            CredentialValue::Certificate(cert) => {
                CredentialValue::Certificate(self.certificates.validate_imported(
                    actor,
                    &cert.certificate,
                    cert.private_key.as_deref(),
                    cert.ca.as_deref(),
                    cert.ca_name.as_deref(),
                )?)
            }
            other => other,
        };

        let request = SaveRequest {
            metadata,
            ..SaveRequest::new(actor.clone())
        };
        let version = self.versions.save(existing.as_ref(), &name, &value, &request)?;
        Ok(CredentialView { version, value })
    }

    /// Generate a value of the requested kind and store it under `name`.
    pub fn generate(
        &self,
        actor: &Actor,
        name: &str,
        request: &GenerateRequest,
        metadata: Option<serde_json::Value>,
    ) -> Result<CredentialView> {
        let name = name::normalize(name)?;
        let existing = self.authorize_write(actor, &name, request.credential_type())?;

        let (value, generation_parameters) = match request {
            GenerateRequest::Password(params) => (
                CredentialValue::Password {
                    password: generate::password(params)?.to_string(),
                },
                Some(params.clone()),
            ),
            GenerateRequest::User {
                username,
                parameters,
            } => (
                CredentialValue::User {
                    username: Some(username.clone().unwrap_or_else(generate::username)),
                    password: generate::password(parameters)?.to_string(),
                    salt: generate::salt(),
                },
                Some(parameters.clone()),
            ),
            GenerateRequest::Certificate(request) => (
                CredentialValue::Certificate(self.certificates.generate(actor, request)?),
                None,
            ),
            GenerateRequest::Ssh {
                key_length,
                comment,
            } => (self.ssh_key(*key_length, comment.as_deref())?, None),
            GenerateRequest::Rsa { key_length } => (self.rsa_key(*key_length)?, None),
        };

        let save = SaveRequest {
            generation_parameters,
            metadata,
            ..SaveRequest::new(actor.clone())
        };
        let version = self.versions.save(existing.as_ref(), &name, &value, &save)?;
        log::info!("{actor} generated {} {}", version.credential_type, version.name);
        Ok(CredentialView { version, value })
    }

    /// Generate a new value with the shape of the current one.
    ///
    /// `set_as_transitional` is only accepted for certificates.
    pub fn regenerate(
        &self,
        actor: &Actor,
        name: &str,
        set_as_transitional: bool,
    ) -> Result<CredentialView> {
        let name = name::normalize(name)?;
        self.permissions.require(actor, &name, PermissionOperation::Write)?;
        let current = self.versions.find_active(&name)?.ok_or(VaultError::NotFound)?;

        if current.credential_type == CredentialType::Certificate {
            let version = self.certificates.regenerate(actor, &name, set_as_transitional)?;
            return self.view(version);
        }
        if set_as_transitional {
            return Err(StateConflict::NotACertificate.into());
        }

        let (value, generation_parameters) = match current.credential_type {
            CredentialType::Password => {
                let params = self.stored_parameters(&current)?;
                let password = generate::password(&params)?.to_string();
                (CredentialValue::Password { password }, Some(params))
            }
            CredentialType::User => {
                let params = self.stored_parameters(&current)?;
                let CredentialValue::User { username, .. } = self.versions.decrypt_value(&current)?
                else {
                    return Err(VaultError::Storage(format!(
                        "{name} is a user credential without user columns"
                    )));
                };
                let value = CredentialValue::User {
                    username,
                    password: generate::password(&params)?.to_string(),
                    salt: generate::salt(),
                };
                (value, Some(params))
            }
            CredentialType::Ssh => (self.ssh_key(DEFAULT_KEY_LENGTH, None)?, None),
            CredentialType::Rsa => (self.rsa_key(DEFAULT_KEY_LENGTH)?, None),
            CredentialType::Value | CredentialType::Json | CredentialType::Certificate => {
                return Err(StateConflict::CannotRegenerateNonGenerated.into());
            }
        };

        let save = SaveRequest {
            generation_parameters,
            metadata: current.metadata.clone(),
            ..SaveRequest::new(actor.clone())
        };
        let version = self.versions.save(Some(&current), &name, &value, &save)?;
        log::info!("{actor} regenerated {name}");
        Ok(CredentialView { version, value })
    }

    /// Set (`Some`) or clear (`None`) the transitional version of a
    /// certificate. Returns the active version and the transitional one.
    pub fn update_transitional_version(
        &self,
        actor: &Actor,
        name: &str,
        version: Option<Uuid>,
    ) -> Result<Vec<CredentialView>> {
        let name = name::normalize(name)?;
        self.permissions.require(actor, &name, PermissionOperation::Write)?;
        self.certificates
            .update_transitional_version(&name, version)?
            .into_iter()
            .map(|v| self.view(v))
            .collect()
    }

    pub fn delete(&self, actor: &Actor, name: &str) -> Result<()> {
        let name = name::normalize(name)?;
        self.permissions.require(actor, &name, PermissionOperation::Delete)?;
        if self.versions.delete(&name)? {
            log::info!("{actor} deleted {name}");
            Ok(())
        } else {
            Err(VaultError::NotFound)
        }
    }

    /// Remove one version of `name`, returning what it held.
    pub fn delete_version(&self, actor: &Actor, name: &str, version: &Uuid) -> Result<CredentialView> {
        let name = name::normalize(name)?;
        self.permissions.require(actor, &name, PermissionOperation::Delete)?;
        let removed = self.versions.delete_version(&name, version)?;
        self.view(removed)
    }

    // ── reads ────────────────────────────────────────────────────────

    /// The current (non-transitional) version.
    pub fn get_current(&self, actor: &Actor, name: &str) -> Result<CredentialView> {
        let name = name::normalize(name)?;
        self.permissions.require(actor, &name, PermissionOperation::Read)?;
        let version = self.versions.find_active(&name)?.ok_or(VaultError::NotFound)?;
        self.view(version)
    }

    /// History, newest first, optionally limited to `n` versions.
    pub fn get_versions(&self, actor: &Actor, name: &str, n: Option<usize>) -> Result<Vec<CredentialView>> {
        let name = name::normalize(name)?;
        if n == Some(0) {
            return Err(ValidationError::InvalidVersionCount.into());
        }
        self.permissions.require(actor, &name, PermissionOperation::Read)?;
        let versions = match n {
            Some(n) => self.versions.find_n_by_name(&name, n)?,
            None => self.versions.find_all_by_name(&name)?,
        };
        if versions.is_empty() {
            return Err(VaultError::NotFound);
        }
        versions.into_iter().map(|v| self.view(v)).collect()
    }

    pub fn get_by_uuid(&self, actor: &Actor, uuid: &Uuid) -> Result<CredentialView> {
        let version = self.versions.find_by_uuid(uuid)?.ok_or(VaultError::NotFound)?;
        self.permissions
            .require(actor, &version.name, PermissionOperation::Read)?;
        self.view(version)
    }

    /// The active version followed by the transitional one, if any.
    pub fn get_active_with_transitional(&self, actor: &Actor, name: &str) -> Result<Vec<CredentialView>> {
        let name = name::normalize(name)?;
        self.permissions.require(actor, &name, PermissionOperation::Read)?;
        let versions = self.versions.find_active_with_transitional(&name)?;
        if versions.is_empty() {
            return Err(VaultError::NotFound);
        }
        versions.into_iter().map(|v| self.view(v)).collect()
    }

    /// Certificate versions issued by `ca_name` that `actor` may read.
    pub fn find_signed_by(&self, actor: &Actor, ca_name: &str) -> Result<Vec<CredentialVersion>> {
        let ca_name = name::normalize(ca_name)?;
        self.permissions
            .require(actor, &ca_name, PermissionOperation::Read)?;
        let mut visible = Vec::new();
        for version in self.versions.find_by_ca_name(&ca_name)? {
            if self
                .permissions
                .has_permission(actor, &version.name, PermissionOperation::Read)?
            {
                visible.push(version);
            }
        }
        Ok(visible)
    }

    // ── permissions ──────────────────────────────────────────────────

    pub fn get_permissions(&self, requester: &Actor, name: &str) -> Result<Vec<PermissionEntry>> {
        self.permissions.get_permissions(requester, name)
    }

    pub fn write_permissions(
        &self,
        requester: &Actor,
        name: &str,
        entries: &[PermissionEntry],
    ) -> Result<Vec<PermissionEntry>> {
        self.permissions.write_permissions(requester, name, entries)
    }

    pub fn delete_permission(&self, requester: &Actor, name: &str, actor: &Actor) -> Result<()> {
        if self.permissions.delete_permission_entry(requester, name, actor)? {
            Ok(())
        } else {
            Err(VaultError::NotFound)
        }
    }

    pub fn find_readable_paths(&self, actor: &Actor) -> Result<Vec<String>> {
        self.permissions.find_readable_paths(actor)
    }

    // ── helpers ──────────────────────────────────────────────────────

    /// The version a write appends to, after checking WRITE and that the
    /// type is unchanged. `None` means the write creates the credential.
    fn authorize_write(
        &self,
        actor: &Actor,
        name: &str,
        credential_type: CredentialType,
    ) -> Result<Option<CredentialVersion>> {
        let Some(existing) = self.versions.find_most_recent(name)? else {
            return Ok(None);
        };
        self.permissions.require(actor, name, PermissionOperation::Write)?;
        if existing.credential_type != credential_type {
            return Err(ValidationError::CredentialTypeMismatch.into());
        }
        Ok(Some(existing))
    }

    fn stored_parameters(&self, version: &CredentialVersion) -> Result<PasswordParameters> {
        self.versions
            .generation_parameters(version)?
            .ok_or_else(|| StateConflict::CannotRegenerateNonGenerated.into())
    }

    fn view(&self, version: CredentialVersion) -> Result<CredentialView> {
        let value = self.versions.decrypt_value(&version)?;
        Ok(CredentialView { version, value })
    }

    fn rsa_key(&self, key_length: u32) -> Result<CredentialValue> {
        if !KEY_LENGTHS.contains(&key_length) {
            return Err(ValidationError::InvalidKeyLength(key_length).into());
        }
        let key_pair = self
            .caps
            .key_pairs
            .generate_rsa(key_length)
            .map_err(|e| VaultError::Capability(format!("key pair generation failed: {e:#}")))?;
        Ok(CredentialValue::Rsa {
            public_key: key_pair.public_key,
            private_key: key_pair.private_key.to_string(),
        })
    }

    fn ssh_key(&self, key_length: u32, comment: Option<&str>) -> Result<CredentialValue> {
        if !KEY_LENGTHS.contains(&key_length) {
            return Err(ValidationError::InvalidKeyLength(key_length).into());
        }
        let key_pair = self
            .caps
            .key_pairs
            .generate_rsa(key_length)
            .map_err(|e| VaultError::Capability(format!("key pair generation failed: {e:#}")))?;
        let public_key = self
            .caps
            .key_pairs
            .to_ssh_public_key(&key_pair, comment)
            .map_err(|e| VaultError::Capability(format!("ssh key encoding failed: {e:#}")))?;
        Ok(CredentialValue::Ssh {
            public_key,
            private_key: key_pair.private_key.to_string(),
        })
    }
}
