//! SQLite-backed store shared by every component.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use uuid::Uuid;
use vaultcrypt::{Canary, CanaryStore, EncryptedValue};

use crate::error::Result;

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS encryption_key_canary (
        uuid            TEXT PRIMARY KEY,
        encrypted_value BLOB NOT NULL,
        nonce           BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS encrypted_value (
        uuid                TEXT PRIMARY KEY,
        encryption_key_uuid TEXT NOT NULL,
        encrypted_value     BLOB NOT NULL,
        nonce               BLOB NOT NULL,
        updated_at          INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_encrypted_value_key
        ON encrypted_value(encryption_key_uuid);

    CREATE TABLE IF NOT EXISTS credential (
        uuid     TEXT PRIMARY KEY,
        name     TEXT NOT NULL UNIQUE,
        checksum TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS credential_version (
        seq                  INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid                 TEXT NOT NULL UNIQUE,
        credential_uuid      TEXT NOT NULL REFERENCES credential(uuid) ON DELETE CASCADE,
        type                 TEXT NOT NULL,
        version_created_at   INTEGER NOT NULL,
        encrypted_value_uuid TEXT NOT NULL REFERENCES encrypted_value(uuid),
        parameters_uuid      TEXT REFERENCES encrypted_value(uuid),
        expiry_date          INTEGER,
        metadata             TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_credential_version_order
        ON credential_version(credential_uuid, version_created_at DESC, seq DESC);

    CREATE TABLE IF NOT EXISTS certificate_credential (
        uuid                  TEXT PRIMARY KEY REFERENCES credential_version(uuid) ON DELETE CASCADE,
        credential_uuid       TEXT NOT NULL,
        certificate           TEXT NOT NULL,
        ca                    TEXT,
        ca_name               TEXT,
        transitional          INTEGER NOT NULL DEFAULT 0,
        certificate_authority INTEGER NOT NULL DEFAULT 0,
        self_signed           INTEGER NOT NULL DEFAULT 0
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_one_transitional_per_credential
        ON certificate_credential(credential_uuid) WHERE transitional = 1;
    CREATE INDEX IF NOT EXISTS idx_certificate_ca_name
        ON certificate_credential(ca_name);

    CREATE TABLE IF NOT EXISTS public_key_credential (
        uuid       TEXT PRIMARY KEY REFERENCES credential_version(uuid) ON DELETE CASCADE,
        public_key TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_credential (
        uuid     TEXT PRIMARY KEY REFERENCES credential_version(uuid) ON DELETE CASCADE,
        username TEXT,
        salt     TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS permission (
        uuid      TEXT PRIMARY KEY,
        path      TEXT NOT NULL,
        actor     TEXT NOT NULL,
        read      INTEGER NOT NULL DEFAULT 0,
        write     INTEGER NOT NULL DEFAULT 0,
        "delete"  INTEGER NOT NULL DEFAULT 0,
        read_acl  INTEGER NOT NULL DEFAULT 0,
        write_acl INTEGER NOT NULL DEFAULT 0,
        UNIQUE (path, actor)
    );
"#;

/// The relational store. One connection, serialized behind a mutex.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

impl CanaryStore for Store {
    fn canaries(&self) -> anyhow::Result<Vec<Canary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT uuid, encrypted_value, nonce FROM encryption_key_canary")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Canary {
                    uuid: uuid_col(row, 0)?,
                    ciphertext: row.get(1)?,
                    nonce: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn insert_canary(&self, canary: &Canary) -> anyhow::Result<()> {
        self.lock().execute(
            "INSERT INTO encryption_key_canary (uuid, encrypted_value, nonce) VALUES (?1, ?2, ?3)",
            params![canary.uuid.to_string(), canary.ciphertext, canary.nonce],
        )?;
        Ok(())
    }

    fn delete_canaries(&self, uuids: &[Uuid]) -> anyhow::Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for uuid in uuids {
            tx.execute(
                "DELETE FROM encryption_key_canary WHERE uuid = ?1",
                [uuid.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

// ── encrypted_value rows ─────────────────────────────────────────────

pub(crate) fn insert_encrypted_value(conn: &Connection, value: &EncryptedValue) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO encrypted_value (uuid, encryption_key_uuid, encrypted_value, nonce, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            value.uuid.to_string(),
            value.encryption_key_uuid.to_string(),
            value.ciphertext,
            value.nonce,
            Utc::now().timestamp_micros(),
        ],
    )?;
    Ok(())
}

/// Replace ciphertext, nonce and key reference of an existing row.
///
/// Only succeeds while the row is still under `previous_key`, so a value
/// rewritten concurrently is left alone. Returns whether a row changed.
pub(crate) fn replace_encrypted_value(
    conn: &Connection,
    value: &EncryptedValue,
    previous_key: &Uuid,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        r#"
        UPDATE encrypted_value
        SET encryption_key_uuid = ?2, encrypted_value = ?3, nonce = ?4, updated_at = ?5
        WHERE uuid = ?1 AND encryption_key_uuid = ?6
        "#,
        params![
            value.uuid.to_string(),
            value.encryption_key_uuid.to_string(),
            value.ciphertext,
            value.nonce,
            Utc::now().timestamp_micros(),
            previous_key.to_string(),
        ],
    )?;
    Ok(changed == 1)
}

pub(crate) fn delete_encrypted_values(conn: &Connection, uuids: &[Uuid]) -> rusqlite::Result<()> {
    for uuid in uuids {
        conn.execute("DELETE FROM encrypted_value WHERE uuid = ?1", [uuid.to_string()])?;
    }
    Ok(())
}

pub(crate) fn find_encrypted_value(
    conn: &Connection,
    uuid: &Uuid,
) -> rusqlite::Result<Option<EncryptedValue>> {
    conn.query_row(
        "SELECT uuid, encryption_key_uuid, encrypted_value, nonce FROM encrypted_value WHERE uuid = ?1",
        [uuid.to_string()],
        |row| encrypted_value_cols(row, 0),
    )
    .optional()
}

/// Read four consecutive columns `uuid, key uuid, ciphertext, nonce`.
pub(crate) fn encrypted_value_cols(row: &Row<'_>, start: usize) -> rusqlite::Result<EncryptedValue> {
    Ok(EncryptedValue {
        uuid: uuid_col(row, start)?,
        encryption_key_uuid: uuid_col(row, start + 1)?,
        ciphertext: row.get(start + 2)?,
        nonce: row.get(start + 3)?,
    })
}

// ── column helpers ───────────────────────────────────────────────────

pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => uuid_col(row, idx).map(Some),
    }
}

pub(crate) fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    micros_to_time(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {micros} out of range").into(),
        )
    })
}

pub(crate) fn opt_time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        None => Ok(None),
        Some(_) => time_col(row, idx).map(Some),
    }
}

pub(crate) fn micros_to_time(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.lock().execute_batch(SCHEMA).unwrap();
    }

    #[test]
    fn canary_rows_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let canary = Canary {
            uuid: Uuid::new_v4(),
            ciphertext: vec![1, 2, 3],
            nonce: vec![4; 12],
        };
        store.insert_canary(&canary).unwrap();
        assert_eq!(store.canaries().unwrap(), vec![canary.clone()]);
        store.delete_canaries(&[canary.uuid]).unwrap();
        assert!(store.canaries().unwrap().is_empty());
    }

    #[test]
    fn replace_is_conditional_on_previous_key() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let old_key = Uuid::new_v4();
        let value = EncryptedValue {
            uuid: Uuid::new_v4(),
            encryption_key_uuid: old_key,
            ciphertext: vec![9; 20],
            nonce: vec![0; 12],
        };
        insert_encrypted_value(&conn, &value).unwrap();

        let rotated = EncryptedValue {
            encryption_key_uuid: Uuid::new_v4(),
            ..value.clone()
        };
        assert!(replace_encrypted_value(&conn, &rotated, &old_key).unwrap());
        // Second attempt with the stale key reference changes nothing.
        assert!(!replace_encrypted_value(&conn, &rotated, &old_key).unwrap());
        assert_eq!(find_encrypted_value(&conn, &value.uuid).unwrap(), Some(rotated));
    }
}
