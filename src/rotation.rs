//! Re-encryption of stored values under the active key.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use rusqlite::params;
use uuid::Uuid;
use vaultcrypt::{CanaryStore, EncryptedValue, Encryptor};

use crate::{
    error::{Result, VaultError},
    store::{Store, encrypted_value_cols, replace_encrypted_value, uuid_col},
};

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Cooperative cancellation, checked between pages.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub rotated: usize,
    pub failed: usize,
    pub pages: usize,
    pub stopped: bool,
}

pub struct KeyRotator {
    store: Arc<Store>,
    encryptor: Arc<Encryptor>,
    page_size: usize,
}

impl KeyRotator {
    pub fn new(store: Arc<Store>, encryptor: Arc<Encryptor>, page_size: usize) -> Self {
        Self {
            store,
            encryptor,
            page_size: page_size.max(1),
        }
    }

    /// Move every value not under the active key onto it.
    ///
    /// Pages through `encrypted_value` in rowid order. A row that fails is
    /// logged and left on its old key; the next run retries it. Running
    /// again with no writes in between rotates nothing.
    pub fn rotate_all(&self, stop: &StopFlag) -> Result<RotationReport> {
        let active = self
            .encryptor
            .active_key_uuid()
            .ok_or_else(|| VaultError::KeyUnavailable("no key is marked active".into()))?;
        let mut report = RotationReport::default();
        let mut cursor: i64 = 0;

        log::info!("key rotation started, target key {active}");
        loop {
            if stop.is_stopped() {
                log::info!("key rotation stopped after {} page(s)", report.pages);
                report.stopped = true;
                break;
            }

            let page = self.next_page(&active, cursor)?;
            let Some((last_rowid, _)) = page.last() else {
                break;
            };
            cursor = *last_rowid;

            for (_, value) in &page {
                match self.rotate_one(value) {
                    Ok(true) => report.rotated += 1,
                    Ok(false) => {}
                    Err(e) => {
                        log::error!("could not rotate encrypted value {}: {e}", value.uuid);
                        report.failed += 1;
                    }
                }
            }
            report.pages += 1;
            log::info!(
                "key rotation page {}: {} row(s), {} rotated so far",
                report.pages,
                page.len(),
                report.rotated
            );
        }

        log::info!(
            "key rotation finished: {} rotated, {} failed",
            report.rotated,
            report.failed
        );
        Ok(report)
    }

    fn next_page(&self, active: &Uuid, after: i64) -> Result<Vec<(i64, EncryptedValue)>> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT rowid, uuid, encryption_key_uuid, encrypted_value, nonce
            FROM encrypted_value
            WHERE encryption_key_uuid != ?1 AND rowid > ?2
            ORDER BY rowid
            LIMIT ?3
            "#,
        )?;
        let limit = i64::try_from(self.page_size).unwrap_or(i64::MAX);
        let page = stmt
            .query_map(params![active.to_string(), after, limit], |row| {
                Ok((row.get(0)?, encrypted_value_cols(row, 1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(page)
    }

    /// Decrypt and re-encrypt outside the lock, then write with one
    /// conditional `UPDATE`.
    fn rotate_one(&self, value: &EncryptedValue) -> Result<bool> {
        let rotated = self.encryptor.rotate(value)?;
        if rotated.encryption_key_uuid == value.encryption_key_uuid {
            return Ok(false);
        }
        let conn = self.store.lock();
        Ok(replace_encrypted_value(&conn, &rotated, &value.encryption_key_uuid)?)
    }

    /// Values whose key is not the active one.
    pub fn count_needing_rotation(&self) -> Result<u64> {
        let active = self.encryptor.active_key_uuid().map(|u| u.to_string());
        let conn = self.store.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM encrypted_value WHERE ?1 IS NULL OR encryption_key_uuid != ?1",
            [active],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of values held under each key.
    pub fn count_by_key(&self) -> Result<BTreeMap<Uuid, u64>> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(
            "SELECT encryption_key_uuid, COUNT(*) FROM encrypted_value GROUP BY encryption_key_uuid",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((uuid_col(row, 0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(counts)
    }

    /// Delete canaries of keys that are no longer configured and that no
    /// value references. Skipped while any configured key is disabled,
    /// since its canary cannot be told apart from an unused one.
    pub fn remove_unused_keys(&self) -> Result<Vec<Uuid>> {
        let keys = self.encryptor.snapshot();
        if !keys.disabled().is_empty() {
            log::warn!(
                "not removing unused keys: {} configured key(s) are disabled",
                keys.disabled().len()
            );
            return Ok(Vec::new());
        }

        let referenced: HashSet<Uuid> = self.count_by_key()?.into_keys().collect();
        let unused: Vec<Uuid> = self
            .store
            .canaries()
            .map_err(|e| VaultError::Storage(e.to_string()))?
            .into_iter()
            .map(|c| c.uuid)
            .filter(|uuid| !keys.contains(uuid) && !referenced.contains(uuid))
            .collect();

        if !unused.is_empty() {
            self.store
                .delete_canaries(&unused)
                .map_err(|e| VaultError::Storage(e.to_string()))?;
            log::info!("removed {} unused encryption key canary(ies)", unused.len());
        }
        Ok(unused)
    }
}
