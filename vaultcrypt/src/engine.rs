//! The envelope encryption engine.

use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
    MAX_PLAINTEXT_LEN,
    error::{CryptError, ProviderError, Result},
    keyset::KeySet,
};

/// Ciphertext, nonce and the identity of the key that produced them.
///
/// `uuid` is the value's own identity; rotation replaces the other fields
/// and keeps it, so rows referencing the value need no update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedValue {
    pub uuid: Uuid,
    pub encryption_key_uuid: Uuid,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Encrypts under the active key and decrypts under whichever key a value
/// references.
pub struct Encryptor {
    keys: RwLock<Arc<KeySet>>,
}

impl Encryptor {
    pub fn new(keys: KeySet) -> Self {
        Self {
            keys: RwLock::new(Arc::new(keys)),
        }
    }

    /// The snapshot in effect right now.
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.keys.read().clone()
    }

    /// Swap in a freshly loaded key set. In-flight operations finish
    /// against the snapshot they started with.
    pub fn reload(&self, keys: KeySet) {
        let keys = Arc::new(keys);
        log::info!(
            "encryption keys reloaded: {} usable, active = {:?}",
            keys.len(),
            keys.active_uuid()
        );
        *self.keys.write() = keys;
    }

    pub fn active_key_uuid(&self) -> Option<Uuid> {
        self.keys.read().active_uuid()
    }

    /// Encrypt `plaintext` under the active key as a new value.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedValue> {
        self.encrypt_as(Uuid::new_v4(), plaintext)
    }

    /// Encrypt `plaintext` under the active key, keeping identity `uuid`.
    pub fn encrypt_as(&self, uuid: Uuid, plaintext: &[u8]) -> Result<EncryptedValue> {
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(CryptError::PlaintextTooLarge(plaintext.len()));
        }
        let keys = self.snapshot();
        let key = keys
            .active()
            .ok_or_else(|| CryptError::KeyUnavailable("no key is marked active".into()))?;

        let sealed = key.provider().encrypt(plaintext).map_err(|e| match e {
            ProviderError::TooLarge { len, .. } => CryptError::PlaintextTooLarge(len),
            other => CryptError::KeyUnavailable(other.to_string()),
        })?;

        Ok(EncryptedValue {
            uuid,
            encryption_key_uuid: key.uuid,
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
        })
    }

    pub fn decrypt(&self, value: &EncryptedValue) -> Result<Vec<u8>> {
        let keys = self.snapshot();
        let key = keys.get(&value.encryption_key_uuid).ok_or_else(|| {
            log::error!(
                "encrypted value {} references key {} which is not configured; data is unrecoverable without it",
                value.uuid,
                value.encryption_key_uuid
            );
            CryptError::KeyNotFound(value.encryption_key_uuid)
        })?;

        key.provider()
            .decrypt(&value.ciphertext, &value.nonce)
            .map_err(|e| match e {
                ProviderError::Authentication => {
                    log::warn!("encrypted value {} failed authentication", value.uuid);
                    CryptError::DecryptionFailed
                }
                other => CryptError::KeyUnavailable(other.to_string()),
            })
    }

    /// Re-encrypt a value under the active key, preserving its identity.
    ///
    /// A value already under the active key is returned unchanged.
    pub fn rotate(&self, value: &EncryptedValue) -> Result<EncryptedValue> {
        if self.active_key_uuid() == Some(value.encryption_key_uuid) {
            return Ok(value.clone());
        }
        let plaintext = zeroize::Zeroizing::new(self.decrypt(value)?);
        self.encrypt_as(value.uuid, &plaintext)
    }
}
