use std::path::PathBuf;

use argon2::Argon2;
use parking_lot::Mutex;
use zeroize::Zeroizing;

use super::{KeyProvider, ProviderKind, Sealed};
use crate::{
    crypto::{aead, keys::MasterKey},
    error::ProviderError,
};

/// In-process AES-256-GCM provider. The key is read from a 32-byte file or
/// derived from a password via Argon2id, on first use.
pub struct InternalKeyProvider {
    /// Cached key, derived once and then reused.
    cached: Mutex<Option<MasterKey>>,
    source: KeyMaterial,
}

enum KeyMaterial {
    Preloaded,
    File(PathBuf),
    Password {
        password: Zeroizing<String>,
        salt: Vec<u8>,
    },
}

/// Salt used when a password key is configured without one. Deployments
/// should always set `salt` explicitly.
const DEFAULT_SALT: &[u8; 16] = b"credvault-salt-1";

impl InternalKeyProvider {
    pub fn from_keyfile(path: PathBuf) -> Self {
        Self {
            cached: Mutex::new(None),
            source: KeyMaterial::File(path),
        }
    }

    pub fn from_password(password: &str, salt: Option<&str>) -> Self {
        let salt = salt
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_else(|| DEFAULT_SALT.to_vec());
        Self {
            cached: Mutex::new(None),
            source: KeyMaterial::Password {
                password: Zeroizing::new(password.to_owned()),
                salt,
            },
        }
    }

    pub fn from_key(key: MasterKey) -> Self {
        Self {
            cached: Mutex::new(Some(key)),
            source: KeyMaterial::Preloaded,
        }
    }

    fn load_key(&self) -> anyhow::Result<MasterKey> {
        match &self.source {
            KeyMaterial::Preloaded => anyhow::bail!("preloaded key is missing from the cache"),
            KeyMaterial::File(path) => {
                let bytes = Zeroizing::new(std::fs::read(path)?);
                MasterKey::from_slice(&bytes)
            }
            KeyMaterial::Password { password, salt } => {
                anyhow::ensure!(
                    salt.len() >= 8,
                    "salt must be at least 8 bytes, got {}",
                    salt.len()
                );
                let mut key = [0u8; 32];
                Argon2::default()
                    .hash_password_into(password.as_bytes(), salt, &mut key)
                    .map_err(|e| anyhow::anyhow!("argon2 failed: {e}"))?;
                Ok(MasterKey::from_bytes(key))
            }
        }
    }

    fn key(&self) -> Result<MasterKey, ProviderError> {
        let mut guard = self.cached.lock();
        if let Some(ref cached) = *guard {
            return Ok(cached.clone());
        }
        let key = self.load_key().map_err(ProviderError::Unreachable)?;
        *guard = Some(key.clone());
        Ok(key)
    }
}

impl KeyProvider for InternalKeyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Internal
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, ProviderError> {
        let key = self.key()?;
        let (ciphertext, nonce) = aead::seal(&key, plaintext)?;
        Ok(Sealed { ciphertext, nonce })
    }

    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let key = self.key()?;
        aead::open(&key, ciphertext, nonce)
    }
}
