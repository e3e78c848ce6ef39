use std::sync::Arc;

use super::{KeyProvider, ProviderKind, Sealed};
use crate::error::ProviderError;

/// Largest single AES-GCM operation the HSM accepts.
pub const HSM_MAX_PLAINTEXT_LEN: usize = 64 * 1024;

/// PKCS#11-style session with a hardware security module.
///
/// The key never leaves the device; the session performs AES-GCM with the
/// named key object and returns the IV it generated.
pub trait HsmSession: Send + Sync + 'static {
    fn encrypt(&self, key_name: &str, plaintext: &[u8]) -> Result<Sealed, ProviderError>;

    fn decrypt(&self, key_name: &str, ciphertext: &[u8], iv: &[u8])
    -> Result<Vec<u8>, ProviderError>;
}

/// Provider backed by a key object stored on an HSM.
pub struct HsmKeyProvider {
    key_name: String,
    session: Arc<dyn HsmSession>,
}

impl HsmKeyProvider {
    pub fn new(key_name: String, session: Arc<dyn HsmSession>) -> Self {
        Self { key_name, session }
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }
}

impl KeyProvider for HsmKeyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hsm
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, ProviderError> {
        if plaintext.len() > HSM_MAX_PLAINTEXT_LEN {
            return Err(ProviderError::TooLarge {
                len: plaintext.len(),
                limit: HSM_MAX_PLAINTEXT_LEN,
            });
        }
        self.session.encrypt(&self.key_name, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.session.decrypt(&self.key_name, ciphertext, nonce)
    }

    fn max_plaintext_len(&self) -> Option<usize> {
        Some(HSM_MAX_PLAINTEXT_LEN)
    }
}
