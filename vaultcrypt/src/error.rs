use thiserror::Error;
use uuid::Uuid;

use crate::MAX_PLAINTEXT_LEN;

/// Errors surfaced by the encryption engine.
#[derive(Debug, Error)]
pub enum CryptError {
    /// No key is marked active, or the active key's provider cannot be reached.
    #[error("no active encryption key is available: {0}")]
    KeyUnavailable(String),

    /// The value references a key that is not part of the current key set.
    /// Data under that key is unrecoverable until the key is configured again.
    #[error("encryption key {0} is not configured")]
    KeyNotFound(Uuid),

    /// Authentication failed while decrypting: tampered or corrupted data,
    /// or a key that does not match the ciphertext.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("plaintext of {0} bytes exceeds the limit of {MAX_PLAINTEXT_LEN} bytes")]
    PlaintextTooLarge(usize),

    #[error("invalid key configuration: {0}")]
    Config(String),

    #[error("canary storage failed: {0}")]
    CanaryStore(#[source] anyhow::Error),
}

/// Errors returned by a single key provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport or device failure. Callers may retry.
    #[error("key provider unreachable: {0}")]
    Unreachable(#[source] anyhow::Error),

    #[error("ciphertext failed authentication")]
    Authentication,

    #[error("plaintext of {len} bytes exceeds provider limit of {limit} bytes")]
    TooLarge { len: usize, limit: usize },
}

impl ProviderError {
    pub fn unreachable(err: impl Into<anyhow::Error>) -> Self {
        ProviderError::Unreachable(err.into())
    }
}

pub type Result<T> = std::result::Result<T, CryptError>;
