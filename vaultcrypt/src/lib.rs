//! Envelope encryption for credvault: pluggable key providers, canary
//! verification and the encrypt/decrypt/rotate engine.

pub mod canary;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod keyset;
pub mod provider;

pub use canary::{CANARY_VALUE, Canary, CanaryStore};
pub use config::{KeyConfig, KeySource};
pub use engine::{EncryptedValue, Encryptor};
pub use error::{CryptError, ProviderError};
pub use keyset::{DisabledKey, EncryptionKey, KeySet};
pub use provider::{KeyProvider, ProviderContext, ProviderKind, Sealed, hsm::HsmSession};

/// Largest plaintext accepted for a single value.
pub const MAX_PLAINTEXT_LEN: usize = 7000;

/// Install `env_logger` unless a logger is already set.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
