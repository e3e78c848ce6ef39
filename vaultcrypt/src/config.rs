//! Encryption key configuration.

use std::{fmt, path::PathBuf};

use serde::Deserialize;

use crate::{error::CryptError, provider::ProviderKind};

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_retries() -> u32 {
    2
}

/// One configured encryption key.
#[derive(Clone, Deserialize)]
pub struct KeyConfig {
    /// New writes go to the active key. At most one key may be active.
    #[serde(default)]
    pub active: bool,
    #[serde(flatten)]
    pub source: KeySource,
}

/// Where a key's material lives, tagged by `provider`.
#[derive(Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "kebab-case")]
pub enum KeySource {
    Internal {
        #[serde(default)]
        encryption_password: Option<String>,
        #[serde(default)]
        salt: Option<String>,
        #[serde(default)]
        key_file: Option<PathBuf>,
    },
    Hsm {
        encryption_key_name: String,
    },
    KmsPlugin {
        endpoint: String,
        key_id: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_retries")]
        retries: u32,
    },
}

impl KeySource {
    pub fn kind(&self) -> ProviderKind {
        match self {
            KeySource::Internal { .. } => ProviderKind::Internal,
            KeySource::Hsm { .. } => ProviderKind::Hsm,
            KeySource::KmsPlugin { .. } => ProviderKind::KmsPlugin,
        }
    }
}

impl KeyConfig {
    pub fn internal_password(password: &str, salt: &str, active: bool) -> Self {
        Self {
            active,
            source: KeySource::Internal {
                encryption_password: Some(password.to_string()),
                salt: Some(salt.to_string()),
                key_file: None,
            },
        }
    }
}

/// Reject key lists with more than one active key.
pub fn validate_keys(keys: &[KeyConfig]) -> Result<(), CryptError> {
    let active = keys.iter().filter(|k| k.active).count();
    if active > 1 {
        return Err(CryptError::Config(format!(
            "{active} keys are marked active; at most one is allowed"
        )));
    }
    Ok(())
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Internal { key_file, .. } => f
                .debug_struct("Internal")
                .field("encryption_password", &"***")
                .field("key_file", key_file)
                .finish(),
            KeySource::Hsm {
                encryption_key_name,
            } => f
                .debug_struct("Hsm")
                .field("encryption_key_name", encryption_key_name)
                .finish(),
            KeySource::KmsPlugin {
                endpoint, key_id, ..
            } => f
                .debug_struct("KmsPlugin")
                .field("endpoint", endpoint)
                .field("key_id", key_id)
                .finish(),
        }
    }
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("active", &self.active)
            .field("source", &self.source)
            .finish()
    }
}
