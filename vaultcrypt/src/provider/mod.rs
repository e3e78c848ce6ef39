pub mod hsm;
pub mod internal;
pub mod kms_plugin;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    config::KeySource,
    error::{CryptError, ProviderError},
};

/// Which kind of backend holds the key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Internal,
    Hsm,
    KmsPlugin,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Internal => write!(f, "internal"),
            ProviderKind::Hsm => write!(f, "hsm"),
            ProviderKind::KmsPlugin => write!(f, "kms-plugin"),
        }
    }
}

/// Output of a provider's authenticated encryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    /// Empty for providers that embed the nonce in the ciphertext.
    pub nonce: Vec<u8>,
}

/// Synchronous authenticated-encryption capability over one key.
pub trait KeyProvider: Send + Sync + 'static {
    fn kind(&self) -> ProviderKind;

    fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, ProviderError>;

    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Largest plaintext this backend accepts, if it imposes a limit.
    fn max_plaintext_len(&self) -> Option<usize> {
        None
    }
}

/// Runtime handles that cannot be expressed in configuration.
#[derive(Clone, Default)]
pub struct ProviderContext {
    pub hsm_session: Option<Arc<dyn hsm::HsmSession>>,
}

impl ProviderContext {
    pub fn with_hsm_session(mut self, session: Arc<dyn hsm::HsmSession>) -> Self {
        self.hsm_session = Some(session);
        self
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("hsm_session", &self.hsm_session.is_some())
            .finish()
    }
}

/// Construct the provider described by a key's configuration.
///
/// This is the only place that branches on the provider kind.
pub fn build(source: &KeySource, ctx: &ProviderContext) -> Result<Arc<dyn KeyProvider>, CryptError> {
    let provider: Arc<dyn KeyProvider> = match source {
        KeySource::Internal {
            encryption_password,
            salt,
            key_file,
        } => match (encryption_password, key_file) {
            (Some(pw), None) => Arc::new(internal::InternalKeyProvider::from_password(
                pw,
                salt.as_deref(),
            )),
            (None, Some(path)) => {
                Arc::new(internal::InternalKeyProvider::from_keyfile(path.clone()))
            }
            _ => {
                return Err(CryptError::Config(
                    "internal key requires exactly one of encryption_password or key_file".into(),
                ));
            }
        },
        KeySource::Hsm {
            encryption_key_name,
        } => {
            let session = ctx.hsm_session.clone().ok_or_else(|| {
                CryptError::Config(format!(
                    "hsm key '{encryption_key_name}' configured but no HSM session is available"
                ))
            })?;
            Arc::new(hsm::HsmKeyProvider::new(encryption_key_name.clone(), session))
        }
        KeySource::KmsPlugin {
            endpoint,
            key_id,
            timeout_ms,
            retries,
        } => Arc::new(kms_plugin::KmsPluginProvider::new(
            endpoint.clone(),
            key_id.clone(),
            std::time::Duration::from_millis(*timeout_ms),
            *retries,
        )),
    };
    Ok(provider)
}
