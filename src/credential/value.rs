use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{CertificateDetails, CredentialType, VersionDetails};
use crate::error::{Result, VaultError};

/// The plaintext payload of a credential version, one variant per type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CredentialValue {
    Value {
        value: String,
    },
    Json {
        value: Json,
    },
    Password {
        password: String,
    },
    User {
        username: Option<String>,
        password: String,
        salt: String,
    },
    Certificate(CertificateValue),
    Ssh {
        public_key: String,
        private_key: String,
    },
    Rsa {
        public_key: String,
        private_key: String,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateValue {
    pub ca: Option<String>,
    pub certificate: String,
    pub private_key: Option<String>,
    pub ca_name: Option<String>,
    #[serde(default)]
    pub certificate_authority: bool,
    #[serde(default)]
    pub self_signed: bool,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl CredentialValue {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialValue::Value { .. } => CredentialType::Value,
            CredentialValue::Json { .. } => CredentialType::Json,
            CredentialValue::Password { .. } => CredentialType::Password,
            CredentialValue::User { .. } => CredentialType::User,
            CredentialValue::Certificate(_) => CredentialType::Certificate,
            CredentialValue::Ssh { .. } => CredentialType::Ssh,
            CredentialValue::Rsa { .. } => CredentialType::Rsa,
        }
    }

    /// The part that gets encrypted, serialised as JSON.
    pub(crate) fn secret_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let secret = match self {
            CredentialValue::Value { value } => Json::String(value.clone()),
            CredentialValue::Json { value } => value.clone(),
            CredentialValue::Password { password } | CredentialValue::User { password, .. } => {
                Json::String(password.clone())
            }
            CredentialValue::Certificate(cert) => match &cert.private_key {
                Some(key) => Json::String(key.clone()),
                None => Json::Null,
            },
            CredentialValue::Ssh { private_key, .. } | CredentialValue::Rsa { private_key, .. } => {
                Json::String(private_key.clone())
            }
        };
        Ok(Zeroizing::new(serde_json::to_vec(&secret)?))
    }

    /// The public columns stored next to the version row.
    pub(crate) fn details(&self, transitional: bool) -> VersionDetails {
        match self {
            CredentialValue::Value { .. }
            | CredentialValue::Json { .. }
            | CredentialValue::Password { .. } => VersionDetails::Plain,
            CredentialValue::User { username, salt, .. } => VersionDetails::User {
                username: username.clone(),
                salt: salt.clone(),
            },
            CredentialValue::Certificate(cert) => VersionDetails::Certificate(CertificateDetails {
                certificate: cert.certificate.clone(),
                ca: cert.ca.clone(),
                ca_name: cert.ca_name.clone(),
                transitional,
                certificate_authority: cert.certificate_authority,
                self_signed: cert.self_signed,
            }),
            CredentialValue::Ssh { public_key, .. } | CredentialValue::Rsa { public_key, .. } => {
                VersionDetails::PublicKey {
                    public_key: public_key.clone(),
                }
            }
        }
    }

    pub(crate) fn expiry_date(&self) -> Option<DateTime<Utc>> {
        match self {
            CredentialValue::Certificate(cert) => cert.expiry_date,
            _ => None,
        }
    }

    /// Reassemble a value from its decrypted secret and public columns.
    pub(crate) fn from_parts(
        credential_type: CredentialType,
        secret: &[u8],
        details: &VersionDetails,
        expiry_date: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let secret: Json = serde_json::from_slice(secret)?;
        let string = |secret: Json| match secret {
            Json::String(s) => Ok(s),
            other => Err(VaultError::Storage(format!(
                "expected a string secret for {credential_type}, found {other}"
            ))),
        };
        let mismatch = || {
            VaultError::Storage(format!(
                "stored columns do not match credential type {credential_type}"
            ))
        };

        Ok(match (credential_type, details) {
            (CredentialType::Value, _) => CredentialValue::Value {
                value: string(secret)?,
            },
            (CredentialType::Json, _) => CredentialValue::Json { value: secret },
            (CredentialType::Password, _) => CredentialValue::Password {
                password: string(secret)?,
            },
            (CredentialType::User, VersionDetails::User { username, salt }) => CredentialValue::User {
                username: username.clone(),
                password: string(secret)?,
                salt: salt.clone(),
            },
            (CredentialType::Certificate, VersionDetails::Certificate(cert)) => {
                let private_key = match secret {
                    Json::Null => None,
                    other => Some(string(other)?),
                };
                CredentialValue::Certificate(CertificateValue {
                    ca: cert.ca.clone(),
                    certificate: cert.certificate.clone(),
                    private_key,
                    ca_name: cert.ca_name.clone(),
                    certificate_authority: cert.certificate_authority,
                    self_signed: cert.self_signed,
                    expiry_date,
                })
            }
            (CredentialType::Ssh, VersionDetails::PublicKey { public_key }) => CredentialValue::Ssh {
                public_key: public_key.clone(),
                private_key: string(secret)?,
            },
            (CredentialType::Rsa, VersionDetails::PublicKey { public_key }) => CredentialValue::Rsa {
                public_key: public_key.clone(),
                private_key: string(secret)?,
            },
            _ => return Err(mismatch()),
        })
    }

    /// OpenSSH style `SHA256:...` fingerprint of an ssh public key.
    pub fn public_key_fingerprint(&self) -> Option<String> {
        let CredentialValue::Ssh { public_key, .. } = self else {
            return None;
        };
        let blob = public_key.split_whitespace().nth(1)?;
        let decoded = STANDARD.decode(blob).ok()?;
        Some(format!(
            "SHA256:{}",
            STANDARD_NO_PAD.encode(Sha256::digest(&decoded))
        ))
    }
}
