//! Named credentials and their append-only version history.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vaultcrypt::EncryptedValue;

pub mod name;
pub mod store;
pub mod value;

pub use store::{CredentialVersionStore, SaveRequest};
pub use value::{CertificateValue, CredentialValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    Password,
    Certificate,
    Ssh,
    Rsa,
    User,
    Json,
    Value,
}

impl CredentialType {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialType::Password => "password",
            CredentialType::Certificate => "certificate",
            CredentialType::Ssh => "ssh",
            CredentialType::Rsa => "rsa",
            CredentialType::User => "user",
            CredentialType::Json => "json",
            CredentialType::Value => "value",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "password" => CredentialType::Password,
            "certificate" => CredentialType::Certificate,
            "ssh" => CredentialType::Ssh,
            "rsa" => CredentialType::Rsa,
            "user" => CredentialType::User,
            "json" => CredentialType::Json,
            "value" => CredentialType::Value,
            other => return Err(format!("unknown credential type '{other}'")),
        })
    }
}

/// One immutable snapshot of a credential.
///
/// The secret payload stays encrypted here; decrypt it through
/// [`CredentialVersionStore::decrypt_value`].
#[derive(Clone, Debug, PartialEq)]
pub struct CredentialVersion {
    pub uuid: Uuid,
    pub credential_uuid: Uuid,
    pub name: String,
    /// Insertion sequence, the tie-break between equal timestamps.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
    pub credential_type: CredentialType,
    pub encrypted_value: EncryptedValue,
    /// Encrypted generation parameters of generated passwords and users.
    pub parameters: Option<EncryptedValue>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub details: VersionDetails,
}

impl CredentialVersion {
    pub fn certificate(&self) -> Option<&CertificateDetails> {
        match &self.details {
            VersionDetails::Certificate(cert) => Some(cert),
            _ => None,
        }
    }

    pub fn is_transitional(&self) -> bool {
        self.certificate().is_some_and(|c| c.transitional)
    }
}

/// Public, unencrypted columns of a version, by subtype.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionDetails {
    /// password, value and json carry nothing outside the ciphertext.
    Plain,
    Certificate(CertificateDetails),
    /// ssh and rsa keypairs.
    PublicKey { public_key: String },
    User { username: Option<String>, salt: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateDetails {
    pub certificate: String,
    pub ca: Option<String>,
    pub ca_name: Option<String>,
    pub transitional: bool,
    pub certificate_authority: bool,
    pub self_signed: bool,
}
