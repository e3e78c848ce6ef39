//! Certificate issuance, import validation and CA resolution.
//!
//! X.509 parsing, key generation and signing are consumed through the
//! [`CertificateParser`], [`KeyPairGenerator`] and [`CertificateSigner`]
//! traits; this module only decides what to ask them for.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

mod generator;
mod request;
mod resolver;

pub use generator::CertificateService;
pub use request::{
    CertificateFields, CertificateParameters, CertificateRequest, DEFAULT_KEY_LENGTH, KEY_LENGTHS,
};
pub use resolver::CaResolver;

/// What the core needs to know about a parsed certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCertificate {
    pub common_name: Option<String>,
    /// Subject `O=`.
    pub organization: Option<String>,
    pub alternative_names: Vec<String>,
    pub key_length: u32,
    pub duration_days: u32,
    pub is_ca: bool,
    pub self_signed: bool,
    pub expiry: DateTime<Utc>,
}

pub trait CertificateParser: Send + Sync {
    /// Parse a PEM certificate. Errors mean the input is not a certificate.
    fn parse(&self, pem: &str) -> anyhow::Result<ParsedCertificate>;

    /// Whether `certificate` carries a valid signature by `ca`.
    fn is_signed_by(&self, certificate: &str, ca: &str) -> bool;

    /// Whether `private_key` is the key of `certificate`.
    fn matches_private_key(&self, certificate: &str, private_key: &str) -> bool;
}

/// A PEM encoded RSA key pair.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: Zeroizing<String>,
}

pub trait KeyPairGenerator: Send + Sync {
    fn generate_rsa(&self, bits: u32) -> anyhow::Result<KeyPair>;

    /// The OpenSSH `ssh-rsa AAAA...` rendering of the public half.
    fn to_ssh_public_key(&self, key_pair: &KeyPair, comment: Option<&str>) -> anyhow::Result<String>;
}

/// Certificate and key of the CA that signs a new certificate.
#[derive(Clone)]
pub struct SigningMaterial {
    pub ca_name: String,
    pub certificate: String,
    pub private_key: Zeroizing<String>,
}

impl std::fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("ca_name", &self.ca_name)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

pub trait CertificateSigner: Send + Sync {
    /// Issue a PEM certificate for `key_pair`. Without `issuer` the result
    /// is self-signed.
    fn sign(
        &self,
        params: &CertificateParameters,
        key_pair: &KeyPair,
        issuer: Option<&SigningMaterial>,
    ) -> anyhow::Result<String>;
}

/// The three certificate capabilities, handed over together.
#[derive(Clone)]
pub struct Capabilities {
    pub parser: Arc<dyn CertificateParser>,
    pub key_pairs: Arc<dyn KeyPairGenerator>,
    pub signer: Arc<dyn CertificateSigner>,
}
