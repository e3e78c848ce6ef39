//! Fake certificate capabilities and small helpers shared by the
//! integration tests.
//!
//! Certificates are JSON documents between PEM markers. A key pair is
//! `PUBLIC-<id>` / `PRIVATE-<id>`, and "signing" records the issuer's
//! public key in the certificate.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, bail};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{Duration, Utc};
use credvault::{
    Actor, Config, Store, Vault,
    certificate::{
        Capabilities, CertificateParameters, CertificateParser, CertificateSigner, KeyPair,
        KeyPairGenerator, ParsedCertificate, SigningMaterial,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vaultcrypt::{KeyConfig, ProviderContext};
use zeroize::Zeroizing;

const BEGIN: &str = "-----BEGIN CERTIFICATE-----\n";
const END: &str = "\n-----END CERTIFICATE-----\n";

#[derive(Serialize, Deserialize)]
struct FakeCert {
    serial: Uuid,
    common_name: Option<String>,
    organization: Option<String>,
    alternative_names: Vec<String>,
    key_length: u32,
    duration_days: u32,
    is_ca: bool,
    public_key: String,
    signed_with: String,
    expiry: chrono::DateTime<Utc>,
}

fn decode(pem: &str) -> anyhow::Result<FakeCert> {
    let body = pem
        .strip_prefix(BEGIN)
        .and_then(|rest| rest.strip_suffix(END))
        .context("missing PEM markers")?;
    Ok(serde_json::from_str(body)?)
}

fn encode(cert: &FakeCert) -> String {
    format!("{BEGIN}{}{END}", serde_json::to_string(cert).unwrap_or_default())
}

fn key_id(key: &str, prefix: &str) -> Option<String> {
    key.strip_prefix(prefix).map(str::to_string)
}

pub struct FakeParser;

impl CertificateParser for FakeParser {
    fn parse(&self, pem: &str) -> anyhow::Result<ParsedCertificate> {
        let cert = decode(pem)?;
        Ok(ParsedCertificate {
            common_name: cert.common_name,
            organization: cert.organization,
            alternative_names: cert.alternative_names,
            key_length: cert.key_length,
            duration_days: cert.duration_days,
            is_ca: cert.is_ca,
            self_signed: cert.signed_with == cert.public_key,
            expiry: cert.expiry,
        })
    }

    fn is_signed_by(&self, certificate: &str, ca: &str) -> bool {
        match (decode(certificate), decode(ca)) {
            (Ok(cert), Ok(ca)) => cert.signed_with == ca.public_key,
            _ => false,
        }
    }

    fn matches_private_key(&self, certificate: &str, private_key: &str) -> bool {
        let Ok(cert) = decode(certificate) else {
            return false;
        };
        key_id(&cert.public_key, "PUBLIC-").is_some()
            && key_id(&cert.public_key, "PUBLIC-") == key_id(private_key, "PRIVATE-")
    }
}

pub struct FakeKeyPairs;

impl KeyPairGenerator for FakeKeyPairs {
    fn generate_rsa(&self, bits: u32) -> anyhow::Result<KeyPair> {
        let id = format!("{bits}-{}", Uuid::new_v4());
        Ok(KeyPair {
            public_key: format!("PUBLIC-{id}"),
            private_key: Zeroizing::new(format!("PRIVATE-{id}")),
        })
    }

    fn to_ssh_public_key(&self, key_pair: &KeyPair, comment: Option<&str>) -> anyhow::Result<String> {
        let blob = STANDARD.encode(key_pair.public_key.as_bytes());
        Ok(match comment {
            Some(c) => format!("ssh-rsa {blob} {c}"),
            None => format!("ssh-rsa {blob}"),
        })
    }
}

pub struct FakeSigner;

impl CertificateSigner for FakeSigner {
    fn sign(
        &self,
        params: &CertificateParameters,
        key_pair: &KeyPair,
        issuer: Option<&SigningMaterial>,
    ) -> anyhow::Result<String> {
        let signed_with = match issuer {
            Some(issuer) => {
                let ca = decode(&issuer.certificate)?;
                if key_id(&ca.public_key, "PUBLIC-") != key_id(&issuer.private_key, "PRIVATE-") {
                    bail!("issuer key does not match issuer certificate");
                }
                ca.public_key
            }
            None => key_pair.public_key.clone(),
        };
        Ok(encode(&FakeCert {
            serial: Uuid::new_v4(),
            common_name: params.common_name.clone(),
            organization: params.organization.clone(),
            alternative_names: params.alternative_names.clone(),
            key_length: params.key_length,
            duration_days: params.duration_days,
            is_ca: params.is_ca,
            public_key: key_pair.public_key.clone(),
            signed_with,
            expiry: Utc::now() + Duration::days(i64::from(params.duration_days)),
        }))
    }
}

pub fn caps() -> Capabilities {
    Capabilities {
        parser: Arc::new(FakeParser),
        key_pairs: Arc::new(FakeKeyPairs),
        signer: Arc::new(FakeSigner),
    }
}

/// A certificate produced outside the store, with its key.
pub fn external_certificate(cn: &str, issuer: Option<(&str, &str)>) -> (String, String) {
    let key_pair = FakeKeyPairs.generate_rsa(2048).unwrap();
    let material = issuer.map(|(cert, key)| SigningMaterial {
        ca_name: "external".into(),
        certificate: cert.to_string(),
        private_key: Zeroizing::new(key.to_string()),
    });
    let params = CertificateParameters {
        common_name: Some(cn.into()),
        is_ca: issuer.is_none(),
        ..CertificateParameters::default()
    };
    let pem = FakeSigner.sign(&params, &key_pair, material.as_ref()).unwrap();
    (pem, key_pair.private_key.to_string())
}

pub fn actor(id: &str) -> Actor {
    Actor::new(id).unwrap()
}

pub fn key(password: &str, active: bool) -> KeyConfig {
    KeyConfig::internal_password(password, "credvault-tests-salt", active)
}

pub fn config(keys: Vec<KeyConfig>) -> Config {
    let mut config = Config::default();
    config.encryption.keys = keys;
    config
}

/// A vault over a fresh in-memory store with one active internal key.
pub fn vault() -> Vault {
    vault_on(Arc::new(Store::open_in_memory().unwrap()), vec![key("k1", true)])
}

pub fn vault_on(store: Arc<Store>, keys: Vec<KeyConfig>) -> Vault {
    Vault::with_store(store, &config(keys), ProviderContext::default(), caps()).unwrap()
}
