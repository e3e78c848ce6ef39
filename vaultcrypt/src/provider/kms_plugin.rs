use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use super::{KeyProvider, ProviderKind, Sealed};
use crate::error::ProviderError;

/// Provider that delegates to an external KMS plugin over JSON/HTTP.
///
/// Protocol:
/// - `POST {endpoint}/v1/encrypt` `{"key_id", "plaintext"}` -> `{"ciphertext"}`
/// - `POST {endpoint}/v1/decrypt` `{"key_id", "ciphertext"}` -> `{"plaintext"}`
///
/// Payloads are base64. The plugin embeds its own nonce in the ciphertext, so
/// the stored nonce is empty. A 4xx answer to a decrypt means the ciphertext
/// was rejected; transport failures and 5xx answers are retried.
pub struct KmsPluginProvider {
    endpoint: String,
    key_id: String,
    agent: ureq::Agent,
    retries: u32,
}

#[derive(Serialize)]
struct EncryptRequest<'a> {
    key_id: &'a str,
    plaintext: String,
}

#[derive(Deserialize)]
struct EncryptResponse {
    ciphertext: String,
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
    key_id: &'a str,
    ciphertext: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

enum CallError {
    Rejected(u16),
    Transport(anyhow::Error),
}

impl KmsPluginProvider {
    pub fn new(endpoint: String, key_id: String, timeout: Duration, retries: u32) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key_id,
            agent,
            retries,
        }
    }

    fn call(&self, path: &str, body: serde_json::Value) -> Result<ureq::Response, CallError> {
        let url = format!("{}{path}", self.endpoint);
        match self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(body)
        {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(code, _)) if (400..500).contains(&code) => {
                Err(CallError::Rejected(code))
            }
            Err(ureq::Error::Status(code, _)) => Err(CallError::Transport(anyhow::anyhow!(
                "kms plugin answered {code} for {url}"
            ))),
            Err(e) => Err(CallError::Transport(anyhow::anyhow!("{url}: {e}"))),
        }
    }

    /// Retry transport failures up to `retries` extra times.
    fn call_with_retry(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ureq::Response, CallError> {
        let mut attempt = 0;
        loop {
            match self.call(path, body.clone()) {
                Err(CallError::Transport(e)) if attempt < self.retries => {
                    attempt += 1;
                    log::warn!("kms plugin call {path} failed (attempt {attempt}): {e}");
                }
                other => return other,
            }
        }
    }
}

impl KeyProvider for KmsPluginProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::KmsPlugin
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, ProviderError> {
        let body = EncryptRequest {
            key_id: &self.key_id,
            plaintext: STANDARD.encode(plaintext),
        };
        let body = serde_json::to_value(&body).map_err(ProviderError::unreachable)?;
        let resp = match self.call_with_retry("/v1/encrypt", body) {
            Ok(resp) => resp,
            Err(CallError::Rejected(code)) => {
                return Err(ProviderError::unreachable(anyhow::anyhow!(
                    "kms plugin rejected encrypt with status {code}"
                )));
            }
            Err(CallError::Transport(e)) => return Err(ProviderError::Unreachable(e)),
        };
        let resp: EncryptResponse = resp.into_json().map_err(ProviderError::unreachable)?;
        let ciphertext = STANDARD
            .decode(resp.ciphertext)
            .map_err(ProviderError::unreachable)?;
        Ok(Sealed {
            ciphertext,
            nonce: Vec::new(),
        })
    }

    fn decrypt(&self, ciphertext: &[u8], _nonce: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let body = DecryptRequest {
            key_id: &self.key_id,
            ciphertext: STANDARD.encode(ciphertext),
        };
        let body = serde_json::to_value(&body).map_err(ProviderError::unreachable)?;
        let resp = match self.call_with_retry("/v1/decrypt", body) {
            Ok(resp) => resp,
            Err(CallError::Rejected(_)) => return Err(ProviderError::Authentication),
            Err(CallError::Transport(e)) => return Err(ProviderError::Unreachable(e)),
        };
        let resp: DecryptResponse = resp.into_json().map_err(ProviderError::unreachable)?;
        STANDARD
            .decode(resp.plaintext)
            .map_err(|_| ProviderError::Authentication)
    }
}
