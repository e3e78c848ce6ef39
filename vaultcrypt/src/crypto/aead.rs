use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};

use super::keys::MasterKey;
use crate::error::ProviderError;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// Returns `(ciphertext || tag, nonce)`.
pub fn seal(key: &MasterKey, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ProviderError> {
    let nonce_bytes = random_nonce().map_err(ProviderError::unreachable)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| ProviderError::unreachable(anyhow::anyhow!("bad key length: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| ProviderError::unreachable(anyhow::anyhow!("encrypt failed: {e}")))?;
    Ok((ciphertext, nonce_bytes.to_vec()))
}

/// Decrypt and authenticate a value produced by [`seal`].
pub fn open(key: &MasterKey, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, ProviderError> {
    if nonce.len() != NONCE_LEN || ciphertext.len() < TAG_LEN {
        return Err(ProviderError::Authentication);
    }
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| ProviderError::unreachable(anyhow::anyhow!("bad key length: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ProviderError::Authentication)
}

fn random_nonce() -> anyhow::Result<[u8; NONCE_LEN]> {
    let mut n = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut n).map_err(|e| anyhow::anyhow!("getrandom failed: {e}"))?;
    Ok(n)
}
