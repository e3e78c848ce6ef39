//! Credential name normalisation and the uniqueness checksum.

use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// Normalise a credential name to its canonical `/a/b/c` form.
///
/// Surrounding whitespace is trimmed, runs of `/` collapse to one and a
/// leading `/` is added. Empty names, names ending in `/` and names that
/// contain whitespace or control characters are rejected.
pub fn normalize(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    let invalid = || ValidationError::InvalidName(name.to_string());

    if trimmed.is_empty() || trimmed.ends_with('/') {
        return Err(invalid());
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid());
    }

    let mut out = String::with_capacity(trimmed.len() + 1);
    for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        return Err(invalid());
    }
    Ok(out)
}

/// Hex SHA-256 of an already normalised name.
pub fn checksum(normalized: &str) -> String {
    let digest = Sha256::digest(normalized.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}
