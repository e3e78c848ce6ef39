use std::sync::Arc;

use parking_lot::Mutex;
use vaultcrypt::{
    CryptError, Encryptor, HsmSession, KeyConfig, KeySet, KeySource, ProviderContext,
    ProviderError, Sealed, canary::MemoryCanaryStore,
};

/// Software stand-in for a PKCS#11 device: XOR "encryption" keyed by name,
/// with a trailing checksum byte so foreign ciphertexts fail authentication.
#[derive(Default)]
struct SoftHsm {
    calls: Mutex<usize>,
}

impl SoftHsm {
    fn pad(key_name: &str) -> u8 {
        key_name.bytes().fold(0x5Au8, |acc, b| acc.wrapping_add(b))
    }
}

impl HsmSession for SoftHsm {
    fn encrypt(&self, key_name: &str, plaintext: &[u8]) -> Result<Sealed, ProviderError> {
        *self.calls.lock() += 1;
        let pad = Self::pad(key_name);
        let mut ciphertext: Vec<u8> = plaintext.iter().map(|b| b ^ pad).collect();
        ciphertext.push(pad);
        Ok(Sealed {
            ciphertext,
            nonce: vec![0; 12],
        })
    }

    fn decrypt(
        &self,
        key_name: &str,
        ciphertext: &[u8],
        _iv: &[u8],
    ) -> Result<Vec<u8>, ProviderError> {
        *self.calls.lock() += 1;
        let pad = Self::pad(key_name);
        match ciphertext.split_last() {
            Some((&tag, body)) if tag == pad => Ok(body.iter().map(|b| b ^ pad).collect()),
            _ => Err(ProviderError::Authentication),
        }
    }
}

fn internal(pw: &str, active: bool) -> KeyConfig {
    KeyConfig::internal_password(pw, "integration-salt", active)
}

fn hsm(name: &str, active: bool) -> KeyConfig {
    KeyConfig {
        active,
        source: KeySource::Hsm {
            encryption_key_name: name.into(),
        },
    }
}

#[test]
fn values_survive_a_key_cutover() {
    let store = MemoryCanaryStore::default();
    let ctx = ProviderContext::default();

    let enc = Encryptor::new(KeySet::load(&[internal("first", true)], &ctx, &store).unwrap());
    let values: Vec<_> = ["alpha", "beta", "gamma"]
        .iter()
        .map(|p| enc.encrypt(p.as_bytes()).unwrap())
        .collect();
    let old_key = enc.active_key_uuid().unwrap();

    enc.reload(
        KeySet::load(&[internal("first", false), internal("second", true)], &ctx, &store).unwrap(),
    );
    let new_key = enc.active_key_uuid().unwrap();
    assert_ne!(old_key, new_key);

    for (value, expected) in values.iter().zip(["alpha", "beta", "gamma"]) {
        // Legacy values stay readable before rotation.
        assert_eq!(enc.decrypt(value).unwrap(), expected.as_bytes());
        let rotated = enc.rotate(value).unwrap();
        assert_eq!(rotated.encryption_key_uuid, new_key);
        assert_eq!(rotated.uuid, value.uuid);
        assert_eq!(enc.decrypt(&rotated).unwrap(), expected.as_bytes());
    }
}

#[test]
fn dropping_a_key_makes_its_values_key_not_found() {
    let store = MemoryCanaryStore::default();
    let ctx = ProviderContext::default();

    let enc = Encryptor::new(KeySet::load(&[internal("first", true)], &ctx, &store).unwrap());
    let value = enc.encrypt(b"orphan").unwrap();

    enc.reload(KeySet::load(&[internal("second", true)], &ctx, &store).unwrap());
    assert!(matches!(
        enc.decrypt(&value),
        Err(CryptError::KeyNotFound(uuid)) if uuid == value.encryption_key_uuid
    ));
}

#[test]
fn hsm_and_internal_keys_coexist() {
    let store = MemoryCanaryStore::default();
    let session = Arc::new(SoftHsm::default());
    let ctx = ProviderContext::default().with_hsm_session(session.clone());

    let enc = Encryptor::new(KeySet::load(&[internal("soft", true)], &ctx, &store).unwrap());
    let legacy = enc.encrypt(b"moved to hardware").unwrap();

    enc.reload(KeySet::load(&[internal("soft", false), hsm("hsm-key-1", true)], &ctx, &store).unwrap());
    let rotated = enc.rotate(&legacy).unwrap();
    assert_eq!(enc.decrypt(&rotated).unwrap(), b"moved to hardware");
    assert!(*session.calls.lock() > 0);

    // A restart with the same configuration binds the HSM key to its canary.
    let again = KeySet::load(&[internal("soft", false), hsm("hsm-key-1", true)], &ctx, &store).unwrap();
    assert_eq!(again.active_uuid(), Some(rotated.encryption_key_uuid));
    assert!(again.disabled().is_empty());
}
