//! Key canaries: a known plaintext stored encrypted under each key, used to
//! prove at startup that a configured key is the one that wrote the data.

use uuid::Uuid;

/// The plaintext every canary decrypts to.
pub const CANARY_VALUE: &[u8] =
    b"credvault-canary:0c1f6a5e-if-this-decrypts-the-encryption-key-is-configured-correctly";

/// A canary row. Its UUID doubles as the encryption key's identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canary {
    pub uuid: Uuid,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Persistence for canaries, implemented by the relational store.
pub trait CanaryStore {
    fn canaries(&self) -> anyhow::Result<Vec<Canary>>;

    fn insert_canary(&self, canary: &Canary) -> anyhow::Result<()>;

    fn delete_canaries(&self, uuids: &[Uuid]) -> anyhow::Result<()>;
}

/// In-memory canary storage, useful when no database is involved.
#[derive(Debug, Default)]
pub struct MemoryCanaryStore {
    rows: parking_lot::Mutex<Vec<Canary>>,
}

impl CanaryStore for MemoryCanaryStore {
    fn canaries(&self) -> anyhow::Result<Vec<Canary>> {
        Ok(self.rows.lock().clone())
    }

    fn insert_canary(&self, canary: &Canary) -> anyhow::Result<()> {
        self.rows.lock().push(canary.clone());
        Ok(())
    }

    fn delete_canaries(&self, uuids: &[Uuid]) -> anyhow::Result<()> {
        self.rows.lock().retain(|c| !uuids.contains(&c.uuid));
        Ok(())
    }
}
