use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use uuid::Uuid;

use crate::{
    canary::{CANARY_VALUE, Canary, CanaryStore},
    config::{KeyConfig, validate_keys},
    error::{CryptError, ProviderError},
    provider::{self, KeyProvider, ProviderContext, ProviderKind},
};

/// A usable encryption key: a verified provider bound to its canary UUID.
#[derive(Clone)]
pub struct EncryptionKey {
    pub uuid: Uuid,
    pub active: bool,
    provider: Arc<dyn KeyProvider>,
}

impl EncryptionKey {
    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn provider(&self) -> &dyn KeyProvider {
        self.provider.as_ref()
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("uuid", &self.uuid)
            .field("active", &self.active)
            .field("kind", &self.kind())
            .finish()
    }
}

/// A configured key that failed verification and cannot be used.
#[derive(Clone, Debug)]
pub struct DisabledKey {
    /// Position in the configured key list.
    pub index: usize,
    pub kind: ProviderKind,
    pub was_active: bool,
    pub reason: String,
}

/// Immutable snapshot of the usable encryption keys.
///
/// Reloading configuration builds a new `KeySet`; an existing snapshot is
/// never mutated.
#[derive(Clone, Debug, Default)]
pub struct KeySet {
    keys: HashMap<Uuid, EncryptionKey>,
    active: Option<Uuid>,
    disabled: Vec<DisabledKey>,
}

impl KeySet {
    /// Build a key set from providers whose identities are already known.
    pub fn from_providers(
        providers: impl IntoIterator<Item = (Uuid, Arc<dyn KeyProvider>, bool)>,
    ) -> Result<Self, CryptError> {
        let mut set = KeySet::default();
        for (uuid, provider, active) in providers {
            if active {
                if set.active.is_some() {
                    return Err(CryptError::Config(
                        "more than one key is marked active".into(),
                    ));
                }
                set.active = Some(uuid);
            }
            set.keys.insert(
                uuid,
                EncryptionKey {
                    uuid,
                    active,
                    provider,
                },
            );
        }
        Ok(set)
    }

    /// Build providers from configuration and bind each to its canary.
    ///
    /// Every configured key trial-decrypts the stored canaries; the one that
    /// yields [`CANARY_VALUE`] gives the key its UUID. The active key gets a
    /// fresh canary if none matches. Keys that cannot be verified are
    /// disabled and reported, the remaining keys stay usable.
    pub fn load(
        configs: &[KeyConfig],
        ctx: &ProviderContext,
        store: &dyn CanaryStore,
    ) -> Result<Self, CryptError> {
        validate_keys(configs)?;
        let canaries = store.canaries().map_err(CryptError::CanaryStore)?;
        let mut claimed: HashSet<Uuid> = HashSet::new();
        let mut set = KeySet::default();

        for (index, cfg) in configs.iter().enumerate() {
            let kind = cfg.source.kind();
            let disable = |reason: String| {
                log::error!("encryption key #{index} ({kind}) disabled: {reason}");
                DisabledKey {
                    index,
                    kind,
                    was_active: cfg.active,
                    reason,
                }
            };

            let provider = match provider::build(&cfg.source, ctx) {
                Ok(p) => p,
                Err(e) => {
                    set.disabled.push(disable(e.to_string()));
                    continue;
                }
            };

            let uuid = match match_canary(provider.as_ref(), &canaries, &claimed) {
                Ok(Some(uuid)) => uuid,
                Ok(None) if cfg.active => {
                    match create_canary(provider.as_ref(), store) {
                        Ok(uuid) => {
                            log::info!("created canary {uuid} for new active key #{index} ({kind})");
                            uuid
                        }
                        Err(e) => {
                            set.disabled.push(disable(e.to_string()));
                            continue;
                        }
                    }
                }
                Ok(None) => {
                    set.disabled
                        .push(disable("no canary decrypts under this key".into()));
                    continue;
                }
                Err(e) => {
                    set.disabled.push(disable(e.to_string()));
                    continue;
                }
            };

            claimed.insert(uuid);
            if cfg.active {
                set.active = Some(uuid);
            }
            set.keys.insert(
                uuid,
                EncryptionKey {
                    uuid,
                    active: cfg.active,
                    provider,
                },
            );
        }

        if set.active.is_none() {
            log::warn!("no usable active encryption key; writes will fail");
        }
        Ok(set)
    }

    pub fn active(&self) -> Option<&EncryptionKey> {
        self.active.and_then(|uuid| self.keys.get(&uuid))
    }

    pub fn active_uuid(&self) -> Option<Uuid> {
        self.active
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&EncryptionKey> {
        self.keys.get(uuid)
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.keys.contains_key(uuid)
    }

    pub fn uuids(&self) -> Vec<Uuid> {
        self.keys.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn disabled(&self) -> &[DisabledKey] {
        &self.disabled
    }
}

fn match_canary(
    provider: &dyn KeyProvider,
    canaries: &[Canary],
    claimed: &HashSet<Uuid>,
) -> Result<Option<Uuid>, ProviderError> {
    for canary in canaries.iter().filter(|c| !claimed.contains(&c.uuid)) {
        match provider.decrypt(&canary.ciphertext, &canary.nonce) {
            Ok(plaintext) if plaintext == CANARY_VALUE => return Ok(Some(canary.uuid)),
            // Decrypts, but to something else: not written by this key.
            Ok(_) => continue,
            Err(ProviderError::Authentication) | Err(ProviderError::TooLarge { .. }) => continue,
            Err(e @ ProviderError::Unreachable(_)) => return Err(e),
        }
    }
    Ok(None)
}

fn create_canary(provider: &dyn KeyProvider, store: &dyn CanaryStore) -> anyhow::Result<Uuid> {
    let sealed = provider.encrypt(CANARY_VALUE)?;
    let canary = Canary {
        uuid: Uuid::new_v4(),
        ciphertext: sealed.ciphertext,
        nonce: sealed.nonce,
    };
    store.insert_canary(&canary)?;
    Ok(canary.uuid)
}
