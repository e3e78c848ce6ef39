//! Wiring: configuration in, a ready service and rotator out.

use std::sync::Arc;

use vaultcrypt::{Encryptor, KeySet, ProviderContext};

use crate::{
    certificate::Capabilities,
    config::Config,
    error::Result,
    rotation::KeyRotator,
    service::CredentialService,
    store::Store,
};

pub struct Vault {
    store: Arc<Store>,
    encryptor: Arc<Encryptor>,
    ctx: ProviderContext,
    credentials: CredentialService,
    rotator: KeyRotator,
}

impl Vault {
    /// Open the database, verify the configured keys against their
    /// canaries and build the service.
    pub fn open(config: &Config, ctx: ProviderContext, caps: Capabilities) -> Result<Self> {
        let path = &config.database.path;
        let store = Arc::new(if path.as_os_str() == ":memory:" {
            Store::open_in_memory()?
        } else {
            Store::open(path)?
        });
        Self::with_store(store, config, ctx, caps)
    }

    pub fn with_store(
        store: Arc<Store>,
        config: &Config,
        ctx: ProviderContext,
        caps: Capabilities,
    ) -> Result<Self> {
        config.validate()?;
        let keys = KeySet::load(&config.encryption.keys, &ctx, store.as_ref())?;
        log::info!(
            "{} encryption key(s) usable, {} disabled",
            keys.len(),
            keys.disabled().len()
        );
        let encryptor = Arc::new(Encryptor::new(keys));
        let credentials = CredentialService::new(
            store.clone(),
            encryptor.clone(),
            caps,
            config.authorization.acls_enabled,
        );
        let rotator = KeyRotator::new(
            store.clone(),
            encryptor.clone(),
            config.encryption.rotation_page_size,
        );
        Ok(Self {
            store,
            encryptor,
            ctx,
            credentials,
            rotator,
        })
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }

    pub fn rotator(&self) -> &KeyRotator {
        &self.rotator
    }

    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    /// Load a new key snapshot from `config` and swap it in. Operations
    /// already running finish on the old snapshot.
    pub fn reload_keys(&self, config: &Config) -> Result<()> {
        let keys = KeySet::load(&config.encryption.keys, &self.ctx, self.store.as_ref())?;
        self.encryptor.reload(keys);
        Ok(())
    }
}
