//! TOML configuration.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use vaultcrypt::{KeyConfig, config::validate_keys};

use crate::{
    error::{Result, VaultError},
    rotation::DEFAULT_PAGE_SIZE,
};

pub const CONFIG_ENV: &str = "CREDVAULT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "credvault.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; `:memory:` keeps everything in process.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("credvault.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    #[serde(default = "default_page_size")]
    pub rotation_page_size: usize,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            rotation_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationConfig {
    #[serde(default = "enabled")]
    pub acls_enabled: bool,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self { acls_enabled: true }
    }
}

fn enabled() -> bool {
    true
}

impl Config {
    /// Read the file named by `CREDVAULT_CONFIG`, or `credvault.toml`.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("{}: {e}", path.display())))?;
        log::info!("loading configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_keys(&self.encryption.keys)?;
        if self.encryption.rotation_page_size == 0 {
            return Err(VaultError::Config("rotation_page_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use vaultcrypt::{KeySource, ProviderKind};

    use super::*;

    #[test]
    fn full_config() {
        let config = Config::from_toml_str(
            r#"
            [database]
            path = "/var/lib/credvault/db.sqlite"

            [encryption]
            rotation_page_size = 10

            [[encryption.keys]]
            provider = "internal"
            encryption_password = "correct horse battery staple"
            salt = "0123456789abcdef"

            [[encryption.keys]]
            provider = "hsm"
            active = true
            encryption_key_name = "credvault-key-2"

            [[encryption.keys]]
            provider = "kms-plugin"
            endpoint = "http://127.0.0.1:8200"
            key_id = "k3"

            [authorization]
            acls_enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/var/lib/credvault/db.sqlite"));
        assert_eq!(config.encryption.rotation_page_size, 10);
        assert!(!config.authorization.acls_enabled);
        let kinds: Vec<ProviderKind> = config.encryption.keys.iter().map(|k| k.source.kind()).collect();
        assert_eq!(
            kinds,
            vec![ProviderKind::Internal, ProviderKind::Hsm, ProviderKind::KmsPlugin]
        );
        assert!(config.encryption.keys[1].active);
        assert!(matches!(
            config.encryption.keys[2].source,
            KeySource::KmsPlugin { timeout_ms: 5000, .. }
        ));
    }

    #[test]
    fn defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.encryption.rotation_page_size, DEFAULT_PAGE_SIZE);
        assert!(config.authorization.acls_enabled);
        assert!(config.encryption.keys.is_empty());
    }

    #[test]
    fn two_active_keys_are_rejected() {
        let result = Config::from_toml_str(
            r#"
            [[encryption.keys]]
            provider = "hsm"
            active = true
            encryption_key_name = "a"

            [[encryption.keys]]
            provider = "hsm"
            active = true
            encryption_key_name = "b"
            "#,
        );
        assert!(matches!(result, Err(VaultError::Config(_))));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let result = Config::from_toml_str("[encryption]\nrotation_page_size = 0\n");
        assert!(matches!(result, Err(VaultError::Config(_))));
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credvault.toml");
        fs::write(&path, "[database]\npath = \":memory:\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from(":memory:"));
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
