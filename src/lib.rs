//! A versioned, encrypted credential store with path based access control.
//!
//! Secrets are encrypted through [`vaultcrypt`] before they reach SQLite.
//! [`service::CredentialService`] is the gated entry point; [`vault::Vault`]
//! wires it up from a [`config::Config`].

pub mod actor;
pub mod certificate;
pub mod config;
pub mod credential;
pub mod error;
pub mod generate;
pub mod permission;
pub mod rotation;
pub mod service;
pub mod store;
pub mod vault;

pub use actor::Actor;
pub use config::Config;
pub use credential::{CredentialType, CredentialValue, CredentialVersion};
pub use error::{PermissionConflict, Result, StateConflict, ValidationError, VaultError};
pub use permission::{PermissionEntry, PermissionOperation};
pub use rotation::{KeyRotator, RotationReport, StopFlag};
pub use service::{CredentialService, CredentialView, GenerateRequest};
pub use store::Store;
pub use vault::Vault;

/// Install `env_logger` unless a logger is already set.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
