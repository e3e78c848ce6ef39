use std::sync::Arc;

use zeroize::Zeroizing;

use super::{CertificateParser, SigningMaterial};
use crate::{
    actor::Actor,
    credential::{CredentialValue, CredentialVersion, CredentialVersionStore, name},
    error::{Result, ValidationError},
    permission::{PermissionOperation, PermissionService},
};

/// Looks up stored CAs on behalf of an actor.
///
/// A CA the actor cannot read is reported exactly like a missing one.
pub struct CaResolver {
    versions: Arc<CredentialVersionStore>,
    permissions: Arc<PermissionService>,
    parser: Arc<dyn CertificateParser>,
}

impl CaResolver {
    pub fn new(
        versions: Arc<CredentialVersionStore>,
        permissions: Arc<PermissionService>,
        parser: Arc<dyn CertificateParser>,
    ) -> Self {
        Self {
            versions,
            permissions,
            parser,
        }
    }

    /// The active version of `ca_name`, checked to be a well formed CA.
    fn active_ca(&self, actor: &Actor, ca_name: &str) -> Result<CredentialVersion> {
        let ca_name = name::normalize(ca_name)?;
        let not_found = || ValidationError::CaNotFound(ca_name.clone());

        if !self
            .permissions
            .has_permission(actor, &ca_name, PermissionOperation::Read)?
        {
            return Err(not_found().into());
        }
        let version = self.versions.find_active(&ca_name)?.ok_or_else(not_found)?;
        let Some(cert) = version.certificate() else {
            return Err(ValidationError::InvalidCa(ca_name).into());
        };

        let parsed = self
            .parser
            .parse(&cert.certificate)
            .map_err(|e| {
                log::warn!("stored CA {ca_name} does not parse: {e:#}");
                ValidationError::MalformedCaCertificate(ca_name.clone())
            })?;
        if !parsed.is_ca {
            return Err(ValidationError::InvalidCa(ca_name).into());
        }
        Ok(version)
    }

    /// Certificate and private key of `ca_name`, for signing.
    pub fn resolve(&self, actor: &Actor, ca_name: &str) -> Result<SigningMaterial> {
        let version = self.active_ca(actor, ca_name)?;
        let CredentialValue::Certificate(value) = self.versions.decrypt_value(&version)? else {
            return Err(ValidationError::InvalidCa(version.name).into());
        };
        let private_key = value
            .private_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ValidationError::CaMissingPrivateKey(version.name.clone()))?;

        Ok(SigningMaterial {
            ca_name: version.name,
            certificate: value.certificate,
            private_key: Zeroizing::new(private_key),
        })
    }

    /// Just the certificate of `ca_name`, for validating imports.
    pub fn ca_certificate(&self, actor: &Actor, ca_name: &str) -> Result<(String, String)> {
        let version = self.active_ca(actor, ca_name)?;
        let certificate = version
            .certificate()
            .map(|c| c.certificate.clone())
            .unwrap_or_default();
        Ok((version.name, certificate))
    }
}
