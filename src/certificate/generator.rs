use std::sync::Arc;

use uuid::Uuid;

use super::{
    CaResolver, Capabilities, CertificateParameters, CertificateRequest, KeyPair,
    ParsedCertificate, SigningMaterial,
};
use crate::{
    actor::Actor,
    credential::{
        CertificateValue, CredentialValue, CredentialVersion, CredentialVersionStore, SaveRequest,
    },
    error::{Result, StateConflict, ValidationError, VaultError},
};

/// Issues, imports and regenerates certificates, and drives the
/// transitional version of a certificate credential.
pub struct CertificateService {
    versions: Arc<CredentialVersionStore>,
    resolver: CaResolver,
    caps: Capabilities,
}

impl CertificateService {
    pub fn new(versions: Arc<CredentialVersionStore>, resolver: CaResolver, caps: Capabilities) -> Self {
        Self {
            versions,
            resolver,
            caps,
        }
    }

    /// Produce the value for `request`: a freshly issued certificate, or a
    /// validated import.
    pub fn generate(&self, actor: &Actor, request: &CertificateRequest) -> Result<CertificateValue> {
        match request {
            CertificateRequest::BySigningCa { ca_name, params } => {
                params.validate()?;
                let issuer = self.resolver.resolve(actor, ca_name)?;
                let key_pair = self.key_pair(params)?;
                let pem = self.sign(params, &key_pair, Some(&issuer))?;
                let parsed = self.parse_issued(&pem)?;
                Ok(CertificateValue {
                    ca: Some(issuer.certificate.clone()),
                    certificate: pem,
                    private_key: Some(key_pair.private_key.to_string()),
                    ca_name: Some(issuer.ca_name.clone()),
                    certificate_authority: params.is_ca,
                    self_signed: false,
                    expiry_date: Some(parsed.expiry),
                })
            }
            CertificateRequest::SelfSigned { params } => {
                params.validate()?;
                let key_pair = self.key_pair(params)?;
                let pem = self.sign(params, &key_pair, None)?;
                let parsed = self.parse_issued(&pem)?;
                Ok(CertificateValue {
                    ca: Some(pem.clone()),
                    certificate: pem,
                    private_key: Some(key_pair.private_key.to_string()),
                    ca_name: None,
                    certificate_authority: params.is_ca,
                    self_signed: true,
                    expiry_date: Some(parsed.expiry),
                })
            }
            CertificateRequest::Imported {
                certificate,
                private_key,
                ca,
                ca_name,
            } => self.validate_imported(
                actor,
                certificate,
                private_key.as_deref(),
                ca.as_deref(),
                ca_name.as_deref(),
            ),
        }
    }

    /// Check an externally produced certificate before it is stored.
    pub fn validate_imported(
        &self,
        actor: &Actor,
        certificate: &str,
        private_key: Option<&str>,
        ca: Option<&str>,
        ca_name: Option<&str>,
    ) -> Result<CertificateValue> {
        let parsed = self
            .caps
            .parser
            .parse(certificate)
            .map_err(|_| ValidationError::MalformedCertificate)?;

        if let Some(key) = private_key {
            if !self.caps.parser.matches_private_key(certificate, key) {
                return Err(ValidationError::MismatchedKeyAndCertificate.into());
            }
        }

        let (ca, ca_name) = match (ca, ca_name) {
            (Some(_), Some(_)) => {
                return Err(ValidationError::MutuallyExclusive("ca", "ca_name").into());
            }
            (None, Some(ca_name)) => {
                let (name, pem) = self.resolver.ca_certificate(actor, ca_name)?;
                (Some(pem), Some(name))
            }
            (Some(ca), None) => {
                self.caps
                    .parser
                    .parse(ca)
                    .map_err(|_| ValidationError::MalformedCertificate)?;
                (Some(ca.to_string()), None)
            }
            (None, None) if parsed.self_signed => (Some(certificate.to_string()), None),
            (None, None) => (None, None),
        };

        if let Some(ca) = &ca {
            if !self.caps.parser.is_signed_by(certificate, ca) {
                return Err(ValidationError::CertificateNotSignedByCa.into());
            }
        }

        Ok(CertificateValue {
            ca,
            certificate: certificate.to_string(),
            private_key: private_key.map(str::to_string),
            ca_name,
            certificate_authority: parsed.is_ca,
            self_signed: parsed.self_signed,
            expiry_date: Some(parsed.expiry),
        })
    }

    /// Issue a new version of `name` with the parameters of its current
    /// certificate. Only self-signed certificates and certificates signed
    /// by a stored CA qualify.
    pub fn regenerate(
        &self,
        actor: &Actor,
        name: &str,
        set_as_transitional: bool,
    ) -> Result<CredentialVersion> {
        let current = self.versions.find_active(name)?.ok_or(VaultError::NotFound)?;
        let Some(cert) = current.certificate() else {
            return Err(StateConflict::NotACertificate.into());
        };
        if !cert.self_signed && cert.ca_name.is_none() {
            return Err(StateConflict::CannotRegenerateNonGeneratedCertificate.into());
        }

        let parsed = self
            .caps
            .parser
            .parse(&cert.certificate)
            .map_err(|_| ValidationError::MalformedCertificate)?;
        let params = parameters_of(&parsed, cert.certificate_authority);
        let request = match &cert.ca_name {
            Some(ca_name) => CertificateRequest::BySigningCa {
                ca_name: ca_name.clone(),
                params,
            },
            None => CertificateRequest::SelfSigned { params },
        };

        let value = self.generate(actor, &request)?;
        let save = SaveRequest {
            transitional: set_as_transitional,
            metadata: current.metadata.clone(),
            ..SaveRequest::new(actor.clone())
        };
        let version = self.versions.save(
            Some(&current),
            &current.name,
            &CredentialValue::Certificate(value),
            &save,
        )?;
        log::info!(
            "regenerated certificate {} as version {}{}",
            version.name,
            version.uuid,
            if set_as_transitional { " (transitional)" } else { "" }
        );
        Ok(version)
    }

    /// Point the transitional marker of `name` at `version`, or clear it.
    /// Returns the active version followed by the transitional one.
    pub fn update_transitional_version(
        &self,
        name: &str,
        version: Option<Uuid>,
    ) -> Result<Vec<CredentialVersion>> {
        let current = self.versions.find_most_recent(name)?.ok_or(VaultError::NotFound)?;
        if current.certificate().is_none() {
            return Err(StateConflict::NotACertificate.into());
        }
        match version {
            Some(uuid) => self.versions.set_transitional_version(name, &uuid)?,
            None => self.versions.unset_transitional_version(name)?,
        }
        self.versions.find_active_with_transitional(name)
    }

    fn key_pair(&self, params: &CertificateParameters) -> Result<KeyPair> {
        self.caps
            .key_pairs
            .generate_rsa(params.key_length)
            .map_err(|e| VaultError::Capability(format!("key pair generation failed: {e:#}")))
    }

    fn sign(
        &self,
        params: &CertificateParameters,
        key_pair: &KeyPair,
        issuer: Option<&SigningMaterial>,
    ) -> Result<String> {
        self.caps
            .signer
            .sign(params, key_pair, issuer)
            .map_err(|e| VaultError::Capability(format!("certificate signing failed: {e:#}")))
    }

    fn parse_issued(&self, pem: &str) -> Result<ParsedCertificate> {
        self.caps.parser.parse(pem).map_err(|e| {
            log::error!("freshly issued certificate does not parse: {e:#}");
            ValidationError::MalformedCertificate.into()
        })
    }
}

/// Parameters that reproduce `parsed` on regeneration.
fn parameters_of(parsed: &ParsedCertificate, is_ca: bool) -> CertificateParameters {
    CertificateParameters {
        common_name: parsed.common_name.clone(),
        organization: parsed.organization.clone(),
        alternative_names: parsed.alternative_names.clone(),
        key_length: parsed.key_length,
        duration_days: parsed.duration_days,
        is_ca: is_ca || parsed.is_ca,
    }
}
