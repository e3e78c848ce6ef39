use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_KEY_LENGTH: u32 = 2048;
pub const KEY_LENGTHS: [u32; 3] = [2048, 3072, 4096];
pub const DEFAULT_DURATION_DAYS: u32 = 365;
pub const MAX_DURATION_DAYS: u32 = 3650;

/// Subject and shape of a certificate to generate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateParameters {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub alternative_names: Vec<String>,
    pub key_length: u32,
    pub duration_days: u32,
    pub is_ca: bool,
}

impl Default for CertificateParameters {
    fn default() -> Self {
        Self {
            common_name: None,
            organization: None,
            alternative_names: Vec::new(),
            key_length: DEFAULT_KEY_LENGTH,
            duration_days: DEFAULT_DURATION_DAYS,
            is_ca: false,
        }
    }
}

impl CertificateParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let has_cn = self.common_name.as_deref().is_some_and(|cn| !cn.trim().is_empty());
        if !has_cn && self.alternative_names.is_empty() {
            return Err(ValidationError::RequireAnyOf(&[
                "common_name",
                "alternative_names",
            ]));
        }
        if !KEY_LENGTHS.contains(&self.key_length) {
            return Err(ValidationError::InvalidKeyLength(self.key_length));
        }
        if !(1..=MAX_DURATION_DAYS).contains(&self.duration_days) {
            return Err(ValidationError::InvalidDuration(self.duration_days));
        }
        Ok(())
    }
}

/// A validated certificate request. Each variant carries exactly the
/// fields its issuance path needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CertificateRequest {
    BySigningCa {
        ca_name: String,
        params: CertificateParameters,
    },
    SelfSigned {
        params: CertificateParameters,
    },
    Imported {
        certificate: String,
        private_key: Option<String>,
        ca: Option<String>,
        ca_name: Option<String>,
    },
}

/// Loose request fields as a caller submits them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateFields {
    pub ca_name: Option<String>,
    pub self_sign: bool,
    pub params: CertificateParameters,
    pub certificate: Option<String>,
    pub private_key: Option<String>,
    pub ca: Option<String>,
}

impl CertificateRequest {
    /// Pick the variant the fields describe and check that nothing is
    /// missing or contradictory.
    pub fn from_fields(fields: CertificateFields) -> Result<Self, ValidationError> {
        let CertificateFields {
            ca_name,
            self_sign,
            params,
            certificate,
            private_key,
            ca,
        } = fields;
        let blank = |s: &Option<String>| s.as_deref().is_none_or(|s| s.trim().is_empty());

        let imported = !blank(&certificate) || !blank(&private_key) || !blank(&ca);
        if imported {
            if self_sign {
                return Err(ValidationError::MutuallyExclusive("certificate", "self_sign"));
            }
            if !blank(&ca) && !blank(&ca_name) {
                return Err(ValidationError::MutuallyExclusive("ca", "ca_name"));
            }
            let certificate = certificate
                .filter(|c| !c.trim().is_empty())
                .ok_or(ValidationError::MissingField("certificate"))?;
            return Ok(CertificateRequest::Imported {
                certificate,
                private_key: private_key.filter(|k| !k.trim().is_empty()),
                ca: ca.filter(|c| !c.trim().is_empty()),
                ca_name: ca_name.filter(|n| !n.trim().is_empty()),
            });
        }

        params.validate()?;
        match (ca_name.filter(|n| !n.trim().is_empty()), self_sign) {
            (Some(_), true) => Err(ValidationError::MutuallyExclusive("ca_name", "self_sign")),
            (Some(ca_name), false) => Ok(CertificateRequest::BySigningCa { ca_name, params }),
            (None, true) => Ok(CertificateRequest::SelfSigned { params }),
            // A CA without an issuer is a self-signed root.
            (None, false) if params.is_ca => Ok(CertificateRequest::SelfSigned { params }),
            (None, false) => Err(ValidationError::RequireAnyOf(&["ca_name", "self_sign", "is_ca"])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(cn: &str) -> CertificateParameters {
        CertificateParameters {
            common_name: Some(cn.into()),
            ..CertificateParameters::default()
        }
    }

    #[test]
    fn generation_variants() {
        let by_ca = CertificateRequest::from_fields(CertificateFields {
            ca_name: Some("/ca".into()),
            params: named("leaf"),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(by_ca, CertificateRequest::BySigningCa { ref ca_name, .. } if ca_name == "/ca"));

        let root = CertificateRequest::from_fields(CertificateFields {
            params: CertificateParameters {
                is_ca: true,
                ..named("root")
            },
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(root, CertificateRequest::SelfSigned { .. }));
    }

    #[test]
    fn contradictions_and_omissions() {
        let both = CertificateFields {
            ca_name: Some("/ca".into()),
            self_sign: true,
            params: named("x"),
            ..Default::default()
        };
        assert_eq!(
            CertificateRequest::from_fields(both),
            Err(ValidationError::MutuallyExclusive("ca_name", "self_sign"))
        );

        let neither = CertificateFields {
            params: named("x"),
            ..Default::default()
        };
        assert!(matches!(
            CertificateRequest::from_fields(neither),
            Err(ValidationError::RequireAnyOf(_))
        ));

        let nameless = CertificateFields {
            self_sign: true,
            ..Default::default()
        };
        assert_eq!(
            CertificateRequest::from_fields(nameless),
            Err(ValidationError::RequireAnyOf(&["common_name", "alternative_names"]))
        );
    }

    #[test]
    fn parameter_ranges() {
        let mut params = named("x");
        params.key_length = 1024;
        assert_eq!(params.validate(), Err(ValidationError::InvalidKeyLength(1024)));
        params.key_length = 4096;
        params.duration_days = 0;
        assert_eq!(params.validate(), Err(ValidationError::InvalidDuration(0)));
    }

    #[test]
    fn imports() {
        let import = CertificateRequest::from_fields(CertificateFields {
            certificate: Some("PEM".into()),
            ca_name: Some("/ca".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(import, CertificateRequest::Imported { private_key: None, .. }));

        let keyless = CertificateFields {
            private_key: Some("KEY".into()),
            ..Default::default()
        };
        assert_eq!(
            CertificateRequest::from_fields(keyless),
            Err(ValidationError::MissingField("certificate"))
        );

        let both_cas = CertificateFields {
            certificate: Some("PEM".into()),
            ca: Some("CA".into()),
            ca_name: Some("/ca".into()),
            ..Default::default()
        };
        assert_eq!(
            CertificateRequest::from_fields(both_cas),
            Err(ValidationError::MutuallyExclusive("ca", "ca_name"))
        );
    }
}
