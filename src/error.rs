//! Public error type for the credential store.

use thiserror::Error;
use vaultcrypt::CryptError;

/// Every public operation returns this.
///
/// Absence and failed authorization are both `NotFound`, so a caller cannot
/// learn that a credential exists without being allowed to read it.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("the request could not be completed because the credential does not exist or you do not have sufficient authorization")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("encryption key {0} is no longer configured")]
    KeyNotFound(uuid::Uuid),

    #[error("stored value failed to decrypt")]
    DecryptionFailed,

    #[error("permission conflict: {0}")]
    PermissionConflict(#[from] PermissionConflict),

    #[error("state conflict: {0}")]
    StateConflict(#[from] StateConflict),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("certificate capability failed: {0}")]
    Capability(String),
}

/// Malformed or inconsistent input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("credential name '{0}' is invalid")]
    InvalidName(String),

    #[error("value of {0} bytes is too large to store")]
    ValueTooLarge(usize),

    #[error("the provided certificate is not a valid X.509 certificate")]
    MalformedCertificate,

    #[error("the provided certificate does not match the private key")]
    MismatchedKeyAndCertificate,

    #[error("the provided certificate was not signed by the CA")]
    CertificateNotSignedByCa,

    #[error("CA '{0}' could not be found")]
    CaNotFound(String),

    #[error("credential '{0}' is not a certificate authority")]
    InvalidCa(String),

    #[error("CA '{0}' has a malformed certificate")]
    MalformedCaCertificate(String),

    #[error("CA '{0}' has no private key and cannot sign")]
    CaMissingPrivateKey(String),

    #[error("only one of '{0}' and '{1}' may be provided")]
    MutuallyExclusive(&'static str, &'static str),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("one of {0:?} must be provided")]
    RequireAnyOf(&'static [&'static str]),

    #[error("key length {0} is not supported")]
    InvalidKeyLength(u32),

    #[error("certificate duration of {0} days is out of range")]
    InvalidDuration(u32),

    #[error("password parameters: {0}")]
    InvalidPasswordParameters(&'static str),

    #[error("the credential type cannot be changed; delete the credential to recreate it with a different type")]
    CredentialTypeMismatch,

    #[error("the version does not belong to the credential")]
    MismatchedCredentialAndVersion,

    #[error("actor identity '{0}' is invalid")]
    InvalidActor(String),

    #[error("the number of versions requested must be at least 1")]
    InvalidVersionCount,
}

impl ValidationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidName(_) => "error.invalid_name",
            ValidationError::ValueTooLarge(_) => "error.exceeds_maximum_size",
            ValidationError::MalformedCertificate => "error.invalid_certificate_value",
            ValidationError::MismatchedKeyAndCertificate => "error.mismatched_key_and_certificate",
            ValidationError::CertificateNotSignedByCa => "error.certificate_was_not_signed_by_ca",
            ValidationError::CaNotFound(_) => "error.ca_not_found",
            ValidationError::InvalidCa(_) => "error.invalid_ca",
            ValidationError::MalformedCaCertificate(_) => "error.invalid_ca_certificate",
            ValidationError::CaMissingPrivateKey(_) => "error.ca_missing_private_key",
            ValidationError::MutuallyExclusive(..) => "error.mutually_exclusive_fields",
            ValidationError::MissingField(_) => "error.missing_field",
            ValidationError::RequireAnyOf(_) => "error.missing_one_of",
            ValidationError::InvalidKeyLength(_) => "error.invalid_key_length",
            ValidationError::InvalidDuration(_) => "error.invalid_duration",
            ValidationError::InvalidPasswordParameters(_) => "error.invalid_password_parameters",
            ValidationError::CredentialTypeMismatch => "error.type_mismatch",
            ValidationError::MismatchedCredentialAndVersion => {
                "error.mismatched_credential_and_version"
            }
            ValidationError::InvalidActor(_) => "error.invalid_actor",
            ValidationError::InvalidVersionCount => "error.invalid_version_count",
        }
    }
}

/// Rejected permission changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionConflict {
    #[error("modification of access control for the authenticated user is not allowed")]
    SelfModification,

    #[error("'{0}' is not a valid permission operation")]
    InvalidOperation(String),

    #[error("at least one operation must be granted")]
    NoOperations,
}

/// The operation is not valid for the credential in its current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateConflict {
    #[error("the certificate cannot be regenerated because it is neither self-signed nor signed by a stored CA")]
    CannotRegenerateNonGeneratedCertificate,

    #[error("the credential was not generated and cannot be regenerated")]
    CannotRegenerateNonGenerated,

    #[error("transitional versions are only supported for certificates")]
    NotACertificate,

    #[error("the last version of a credential cannot be deleted on its own")]
    CannotDeleteLastVersion,
}

impl StateConflict {
    pub fn code(&self) -> &'static str {
        match self {
            StateConflict::CannotRegenerateNonGeneratedCertificate => {
                "error.cannot_regenerate_non_generated_certificate"
            }
            StateConflict::CannotRegenerateNonGenerated => "error.cannot_regenerate_non_generated_credential",
            StateConflict::NotACertificate => "error.not_a_certificate",
            StateConflict::CannotDeleteLastVersion => "error.cannot_delete_last_version",
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        log::error!("sqlite error: {err}");
        VaultError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Storage(format!("stored payload is not valid: {err}"))
    }
}

impl From<CryptError> for VaultError {
    fn from(err: CryptError) -> Self {
        match err {
            CryptError::KeyUnavailable(msg) => VaultError::KeyUnavailable(msg),
            CryptError::KeyNotFound(uuid) => VaultError::KeyNotFound(uuid),
            CryptError::DecryptionFailed => VaultError::DecryptionFailed,
            CryptError::PlaintextTooLarge(len) => ValidationError::ValueTooLarge(len).into(),
            CryptError::Config(msg) => VaultError::Config(msg),
            CryptError::CanaryStore(e) => VaultError::Storage(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
