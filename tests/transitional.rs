mod support;

use credvault::{
    Actor, CredentialService, CredentialValue, GenerateRequest, StateConflict, ValidationError,
    VaultError,
    certificate::{CertificateParameters, CertificateParser, CertificateRequest},
};
use support::{FakeParser, actor, vault};
use uuid::Uuid;

fn ca_params(cn: &str) -> CertificateParameters {
    CertificateParameters {
        common_name: Some(cn.into()),
        is_ca: true,
        ..CertificateParameters::default()
    }
}

fn self_signed(svc: &CredentialService, owner: &Actor, name: &str, params: CertificateParameters) -> Uuid {
    svc.generate(
        owner,
        name,
        &GenerateRequest::Certificate(CertificateRequest::SelfSigned { params }),
        None,
    )
    .unwrap()
    .version
    .uuid
}

fn uuids(svc: &CredentialService, owner: &Actor, name: &str) -> Vec<Uuid> {
    svc.get_active_with_transitional(owner, name)
        .unwrap()
        .into_iter()
        .map(|v| v.version.uuid)
        .collect()
}

fn transitional_count(svc: &CredentialService, name: &str) -> usize {
    svc.versions()
        .find_all_by_name(name)
        .unwrap()
        .iter()
        .filter(|v| v.is_transitional())
        .count()
}

#[test]
fn transitional_version_sits_beside_the_active_one() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    let a = self_signed(svc, &owner, "/ca-1", ca_params("ca-1"));

    let b = svc.regenerate(&owner, "/ca-1", true).unwrap().version;
    assert!(b.is_transitional());
    assert_eq!(svc.get_current(&owner, "/ca-1").unwrap().version.uuid, a);
    assert_eq!(uuids(svc, &owner, "/ca-1"), vec![a, b.uuid]);

    let c = svc.regenerate(&owner, "/ca-1", true).unwrap().version;
    assert_eq!(uuids(svc, &owner, "/ca-1"), vec![a, c.uuid]);
    assert_eq!(transitional_count(svc, "/ca-1"), 1);

    // A plain regeneration becomes the active version; the marker stays.
    let d = svc.regenerate(&owner, "/ca-1", false).unwrap().version;
    assert_eq!(uuids(svc, &owner, "/ca-1"), vec![d.uuid, c.uuid]);
}

#[test]
fn at_most_one_transitional_version() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    let a = self_signed(svc, &owner, "/ca", ca_params("ca"));
    let b = svc.regenerate(&owner, "/ca", false).unwrap().version.uuid;
    let c = svc.regenerate(&owner, "/ca", false).unwrap().version.uuid;

    let steps = [Some(a), Some(b), None, Some(c), Some(c), None, None, Some(a)];
    for step in steps {
        let views = svc.update_transitional_version(&owner, "/ca", step).unwrap();
        assert!(transitional_count(svc, "/ca") <= 1);
        assert_eq!(transitional_count(svc, "/ca"), usize::from(step.is_some()));
        match step {
            Some(uuid) => assert_eq!(views.last().unwrap().version.uuid, uuid),
            None => assert_eq!(views.len(), 1),
        }
    }
}

#[test]
fn transitional_preconditions() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    self_signed(svc, &owner, "/ca", ca_params("ca"));
    svc.set(
        &owner,
        "/plain",
        CredentialValue::Value { value: "v".into() },
        None,
    )
    .unwrap();
    let foreign = svc
        .set(
            &owner,
            "/other",
            CredentialValue::Value { value: "o".into() },
            None,
        )
        .unwrap()
        .version
        .uuid;

    assert!(matches!(
        svc.update_transitional_version(&owner, "/plain", None),
        Err(VaultError::StateConflict(StateConflict::NotACertificate))
    ));
    assert!(matches!(
        svc.update_transitional_version(&owner, "/ca", Some(foreign)),
        Err(VaultError::Validation(ValidationError::MismatchedCredentialAndVersion))
    ));
    assert!(matches!(
        svc.update_transitional_version(&owner, "/missing", None),
        Err(VaultError::NotFound)
    ));
    assert_eq!(transitional_count(svc, "/ca"), 0);
}

#[test]
fn leaves_are_signed_by_the_stored_ca() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    self_signed(svc, &owner, "/ca-1", ca_params("ca-1"));

    let leaf_request = GenerateRequest::Certificate(CertificateRequest::BySigningCa {
        ca_name: "/ca-1".into(),
        params: CertificateParameters {
            common_name: Some("leaf.example".into()),
            ..CertificateParameters::default()
        },
    });
    let leaf = svc.generate(&owner, "/leaf", &leaf_request, None).unwrap();
    let cert = leaf.version.certificate().unwrap();
    assert_eq!(cert.ca_name.as_deref(), Some("/ca-1"));
    assert!(!cert.self_signed);

    let signed: Vec<_> = svc
        .find_signed_by(&owner, "/ca-1")
        .unwrap()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(signed, vec!["/leaf".to_string()]);

    // Regeneration re-signs with the same CA.
    let again = svc.regenerate(&owner, "/leaf", false).unwrap();
    assert_eq!(
        again.version.certificate().unwrap().ca_name.as_deref(),
        Some("/ca-1")
    );
}

#[test]
fn ca_resolution_failures() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    let stranger = actor("uaa-user:stranger");
    self_signed(svc, &owner, "/ca-1", ca_params("ca-1"));
    self_signed(
        svc,
        &owner,
        "/not-a-ca",
        CertificateParameters {
            common_name: Some("plain".into()),
            ..CertificateParameters::default()
        },
    );
    svc.set(
        &owner,
        "/value",
        CredentialValue::Value { value: "v".into() },
        None,
    )
    .unwrap();

    let signed_by = |ca_name: &str| {
        GenerateRequest::Certificate(CertificateRequest::BySigningCa {
            ca_name: ca_name.into(),
            params: CertificateParameters {
                common_name: Some("leaf".into()),
                ..CertificateParameters::default()
            },
        })
    };

    assert!(matches!(
        svc.generate(&owner, "/leaf", &signed_by("/not-a-ca"), None),
        Err(VaultError::Validation(ValidationError::InvalidCa(_)))
    ));
    assert!(matches!(
        svc.generate(&owner, "/leaf", &signed_by("/value"), None),
        Err(VaultError::Validation(ValidationError::InvalidCa(_)))
    ));
    assert!(matches!(
        svc.generate(&owner, "/leaf", &signed_by("/nowhere"), None),
        Err(VaultError::Validation(ValidationError::CaNotFound(_)))
    ));
    // Exists, but the stranger cannot read it.
    assert!(matches!(
        svc.generate(&stranger, "/stranger-leaf", &signed_by("/ca-1"), None),
        Err(VaultError::Validation(ValidationError::CaNotFound(_)))
    ));
    assert!(svc.versions().find_all_by_name("/stranger-leaf").unwrap().is_empty());
}

#[test]
fn directly_built_requests_are_validated() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    self_signed(svc, &owner, "/ca-1", ca_params("ca-1"));

    let generate = |request: CertificateRequest| {
        svc.generate(&owner, "/bad-cert", &GenerateRequest::Certificate(request), None)
    };
    let nameless = CertificateParameters {
        common_name: None,
        ..CertificateParameters::default()
    };
    let short_key = CertificateParameters {
        key_length: 1024,
        ..ca_params("short")
    };
    let no_duration = CertificateParameters {
        duration_days: 0,
        ..ca_params("instant")
    };

    assert!(matches!(
        generate(CertificateRequest::SelfSigned { params: nameless.clone() }),
        Err(VaultError::Validation(ValidationError::RequireAnyOf(_)))
    ));
    assert!(matches!(
        generate(CertificateRequest::SelfSigned { params: short_key }),
        Err(VaultError::Validation(ValidationError::InvalidKeyLength(1024)))
    ));
    assert!(matches!(
        generate(CertificateRequest::BySigningCa {
            ca_name: "/ca-1".into(),
            params: no_duration,
        }),
        Err(VaultError::Validation(ValidationError::InvalidDuration(0)))
    ));
    assert!(matches!(
        generate(CertificateRequest::BySigningCa {
            ca_name: "/ca-1".into(),
            params: nameless,
        }),
        Err(VaultError::Validation(ValidationError::RequireAnyOf(_)))
    ));
    assert!(svc.versions().find_all_by_name("/bad-cert").unwrap().is_empty());
}

#[test]
fn regeneration_keeps_the_subject_organization() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    self_signed(
        svc,
        &owner,
        "/org-ca",
        CertificateParameters {
            organization: Some("Example Corp".into()),
            ..ca_params("org-ca")
        },
    );

    let regenerated = svc.regenerate(&owner, "/org-ca", false).unwrap();
    let pem = &regenerated.version.certificate().unwrap().certificate;
    let parsed = FakeParser.parse(pem).unwrap();
    assert_eq!(parsed.organization.as_deref(), Some("Example Corp"));
    assert_eq!(parsed.common_name.as_deref(), Some("org-ca"));
}
