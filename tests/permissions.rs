mod support;

use std::sync::Arc;

use credvault::{
    CredentialValue, PermissionConflict, PermissionEntry, PermissionOperation, Store, VaultError,
    permission::PermissionService,
};
use support::{actor, config, key, vault};

fn secret() -> CredentialValue {
    CredentialValue::Value {
        value: "hunter2".into(),
    }
}

#[test]
fn self_escalation_is_rejected_without_side_effects() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    let admin = actor("uaa-user:admin");
    svc.set(&owner, "/team/db", secret(), None).unwrap();
    svc.write_permissions(
        &owner,
        "/team/db",
        &[PermissionEntry::new(
            admin.clone(),
            [PermissionOperation::Read, PermissionOperation::WriteAcl],
        )],
    )
    .unwrap();
    let before = svc.get_permissions(&owner, "/team/db").unwrap();

    // A batch that also touches the requester's own grant is rejected whole.
    let other = actor("mtls-app:worker");
    let err = svc
        .write_permissions(
            &admin,
            "/team/db",
            &[
                PermissionEntry::new(other.clone(), [PermissionOperation::Read]),
                PermissionEntry::new(admin.clone(), PermissionOperation::ALL),
            ],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::PermissionConflict(PermissionConflict::SelfModification)
    ));
    assert!(matches!(
        svc.delete_permission(&admin, "/team/db", &admin),
        Err(VaultError::PermissionConflict(PermissionConflict::SelfModification))
    ));
    assert_eq!(svc.get_permissions(&owner, "/team/db").unwrap(), before);
    assert!(!svc
        .permissions()
        .has_permission(&admin, "/team/db", PermissionOperation::Write)
        .unwrap());
}

#[test]
fn grants_are_upserted_and_removed() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    let reader = actor("mtls-app:reader");
    svc.set(&owner, "/svc/token", secret(), None).unwrap();

    svc.write_permissions(
        &owner,
        "/svc/token",
        &[PermissionEntry::new(reader.clone(), [PermissionOperation::Read])],
    )
    .unwrap();
    let entries = svc
        .write_permissions(
            &owner,
            "/svc/token",
            &[PermissionEntry::new(
                reader.clone(),
                [PermissionOperation::Read, PermissionOperation::Delete],
            )],
        )
        .unwrap();
    assert_eq!(entries.len(), 2);
    let granted = entries.iter().find(|e| e.actor == reader).unwrap();
    assert!(granted.allows(PermissionOperation::Delete));
    assert!(!granted.allows(PermissionOperation::Write));

    // The reader may not see or edit the ACL.
    assert!(matches!(
        svc.get_permissions(&reader, "/svc/token"),
        Err(VaultError::NotFound)
    ));

    svc.delete_permission(&owner, "/svc/token", &reader).unwrap();
    assert!(matches!(
        svc.delete_permission(&owner, "/svc/token", &reader),
        Err(VaultError::NotFound)
    ));
    assert!(matches!(
        svc.get_current(&reader, "/svc/token"),
        Err(VaultError::NotFound)
    ));
}

#[test]
fn empty_operation_list_is_rejected() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    svc.set(&owner, "/x", secret(), None).unwrap();
    assert!(matches!(
        svc.write_permissions(
            &owner,
            "/x",
            &[PermissionEntry::new(actor("uaa-user:someone"), Vec::new())]
        ),
        Err(VaultError::PermissionConflict(PermissionConflict::NoOperations))
    ));
}

#[test]
fn textual_operation_lists() {
    let entry = PermissionService::entry_from_str("uaa-client:ci", "read, write_acl").unwrap();
    assert_eq!(
        entry,
        PermissionEntry::new(
            actor("uaa-client:ci"),
            [PermissionOperation::Read, PermissionOperation::WriteAcl]
        )
    );
    assert!(matches!(
        PermissionService::entry_from_str("uaa-client:ci", "read,fly"),
        Err(VaultError::PermissionConflict(PermissionConflict::InvalidOperation(op))) if op == "fly"
    ));
}

#[test]
fn readable_paths_are_exact() {
    let vault = vault();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    svc.set(&owner, "/b", secret(), None).unwrap();
    svc.set(&owner, "/a", secret(), None).unwrap();
    svc.set(&owner, "/a/nested", secret(), None).unwrap();
    assert_eq!(
        svc.find_readable_paths(&owner).unwrap(),
        vec!["/a".to_string(), "/a/nested".to_string(), "/b".to_string()]
    );
    assert!(svc.find_readable_paths(&actor("uaa-user:nobody")).unwrap().is_empty());
}

#[test]
fn disabled_acls_allow_everything() {
    let mut config = config(vec![key("k1", true)]);
    config.authorization.acls_enabled = false;
    let vault = credvault::Vault::with_store(
        Arc::new(Store::open_in_memory().unwrap()),
        &config,
        vaultcrypt::ProviderContext::default(),
        support::caps(),
    )
    .unwrap();
    let svc = vault.credentials();
    let owner = actor("uaa-user:owner");
    let anyone = actor("uaa-user:anyone");
    svc.set(&owner, "/open", secret(), None).unwrap();

    assert_eq!(svc.get_current(&anyone, "/open").unwrap().value, secret());
    svc.set(&anyone, "/open", secret(), None).unwrap();
    // Editing one's own grant stays forbidden.
    assert!(matches!(
        svc.write_permissions(
            &anyone,
            "/open",
            &[PermissionEntry::new(anyone.clone(), [PermissionOperation::Read])]
        ),
        Err(VaultError::PermissionConflict(PermissionConflict::SelfModification))
    ));
}
