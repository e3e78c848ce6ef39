use std::sync::Arc;

use super::{PermissionEntry, PermissionOperation, store};
use crate::{
    actor::Actor,
    credential::name,
    error::{PermissionConflict, Result, VaultError},
    store::Store,
};

/// Evaluates and edits grants.
///
/// With `acls_enabled = false` every check passes; the ACL editing
/// operations keep rejecting self-modification either way.
pub struct PermissionService {
    store: Arc<Store>,
    acls_enabled: bool,
}

impl PermissionService {
    pub fn new(store: Arc<Store>, acls_enabled: bool) -> Self {
        Self {
            store,
            acls_enabled,
        }
    }

    pub fn acls_enabled(&self) -> bool {
        self.acls_enabled
    }

    /// True iff `actor` holds `op` on exactly `path`.
    pub fn has_permission(&self, actor: &Actor, path: &str, op: PermissionOperation) -> Result<bool> {
        if !self.acls_enabled {
            return Ok(true);
        }
        let conn = self.store.lock();
        Ok(store::find(&conn, path, actor)?.is_some_and(|ops| ops.contains(&op)))
    }

    /// Fail with `NotFound` unless `actor` holds `op` on `path`.
    pub(crate) fn require(&self, actor: &Actor, path: &str, op: PermissionOperation) -> Result<()> {
        if self.has_permission(actor, path, op)? {
            Ok(())
        } else {
            log::debug!("{actor} lacks {op} on {path}");
            Err(VaultError::NotFound)
        }
    }

    /// All grants on `path`. Requires `READ_ACL`.
    pub fn get_permissions(&self, requester: &Actor, path: &str) -> Result<Vec<PermissionEntry>> {
        let path = name::normalize(path)?;
        self.require(requester, &path, PermissionOperation::ReadAcl)?;
        let conn = self.store.lock();
        Ok(store::find_by_path(&conn, &path)?)
    }

    /// Upsert each entry on `path`. Requires `WRITE_ACL`.
    ///
    /// Nothing is written if any entry is rejected.
    pub fn write_permissions(
        &self,
        requester: &Actor,
        path: &str,
        entries: &[PermissionEntry],
    ) -> Result<Vec<PermissionEntry>> {
        let path = name::normalize(path)?;
        self.require(requester, &path, PermissionOperation::WriteAcl)?;

        for entry in entries {
            if !allowed_to_operate_on(requester, &entry.actor) {
                log::warn!("{requester} attempted to change their own grant on {path}");
                return Err(PermissionConflict::SelfModification.into());
            }
            if entry.operations.is_empty() {
                return Err(PermissionConflict::NoOperations.into());
            }
        }

        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        for entry in entries {
            store::upsert(&tx, &path, entry)?;
        }
        tx.commit()?;
        log::info!("{requester} wrote {} grant(s) on {path}", entries.len());

        Ok(store::find_by_path(&conn, &path)?)
    }

    /// Remove `actor`'s grant on `path`. Requires `WRITE_ACL`.
    ///
    /// Returns false if there was no such grant.
    pub fn delete_permission_entry(&self, requester: &Actor, path: &str, actor: &Actor) -> Result<bool> {
        let path = name::normalize(path)?;
        self.require(requester, &path, PermissionOperation::WriteAcl)?;
        if !allowed_to_operate_on(requester, actor) {
            return Err(PermissionConflict::SelfModification.into());
        }
        let conn = self.store.lock();
        let deleted = store::delete(&conn, &path, actor)?;
        if deleted {
            log::info!("{requester} removed the grant of {actor} on {path}");
        }
        Ok(deleted)
    }

    /// Every path `actor` can read, sorted.
    pub fn find_readable_paths(&self, actor: &Actor) -> Result<Vec<String>> {
        let conn = self.store.lock();
        Ok(store::find_paths_with(&conn, actor, PermissionOperation::Read)?)
    }

    /// Grants from a textual operation list, for callers that receive
    /// `"read, write"` style input.
    pub fn entry_from_str(actor: &str, operations: &str) -> Result<PermissionEntry> {
        let actor = Actor::new(actor)?;
        let operations = super::parse_operations(operations)?;
        Ok(PermissionEntry { actor, operations })
    }
}

fn allowed_to_operate_on(requester: &Actor, target: &Actor) -> bool {
    requester != target
}
