//! Path based access control.
//!
//! A grant ties one actor to one exact credential path with a set of
//! operations. There is no inheritance between paths.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{actor::Actor, error::PermissionConflict};

mod check;
mod parse;
pub(crate) mod store;

pub use check::PermissionService;
pub use parse::parse_operations;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOperation {
    Read,
    Write,
    Delete,
    ReadAcl,
    WriteAcl,
}

impl PermissionOperation {
    pub const ALL: [PermissionOperation; 5] = [
        PermissionOperation::Read,
        PermissionOperation::Write,
        PermissionOperation::Delete,
        PermissionOperation::ReadAcl,
        PermissionOperation::WriteAcl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionOperation::Read => "read",
            PermissionOperation::Write => "write",
            PermissionOperation::Delete => "delete",
            PermissionOperation::ReadAcl => "read_acl",
            PermissionOperation::WriteAcl => "write_acl",
        }
    }

    /// Column holding this operation's flag in the `permission` table.
    pub(crate) fn column(self) -> &'static str {
        match self {
            PermissionOperation::Read => "read",
            PermissionOperation::Write => "write",
            PermissionOperation::Delete => "\"delete\"",
            PermissionOperation::ReadAcl => "read_acl",
            PermissionOperation::WriteAcl => "write_acl",
        }
    }

    pub fn all() -> BTreeSet<PermissionOperation> {
        Self::ALL.into_iter().collect()
    }
}

impl fmt::Display for PermissionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionOperation {
    type Err = PermissionConflict;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PermissionConflict::InvalidOperation(s.trim().to_string()))
    }
}

/// The operations one actor holds on a path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub actor: Actor,
    pub operations: BTreeSet<PermissionOperation>,
}

impl PermissionEntry {
    pub fn new(actor: Actor, operations: impl IntoIterator<Item = PermissionOperation>) -> Self {
        Self {
            actor,
            operations: operations.into_iter().collect(),
        }
    }

    pub fn allows(&self, op: PermissionOperation) -> bool {
        self.operations.contains(&op)
    }
}
