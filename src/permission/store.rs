//! Row access for the `permission` table. Callers own the transaction.

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::{PermissionEntry, PermissionOperation};
use crate::actor::Actor;

const OPERATION_COLUMNS: &str = r#"read, write, "delete", read_acl, write_acl"#;

fn operations_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<BTreeSet<PermissionOperation>> {
    let mut ops = BTreeSet::new();
    for (offset, op) in PermissionOperation::ALL.into_iter().enumerate() {
        if row.get::<_, bool>(start + offset)? {
            ops.insert(op);
        }
    }
    Ok(ops)
}

fn actor_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Actor> {
    let text: String = row.get(idx)?;
    Actor::new(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn find(
    conn: &Connection,
    path: &str,
    actor: &Actor,
) -> rusqlite::Result<Option<BTreeSet<PermissionOperation>>> {
    conn.query_row(
        &format!("SELECT {OPERATION_COLUMNS} FROM permission WHERE path = ?1 AND actor = ?2"),
        params![path, actor.as_str()],
        |row| operations_from_row(row, 0),
    )
    .optional()
}

pub(crate) fn find_by_path(conn: &Connection, path: &str) -> rusqlite::Result<Vec<PermissionEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT actor, {OPERATION_COLUMNS} FROM permission WHERE path = ?1 ORDER BY actor"
    ))?;
    let entries = stmt
        .query_map([path], |row| {
            Ok(PermissionEntry {
                actor: actor_col(row, 0)?,
                operations: operations_from_row(row, 1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Paths on which `actor` holds `op`, sorted.
pub(crate) fn find_paths_with(
    conn: &Connection,
    actor: &Actor,
    op: PermissionOperation,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT path FROM permission WHERE actor = ?1 AND {} = 1 ORDER BY path",
        op.column()
    ))?;
    let paths = stmt
        .query_map([actor.as_str()], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(paths)
}

/// Insert or replace the operation set of `(path, actor)`.
pub(crate) fn upsert(conn: &Connection, path: &str, entry: &PermissionEntry) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            r#"
            INSERT INTO permission (uuid, path, actor, {OPERATION_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (path, actor) DO UPDATE SET
                read = excluded.read,
                write = excluded.write,
                "delete" = excluded."delete",
                read_acl = excluded.read_acl,
                write_acl = excluded.write_acl
            "#
        ),
        params![
            Uuid::new_v4().to_string(),
            path,
            entry.actor.as_str(),
            entry.allows(PermissionOperation::Read),
            entry.allows(PermissionOperation::Write),
            entry.allows(PermissionOperation::Delete),
            entry.allows(PermissionOperation::ReadAcl),
            entry.allows(PermissionOperation::WriteAcl),
        ],
    )?;
    Ok(())
}

/// Full control for the actor that first writes a credential.
pub(crate) fn grant_creator(conn: &Connection, path: &str, actor: &Actor) -> rusqlite::Result<()> {
    upsert(
        conn,
        path,
        &PermissionEntry::new(actor.clone(), PermissionOperation::ALL),
    )
}

pub(crate) fn delete(conn: &Connection, path: &str, actor: &Actor) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM permission WHERE path = ?1 AND actor = ?2",
        params![path, actor.as_str()],
    )?;
    Ok(n > 0)
}

pub(crate) fn delete_by_path(conn: &Connection, path: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM permission WHERE path = ?1", [path])
}
