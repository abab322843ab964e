//! Row-level policies shared by the bundled backends.
//!
//! Reads are public. Writes require a signed-in actor who owns the row; the
//! owner column is `id` for `users` and `user_id` everywhere else.

use serde_json::{Map, Value};

use super::Table;
use crate::errors::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    const fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

fn owner_column(table: Table) -> &'static str {
    match table {
        Table::Users => "id",
        Table::Posts | Table::Comments | Table::Likes => "user_id",
    }
}

/// Columns a row owner may change through `update`.
pub(crate) fn updatable_columns(table: Table) -> &'static [&'static str] {
    match table {
        Table::Users => &["user_name"],
        Table::Posts => &["content"],
        Table::Comments | Table::Likes => &[],
    }
}

fn denied(table: Table, operation: Operation) -> BackendError {
    BackendError::PolicyDenied {
        table,
        operation: operation.as_str(),
    }
}

pub(crate) fn authorize(
    table: Table,
    operation: Operation,
    actor: Option<&str>,
    row: &Value,
) -> Result<(), BackendError> {
    let Some(actor) = actor else {
        return Err(denied(table, operation));
    };
    if operation == Operation::Delete && table == Table::Users {
        return Err(denied(table, operation));
    }
    match row.get(owner_column(table)).and_then(Value::as_str) {
        Some(owner) if owner == actor => Ok(()),
        _ => Err(denied(table, operation)),
    }
}

/// Validates an update patch against the updatable columns.
pub(crate) fn authorize_patch(table: Table, patch: &Value) -> Result<Map<String, Value>, BackendError> {
    let Some(fields) = patch.as_object() else {
        return Err(BackendError::decode("update patch must be an object"));
    };
    let allowed = updatable_columns(table);
    if fields.keys().any(|key| !allowed.contains(&key.as_str())) {
        return Err(denied(table, Operation::Update));
    }
    Ok(fields.clone())
}

/// Name of the uniqueness constraint guarding a row, if any.
pub(crate) fn unique_key(table: Table, row: &Value) -> Option<(String, String)> {
    match table {
        Table::Likes => {
            let post_id = row.get("post_id").and_then(Value::as_str)?;
            let user_id = row.get("user_id").and_then(Value::as_str)?;
            Some(("likes_post_id_user_id_key".to_string(), format!("{post_id}:{user_id}")))
        }
        _ => None,
    }
}

/// Constraint name reported when an inserted row reuses an existing id.
pub(crate) fn primary_key(table: Table) -> String {
    format!("{table}_pkey")
}

/// Tables whose rows are removed together with a deleted post.
pub(crate) const POST_DEPENDENTS: [Table; 2] = [Table::Comments, Table::Likes];
