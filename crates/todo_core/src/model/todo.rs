//! Todo domain model.
//!
//! # Responsibility
//! - Define the canonical todo record and its document wire shape.
//! - Provide lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - `id` is assigned by the document store exactly once and never changes.
//! - `created_at <= updated_at` for every persisted record.
//! - `deleted_at` is the source of truth for tombstone state.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable identifier of a todo document.
///
/// Kept as a type alias so signatures read in domain terms. Stored as a
/// native BSON object id and rendered as 24 lower-case hex digits.
pub type TodoId = ObjectId;

/// Field names of the todo document. These are part of the stored shape.
pub mod fields {
    pub const ID: &str = "_id";
    pub const TEXT: &str = "todo";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const DELETED_AT: &str = "deleted_at";
}

/// Validation failures for todo records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoValidationError {
    EmptyText,
    UpdatedBeforeCreated { created_at: i64, updated_at: i64 },
}

impl Display for TodoValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "todo text must not be empty"),
            Self::UpdatedBeforeCreated {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at ({updated_at}) must be >= created_at ({created_at})"
            ),
        }
    }
}

impl Error for TodoValidationError {}

/// A todo document as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    #[serde(rename = "_id")]
    pub id: TodoId,
    /// Serialized as `todo` to match the stored document shape.
    #[serde(rename = "todo")]
    pub text: String,
    /// Free-form label such as `Pending` or `Completed`.
    pub status: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds, refreshed on every status update.
    pub updated_at: i64,
    /// Unix epoch milliseconds. `None` until soft-deleted.
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl Todo {
    /// Returns whether this todo carries a soft-delete tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Checks record-level invariants.
    ///
    /// # Errors
    /// - [`TodoValidationError::EmptyText`] when `text` is blank.
    /// - [`TodoValidationError::UpdatedBeforeCreated`] when timestamps are
    ///   out of order.
    pub fn validate(&self) -> Result<(), TodoValidationError> {
        validate_text(&self.text)?;
        if self.updated_at < self.created_at {
            return Err(TodoValidationError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }
}

/// Insert payload for a todo that has no id yet.
///
/// Serializes to the stored document shape minus `_id`, which the store
/// assigns on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTodo<'a> {
    #[serde(rename = "todo")]
    pub text: &'a str,
    pub status: &'a str,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl<'a> NewTodo<'a> {
    /// Builds an insert payload stamped with a single clock reading.
    ///
    /// # Invariants
    /// - `created_at == updated_at`.
    /// - `deleted_at` starts as `None`.
    pub fn new(
        text: &'a str,
        status: &'a str,
        now_epoch_ms: i64,
    ) -> Result<Self, TodoValidationError> {
        validate_text(text)?;
        Ok(Self {
            text,
            status,
            created_at: now_epoch_ms,
            updated_at: now_epoch_ms,
            deleted_at: None,
        })
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn validate_text(text: &str) -> Result<(), TodoValidationError> {
    if text.trim().is_empty() {
        return Err(TodoValidationError::EmptyText);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{now_epoch_ms, NewTodo, TodoValidationError};

    #[test]
    fn new_todo_stamps_both_timestamps_with_same_instant() {
        let payload = NewTodo::new("Buy milk", "Pending", 1_700_000_000_000).unwrap();
        assert_eq!(payload.created_at, payload.updated_at);
        assert_eq!(payload.deleted_at, None);
    }

    #[test]
    fn new_todo_rejects_blank_text() {
        let err = NewTodo::new("   ", "Pending", 1).unwrap_err();
        assert_eq!(err, TodoValidationError::EmptyText);
    }

    #[test]
    fn clock_is_after_2020() {
        assert!(now_epoch_ms() > 1_577_836_800_000);
    }
}
