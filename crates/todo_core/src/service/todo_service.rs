//! Todo use-case service.
//!
//! # Responsibility
//! - Provide stable CRUD entry points for binaries and embedding hosts.
//! - Delegate persistence to repository implementations.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Service layer remains storage-agnostic.

use crate::model::todo::{Todo, TodoId};
use crate::repo::todo_repo::{RepoResult, TodoRepository};
use crate::store::UpdateResult;

/// Use-case service wrapper for todo operations.
pub struct TodoService<R: TodoRepository> {
    repo: R,
}

impl<R: TodoRepository> TodoService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a todo and returns its store-assigned id.
    pub fn create_todo(&self, text: &str, status: &str) -> RepoResult<TodoId> {
        self.repo.create_todo(text, status)
    }

    /// Snapshot of every todo, soft-deleted ones included.
    pub fn list_todos(&self) -> RepoResult<Vec<Todo>> {
        self.repo.list_todos()
    }

    /// Sets a new status and refreshes `updated_at`.
    ///
    /// An unknown id is not an error; the result reports zero matches.
    pub fn update_status(&self, id: &str, status: &str) -> RepoResult<UpdateResult> {
        self.repo.update_todo_status(id, status)
    }

    /// Stamps `deleted_at`; the record stays listed.
    pub fn soft_delete(&self, id: &str) -> RepoResult<UpdateResult> {
        self.repo.soft_delete_todo(id)
    }
}
