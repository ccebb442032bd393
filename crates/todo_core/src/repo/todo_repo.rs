//! Todo repository contract and document-store implementation.
//!
//! # Responsibility
//! - Provide the create/list/update-status/soft-delete operations over the
//!   `todos` collection.
//! - Translate between `Todo` and the stored document shape.
//!
//! # Invariants
//! - Identifier strings are validated before any store call is issued.
//! - Write paths touch only the fields they own; nothing is removed.
//! - Write paths validate records; read paths only require that each
//!   document decodes as a todo.
//! - `updated_at` never moves backwards, so it stays `>= created_at` even
//!   when the wall clock steps back.
//! - `list_todos` does not filter soft-deleted records.

use crate::config::TODOS_COLLECTION;
use crate::model::todo::{fields, now_epoch_ms, NewTodo, Todo, TodoId, TodoValidationError};
use crate::store::{Document, DocumentStore, StoreError, Update, UpdateResult};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for todo operations.
#[derive(Debug)]
pub enum RepoError {
    InvalidId(bson::oid::Error),
    Validation(TodoValidationError),
    Store(StoreError),
    Encode(bson::ser::Error),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidId(err) => write!(f, "invalid todo id: {err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode todo document: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted todo data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidId(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<bson::oid::Error> for RepoError {
    fn from(value: bson::oid::Error) -> Self {
        Self::InvalidId(value)
    }
}

impl From<TodoValidationError> for RepoError {
    fn from(value: TodoValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Repository interface for todo operations.
///
/// Ids are taken in their string wire form so malformed input surfaces as
/// [`RepoError::InvalidId`] rather than being unrepresentable.
pub trait TodoRepository {
    fn create_todo(&self, text: &str, status: &str) -> RepoResult<TodoId>;
    fn list_todos(&self) -> RepoResult<Vec<Todo>>;
    fn update_todo_status(&self, id: &str, status: &str) -> RepoResult<UpdateResult>;
    fn soft_delete_todo(&self, id: &str) -> RepoResult<UpdateResult>;
}

/// Todo repository over any [`DocumentStore`].
pub struct DocumentTodoRepository<S: DocumentStore> {
    store: S,
    collection: String,
}

impl<S: DocumentStore> DocumentTodoRepository<S> {
    /// Targets the default `todos` collection.
    pub fn new(store: S) -> Self {
        Self {
            store,
            collection: TODOS_COLLECTION.to_string(),
        }
    }

    /// Targets a caller-chosen collection.
    pub fn with_collection(store: S, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn apply_update(
        &self,
        event: &str,
        raw_id: &str,
        update: Update,
    ) -> RepoResult<UpdateResult> {
        let id = parse_todo_id(event, raw_id)?;
        let started_at = Instant::now();

        match self.store.update_one(&self.collection, id, update) {
            Ok(result) => {
                info!(
                    "event={event} module=repo status=ok id={id} matched={} modified={} duration_ms={}",
                    result.matched_count,
                    result.modified_count,
                    started_at.elapsed().as_millis()
                );
                Ok(result)
            }
            Err(err) => {
                error!(
                    "event={event} module=repo status=error id={id} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err.into())
            }
        }
    }
}

impl<S: DocumentStore> TodoRepository for DocumentTodoRepository<S> {
    fn create_todo(&self, text: &str, status: &str) -> RepoResult<TodoId> {
        let payload = NewTodo::new(text, status, now_epoch_ms())?;
        let document = to_document(&payload)?;
        let started_at = Instant::now();

        match self.store.insert_one(&self.collection, document) {
            Ok(id) => {
                info!(
                    "event=todo_create module=repo status=ok id={id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(id)
            }
            Err(err) => {
                error!(
                    "event=todo_create module=repo status=error duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err.into())
            }
        }
    }

    fn list_todos(&self) -> RepoResult<Vec<Todo>> {
        let started_at = Instant::now();
        let documents = self.store.find_all(&self.collection).map_err(|err| {
            error!(
                "event=todo_list module=repo status=error duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            RepoError::from(err)
        })?;

        let todos = documents
            .into_iter()
            .map(parse_todo_document)
            .collect::<RepoResult<Vec<_>>>()?;

        info!(
            "event=todo_list module=repo status=ok count={} duration_ms={}",
            todos.len(),
            started_at.elapsed().as_millis()
        );
        Ok(todos)
    }

    fn update_todo_status(&self, id: &str, status: &str) -> RepoResult<UpdateResult> {
        let update = Update::new()
            .set(fields::STATUS, status)
            .max(fields::UPDATED_AT, now_epoch_ms());
        self.apply_update("todo_update_status", id, update)
    }

    fn soft_delete_todo(&self, id: &str) -> RepoResult<UpdateResult> {
        let update = Update::new().set(fields::DELETED_AT, now_epoch_ms());
        self.apply_update("todo_soft_delete", id, update)
    }
}

fn parse_todo_id(event: &str, raw_id: &str) -> RepoResult<TodoId> {
    TodoId::parse_str(raw_id).map_err(|err| {
        error!("event={event} module=repo status=error error_code=invalid_id error={err}");
        RepoError::InvalidId(err)
    })
}

fn to_document(payload: &NewTodo<'_>) -> RepoResult<Document> {
    bson::to_document(payload).map_err(RepoError::Encode)
}

/// Decodes a stored document. Record invariants are checked on write only.
fn parse_todo_document(document: Document) -> RepoResult<Todo> {
    let raw_id = document
        .get_object_id(fields::ID)
        .map_or_else(|_| "<missing>".to_string(), |id| id.to_hex());
    bson::from_document(document).map_err(|err| {
        RepoError::InvalidData(format!("document {raw_id} does not decode as a todo: {err}"))
    })
}
