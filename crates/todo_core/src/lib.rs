//! Todo document store client and index migration.
//! This crate owns the todo data model, its document shape and the
//! soft-delete and index policies.

pub mod config;
pub mod db;
pub mod logging;
pub mod migration;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use bson::oid::ObjectId;
pub use config::{StoreConfig, StoreLocation, TODOS_COLLECTION};
pub use logging::{default_log_level, init_logging, logging_status};
pub use migration::{ensure_status_index, status_index_spec};
pub use model::todo::{Todo, TodoId, TodoValidationError};
pub use repo::todo_repo::{DocumentTodoRepository, RepoError, RepoResult, TodoRepository};
pub use service::todo_service::TodoService;
#[cfg(feature = "mongodb")]
pub use store::MongoDocumentStore;
pub use store::{
    Document, DocumentStore, IndexOutcome, IndexSpec, SortDirection, SqliteDocumentStore,
    StoreClient, StoreError, StoreResult, Update, UpdateResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
