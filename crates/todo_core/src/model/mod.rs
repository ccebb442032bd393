//! Domain model for todo documents.
//!
//! # Responsibility
//! - Define canonical data structures used by repository and service code.
//!
//! # Invariants
//! - Every todo is identified by a store-assigned BSON `ObjectId`.
//! - Deletion is represented by a `deleted_at` tombstone, never hard delete.

pub mod todo;
