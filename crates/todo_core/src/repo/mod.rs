//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate document-store details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`InvalidId`, `InvalidData`) in
//!   addition to store transport errors.

pub mod todo_repo;
