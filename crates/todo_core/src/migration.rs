//! Collection index migration.
//!
//! # Responsibility
//! - Ensure the secondary index that status queries rely on exists.
//!
//! # Invariants
//! - Running the migration any number of times leaves exactly one index on
//!   `status`.

use crate::model::todo::fields;
use crate::store::{DocumentStore, IndexOutcome, IndexSpec, StoreResult};
use log::{error, info};
use std::time::Instant;

/// Non-unique ascending index on `status`.
pub fn status_index_spec() -> IndexSpec {
    IndexSpec::ascending(fields::STATUS).unique(false)
}

/// Creates the `status` index on `collection` unless it already exists.
///
/// # Side effects
/// - Emits `index_ensure` logging events with outcome and duration.
///
/// # Errors
/// - Propagates store errors, including an index conflict when an index with
///   the same name or key exists with different options.
pub fn ensure_status_index<S: DocumentStore>(
    store: &S,
    collection: &str,
) -> StoreResult<IndexOutcome> {
    let spec = status_index_spec();
    let started_at = Instant::now();

    match store.create_index(collection, &spec) {
        Ok(outcome) => {
            let result = match outcome {
                IndexOutcome::Created(_) => "created",
                IndexOutcome::AlreadyExists(_) => "exists",
            };
            info!(
                "event=index_ensure module=migration status=ok collection={collection} index={} result={result} duration_ms={}",
                outcome.name(),
                started_at.elapsed().as_millis()
            );
            Ok(outcome)
        }
        Err(err) => {
            error!(
                "event=index_ensure module=migration status=error collection={collection} index={} duration_ms={} error={err}",
                spec.name,
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}
