//! Storage schema for the SQLite document store.
//!
//! The schema is three tables: `documents` holds bodies keyed by
//! `(collection, id)`, `index_catalog` describes the secondary indexes built
//! over those bodies, and `schema_history` records which storage migrations
//! ran and when. `PRAGMA user_version` mirrors the highest applied version so
//! a file written by a newer build is refused before anything is touched.
//!
//! Collection-level index policy (the `status` index) is not a storage
//! migration; see [`crate::migration`].

use crate::db::{DbError, DbResult};
use crate::model::todo::now_epoch_ms;
use log::info;
use rusqlite::{params, Connection, Transaction};

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "documents",
        sql: include_str!("0001_documents.sql"),
    },
    Migration {
        version: 2,
        name: "index_catalog",
        sql: include_str!("0002_index_catalog.sql"),
    },
    Migration {
        version: 3,
        name: "schema_history",
        sql: include_str!("0003_schema_history.sql"),
    },
];

/// Tables the store reads and writes once migrations are done.
pub const REQUIRED_TABLES: [&str; 3] = ["documents", "index_catalog", "schema_history"];

/// A `schema_history` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
    /// Epoch milliseconds; `None` when the migration predates the history
    /// table.
    pub applied_at: Option<i64>,
}

/// Highest schema version this build can write.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings the storage schema up to [`latest_version`] and checks its tables.
///
/// All pending migrations and their history rows commit in one transaction.
///
/// # Errors
/// - [`DbError::UnsupportedSchemaVersion`] for a file from a newer build.
/// - [`DbError::MissingTable`] when the version claims a table that is gone.
/// - [`DbError::Sqlite`] when a statement fails; nothing is applied then.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = current_user_version(conn)?;
    let latest = latest_version();

    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    if from_version < latest {
        let tx = conn.transaction()?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > from_version) {
            tx.execute_batch(migration.sql)?;
            info!(
                "event=db_migrate module=db status=ok version={} name={}",
                migration.version, migration.name
            );
        }
        record_history(&tx, from_version)?;
        tx.execute_batch(&format!("PRAGMA user_version = {latest};"))?;
        tx.commit()?;
    }

    check_required_tables(conn)
}

/// Reads `PRAGMA user_version` from the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Lists `schema_history` in version order.
pub fn applied_migrations(conn: &Connection) -> DbResult<Vec<AppliedMigration>> {
    let mut stmt =
        conn.prepare("SELECT version, name, applied_at FROM schema_history ORDER BY version;")?;
    let rows = stmt.query_map([], |row| {
        Ok(AppliedMigration {
            version: row.get(0)?,
            name: row.get(1)?,
            applied_at: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Writes a history row per known migration. Versions at or below
/// `from_version` ran in an earlier session and get no timestamp.
fn record_history(tx: &Transaction<'_>, from_version: u32) -> DbResult<()> {
    let now = now_epoch_ms();
    for migration in MIGRATIONS {
        let applied_at = (migration.version > from_version).then_some(now);
        tx.execute(
            "INSERT OR IGNORE INTO schema_history (version, name, applied_at)
             VALUES (?1, ?2, ?3);",
            params![migration.version, migration.name, applied_at],
        )?;
    }
    Ok(())
}

fn check_required_tables(conn: &Connection) -> DbResult<()> {
    for table in REQUIRED_TABLES {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DbError::MissingTable(table));
        }
    }
    Ok(())
}
