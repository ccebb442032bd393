//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist documents per collection in the `documents` table as relaxed
//!   extended JSON, so object ids and integer widths survive a round trip.
//! - Back secondary indexes with partial expression indexes over
//!   `json_extract(body, '$.<field>')`, recorded in `index_catalog`.
//!
//! # Invariants
//! - Collection, field and index names are validated before they are
//!   interpolated into SQL.
//! - `find_all` returns documents in insertion order.
//! - An update that changes nothing does not rewrite the row.

use super::{
    assign_id, resolve_existing_index, validate_collection, validate_index, Document,
    DocumentStore, IndexOutcome, IndexSpec, SortDirection, StoreError, StoreResult, Update,
    UpdateResult,
};
use crate::config::{StoreConfig, StoreLocation};
use crate::db::{open_db, open_db_in_memory, DbError};
use bson::oid::ObjectId;
use bson::Bson;
use log::{debug, error, info};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use serde_json::Value;
use std::cmp::Ordering;
use std::time::Instant;

const INDEX_SELECT_SQL: &str = "SELECT name, field, direction, is_unique FROM index_catalog";

/// Document store over a single owned SQLite connection.
///
/// The connection is released by [`SqliteDocumentStore::close`], or on drop
/// when the value goes out of scope on an error path.
pub struct SqliteDocumentStore {
    conn: Connection,
    database: String,
}

impl SqliteDocumentStore {
    /// Connects to the store described by `config` and pings it.
    ///
    /// # Side effects
    /// - Creates the data directory and database file when missing.
    /// - Emits `store_connect` logging events with duration and status.
    ///
    /// # Errors
    /// - [`StoreError::Db`] for invalid config, a non-SQLite URI, I/O,
    ///   bootstrap or ping failure.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let started_at = Instant::now();
        info!(
            "event=store_connect module=store status=start backend=sqlite database={}",
            config.database
        );

        match Self::connect(config) {
            Ok(store) => {
                info!(
                    "event=store_connect module=store status=ok backend=sqlite database={} duration_ms={}",
                    store.database,
                    started_at.elapsed().as_millis()
                );
                Ok(store)
            }
            Err(err) => {
                error!(
                    "event=store_connect module=store status=error backend=sqlite database={} duration_ms={} error={err}",
                    config.database,
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    fn connect(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let conn = match config.location()? {
            StoreLocation::SqliteDirectory(dir) => {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(&dir).map_err(DbError::from)?;
                }
                open_db(config.database_file(&dir), config.connect_timeout)?
            }
            StoreLocation::SqliteMemory => open_db_in_memory(config.connect_timeout)?,
            StoreLocation::MongoDb => {
                return Err(DbError::InvalidConfig(
                    "connection string does not name a sqlite store".to_string(),
                )
                .into())
            }
        };

        let store = Self {
            conn,
            database: config.database.clone(),
        };
        store.ping()?;
        Ok(store)
    }

    /// Name of the connected database.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Underlying connection, for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the connection and reports any error raised while doing so.
    pub fn close(self) -> StoreResult<()> {
        let database = self.database;
        match self.conn.close() {
            Ok(()) => {
                info!("event=store_close module=store status=ok backend=sqlite database={database}");
                Ok(())
            }
            Err((_conn, err)) => {
                error!(
                    "event=store_close module=store status=error backend=sqlite database={database} error={err}"
                );
                Err(err.into())
            }
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn ping(&self) -> StoreResult<()> {
        self.conn
            .query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn insert_one(&self, collection: &str, mut document: Document) -> StoreResult<ObjectId> {
        validate_collection(collection)?;
        let id = assign_id(&mut document)?;

        self.conn
            .execute(
                "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3);",
                params![collection, id.to_hex(), encode_document(document)],
            )
            .map_err(|err| map_write_error(collection, err))?;

        debug!("event=doc_insert module=store status=ok collection={collection} id={id}");
        Ok(id)
    }

    fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        validate_collection(collection)?;

        let mut stmt = self.conn.prepare(
            "SELECT body FROM documents
             WHERE collection = ?1
             ORDER BY rowid ASC;",
        )?;
        let mut rows = stmt.query([collection])?;
        let mut documents = Vec::new();

        while let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            documents.push(decode_document(&body)?);
        }

        debug!(
            "event=doc_find module=store status=ok collection={collection} count={}",
            documents.len()
        );
        Ok(documents)
    }

    fn update_one(
        &self,
        collection: &str,
        id: ObjectId,
        update: Update,
    ) -> StoreResult<UpdateResult> {
        validate_collection(collection)?;
        update.check()?;

        let tx = self.conn.unchecked_transaction()?;
        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2;",
                params![collection, id.to_hex()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(body) = body else {
            debug!("event=doc_update module=store status=ok collection={collection} id={id} matched=0");
            return Ok(UpdateResult::default());
        };

        let mut document = decode_document(&body)?;
        let mut changed = false;
        for (field, value) in update.set {
            if !document.get(&field).is_some_and(|current| same_value(current, &value)) {
                document.insert(field, value);
                changed = true;
            }
        }
        for (field, value) in update.max {
            if raises(document.get(&field), &value) {
                document.insert(field, value);
                changed = true;
            }
        }

        if !changed {
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: 0,
            });
        }

        tx.execute(
            "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2;",
            params![collection, id.to_hex(), encode_document(document)],
        )
        .map_err(|err| map_write_error(collection, err))?;
        tx.commit()?;

        debug!("event=doc_update module=store status=ok collection={collection} id={id} matched=1");
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: 1,
        })
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<IndexOutcome> {
        validate_collection(collection)?;
        validate_index(index)?;

        let tx = self.conn.unchecked_transaction()?;
        let existing = catalog_indexes(&tx, collection)?;
        if let Some(name) = resolve_existing_index(index, &existing)? {
            return Ok(IndexOutcome::AlreadyExists(name));
        }

        let sqlite_name = format!("ix_{collection}_{}", index.name);
        let direction_sql = match index.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        let unique_sql = if index.unique { "UNIQUE " } else { "" };
        tx.execute_batch(&format!(
            "CREATE {unique_sql}INDEX IF NOT EXISTS \"{sqlite_name}\"
             ON documents (json_extract(body, '$.{field}') {direction_sql})
             WHERE collection = '{collection}';",
            field = index.field
        ))
        .map_err(|err| map_write_error(collection, err))?;
        tx.execute(
            "INSERT INTO index_catalog (collection, name, field, direction, is_unique, sqlite_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                collection,
                index.name,
                index.field,
                index.direction.as_i64(),
                index.unique,
                sqlite_name
            ],
        )?;
        tx.commit()?;

        Ok(IndexOutcome::Created(index.name.clone()))
    }

    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        validate_collection(collection)?;

        let mut indexes = vec![IndexSpec::primary_key()];
        indexes.extend(catalog_indexes(&self.conn, collection)?);
        Ok(indexes)
    }
}

fn catalog_indexes(conn: &Connection, collection: &str) -> StoreResult<Vec<IndexSpec>> {
    let mut stmt = conn.prepare(&format!(
        "{INDEX_SELECT_SQL}
         WHERE collection = ?1
         ORDER BY rowid ASC;"
    ))?;
    let mut rows = stmt.query([collection])?;
    let mut indexes = Vec::new();
    while let Some(row) = rows.next()? {
        indexes.push(parse_index_row(row)?);
    }
    Ok(indexes)
}

fn encode_document(document: Document) -> String {
    Bson::Document(document).into_relaxed_extjson().to_string()
}

fn decode_document(body: &str) -> StoreResult<Document> {
    let value: Value = serde_json::from_str(body)?;
    if !value.is_object() {
        return Err(StoreError::InvalidDocument(format!(
            "stored body is not an object: {value}"
        )));
    }
    match Bson::try_from(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(StoreError::InvalidDocument(format!(
            "stored body decodes to {other} instead of a document"
        ))),
    }
}

/// Integer view of a value; relaxed JSON narrows small `Int64`s to `Int32`.
fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(value) => Some(i64::from(*value)),
        Bson::Int64(value) => Some(*value),
        _ => None,
    }
}

fn same_value(current: &Bson, candidate: &Bson) -> bool {
    match (as_integer(current), as_integer(candidate)) {
        (Some(current), Some(candidate)) => current == candidate,
        _ => current == candidate,
    }
}

/// Whether `$max` replaces `current` with `candidate`.
///
/// Missing and null fields are always raised. Values of unrelated types
/// are left alone.
fn raises(current: Option<&Bson>, candidate: &Bson) -> bool {
    let current = match current {
        None | Some(Bson::Null) => return true,
        Some(current) => current,
    };
    let ordering = match (as_integer(current), as_integer(candidate)) {
        (Some(current), Some(candidate)) => Some(current.cmp(&candidate)),
        _ => match (current, candidate) {
            (Bson::Double(current), Bson::Double(candidate)) => current.partial_cmp(candidate),
            (Bson::String(current), Bson::String(candidate)) => Some(current.cmp(candidate)),
            (Bson::DateTime(current), Bson::DateTime(candidate)) => Some(current.cmp(candidate)),
            _ => None,
        },
    };
    ordering == Some(Ordering::Less)
}

fn parse_index_row(row: &Row<'_>) -> StoreResult<IndexSpec> {
    let raw_direction: i64 = row.get("direction")?;
    let direction = SortDirection::from_i64(raw_direction).ok_or_else(|| {
        StoreError::InvalidDocument(format!(
            "invalid index direction `{raw_direction}` in index_catalog.direction"
        ))
    })?;

    Ok(IndexSpec {
        name: row.get("name")?,
        field: row.get("field")?,
        direction,
        unique: row.get("is_unique")?,
    })
}

fn map_write_error(collection: &str, err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
                ) =>
        {
            StoreError::DuplicateKey {
                collection: collection.to_string(),
                detail: message.clone().unwrap_or_else(|| failure.to_string()),
            }
        }
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_document, encode_document, raises, same_value};
    use crate::store::StoreError;
    use bson::oid::ObjectId;
    use bson::{doc, Bson};

    #[test]
    fn stored_body_keeps_object_ids_and_plain_scalars() {
        let id = ObjectId::parse_str("65a1f0c2e4b0d1a2b3c4d5e6").unwrap();
        let body = encode_document(doc! {"_id": id, "status": "Pending", "created_at": 5_i64});

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["_id"]["$oid"], "65a1f0c2e4b0d1a2b3c4d5e6");
        assert_eq!(json["status"], "Pending");
        assert_eq!(json["created_at"], 5);

        let decoded = decode_document(&body).unwrap();
        assert_eq!(decoded.get_object_id("_id").unwrap(), id);
    }

    #[test]
    fn decode_rejects_non_object_bodies() {
        assert!(decode_document(r#"{"todo":"x"}"#).is_ok());
        assert!(matches!(
            decode_document("[1,2]"),
            Err(StoreError::InvalidDocument(_))
        ));
        assert!(matches!(
            decode_document("not json"),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn max_only_raises_smaller_or_missing_values() {
        assert!(raises(None, &Bson::Int64(1)));
        assert!(raises(Some(&Bson::Null), &Bson::Int64(1)));
        assert!(raises(Some(&Bson::Int32(1)), &Bson::Int64(2)));
        assert!(!raises(Some(&Bson::Int64(2)), &Bson::Int64(2)));
        assert!(!raises(Some(&Bson::Int64(i64::MAX / 2)), &Bson::Int64(1_700_000_000_000)));
        assert!(!raises(Some(&Bson::String("b".into())), &Bson::Int64(3)));
    }

    #[test]
    fn integer_widths_compare_equal() {
        assert!(same_value(&Bson::Int32(7), &Bson::Int64(7)));
        assert!(!same_value(&Bson::Int32(7), &Bson::String("7".into())));
    }
}
