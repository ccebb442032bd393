//! Document store contract and its backends.
//!
//! # Responsibility
//! - Define the minimal document-store interface the todo repository and
//!   the index migration depend on.
//! - Keep engine details (SQL, wire protocol) behind that interface.
//!
//! # Invariants
//! - `_id` is assigned on insert when absent and is immutable afterwards.
//! - `update_one` on an unknown id is a successful zero-match result.
//! - Index creation is idempotent for identical specs.

use crate::db::DbError;
use bson::oid::ObjectId;
use bson::Bson;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod client;
#[cfg(feature = "mongodb")]
mod mongo_store;
mod sqlite_store;

pub use bson::Document;
pub use client::StoreClient;
#[cfg(feature = "mongodb")]
pub use mongo_store::MongoDocumentStore;
pub use sqlite_store::SqliteDocumentStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Field every document carries as its primary key.
pub const ID_FIELD: &str = "_id";

/// Name of the implicit primary-key index reported by `list_indexes`.
pub const ID_INDEX_NAME: &str = "_id_";

static FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("valid field name regex"));

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    #[cfg(feature = "mongodb")]
    Mongo(mongodb::error::Error),
    Json(serde_json::Error),
    ExtJson(bson::extjson::de::Error),
    InvalidName { kind: &'static str, value: String },
    InvalidDocument(String),
    ImmutableField(&'static str),
    DuplicateKey { collection: String, detail: String },
    IndexConflict { requested: IndexSpec, existing: IndexSpec },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            #[cfg(feature = "mongodb")]
            Self::Mongo(err) => write!(f, "mongodb error: {err}"),
            Self::Json(err) => write!(f, "failed to parse stored document: {err}"),
            Self::ExtJson(err) => write!(f, "failed to decode stored document: {err}"),
            Self::InvalidName { kind, value } => write!(f, "invalid {kind} name `{value}`"),
            Self::InvalidDocument(message) => write!(f, "invalid document: {message}"),
            Self::ImmutableField(field) => write!(f, "field `{field}` is immutable"),
            Self::DuplicateKey { collection, detail } => {
                write!(f, "duplicate key in collection `{collection}`: {detail}")
            }
            Self::IndexConflict {
                requested,
                existing,
            } => write!(
                f,
                "index `{}` conflicts with existing index `{}` on `{}`",
                requested.name, existing.name, existing.field
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            #[cfg(feature = "mongodb")]
            Self::Mongo(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::ExtJson(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<bson::extjson::de::Error> for StoreError {
    fn from(value: bson::extjson::de::Error) -> Self {
        Self::ExtJson(value)
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for StoreError {
    fn from(value: mongodb::error::Error) -> Self {
        Self::Mongo(value)
    }
}

/// Sort order of a single-field index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Wire value: `1` for ascending, `-1` for descending.
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Ascending),
            -1 => Some(Self::Descending),
            _ => None,
        }
    }
}

/// Single-field secondary index description.
///
/// Names follow the `<field>_<direction>` convention, e.g. `status_1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub field: String,
    pub direction: SortDirection,
    pub unique: bool,
}

impl IndexSpec {
    /// Non-unique ascending index on `field`.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    /// Non-unique descending index on `field`.
    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }

    fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();
        Self {
            name: format!("{field}_{}", direction.as_i64()),
            field,
            direction,
            unique: false,
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// The primary-key index every collection has.
    pub fn primary_key() -> Self {
        Self {
            name: ID_INDEX_NAME.to_string(),
            field: ID_FIELD.to_string(),
            direction: SortDirection::Ascending,
            unique: true,
        }
    }

    /// Whether `other` occupies the same name or the same key as `self`.
    fn overlaps(&self, other: &IndexSpec) -> bool {
        self.name == other.name || (self.field == other.field && self.direction == other.direction)
    }
}

/// Result of an index creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Created(String),
    AlreadyExists(String),
}

impl IndexOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Created(name) | Self::AlreadyExists(name) => name,
        }
    }
}

/// Match/modify counts of a single-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Top-level field changes applied by [`DocumentStore::update_one`].
///
/// `set` fields are overwritten. `max` fields are raised to the given value
/// and left alone when the stored value is already greater, the way
/// MongoDB's `$max` operator behaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub max: Document,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.set.insert(field, value);
        self
    }

    pub fn max(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.max.insert(field, value);
        self
    }

    /// Update document in MongoDB operator form, e.g. `{"$set": {..}}`.
    pub fn to_modifiers(&self) -> Document {
        let mut modifiers = Document::new();
        if !self.set.is_empty() {
            modifiers.insert("$set", self.set.clone());
        }
        if !self.max.is_empty() {
            modifiers.insert("$max", self.max.clone());
        }
        modifiers
    }

    /// Rejects empty updates, `_id` changes and unusable field names.
    pub(crate) fn check(&self) -> StoreResult<()> {
        if self.set.is_empty() && self.max.is_empty() {
            return Err(StoreError::InvalidDocument(
                "update names no fields".to_string(),
            ));
        }
        for field in self.set.keys().chain(self.max.keys()) {
            if field == ID_FIELD {
                return Err(StoreError::ImmutableField(ID_FIELD));
            }
            validate_field(field)?;
        }
        Ok(())
    }
}

/// Minimal document-store interface.
///
/// Every call is a blocking request/response round trip.
pub trait DocumentStore {
    /// Verifies the store answers requests.
    fn ping(&self) -> StoreResult<()>;
    /// Inserts one document, assigning `_id` when absent, and returns its id.
    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<ObjectId>;
    /// Returns every document of `collection` in insertion order.
    fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>>;
    /// Applies `update` to the document with `id`.
    fn update_one(
        &self,
        collection: &str,
        id: ObjectId,
        update: Update,
    ) -> StoreResult<UpdateResult>;
    /// Creates a secondary index unless an identical one exists.
    fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<IndexOutcome>;
    /// Lists indexes of `collection`, the implicit `_id_` index first.
    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn ping(&self) -> StoreResult<()> {
        (**self).ping()
    }

    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<ObjectId> {
        (**self).insert_one(collection, document)
    }

    fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        (**self).find_all(collection)
    }

    fn update_one(
        &self,
        collection: &str,
        id: ObjectId,
        update: Update,
    ) -> StoreResult<UpdateResult> {
        (**self).update_one(collection, id, update)
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<IndexOutcome> {
        (**self).create_index(collection, index)
    }

    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        (**self).list_indexes(collection)
    }
}

pub(crate) fn validate_collection(collection: &str) -> StoreResult<()> {
    if crate::config::is_valid_name(collection) {
        return Ok(());
    }
    Err(StoreError::InvalidName {
        kind: "collection",
        value: collection.to_string(),
    })
}

pub(crate) fn validate_field(field: &str) -> StoreResult<()> {
    if FIELD_RE.is_match(field) {
        return Ok(());
    }
    Err(StoreError::InvalidName {
        kind: "field",
        value: field.to_string(),
    })
}

/// Checks that `index` may be created as a secondary index.
pub(crate) fn validate_index(index: &IndexSpec) -> StoreResult<()> {
    validate_field(&index.field)?;
    if index.field == ID_FIELD {
        return Err(StoreError::InvalidName {
            kind: "index field",
            value: index.field.clone(),
        });
    }
    if !crate::config::is_valid_name(&index.name) {
        return Err(StoreError::InvalidName {
            kind: "index",
            value: index.name.clone(),
        });
    }
    Ok(())
}

/// Decides what `create_index` does given the indexes already present.
///
/// Returns `Ok(Some(name))` when an identical index exists, `Ok(None)` when
/// the index should be built.
pub(crate) fn resolve_existing_index<'a>(
    requested: &IndexSpec,
    existing: impl IntoIterator<Item = &'a IndexSpec>,
) -> StoreResult<Option<String>> {
    match existing.into_iter().find(|index| index.overlaps(requested)) {
        Some(index) if index == requested => Ok(Some(index.name.clone())),
        Some(index) => Err(StoreError::IndexConflict {
            requested: requested.clone(),
            existing: index.clone(),
        }),
        None => Ok(None),
    }
}

/// Takes the document's `_id`, generating one when absent.
pub(crate) fn assign_id(document: &mut Document) -> StoreResult<ObjectId> {
    match document.get(ID_FIELD) {
        Some(Bson::ObjectId(id)) => Ok(*id),
        Some(other) => Err(StoreError::InvalidDocument(format!(
            "`{ID_FIELD}` must be an object id, got {other}"
        ))),
        None => {
            let id = ObjectId::new();
            document.insert(ID_FIELD, id);
            Ok(id)
        }
    }
}
