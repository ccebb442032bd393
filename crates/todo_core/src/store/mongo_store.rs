//! MongoDB-backed document store.
//!
//! # Responsibility
//! - Serve the [`DocumentStore`] contract from a MongoDB deployment through
//!   the driver's blocking API.
//! - Translate driver results into store outcomes: update counts, duplicate
//!   keys, index conflicts.
//!
//! # Invariants
//! - The connect timeout bounds both server selection and socket connect.
//! - Credentials in the connection string never reach the log.

use super::{
    assign_id, resolve_existing_index, validate_collection, validate_index, Document,
    DocumentStore, IndexOutcome, IndexSpec, SortDirection, StoreError, StoreResult, Update,
    UpdateResult, ID_FIELD, ID_INDEX_NAME,
};
use crate::config::{redact_uri, StoreConfig};
use bson::oid::ObjectId;
use bson::{doc, Bson};
use log::{debug, error, info};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::sync::{Client, Collection, Database};
use mongodb::IndexModel;
use std::time::{Duration, Instant};

const DUPLICATE_KEY_CODE: i32 = 11000;
const NAMESPACE_NOT_FOUND_CODE: i32 = 26;
const TIMEOUT_OPTIONS: [&str; 2] = ["connectTimeoutMS", "serverSelectionTimeoutMS"];

/// Document store over a MongoDB client bound to one database.
pub struct MongoDocumentStore {
    client: Client,
    database: Database,
}

impl MongoDocumentStore {
    /// Connects to the deployment named by `config.uri` and pings it.
    ///
    /// # Side effects
    /// - Emits `store_connect` logging events with duration and status.
    ///
    /// # Errors
    /// - [`StoreError::Db`] for invalid names.
    /// - [`StoreError::Mongo`] for a malformed URI or when no server answers
    ///   within the connect timeout.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let started_at = Instant::now();
        let target = redact_uri(&config.uri);
        info!(
            "event=store_connect module=store status=start backend=mongodb uri={target} database={}",
            config.database
        );

        match Self::connect(config) {
            Ok(store) => {
                info!(
                    "event=store_connect module=store status=ok backend=mongodb uri={target} database={} duration_ms={}",
                    config.database,
                    started_at.elapsed().as_millis()
                );
                Ok(store)
            }
            Err(err) => {
                error!(
                    "event=store_connect module=store status=error backend=mongodb uri={target} database={} duration_ms={} error={err}",
                    config.database,
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    fn connect(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let client = Client::with_uri_str(with_timeouts(&config.uri, config.connect_timeout))?;
        let store = Self {
            database: client.database(&config.database),
            client,
        };
        store.ping()?;
        Ok(store)
    }

    /// Name of the connected database.
    pub fn database(&self) -> &str {
        self.database.name()
    }

    /// Releases the client and its connection pool.
    pub fn close(self) -> StoreResult<()> {
        let database = self.database.name().to_string();
        drop(self.database);
        drop(self.client);
        info!("event=store_close module=store status=ok backend=mongodb database={database}");
        Ok(())
    }

    fn collection(&self, name: &str) -> StoreResult<Collection<Document>> {
        validate_collection(name)?;
        Ok(self.database.collection::<Document>(name))
    }
}

impl DocumentStore for MongoDocumentStore {
    fn ping(&self) -> StoreResult<()> {
        self.database.run_command(doc! {"ping": 1}, None)?;
        Ok(())
    }

    fn insert_one(&self, collection: &str, mut document: Document) -> StoreResult<ObjectId> {
        let target = self.collection(collection)?;
        let id = assign_id(&mut document)?;

        target
            .insert_one(document, None)
            .map_err(|err| map_write_error(collection, err))?;

        debug!("event=doc_insert module=store status=ok collection={collection} id={id}");
        Ok(id)
    }

    fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let target = self.collection(collection)?;

        let mut documents = Vec::new();
        for document in target.find(None, None)? {
            documents.push(document?);
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
        let target = self.collection(collection)?;
        update.check()?;

        let result = target
            .update_one(doc! {ID_FIELD: id}, update.to_modifiers(), None)
            .map_err(|err| map_write_error(collection, err))?;

        debug!(
            "event=doc_update module=store status=ok collection={collection} id={id} matched={}",
            result.matched_count
        );
        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<IndexOutcome> {
        let target = self.collection(collection)?;
        validate_index(index)?;

        let existing = self.list_indexes(collection)?;
        if let Some(name) = resolve_existing_index(index, &existing)? {
            return Ok(IndexOutcome::AlreadyExists(name));
        }

        target
            .create_index(index_model(index), None)
            .map_err(|err| map_write_error(collection, err))?;
        Ok(IndexOutcome::Created(index.name.clone()))
    }

    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        let target = self.collection(collection)?;

        let cursor = match target.list_indexes(None) {
            Ok(cursor) => cursor,
            Err(err) if is_namespace_missing(&err) => return Ok(vec![IndexSpec::primary_key()]),
            Err(err) => return Err(err.into()),
        };

        let mut indexes = Vec::new();
        for model in cursor {
            let model = model?;
            match index_spec_from_model(&model) {
                Some(spec) if spec.name == ID_INDEX_NAME => indexes.insert(0, spec),
                Some(spec) => indexes.push(spec),
                None => debug!(
                    "event=index_list module=store status=skip collection={collection} keys={}",
                    model.keys
                ),
            }
        }
        Ok(indexes)
    }
}

/// Driver index model for a single-field spec, e.g. `{status: 1}`.
fn index_model(index: &IndexSpec) -> IndexModel {
    let mut keys = Document::new();
    keys.insert(index.field.clone(), index.direction.as_i64() as i32);

    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(index.name.clone())
                .unique(index.unique)
                .build(),
        )
        .build()
}

/// Reads a single-field ascending/descending index back into a spec.
///
/// Compound and special (text, hashed, geo) indexes yield `None`.
fn index_spec_from_model(model: &IndexModel) -> Option<IndexSpec> {
    let mut keys = model.keys.iter();
    let (field, value) = keys.next()?;
    if keys.next().is_some() {
        return None;
    }
    let direction = match value {
        Bson::Int32(value) => SortDirection::from_i64(i64::from(*value)),
        Bson::Int64(value) => SortDirection::from_i64(*value),
        Bson::Double(value) => SortDirection::from_i64(*value as i64),
        _ => None,
    }?;

    let options = model.options.as_ref();
    let name = options
        .and_then(|options| options.name.clone())
        .unwrap_or_else(|| format!("{field}_{}", direction.as_i64()));
    if name == ID_INDEX_NAME {
        return Some(IndexSpec::primary_key());
    }

    Some(IndexSpec {
        name,
        field: field.clone(),
        direction,
        unique: options.and_then(|options| options.unique).unwrap_or(false),
    })
}

/// Adds connect and server-selection timeouts unless the URI sets them.
fn with_timeouts(uri: &str, timeout: Duration) -> String {
    let lowered = uri.to_ascii_lowercase();
    let millis = timeout.as_millis();
    let missing: Vec<String> = TIMEOUT_OPTIONS
        .iter()
        .filter(|option| !lowered.contains(&option.to_ascii_lowercase()))
        .map(|option| format!("{option}={millis}"))
        .collect();
    if missing.is_empty() {
        return uri.to_string();
    }

    let mut out = uri.to_string();
    if uri.contains('?') {
        if !uri.ends_with('?') && !uri.ends_with('&') {
            out.push('&');
        }
    } else {
        let hosts = uri.split_once("://").map_or(uri, |(_, rest)| rest);
        if !hosts.contains('/') {
            out.push('/');
        }
        out.push('?');
    }
    out.push_str(&missing.join("&"));
    out
}

fn is_namespace_missing(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Command(command_error) if command_error.code == NAMESPACE_NOT_FOUND_CODE
    )
}

fn map_write_error(collection: &str, err: mongodb::error::Error) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE =>
        {
            StoreError::DuplicateKey {
                collection: collection.to_string(),
                detail: write_error.message.clone(),
            }
        }
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::{index_model, index_spec_from_model, with_timeouts};
    use crate::store::IndexSpec;
    use bson::doc;
    use mongodb::IndexModel;
    use std::time::Duration;

    #[test]
    fn status_index_model_matches_driver_shape() {
        let model = index_model(&IndexSpec::ascending("status"));

        assert_eq!(model.keys, doc! {"status": 1});
        let options = model.options.as_ref().unwrap();
        assert_eq!(options.name.as_deref(), Some("status_1"));
        assert_eq!(options.unique, Some(false));
    }

    #[test]
    fn index_models_read_back_as_specs() {
        let spec = IndexSpec::descending("created_at").unique(true);
        assert_eq!(index_spec_from_model(&index_model(&spec)), Some(spec));

        let primary = IndexModel::builder().keys(doc! {"_id": 1}).build();
        assert_eq!(
            index_spec_from_model(&primary),
            Some(IndexSpec::ascending("_id"))
        );

        let compound = IndexModel::builder()
            .keys(doc! {"status": 1, "created_at": -1})
            .build();
        assert_eq!(index_spec_from_model(&compound), None);

        let text = IndexModel::builder().keys(doc! {"todo": "text"}).build();
        assert_eq!(index_spec_from_model(&text), None);
    }

    #[test]
    fn timeouts_are_appended_to_bare_uri() {
        assert_eq!(
            with_timeouts("mongodb://localhost:27017", Duration::from_secs(10)),
            "mongodb://localhost:27017/?connectTimeoutMS=10000&serverSelectionTimeoutMS=10000"
        );
        assert_eq!(
            with_timeouts("mongodb://db.local/app?tls=true", Duration::from_secs(5)),
            "mongodb://db.local/app?tls=true&connectTimeoutMS=5000&serverSelectionTimeoutMS=5000"
        );
    }

    #[test]
    fn explicit_timeouts_in_uri_win() {
        let uri = "mongodb://localhost/?serverSelectionTimeoutMS=100&connectTimeoutMS=200";
        assert_eq!(with_timeouts(uri, Duration::from_secs(5)), uri);

        assert_eq!(
            with_timeouts("mongodb://localhost/?connecttimeoutms=1", Duration::from_secs(2)),
            "mongodb://localhost/?connecttimeoutms=1&serverSelectionTimeoutMS=2000"
        );
    }
}
