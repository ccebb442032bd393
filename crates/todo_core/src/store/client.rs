//! Backend selection by connection string.

use super::{
    Document, DocumentStore, IndexOutcome, IndexSpec, SqliteDocumentStore, StoreResult, Update,
    UpdateResult,
};
use crate::config::{StoreConfig, StoreLocation};
use bson::oid::ObjectId;

#[cfg(feature = "mongodb")]
use super::MongoDocumentStore;
#[cfg(not(feature = "mongodb"))]
use crate::db::DbError;

/// A connected document store of whichever backend `StoreConfig::uri` names.
pub enum StoreClient {
    Sqlite(SqliteDocumentStore),
    #[cfg(feature = "mongodb")]
    MongoDb(MongoDocumentStore),
}

impl StoreClient {
    /// Connects to the store named by `config.uri` and pings it.
    ///
    /// # Errors
    /// - [`super::StoreError::Db`] for an unsupported scheme or invalid names.
    /// - Any connect or ping error of the selected backend.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        match config.location()? {
            StoreLocation::SqliteDirectory(_) | StoreLocation::SqliteMemory => {
                SqliteDocumentStore::open(config).map(Self::Sqlite)
            }
            #[cfg(feature = "mongodb")]
            StoreLocation::MongoDb => MongoDocumentStore::open(config).map(Self::MongoDb),
            #[cfg(not(feature = "mongodb"))]
            StoreLocation::MongoDb => Err(DbError::InvalidConfig(
                "mongodb connection strings need the `mongodb` feature".to_string(),
            )
            .into()),
        }
    }

    /// Short backend label used in logs and output.
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            #[cfg(feature = "mongodb")]
            Self::MongoDb(_) => "mongodb",
        }
    }

    /// Releases the connection, reporting errors raised while doing so.
    pub fn close(self) -> StoreResult<()> {
        match self {
            Self::Sqlite(store) => store.close(),
            #[cfg(feature = "mongodb")]
            Self::MongoDb(store) => store.close(),
        }
    }

    fn inner(&self) -> &dyn DocumentStore {
        match self {
            Self::Sqlite(store) => store,
            #[cfg(feature = "mongodb")]
            Self::MongoDb(store) => store,
        }
    }
}

impl DocumentStore for StoreClient {
    fn ping(&self) -> StoreResult<()> {
        self.inner().ping()
    }

    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<ObjectId> {
        self.inner().insert_one(collection, document)
    }

    fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.inner().find_all(collection)
    }

    fn update_one(
        &self,
        collection: &str,
        id: ObjectId,
        update: Update,
    ) -> StoreResult<UpdateResult> {
        self.inner().update_one(collection, id, update)
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<IndexOutcome> {
        self.inner().create_index(collection, index)
    }

    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        self.inner().list_indexes(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::StoreClient;
    use crate::config::StoreConfig;
    use crate::store::{DocumentStore, StoreError};

    #[test]
    fn sqlite_uris_open_the_embedded_backend() {
        let client = StoreClient::open(&StoreConfig::in_memory()).unwrap();
        assert_eq!(client.backend(), "sqlite");
        client.ping().unwrap();
        client.close().unwrap();
    }

    #[test]
    fn unknown_scheme_fails_before_connecting() {
        let err = StoreClient::open(&StoreConfig::with_uri("redis://localhost"))
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Db(_)), "{err}");
    }
}
