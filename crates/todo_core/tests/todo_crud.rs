use bson::{doc, Bson};
use std::cell::Cell;
use todo_core::{
    Document, DocumentStore, DocumentTodoRepository, IndexOutcome, IndexSpec, ObjectId,
    RepoError, SqliteDocumentStore, StoreConfig, StoreResult, TodoRepository, TodoService,
    TodoValidationError, Update, UpdateResult,
};

fn open_store() -> SqliteDocumentStore {
    SqliteDocumentStore::open(&StoreConfig::in_memory()).unwrap()
}

#[test]
fn create_then_list_returns_one_matching_record() {
    let store = open_store();
    let repo = DocumentTodoRepository::new(&store);

    let id = repo.create_todo("Buy milk", "Pending").unwrap();

    let todos = repo.list_todos().unwrap();
    assert_eq!(todos.len(), 1);
    let todo = &todos[0];
    assert_eq!(todo.id, id);
    assert_eq!(todo.text, "Buy milk");
    assert_eq!(todo.status, "Pending");
    assert_eq!(todo.created_at, todo.updated_at);
    assert_eq!(todo.deleted_at, None);
}

#[test]
fn update_status_sets_status_and_refreshes_updated_at() {
    let store = open_store();
    let repo = DocumentTodoRepository::new(&store);
    let id = repo.create_todo("Write report", "Pending").unwrap();
    let before = repo.list_todos().unwrap().remove(0);

    let result = repo
        .update_todo_status(&id.to_hex(), "Completed")
        .unwrap();
    assert_eq!(result.matched_count, 1);

    let after = repo.list_todos().unwrap().remove(0);
    assert_eq!(after.status, "Completed");
    assert!(after.updated_at >= before.updated_at);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.text, before.text);
    assert_eq!(after.deleted_at, None);
}

#[test]
fn soft_delete_keeps_record_listed_and_leaves_other_fields() {
    let store = open_store();
    let repo = DocumentTodoRepository::new(&store);
    let id = repo.create_todo("Call plumber", "Pending").unwrap();
    let before = repo.list_todos().unwrap().remove(0);

    let result = repo.soft_delete_todo(&id.to_hex()).unwrap();
    assert_eq!(
        result,
        UpdateResult {
            matched_count: 1,
            modified_count: 1
        }
    );

    let todos = repo.list_todos().unwrap();
    assert_eq!(todos.len(), 1);
    let after = &todos[0];
    assert!(after.is_deleted());
    assert!(after.deleted_at.unwrap() > 0);
    assert_eq!(after.id, before.id);
    assert_eq!(after.text, before.text);
    assert_eq!(after.status, before.status);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.updated_at, before.updated_at);
}

#[test]
fn full_lifecycle_scenario() {
    let store = open_store();
    let service = TodoService::new(DocumentTodoRepository::new(&store));

    let id = service.create_todo("Buy milk", "Pending").unwrap();
    service.update_status(&id.to_hex(), "Completed").unwrap();
    service.soft_delete(&id.to_hex()).unwrap();

    let todos = service.list_todos().unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].text, "Buy milk");
    assert_eq!(todos[0].status, "Completed");
    assert!(todos[0].deleted_at.is_some());
}

#[test]
fn unknown_but_well_formed_id_is_a_zero_match_no_op() {
    let store = open_store();
    let repo = DocumentTodoRepository::new(&store);
    repo.create_todo("Existing", "Pending").unwrap();

    let missing = ObjectId::new().to_hex();
    let update = repo.update_todo_status(&missing, "Completed").unwrap();
    let delete = repo.soft_delete_todo(&missing).unwrap();

    assert_eq!(update, UpdateResult::default());
    assert_eq!(delete, UpdateResult::default());
    let todos = repo.list_todos().unwrap();
    assert_eq!(todos[0].status, "Pending");
    assert!(!todos[0].is_deleted());
}

#[test]
fn malformed_id_fails_before_any_store_write() {
    let store = CountingStore::new(open_store());
    let repo = DocumentTodoRepository::new(&store);

    for bad_id in ["", "not-an-id", "65a1f0c2e4b0d1a2b3c4d5", "65a1f0c2e4b0d1a2b3c4d5zz"] {
        let update_err = repo.update_todo_status(bad_id, "Completed").unwrap_err();
        assert!(matches!(update_err, RepoError::InvalidId(_)), "{bad_id}");

        let delete_err = repo.soft_delete_todo(bad_id).unwrap_err();
        assert!(matches!(delete_err, RepoError::InvalidId(_)), "{bad_id}");
    }

    assert_eq!(store.writes.get(), 0);
}

#[test]
fn create_rejects_blank_text_without_writing() {
    let store = CountingStore::new(open_store());
    let repo = DocumentTodoRepository::new(&store);

    let err = repo.create_todo("  ", "Pending").unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(TodoValidationError::EmptyText)
    ));
    assert_eq!(store.writes.get(), 0);
}

#[test]
fn list_preserves_insertion_order_and_includes_deleted() {
    let store = open_store();
    let repo = DocumentTodoRepository::new(&store);
    let first = repo.create_todo("first", "Pending").unwrap();
    let second = repo.create_todo("second", "Pending").unwrap();
    let third = repo.create_todo("third", "Completed").unwrap();
    repo.soft_delete_todo(&second.to_hex()).unwrap();

    let ids: Vec<_> = repo.list_todos().unwrap().into_iter().map(|todo| todo.id).collect();
    assert_eq!(ids, vec![first, second, third]);
}

#[test]
fn ids_accept_uppercase_hex() {
    let store = open_store();
    let repo = DocumentTodoRepository::new(&store);
    let id = repo.create_todo("shout", "Pending").unwrap();

    let result = repo
        .update_todo_status(&id.to_hex().to_uppercase(), "Completed")
        .unwrap();
    assert_eq!(result.matched_count, 1);
}

#[test]
fn repositories_on_different_collections_are_isolated() {
    let store = open_store();
    let todos = DocumentTodoRepository::new(&store);
    let archive = DocumentTodoRepository::with_collection(&store, "todos_archive");

    todos.create_todo("live", "Pending").unwrap();
    archive.create_todo("old", "Completed").unwrap();

    assert_eq!(todos.list_todos().unwrap().len(), 1);
    assert_eq!(archive.list_todos().unwrap()[0].text, "old");
    assert_eq!(archive.collection(), "todos_archive");
}

#[test]
fn list_rejects_documents_that_do_not_decode_as_todos() {
    let store = open_store();
    let repo = DocumentTodoRepository::new(&store);
    store.insert_one("todos", doc! {"todo": 42}).unwrap();

    let err = repo.list_todos().unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn list_returns_records_written_with_blank_text_by_other_writers() {
    let store = open_store();
    let repo = DocumentTodoRepository::new(&store);
    let valid = repo.create_todo("Buy milk", "Pending").unwrap();
    let blank = store
        .insert_one(
            "todos",
            doc! {
                "todo": "",
                "status": "Pending",
                "created_at": 1_i64,
                "updated_at": 1_i64,
                "deleted_at": Bson::Null
            },
        )
        .unwrap();

    let todos = repo.list_todos().unwrap();
    let ids: Vec<_> = todos.iter().map(|todo| todo.id).collect();
    assert_eq!(ids, vec![valid, blank]);
    assert_eq!(todos[1].text, "");
}

#[test]
fn status_update_never_moves_updated_at_below_created_at() {
    let store = open_store();
    let repo = DocumentTodoRepository::new(&store);
    let future = i64::MAX / 2;
    let id = store
        .insert_one(
            "todos",
            doc! {
                "todo": "From a fast clock",
                "status": "Pending",
                "created_at": future,
                "updated_at": future,
                "deleted_at": Bson::Null
            },
        )
        .unwrap();

    let result = repo.update_todo_status(&id.to_hex(), "Completed").unwrap();
    assert_eq!(result.matched_count, 1);

    let todo = repo.list_todos().unwrap().remove(0);
    assert_eq!(todo.status, "Completed");
    assert_eq!(todo.created_at, future);
    assert!(todo.updated_at >= todo.created_at);
    todo.validate().unwrap();
}

struct CountingStore<S> {
    inner: S,
    writes: Cell<u32>,
}

impl<S> CountingStore<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            writes: Cell::new(0),
        }
    }
}

impl<S: DocumentStore> DocumentStore for CountingStore<S> {
    fn ping(&self) -> StoreResult<()> {
        self.inner.ping()
    }

    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<ObjectId> {
        self.writes.set(self.writes.get() + 1);
        self.inner.insert_one(collection, document)
    }

    fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.inner.find_all(collection)
    }

    fn update_one(
        &self,
        collection: &str,
        id: ObjectId,
        update: Update,
    ) -> StoreResult<UpdateResult> {
        self.writes.set(self.writes.get() + 1);
        self.inner.update_one(collection, id, update)
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<IndexOutcome> {
        self.writes.set(self.writes.get() + 1);
        self.inner.create_index(collection, index)
    }

    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        self.inner.list_indexes(collection)
    }
}
