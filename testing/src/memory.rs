//! In-memory document store for fast, deterministic testing.
//!
//! [`InMemoryDocumentStore`] behaves like the managed database as far as the
//! data layer can observe it:
//! - batches are atomic (validated against a scratch copy, then swapped in)
//! - server timestamps resolve to one commit time per batch
//! - live queries redeliver the full ordered result set after every commit
//!
//! Failure injection lets tests exercise the error paths without a network.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use crate::mocks::stepping_clock;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use ticketdesk_core::document::DocumentId;
use ticketdesk_core::environment::Clock;
use ticketdesk_core::record::timestamp_value;
use ticketdesk_core::remote::{
    Direction, DocumentStore, FieldValue, Fields, OrderBy, RawDocument, RemoteError, Result,
    SnapshotStream, StoreFuture, Write, WriteBatch,
};
use tokio::sync::watch;
use uuid::Uuid;

type Documents = BTreeMap<DocumentId, Map<String, Value>>;

struct CollectionState {
    documents: Documents,
    revision: watch::Sender<u64>,
}

impl CollectionState {
    fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            documents: Documents::new(),
            revision,
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, CollectionState>,
    offline: bool,
    fail_next: Option<RemoteError>,
    commits: usize,
}

impl StoreState {
    fn collection(&mut self, name: &str) -> &mut CollectionState {
        self.collections
            .entry(name.to_string())
            .or_insert_with(CollectionState::new)
    }

    fn take_failure(&mut self) -> Result<()> {
        if self.offline {
            return Err(RemoteError::Unavailable("store is offline".to_string()));
        }
        match self.fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// In-memory document store.
///
/// # Example
///
/// ```
/// use ticketdesk_testing::InMemoryDocumentStore;
/// use ticketdesk_core::remote::{DocumentStore, Fields, FieldValue};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::new();
///
/// let mut fields = Fields::new();
/// fields.insert("name".to_string(), FieldValue::Value("Ann".into()));
/// let id = store.create("customers", fields).await?;
///
/// assert!(store.document("customers", &id).is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDocumentStore {
    /// Create an empty store whose commit times advance one second per commit
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(stepping_clock()))
    }

    /// Create an empty store that stamps commits with `clock`
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock,
        }
    }

    /// Reject every operation with [`RemoteError::Unavailable`] while set
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Reject the next write (or listen) with `error`
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().unwrap().fail_next = Some(error);
    }

    /// Store a document verbatim, bypassing encoding and server timestamps.
    ///
    /// Useful for seeding malformed documents. Live queries are notified.
    pub fn insert_raw(&self, collection: &str, id: DocumentId, fields: Map<String, Value>) {
        let mut state = self.state.lock().unwrap();
        let collection = state.collection(collection);
        collection.documents.insert(id, fields);
        collection.bump();
    }

    /// Current fields of one document
    #[must_use]
    pub fn document(&self, collection: &str, id: &DocumentId) -> Option<Map<String, Value>> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(collection)
            .and_then(|c| c.documents.get(id).cloned())
    }

    /// Number of documents in a collection
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }

    /// Whether a collection holds no documents
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Number of successfully applied commits (including single creates)
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    /// Ordered snapshot, as a live query would deliver it
    #[must_use]
    pub fn snapshot(&self, collection: &str, order_by: &OrderBy) -> Vec<RawDocument> {
        snapshot_of(&self.state, collection, order_by)
    }

    fn apply(&self, collection: &str, writes: Vec<Write>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        if collection.is_empty() || collection.contains('/') {
            return Err(RemoteError::InvalidArgument(format!(
                "invalid collection path: {collection:?}"
            )));
        }
        if writes.is_empty() {
            return Ok(());
        }

        let commit_time = timestamp_value(self.clock.now());
        let target = state.collection(collection);
        let mut scratch = target.documents.clone();
        for write in writes {
            match write {
                Write::Set { id, fields } => {
                    let mut document = Map::new();
                    merge(&mut document, fields, &commit_time);
                    scratch.insert(id, document);
                },
                Write::Update { id, fields } => {
                    let Some(document) = scratch.get_mut(&id) else {
                        return Err(RemoteError::NotFound(id));
                    };
                    merge(document, fields, &commit_time);
                },
                Write::Delete { id } => {
                    scratch.remove(&id);
                },
            }
        }

        target.documents = scratch;
        target.bump();
        state.commits += 1;
        Ok(())
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("InMemoryDocumentStore")
            .field("collections", &state.collections.len())
            .field("offline", &state.offline)
            .field("commits", &state.commits)
            .finish_non_exhaustive()
    }
}

fn merge(document: &mut Map<String, Value>, fields: Fields, commit_time: &Value) {
    for (name, value) in fields {
        match value {
            FieldValue::Value(value) => {
                document.insert(name, value);
            },
            FieldValue::ServerTimestamp => {
                document.insert(name, commit_time.clone());
            },
            FieldValue::Delete => {
                document.remove(&name);
            },
        }
    }
}

fn snapshot_of(state: &Mutex<StoreState>, collection: &str, order_by: &OrderBy) -> Vec<RawDocument> {
    let mut documents: Vec<RawDocument> = {
        let state = state.lock().unwrap();
        state
            .collections
            .get(collection)
            .map(|c| {
                c.documents
                    .iter()
                    .map(|(id, fields)| RawDocument::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    };

    documents.sort_by(|a, b| {
        let ascending = compare_ascending(a.fields.get(&order_by.field), b.fields.get(&order_by.field));
        let ordered = match order_by.direction {
            Direction::Ascending => ascending,
            Direction::Descending => ascending.reverse(),
        };
        ordered.then_with(|| a.id.cmp(&b.id))
    });
    documents
}

// Missing values sort after everything ascending, so they lead a descending query
fn compare_ascending(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        },
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn allocate_id(&self, _collection: &str) -> DocumentId {
        DocumentId::new(Uuid::new_v4().simple().to_string())
    }

    fn listen(&self, collection: &str, order_by: &OrderBy) -> StoreFuture<'_, SnapshotStream> {
        let collection = collection.to_string();
        let order_by = order_by.clone();
        Box::pin(async move {
            let mut revisions = {
                let mut state = self.state.lock().unwrap();
                state.take_failure()?;
                state.collection(&collection).revision.subscribe()
            };
            let state = Arc::clone(&self.state);

            let stream = async_stream::stream! {
                loop {
                    revisions.borrow_and_update();
                    let snapshot = snapshot_of(&state, &collection, &order_by);
                    yield Ok::<_, RemoteError>(snapshot);
                    if revisions.changed().await.is_err() {
                        break;
                    }
                }
            };
            Ok(Box::pin(stream) as SnapshotStream)
        })
    }

    fn create(&self, collection: &str, fields: Fields) -> StoreFuture<'_, DocumentId> {
        let collection = collection.to_string();
        Box::pin(async move {
            let id = self.allocate_id(&collection);
            self.apply(&collection, vec![Write::Set {
                id: id.clone(),
                fields,
            }])?;
            Ok(id)
        })
    }

    fn commit(&self, collection: &str, batch: WriteBatch) -> StoreFuture<'_, ()> {
        let collection = collection.to_string();
        Box::pin(async move {
            let writes = batch.len();
            self.apply(&collection, batch.into_writes())?;
            tracing::trace!(collection = %collection, writes, "In-memory batch committed");
            Ok(())
        })
    }
}
