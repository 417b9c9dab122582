//! Remote document store abstraction.
//!
//! This module provides the [`DocumentStore`] trait: the port through which the
//! data layer talks to the managed document database. The database owns
//! durability, conflict resolution and consistency; this crate only issues
//! queries and writes and consumes live snapshots.
//!
//! # Data Flow
//!
//! ```text
//!        writes                          reads
//! ┌──────────────────┐          ┌──────────────────┐
//! │  Repository      │          │  Repository list │
//! └────────┬─────────┘          └────────▲─────────┘
//!          │ commit(batch)               │ full ordered snapshot
//!          ▼                             │
//! ┌─────────────────────────────────────────────────┐
//! │              DocumentStore (remote)             │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! A write never updates the local list directly. The store applies it and the
//! live query redelivers the complete result set.
//!
//! # Implementations
//!
//! - `InMemoryDocumentStore` in `ticketdesk-testing` - For tests and demos

use crate::document::DocumentId;
use futures::Stream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur while talking to the remote document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The caller is not allowed to perform the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A record could not be encoded into document fields
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The target document does not exist
    #[error("Document not found: {0}")]
    NotFound(DocumentId),

    /// The request was malformed (empty batch, bad collection path, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The live query was closed by the store
    #[error("Live query closed: {0}")]
    Closed(String),
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Value written to a single document field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A concrete JSON value
    Value(Value),
    /// Replaced by the store's commit time
    ServerTimestamp,
    /// Removes the field from the document
    Delete,
}

impl FieldValue {
    /// Wrap any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Serialization`] if the value cannot be
    /// represented as JSON.
    pub fn of<T: serde::Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Value)
            .map_err(|e| RemoteError::Serialization(e.to_string()))
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Field map of a write. Ordered so batches are reproducible in logs and tests.
pub type Fields = BTreeMap<String, FieldValue>;

/// A document as delivered by a live query.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDocument {
    /// Document ID
    pub id: DocumentId,
    /// Stored fields (server timestamps already resolved)
    pub fields: serde_json::Map<String, Value>,
}

impl RawDocument {
    /// Creates a new `RawDocument`
    #[must_use]
    pub const fn new(id: DocumentId, fields: serde_json::Map<String, Value>) -> Self {
        Self { id, fields }
    }
}

/// Sort direction of a live query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Smallest value first
    Ascending,
    /// Largest value first; documents missing the field come first
    Descending,
}

/// Ordering clause of a live query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    /// Field to order by
    pub field: String,
    /// Sort direction
    pub direction: Direction,
}

impl OrderBy {
    /// Order by `field`, descending when `descending` is set.
    #[must_use]
    pub fn new(field: impl Into<String>, descending: bool) -> Self {
        Self {
            field: field.into(),
            direction: if descending {
                Direction::Descending
            } else {
                Direction::Ascending
            },
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Ascending => write!(f, "{} asc", self.field),
            Direction::Descending => write!(f, "{} desc", self.field),
        }
    }
}

/// One write inside a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    /// Create or fully overwrite a document
    Set {
        /// Target document
        id: DocumentId,
        /// New field set
        fields: Fields,
    },
    /// Change the named fields of an existing document
    Update {
        /// Target document (must exist)
        id: DocumentId,
        /// Fields to change; unspecified fields are untouched
        fields: Fields,
    },
    /// Delete a document (deleting a missing document succeeds)
    Delete {
        /// Target document
        id: DocumentId,
    },
}

impl Write {
    /// Document this write targets.
    #[must_use]
    pub const fn id(&self) -> &DocumentId {
        match self {
            Self::Set { id, .. } | Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }
}

/// An atomic group of writes: the store applies all of them or none.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Create an empty batch
    #[must_use]
    pub const fn new() -> Self {
        Self { writes: Vec::new() }
    }

    /// Queue a full overwrite
    #[must_use]
    pub fn set(mut self, id: DocumentId, fields: Fields) -> Self {
        self.writes.push(Write::Set { id, fields });
        self
    }

    /// Queue a partial update
    #[must_use]
    pub fn update(mut self, id: DocumentId, fields: Fields) -> Self {
        self.writes.push(Write::Update { id, fields });
        self
    }

    /// Queue a deletion
    #[must_use]
    pub fn delete(mut self, id: DocumentId) -> Self {
        self.writes.push(Write::Delete { id });
        self
    }

    /// Number of queued writes
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether the batch is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Queued writes in commit order
    #[must_use]
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Consume the batch
    #[must_use]
    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Stream of full, ordered result sets from a live query.
///
/// The first item is the initial load; every later item is the complete
/// result set after a change.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Vec<RawDocument>>> + Send>>;

/// Boxed future returned by [`DocumentStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Trait for remote document store clients.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the store can
/// be shared as `Arc<dyn DocumentStore>` by the repository and its tasks.
///
/// # Retries
///
/// Implementations must not retry failed writes. Each call is one attempt and
/// failures are returned to the caller.
pub trait DocumentStore: Send + Sync {
    /// Allocate a fresh document ID without writing anything.
    ///
    /// The ID is valid immediately. If the write that uses it fails, the ID
    /// never shows up in a snapshot.
    fn allocate_id(&self, collection: &str) -> DocumentId;

    /// Open a live query over `collection`, ordered by `order_by`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the query cannot be opened.
    fn listen(&self, collection: &str, order_by: &OrderBy) -> StoreFuture<'_, SnapshotStream>;

    /// Create a single document with a store-assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the write is rejected.
    fn create(&self, collection: &str, fields: Fields) -> StoreFuture<'_, DocumentId>;

    /// Apply a batch of writes atomically.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if any write in the batch is rejected; in that
    /// case none of the writes are applied.
    fn commit(&self, collection: &str, batch: WriteBatch) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_keeps_commit_order() {
        let batch = WriteBatch::new()
            .set(DocumentId::new("a"), Fields::new())
            .update(DocumentId::new("b"), Fields::new())
            .delete(DocumentId::new("c"));

        let ids: Vec<&str> = batch.writes().iter().map(|w| w.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn order_by_direction() {
        assert_eq!(OrderBy::new("updatedAt", true).direction, Direction::Descending);
        assert_eq!(OrderBy::new("updatedAt", false).to_string(), "updatedAt asc");
    }

    #[test]
    fn field_value_of_serializes() {
        let value = FieldValue::of(&true);
        assert_eq!(value, Ok(FieldValue::Value(json!(true))));
    }
}
