//! Typed access to one remote collection.
//!
//! [`Collection`] turns the raw [`DocumentStore`] port into record-level
//! operations. Every method is one attempt: failures are returned to the
//! caller and never retried here.

use futures::Stream;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use ticketdesk_core::document::DocumentId;
use ticketdesk_core::record::Record;
use ticketdesk_core::remote::{
    DocumentStore, Fields, OrderBy, RawDocument, RemoteError, Result, SnapshotStream, WriteBatch,
};
use tracing::{debug, warn};

/// A named collection of `T` records in a document store.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    path: Arc<str>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            path: Arc::clone(&self.path),
            _record: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<T: Record> Collection<T> {
    /// Bind `path` in `store`
    pub fn new(store: Arc<dyn DocumentStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: Arc::from(path.into()),
            _record: PhantomData,
        }
    }

    /// Collection path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Open a live query ordered by `order_by`.
    ///
    /// Every change to the result set redelivers the full ordered snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the subscription cannot be opened.
    pub async fn query(&self, order_by: &str, descending: bool) -> Result<LiveQuery<T>> {
        let order_by = OrderBy::new(order_by, descending);
        let inner = self.store.listen(&self.path, &order_by).await?;
        debug!(collection = %self.path, order_by = %order_by, "Live query opened");
        Ok(LiveQuery {
            inner,
            collection: Arc::clone(&self.path),
            _record: PhantomData,
        })
    }

    /// Create one document; the store assigns its ID.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the record cannot be encoded or the write fails.
    pub async fn add_one(&self, record: &T) -> Result<DocumentId> {
        let fields = record.to_fields()?;
        self.store.create(&self.path, fields).await
    }

    /// Reserve `count` fresh document IDs without writing anything.
    #[must_use]
    pub fn allocate_ids(&self, count: usize) -> Vec<DocumentId> {
        (0..count).map(|_| self.store.allocate_id(&self.path)).collect()
    }

    /// Create `count` copies of `template` in one atomic batch.
    ///
    /// Returns the new IDs in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the batch fails; none of the documents exist then.
    pub async fn add_batch(&self, template: &T, count: usize) -> Result<Vec<DocumentId>> {
        let ids = self.allocate_ids(count);
        self.commit_batch_with_ids(template, &ids).await?;
        Ok(ids)
    }

    /// Write one copy of `template` under each of `ids`, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the template cannot be encoded or the batch fails.
    pub async fn commit_batch_with_ids(&self, template: &T, ids: &[DocumentId]) -> Result<()> {
        let fields = template.to_fields()?;
        let batch = ids
            .iter()
            .fold(WriteBatch::new(), |batch, id| batch.set(id.clone(), fields.clone()));
        self.store.commit(&self.path, batch).await
    }

    /// Partial update of the named fields only.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] if the document does not exist, or
    /// any transport error.
    pub async fn update_fields(&self, id: &DocumentId, fields: Fields) -> Result<()> {
        let batch = WriteBatch::new().update(id.clone(), fields);
        self.store.commit(&self.path, batch).await
    }

    /// Overwrite the whole document identified by `record.id()`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidArgument`] if the record has no ID yet,
    /// or any encoding or transport error.
    pub async fn set_whole(&self, record: &T) -> Result<()> {
        let Some(id) = record.id() else {
            return Err(RemoteError::InvalidArgument(
                "record has no document id".to_string(),
            ));
        };
        let batch = WriteBatch::new().set(id.clone(), record.to_fields()?);
        self.store.commit(&self.path, batch).await
    }

    /// Delete one document.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the delete fails.
    pub async fn delete_one(&self, id: &DocumentId) -> Result<()> {
        self.delete_batch(std::slice::from_ref(id)).await
    }

    /// Delete several documents in one atomic batch.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the batch fails; nothing is deleted then.
    pub async fn delete_batch(&self, ids: &[DocumentId]) -> Result<()> {
        let batch = ids
            .iter()
            .fold(WriteBatch::new(), |batch, id| batch.delete(id.clone()));
        self.store.commit(&self.path, batch).await
    }
}

/// Live query over a typed collection.
///
/// Yields the full decoded snapshot on every change. Documents that fail to
/// decode are logged and left out; the query keeps running.
pub struct LiveQuery<T> {
    inner: SnapshotStream,
    collection: Arc<str>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Stream for LiveQuery<T> {
    type Item = Result<Vec<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let collection = &this.collection;
        this.inner.as_mut().poll_next(cx).map(|delivery| {
            delivery.map(|snapshot| snapshot.map(|documents| decode_snapshot(collection, documents)))
        })
    }
}

fn decode_snapshot<T: Record>(collection: &str, documents: Vec<RawDocument>) -> Vec<T> {
    documents
        .into_iter()
        .filter_map(|document| {
            let id = document.id.clone();
            match T::from_document(document) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(
                        collection = %collection,
                        document = %id,
                        error = %error,
                        "Dropping document that failed to decode"
                    );
                    None
                },
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use ticketdesk_core::customer::{Customer, UPDATED_AT};
    use ticketdesk_testing::{InMemoryDocumentStore, fixtures};

    const PATH: &str = "customers";

    fn collection() -> (InMemoryDocumentStore, Collection<Customer>) {
        let store = InMemoryDocumentStore::new();
        let collection = Collection::new(Arc::new(store.clone()), PATH);
        (store, collection)
    }

    #[tokio::test]
    async fn add_batch_returns_unique_ids_in_order() {
        let (store, collection) = collection();

        let ids = collection.add_batch(&fixtures::customer("Ann"), 3).await.unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(store.len(PATH), 3);
        assert_eq!(store.commit_count(), 1);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn failed_batch_leaves_nothing_behind() {
        let (store, collection) = collection();
        store.set_offline(true);

        let result = collection.add_batch(&fixtures::customer("Ann"), 4).await;

        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
        assert!(store.is_empty(PATH));
    }

    #[tokio::test]
    async fn set_whole_requires_an_id() {
        let (_, collection) = collection();
        let result = collection.set_whole(&fixtures::customer("Ann")).await;
        assert!(matches!(result, Err(RemoteError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn update_of_missing_document_fails() {
        let (_, collection) = collection();
        let result = collection
            .update_fields(&DocumentId::new("ghost"), Fields::new())
            .await;
        assert_eq!(result, Err(RemoteError::NotFound(DocumentId::new("ghost"))));
    }

    #[tokio::test]
    async fn live_query_drops_undecodable_documents() {
        let (store, collection) = collection();
        collection.add_one(&fixtures::customer("Ann")).await.unwrap();
        let mut broken = serde_json::Map::new();
        broken.insert("name".to_string(), json!(42));
        broken.insert(UPDATED_AT.to_string(), json!("2030-01-01T00:00:00Z"));
        store.insert_raw(PATH, DocumentId::new("broken"), broken);

        let mut query = collection.query(UPDATED_AT, true).await.unwrap();
        let snapshot = query.next().await.unwrap().unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "Ann");
    }

    #[tokio::test]
    async fn delete_batch_is_atomic() {
        let (store, collection) = collection();
        let ids = collection.add_batch(&fixtures::customer("Ann"), 2).await.unwrap();

        collection.delete_batch(&ids).await.unwrap();

        assert!(store.is_empty(PATH));
        assert_eq!(store.commit_count(), 2);
    }
}
