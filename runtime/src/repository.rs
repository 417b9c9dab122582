//! The customer repository: one live, ordered mirror of the remote
//! collection plus write-through operations.
//!
//! # Reads
//!
//! [`CustomerRepository::start`] opens a single standing live query. Every
//! delivery replaces the published list wholesale (`Arc<Vec<Customer>>` in a
//! `watch` channel), so readers always see one complete snapshot and never a
//! partially applied change.
//!
//! # Writes
//!
//! Writes go straight to the store. Their effect on the list arrives later
//! through the live query, unordered relative to other writes. The plain
//! write methods are fire-and-forget: failures are logged and counted but not
//! reported. [`CustomerRepository::update`] reports through its callback and
//! [`CustomerRepository::apply`] returns the outcome directly.

use crate::collection::Collection;
use futures::StreamExt;
use std::sync::Arc;
use ticketdesk_core::customer::{Customer, CustomerPatch};
use ticketdesk_core::document::DocumentId;
use ticketdesk_core::environment::Clock;
use ticketdesk_core::record::Record;
use ticketdesk_core::remote::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

/// Snapshot of the repository list.
pub type CustomerList = Arc<Vec<Customer>>;

/// Live mirror of the customer collection.
///
/// Construct once per process and share through [`crate::context::AppContext`].
/// Dropping the repository cancels its live query.
pub struct CustomerRepository {
    collection: Collection<Customer>,
    customers: watch::Receiver<CustomerList>,
    clock: Arc<dyn Clock>,
    subscription: JoinHandle<()>,
}

impl CustomerRepository {
    /// Start mirroring `collection`, ordered by `order_by`.
    ///
    /// The list starts empty and fills on the first delivery. Must be called
    /// from within a Tokio runtime.
    pub fn start(
        collection: Collection<Customer>,
        order_by: impl Into<String>,
        descending: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (sender, customers) = watch::channel(CustomerList::default());
        let subscription = tokio::spawn(run_subscription(
            collection.clone(),
            order_by.into(),
            descending,
            sender,
        ));

        Self {
            collection,
            customers,
            clock,
            subscription,
        }
    }

    /// Current list, in query order
    #[must_use]
    pub fn customers(&self) -> CustomerList {
        Arc::clone(&self.customers.borrow())
    }

    /// Observe list replacements
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CustomerList> {
        self.customers.clone()
    }

    /// List replacements as a stream, starting with the current list
    #[must_use]
    pub fn updates(&self) -> WatchStream<CustomerList> {
        WatchStream::new(self.customers.clone())
    }

    /// Collection this repository mirrors
    #[must_use]
    pub const fn collection(&self) -> &Collection<Customer> {
        &self.collection
    }

    /// Look a ticket up by its QR payload (the document ID).
    #[must_use]
    pub fn find(&self, id: &str) -> Option<Customer> {
        self.customers
            .borrow()
            .iter()
            .find(|customer| customer.id.as_ref().is_some_and(|known| known.as_str() == id))
            .cloned()
    }

    /// Create one record. The ID appears with the next delivery.
    pub fn add(&self, customer: Customer) {
        let collection = self.collection.clone();
        tokio::spawn(async move {
            match collection.add_one(&customer).await {
                Ok(id) => {
                    record_write("add", Ok(()));
                    debug!(document = %id, "Customer added");
                },
                Err(e) => record_write("add", Err(e)),
            }
        });
    }

    /// Create `quantity` copies of `customer` in one batch.
    ///
    /// The IDs are allocated locally and returned before the batch commits.
    /// If the batch fails they simply never show up in the list.
    pub fn add_many(&self, customer: &Customer, quantity: usize) -> Vec<DocumentId> {
        if quantity == 0 {
            return Vec::new();
        }
        let ids = self.collection.allocate_ids(quantity);
        let collection = self.collection.clone();
        let template = customer.clone();
        let batch = ids.clone();
        tokio::spawn(async move {
            let result = collection.commit_batch_with_ids(&template, &batch).await;
            if result.is_ok() {
                debug!(count = batch.len(), "Customer batch added");
            }
            record_write("add_many", result);
        });
        ids
    }

    /// Delete one record. Records without an ID are ignored.
    pub fn remove(&self, customer: &Customer) {
        match customer.id.clone() {
            Some(id) => self.spawn_delete("remove", vec![id]),
            None => warn!("Ignoring removal of a customer without id"),
        }
    }

    /// Delete several records in one batch, skipping those without an ID.
    pub fn remove_many(&self, customers: &[Customer]) {
        let ids = customers.iter().filter_map(|c| c.id.clone()).collect();
        self.spawn_delete("remove_many", ids);
    }

    /// Delete the given IDs in one batch.
    pub fn remove_ids(&self, ids: Vec<DocumentId>) {
        self.spawn_delete("remove_ids", ids);
    }

    /// Overwrite a whole record, refreshing `updatedAt`.
    ///
    /// Records without an ID are ignored.
    pub fn set(&self, customer: &Customer) {
        if customer.id.is_none() {
            warn!("Ignoring overwrite of a customer without id");
            return;
        }
        let mut customer = customer.clone();
        customer.updated_at = None;
        let collection = self.collection.clone();
        tokio::spawn(async move {
            record_write("set", collection.set_whole(&customer).await);
        });
    }

    /// Apply `patch` to document `id`, then call `callback` exactly once with
    /// the outcome.
    ///
    /// Flags the mirrored record already carries are left alone, so their
    /// timestamps only move on a real transition.
    pub fn update<F>(&self, id: DocumentId, patch: CustomerPatch, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let collection = self.collection.clone();
        let fields = self.narrow(&id, patch).into_fields(self.clock.now());
        tokio::spawn(async move {
            let result = collection.update_fields(&id, fields).await;
            let succeeded = result.is_ok();
            record_write("update", result);
            callback(succeeded);
        });
    }

    /// Apply `patch` to document `id` and wait for the outcome.
    ///
    /// Flags are narrowed against the mirrored record as in
    /// [`CustomerRepository::update`].
    ///
    /// # Errors
    ///
    /// Returns [`ticketdesk_core::RemoteError`] if the update fails, e.g.
    /// `NotFound` when the document no longer exists.
    pub async fn apply(&self, id: &DocumentId, patch: CustomerPatch) -> Result<()> {
        let fields = self.narrow(id, patch).into_fields(self.clock.now());
        let result = self.collection.update_fields(id, fields).await;
        record_write("apply", result.clone());
        result
    }

    fn narrow(&self, id: &DocumentId, patch: CustomerPatch) -> CustomerPatch {
        match self.find(id.as_str()) {
            Some(current) => patch.relative_to(&current),
            None => patch,
        }
    }

    fn spawn_delete(&self, operation: &'static str, ids: Vec<DocumentId>) {
        if ids.is_empty() {
            return;
        }
        let collection = self.collection.clone();
        tokio::spawn(async move {
            record_write(operation, collection.delete_batch(&ids).await);
        });
    }
}

impl Drop for CustomerRepository {
    fn drop(&mut self) {
        self.subscription.abort();
    }
}

impl std::fmt::Debug for CustomerRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerRepository")
            .field("collection", &self.collection)
            .field("customers", &self.customers.borrow().len())
            .finish_non_exhaustive()
    }
}

async fn run_subscription(
    collection: Collection<Customer>,
    order_by: String,
    descending: bool,
    sender: watch::Sender<CustomerList>,
) {
    let mut query = match collection.query(&order_by, descending).await {
        Ok(query) => query,
        Err(e) => {
            error!(collection = %collection.path(), error = %e, "Failed to open live query");
            return;
        },
    };

    while let Some(delivery) = query.next().await {
        match delivery {
            Ok(customers) => {
                debug!(collection = %collection.path(), count = customers.len(), "Live query delivery");
                metrics::counter!("repository.deliveries.total").increment(1);
                sender.send_replace(Arc::new(customers));
            },
            Err(e) => {
                warn!(collection = %collection.path(), error = %e, "Live query delivery failed");
            },
        }
    }

    info!(collection = %collection.path(), "Live query ended");
}

fn record_write(operation: &'static str, result: Result<()>) {
    metrics::counter!("repository.writes.total", "operation" => operation).increment(1);
    if let Err(e) = result {
        metrics::counter!("repository.writes.failed", "operation" => operation).increment(1);
        error!(operation, error = %e, "Repository write failed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ticketdesk_core::customer::UPDATED_AT;
    use ticketdesk_testing::{InMemoryDocumentStore, fixtures, test_clock};

    const PATH: &str = "customers";

    fn repository() -> (InMemoryDocumentStore, CustomerRepository) {
        let store = InMemoryDocumentStore::new();
        let collection = Collection::new(Arc::new(store.clone()), PATH);
        let repository = CustomerRepository::start(collection, UPDATED_AT, true, Arc::new(test_clock()));
        (store, repository)
    }

    #[tokio::test]
    async fn add_many_with_zero_quantity_writes_nothing() {
        let (store, repository) = repository();
        assert!(repository.add_many(&fixtures::customer("Ann"), 0).is_empty());
        tokio::task::yield_now().await;
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn find_matches_document_id_exactly() {
        let (_, repository) = repository();
        let ids = repository.add_many(&fixtures::customer("Ann"), 1);

        let mut list = repository.subscribe();
        list.wait_for(|customers| !customers.is_empty()).await.unwrap();

        assert!(repository.find(ids[0].as_str()).is_some());
        assert!(repository.find("unknown").is_none());
        assert!(repository.find("").is_none());
    }

    #[tokio::test]
    async fn update_callback_reports_failure() {
        let (_, repository) = repository();
        let (tx, rx) = tokio::sync::oneshot::channel();

        repository.update(DocumentId::new("ghost"), CustomerPatch::new().verified(true), move |ok| {
            let _ = tx.send(ok);
        });

        assert!(!rx.await.unwrap());
    }

    #[tokio::test]
    async fn set_without_id_is_ignored() {
        let (store, repository) = repository();
        repository.set(&fixtures::customer("Ann"));
        tokio::task::yield_now().await;
        assert_eq!(store.commit_count(), 0);
    }
}
