//! Keyed, order-preserving view of the repository list.
//!
//! Every repository delivery produces a fresh [`IndexSnapshot`]. The snapshot
//! maps each [`RecordKey`] to its position and creates the per-record
//! [`CustomerModel`] lazily on first lookup. Model identity is therefore
//! stable within one snapshot and not across snapshots.
//!
//! Lookups never fail: [`CustomerIndex::model_or_placeholder`] answers keys
//! that have just disappeared with one shared, empty placeholder model.

use crate::debounce::debounced;
use crate::repository::{CustomerList, CustomerRepository};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use ticketdesk_core::customer::Customer;
use ticketdesk_core::document::{DocumentId, RecordKey};
use ticketdesk_core::record::Record;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default quiet period before local edits are written back.
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Observable wrapper around one record.
///
/// Local edits are published immediately to subscribers and written back to
/// the store once they have been quiet for the save period. Placeholders and
/// records without a document ID never write back.
#[derive(Debug)]
pub struct CustomerModel {
    key: RecordKey,
    state: watch::Sender<Customer>,
    placeholder: bool,
}

impl CustomerModel {
    fn live(customer: Customer, write_back: Option<&WriteBack>) -> Arc<Self> {
        let key = customer.key();
        let (state, _) = watch::channel(customer);
        if let Some(write_back) = write_back {
            if !key.is_pending() {
                write_back.spawn(&state);
            }
        }
        Arc::new(Self {
            key,
            state,
            placeholder: false,
        })
    }

    fn placeholder() -> Arc<Self> {
        let customer = Customer::default();
        let key = customer.key();
        let (state, _) = watch::channel(customer);
        Arc::new(Self {
            key,
            state,
            placeholder: true,
        })
    }

    /// Index key of the wrapped record
    #[must_use]
    pub const fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Current value
    #[must_use]
    pub fn customer(&self) -> Customer {
        self.state.borrow().clone()
    }

    /// Observe local edits
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Customer> {
        self.state.subscribe()
    }

    /// Apply a local edit and schedule the write-back.
    pub fn edit(&self, edit: impl FnOnce(&mut Customer)) {
        self.state.send_modify(edit);
    }

    /// Whether this is the stand-in for a missing record
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

#[derive(Clone, Debug)]
struct WriteBack {
    repository: Weak<CustomerRepository>,
    period: Duration,
}

impl WriteBack {
    fn spawn(&self, state: &watch::Sender<Customer>) {
        let Ok(handle) = Handle::try_current() else {
            warn!("No runtime available, edits will not be written back");
            return;
        };
        let _guard = handle.enter();

        let mut saved = state.borrow().clone();
        let mut settled = debounced(state.subscribe(), self.period, Customer::clone);
        let repository = self.repository.clone();
        handle.spawn(async move {
            while settled.changed().await.is_ok() {
                let customer = settled.borrow_and_update().clone();
                if customer == saved {
                    continue;
                }
                let Some(repository) = repository.upgrade() else {
                    break;
                };
                debug!(customer = ?customer.id, "Writing back edited customer");
                repository.set(&customer);
                saved = customer;
            }
        });
    }
}

/// One rebuild of the index.
#[derive(Debug)]
pub struct IndexSnapshot {
    customers: CustomerList,
    keys: Vec<RecordKey>,
    positions: HashMap<RecordKey, usize>,
    models: Vec<OnceLock<Arc<CustomerModel>>>,
    write_back: Option<WriteBack>,
}

impl IndexSnapshot {
    fn build(customers: CustomerList, write_back: Option<WriteBack>) -> Self {
        let keys: Vec<RecordKey> = customers.iter().map(Record::key).collect();
        let mut positions = HashMap::with_capacity(keys.len());
        for (position, key) in keys.iter().enumerate() {
            positions.entry(key.clone()).or_insert(position);
        }
        let models = (0..keys.len()).map(|_| OnceLock::new()).collect();

        Self {
            customers,
            keys,
            positions,
            models,
            write_back,
        }
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in list order
    #[must_use]
    pub fn keys(&self) -> &[RecordKey] {
        &self.keys
    }

    /// Records in list order
    #[must_use]
    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    /// Position of `key` in list order
    #[must_use]
    pub fn position(&self, key: &RecordKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    /// Model for `key`, created on first lookup
    #[must_use]
    pub fn model(&self, key: &RecordKey) -> Option<Arc<CustomerModel>> {
        self.position(key).and_then(|position| self.model_at(position))
    }

    /// Model at `position`, created on first lookup
    #[must_use]
    pub fn model_at(&self, position: usize) -> Option<Arc<CustomerModel>> {
        let customer = self.customers.get(position)?;
        let slot = self.models.get(position)?;
        let model = slot.get_or_init(|| CustomerModel::live(customer.clone(), self.write_back.as_ref()));
        Some(Arc::clone(model))
    }
}

/// The derived index, kept current with the repository.
pub struct CustomerIndex {
    repository: Arc<CustomerRepository>,
    snapshots: watch::Receiver<Arc<IndexSnapshot>>,
    placeholder: Arc<CustomerModel>,
    task: JoinHandle<()>,
}

impl CustomerIndex {
    /// Follow `repository`, writing model edits back after `save_debounce`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(repository: Arc<CustomerRepository>, save_debounce: Duration) -> Self {
        let write_back = WriteBack {
            repository: Arc::downgrade(&repository),
            period: save_debounce,
        };
        let mut lists = repository.subscribe();
        let initial = IndexSnapshot::build(
            Arc::clone(&lists.borrow_and_update()),
            Some(write_back.clone()),
        );
        let (sender, snapshots) = watch::channel(Arc::new(initial));

        let task = tokio::spawn(async move {
            while lists.changed().await.is_ok() {
                let customers = Arc::clone(&lists.borrow_and_update());
                let snapshot = IndexSnapshot::build(customers, Some(write_back.clone()));
                debug!(entries = snapshot.len(), "Customer index rebuilt");
                if sender.send(Arc::new(snapshot)).is_err() {
                    break;
                }
            }
        });

        Self {
            repository,
            snapshots,
            placeholder: CustomerModel::placeholder(),
            task,
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Observe rebuilds
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<IndexSnapshot>> {
        self.snapshots.clone()
    }

    /// Keys of the current snapshot, in list order
    #[must_use]
    pub fn keys(&self) -> Vec<RecordKey> {
        self.snapshot().keys().to_vec()
    }

    /// Model for `key` in the current snapshot
    #[must_use]
    pub fn model(&self, key: &RecordKey) -> Option<Arc<CustomerModel>> {
        self.snapshot().model(key)
    }

    /// Model for `key`, or the shared placeholder if the key is gone.
    #[must_use]
    pub fn model_or_placeholder(&self, key: &RecordKey) -> Arc<CustomerModel> {
        self.model(key).unwrap_or_else(|| {
            debug!(key = %key, "Index miss, serving placeholder");
            Arc::clone(&self.placeholder)
        })
    }

    /// Delete the records at `offsets` of the current snapshot in one batch.
    pub fn remove_at(&self, offsets: &[usize]) {
        let snapshot = self.snapshot();
        let ids: Vec<DocumentId> = offsets
            .iter()
            .filter_map(|&offset| snapshot.customers().get(offset))
            .filter_map(|customer| customer.id.clone())
            .collect();
        self.repository.remove_ids(ids);
    }

    /// Delete the records with the given keys in one batch.
    ///
    /// Pending keys have nothing to delete and are skipped.
    pub fn remove_keys(&self, keys: &[RecordKey]) {
        let ids: Vec<DocumentId> = keys
            .iter()
            .filter_map(RecordKey::document_id)
            .cloned()
            .collect();
        self.repository.remove_ids(ids);
    }
}

impl Drop for CustomerIndex {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for CustomerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerIndex")
            .field("entries", &self.snapshots.borrow().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ticketdesk_testing::fixtures;

    fn listed(names: &[&str]) -> CustomerList {
        Arc::new(
            names
                .iter()
                .map(|name| fixtures::customer(name).with_id(DocumentId::new(name.to_lowercase())))
                .collect(),
        )
    }

    #[test]
    fn snapshot_preserves_list_order() {
        let snapshot = IndexSnapshot::build(listed(&["Cy", "Ann", "Bo"]), None);
        let ids: Vec<String> = snapshot.keys().iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["cy", "ann", "bo"]);
        assert_eq!(snapshot.position(&DocumentId::new("bo").into()), Some(2));
    }

    #[test]
    fn models_are_created_once_per_snapshot() {
        let snapshot = IndexSnapshot::build(listed(&["Ann"]), None);
        let key = RecordKey::from(DocumentId::new("ann"));
        let first = snapshot.model(&key).unwrap();
        let second = snapshot.model(&key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.customer().name, "Ann");
    }

    #[test]
    fn pending_records_get_distinct_keys() {
        let customers = Arc::new(vec![fixtures::customer("Ann"), fixtures::customer("Ann")]);
        let snapshot = IndexSnapshot::build(customers, None);
        assert_eq!(snapshot.len(), 2);
        assert_ne!(snapshot.keys()[0], snapshot.keys()[1]);
        assert_eq!(snapshot.position(&snapshot.keys()[1].clone()), Some(1));
    }

    #[test]
    fn unknown_key_has_no_model() {
        let snapshot = IndexSnapshot::build(listed(&["Ann"]), None);
        assert!(snapshot.model(&DocumentId::new("gone").into()).is_none());
        assert!(snapshot.model_at(5).is_none());
    }

    #[test]
    fn edits_are_published_locally() {
        let snapshot = IndexSnapshot::build(listed(&["Ann"]), None);
        let model = snapshot.model_at(0).unwrap();
        let observer = model.subscribe();

        model.edit(|customer| customer.phone = "0987654321".to_string());

        assert_eq!(observer.borrow().phone, "0987654321");
    }

    proptest! {
        #[test]
        fn every_listed_id_maps_back_to_its_position(
            ids in proptest::collection::hash_set("[a-z0-9]{1,12}", 0..40)
        ) {
            let customers: Vec<Customer> = ids
                .iter()
                .map(|id| fixtures::customer("Ann").with_id(DocumentId::new(id.clone())))
                .collect();
            let snapshot = IndexSnapshot::build(Arc::new(customers.clone()), None);

            prop_assert_eq!(snapshot.len(), customers.len());
            for (position, customer) in customers.iter().enumerate() {
                prop_assert_eq!(snapshot.position(&customer.key()), Some(position));
            }
        }
    }
}
