//! Application context: the single instance of every long-lived component.
//!
//! Built once at start-up and passed to whoever needs it. There is no global
//! repository; tests build as many independent contexts as they like.

use crate::collection::Collection;
use crate::config::Config;
use crate::index::CustomerIndex;
use crate::mail::{TicketDelivery, mailer_for};
use crate::order::OrderForm;
use crate::repository::CustomerRepository;
use crate::scanner::TicketScanner;
use std::sync::Arc;
use ticketdesk_core::DocumentStore;
use ticketdesk_core::environment::{Clock, SystemClock};
use ticketdesk_core::mail::Mailer;
use tracing::info;

/// Long-lived components wired to one document store.
pub struct AppContext {
    /// Configuration the context was built from
    pub config: Config,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Live mirror of the customer collection
    pub repository: Arc<CustomerRepository>,
    /// Derived per-record index over the repository
    pub index: CustomerIndex,
    /// QR lookup and check-in
    pub scanner: TicketScanner,
    /// Ticket email delivery
    pub delivery: TicketDelivery,
}

impl AppContext {
    /// Wire the context with the system clock and the configured mailer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        let mailer = mailer_for(&config.mail);
        Self::with_parts(config, store, Arc::new(SystemClock), mailer)
    }

    /// Wire the context from explicit parts.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let collection = Collection::new(store, config.store.collection.clone());
        let repository = Arc::new(CustomerRepository::start(
            collection,
            config.store.order_by.clone(),
            config.store.descending,
            Arc::clone(&clock),
        ));
        let index = CustomerIndex::new(Arc::clone(&repository), config.forms.save_debounce);
        let scanner = TicketScanner::new(
            Arc::clone(&repository),
            Arc::clone(&clock),
            config.scanner.verify_automatically,
        );
        let delivery = TicketDelivery::new(mailer, Arc::clone(&repository), &config.mail);

        info!(
            collection = %config.store.collection,
            order_by = %config.store.order_by,
            send_option = %config.mail.send_option,
            "Ticket desk context started"
        );

        Self {
            config,
            clock,
            repository,
            index,
            scanner,
            delivery,
        }
    }

    /// A fresh, empty order form
    #[must_use]
    pub fn order_form(&self) -> OrderForm {
        OrderForm::new(Arc::clone(&self.repository), &self.config.forms)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}
