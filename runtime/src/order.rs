//! Ticket order form and purchase.
//!
//! Each input is a `watch` channel. Its validation state is derived through
//! [`debounced`], so a field is judged only once typing has paused. The
//! combined form validity drops to `false` on every keystroke and is
//! re-evaluated when the debounced states settle.

use crate::config::FormConfig;
use crate::debounce::debounced;
use crate::repository::CustomerRepository;
use futures::future::select_all;
use std::sync::Arc;
use thiserror::Error;
use ticketdesk_core::customer::Customer;
use ticketdesk_core::document::DocumentId;
use ticketdesk_core::validation::{
    Validation, all_valid, validate_email, validate_name, validate_phone, validate_quantity,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Why an order could not be placed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// A field failed validation; the message is shown as-is
    #[error("{0}")]
    InvalidField(String),

    /// A required field is empty
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// One purchased ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    /// Ticket holder, carrying the allocated document ID
    pub holder: Customer,
    id: DocumentId,
}

impl Ticket {
    fn new(template: &Customer, id: DocumentId) -> Self {
        Self {
            holder: template.clone().with_id(id.clone()),
            id,
        }
    }

    /// Document ID of the ticket
    #[must_use]
    pub const fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Content to encode in the ticket's QR code: exactly the document ID
    #[must_use]
    pub fn qr_payload(&self) -> &str {
        self.id.as_str()
    }
}

/// Order form state.
pub struct OrderForm {
    repository: Arc<CustomerRepository>,
    max_quantity: u32,
    name: watch::Sender<String>,
    phone: watch::Sender<String>,
    email: watch::Sender<String>,
    quantity: watch::Sender<u32>,
    name_state: watch::Receiver<Validation>,
    phone_state: watch::Receiver<Validation>,
    email_state: watch::Receiver<Validation>,
    quantity_state: watch::Receiver<Validation>,
    valid: watch::Receiver<bool>,
    tracker: JoinHandle<()>,
}

impl OrderForm {
    /// Empty form (quantity 1) placing orders through `repository`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(repository: Arc<CustomerRepository>, config: &FormConfig) -> Self {
        let period = config.debounce;
        let max_quantity = config.max_quantity;

        let (name, _) = watch::channel(String::new());
        let (phone, _) = watch::channel(String::new());
        let (email, _) = watch::channel(String::new());
        let (quantity, _) = watch::channel(1_u32);

        let name_state = debounced(name.subscribe(), period, |v: &String| validate_name(v));
        let phone_state = debounced(phone.subscribe(), period, |v: &String| validate_phone(v));
        let email_state = debounced(email.subscribe(), period, |v: &String| validate_email(v));
        let quantity_state =
            debounced(quantity.subscribe(), period, move |v: &u32| validate_quantity(*v, max_quantity));

        let states = vec![
            name_state.clone(),
            phone_state.clone(),
            email_state.clone(),
            quantity_state.clone(),
        ];
        let (valid_sender, valid) = watch::channel(evaluate(&states));
        let tracker = tokio::spawn(track_validity(
            (name.subscribe(), phone.subscribe(), email.subscribe(), quantity.subscribe()),
            states,
            valid_sender,
        ));

        Self {
            repository,
            max_quantity,
            name,
            phone,
            email,
            quantity,
            name_state,
            phone_state,
            email_state,
            quantity_state,
            valid,
            tracker,
        }
    }

    /// Set the name input
    pub fn set_name(&self, name: impl Into<String>) {
        self.name.send_replace(name.into());
    }

    /// Set the phone input
    pub fn set_phone(&self, phone: impl Into<String>) {
        self.phone.send_replace(phone.into());
    }

    /// Set the email input
    pub fn set_email(&self, email: impl Into<String>) {
        self.email.send_replace(email.into());
    }

    /// Set the quantity input
    pub fn set_quantity(&self, quantity: u32) {
        self.quantity.send_replace(quantity);
    }

    /// Current quantity input
    #[must_use]
    pub fn quantity(&self) -> u32 {
        *self.quantity.borrow()
    }

    /// Debounced name validation
    #[must_use]
    pub fn name_validation(&self) -> watch::Receiver<Validation> {
        self.name_state.clone()
    }

    /// Debounced phone validation
    #[must_use]
    pub fn phone_validation(&self) -> watch::Receiver<Validation> {
        self.phone_state.clone()
    }

    /// Debounced email validation
    #[must_use]
    pub fn email_validation(&self) -> watch::Receiver<Validation> {
        self.email_state.clone()
    }

    /// Debounced quantity validation
    #[must_use]
    pub fn quantity_validation(&self) -> watch::Receiver<Validation> {
        self.quantity_state.clone()
    }

    /// Combined validity of the four fields
    #[must_use]
    pub fn form_valid(&self) -> watch::Receiver<bool> {
        self.valid.clone()
    }

    /// Whether the form is currently valid
    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self.valid.borrow()
    }

    /// Place the order: one ticket per unit of quantity.
    ///
    /// The inputs are checked again as they are now, without waiting for the
    /// debounced states. Ticket IDs are allocated locally and returned
    /// immediately; the batch write completes in the background.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError`] naming the first field that is empty or invalid.
    pub fn place_order(&self) -> Result<Vec<Ticket>, OrderError> {
        let name = self.name.borrow().clone();
        let phone = self.phone.borrow().clone();
        let email = self.email.borrow().clone();
        let quantity = *self.quantity.borrow();

        require("Name", validate_name(&name))?;
        require("Phone", validate_phone(&phone))?;
        require("Email", validate_email(&email))?;
        require("Quantity", validate_quantity(quantity, self.max_quantity))?;

        let template = Customer::new(name, phone, email);
        let ids = self.repository.add_many(&template, quantity as usize);
        info!(quantity, "Order placed");

        Ok(ids.into_iter().map(|id| Ticket::new(&template, id)).collect())
    }

    /// Reset every input to its initial value.
    pub fn clear(&self) {
        self.name.send_replace(String::new());
        self.phone.send_replace(String::new());
        self.email.send_replace(String::new());
        self.quantity.send_replace(1);
    }
}

impl Drop for OrderForm {
    fn drop(&mut self) {
        self.tracker.abort();
    }
}

impl std::fmt::Debug for OrderForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderForm")
            .field("name", &*self.name.borrow())
            .field("quantity", &*self.quantity.borrow())
            .field("valid", &*self.valid.borrow())
            .finish_non_exhaustive()
    }
}

fn require(field: &'static str, validation: Validation) -> Result<(), OrderError> {
    match validation {
        Validation::Success => Ok(()),
        Validation::Indeterminate => Err(OrderError::MissingField(field)),
        Validation::Failure(reason) => Err(OrderError::InvalidField(reason)),
    }
}

fn evaluate(states: &[watch::Receiver<Validation>]) -> bool {
    let current: Vec<Validation> = states.iter().map(|state| state.borrow().clone()).collect();
    all_valid(&current)
}

type RawInputs = (
    watch::Receiver<String>,
    watch::Receiver<String>,
    watch::Receiver<String>,
    watch::Receiver<u32>,
);

async fn track_validity(
    mut raw: RawInputs,
    mut states: Vec<watch::Receiver<Validation>>,
    valid: watch::Sender<bool>,
) {
    loop {
        let settled = tokio::select! {
            changed = raw.0.changed() => changed.map(|()| false),
            changed = raw.1.changed() => changed.map(|()| false),
            changed = raw.2.changed() => changed.map(|()| false),
            changed = raw.3.changed() => changed.map(|()| false),
            (changed, _, _) = select_all(states.iter_mut().map(|state| Box::pin(state.changed()))) => {
                changed.map(|()| true)
            }
            () = valid.closed() => break,
        };

        match settled {
            Ok(false) => {
                valid.send_replace(false);
            },
            Ok(true) => {
                valid.send_replace(evaluate(&states));
            },
            Err(_) => {
                warn!("Order form input closed, validity tracking stopped");
                break;
            },
        }
    }
}
