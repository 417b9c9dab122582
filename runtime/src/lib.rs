//! # Ticketdesk Runtime
//!
//! Live collection sync for the ticket desk, plus the flows built on it.
//!
//! ## Core Components
//!
//! - **Collection**: typed access to one remote collection, including the live query
//! - **Repository**: the single ordered, live mirror of the customer collection
//! - **Index**: keyed per-record models derived from the repository list
//! - **Order form**: debounced validation and batched ticket purchase
//! - **Scanner**: QR lookup and check-in
//! - **Delivery**: ticket emails through a pluggable mailer
//!
//! ## Example
//!
//! ```ignore
//! use ticketdesk_runtime::{AppContext, Config};
//!
//! let context = AppContext::start(Config::from_env(), store);
//!
//! let form = context.order_form();
//! form.set_name("Ann Lee");
//! form.set_phone("0912345678");
//! form.set_email("ann@example.com");
//! form.set_quantity(2);
//! let tickets = form.place_order()?;
//!
//! let outcome = context.scanner.scan(tickets[0].qr_payload()).await;
//! ```

pub mod collection;
pub mod config;
pub mod context;
pub mod debounce;
pub mod index;
pub mod mail;
pub mod notice;
pub mod order;
pub mod repository;
pub mod scanner;

pub use collection::{Collection, LiveQuery};
pub use config::Config;
pub use context::AppContext;
pub use index::{CustomerIndex, CustomerModel, IndexSnapshot};
pub use notice::{Notice, NoticeKind};
pub use order::{OrderError, OrderForm, Ticket};
pub use repository::CustomerRepository;
pub use scanner::{ScanOutcome, TicketScanner};
