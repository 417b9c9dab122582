//! # Ticketdesk Core
//!
//! Core types and ports for the Ticketdesk live-sync data layer.
//!
//! This crate holds everything that does not need a runtime: the ticket
//! record, its identifiers and typed partial updates, the remote document
//! store port, field validators and the mailer port.
//!
//! ## Core Concepts
//!
//! - **Record**: One customer/ticket document ([`customer::Customer`])
//! - **Document store**: The remote database, reached through [`remote::DocumentStore`]
//! - **Live query**: A standing subscription that redelivers the full result set
//! - **Patch**: A typed partial update ([`customer::CustomerPatch`])
//! - **Environment**: Injected dependencies via traits ([`environment::Clock`])
//!
//! ## Architecture Principles
//!
//! - Reads flow one way: store → live query → repository list → derived index
//! - Writes flow the other way: caller → repository → store
//! - No local durability, caching or conflict resolution: the store owns that
//! - At most one attempt per write
//!
//! ## Example
//!
//! ```
//! use ticketdesk_core::customer::{Customer, CustomerPatch};
//! use ticketdesk_core::validation::{validate_name, Validation};
//! use chrono::Utc;
//!
//! let mut customer = Customer::new("Ann", "0912345678", "ann@example.com");
//! CustomerPatch::new().verified(true).apply_to(&mut customer, Utc::now());
//! assert!(customer.verified_at().is_some());
//!
//! assert_eq!(validate_name("Ann"), Validation::Success);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod customer;
pub mod document;
pub mod mail;
pub mod record;
pub mod remote;
pub mod validation;

pub use customer::{Customer, CustomerPatch};
pub use document::{DocumentId, RecordKey};
pub use record::Record;
pub use remote::{DocumentStore, RemoteError};
pub use validation::Validation;

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// explicitly, so tests can substitute deterministic implementations.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock;
    ///
    /// // Test - fixed time for deterministic tests
    /// let clock = FixedClock::new(time);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
