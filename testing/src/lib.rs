//! # Ticketdesk Testing
//!
//! Testing utilities and helpers for the Ticketdesk data layer.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`SteppingClock`])
//! - [`InMemoryDocumentStore`]: a live-query capable document store
//! - [`MockMailer`]: records outgoing email
//! - Record fixtures
//!
//! ## Example
//!
//! ```ignore
//! use ticketdesk_testing::{InMemoryDocumentStore, fixtures, test_clock};
//! use ticketdesk_runtime::{Collection, CustomerRepository};
//!
//! #[tokio::test]
//! async fn test_order_flow() {
//!     let store = Arc::new(InMemoryDocumentStore::new());
//!     let collection = Collection::new(store, "customers");
//!     let repository = CustomerRepository::start(collection, "updatedAt", true, Arc::new(test_clock()));
//!
//!     let ids = repository.add_many(&fixtures::customer("Ann"), 2);
//!     assert_eq!(ids.len(), 2);
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use ticketdesk_core::environment::Clock;

pub mod mailer;
pub mod memory;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketdesk_testing::mocks::FixedClock;
    /// use ticketdesk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every read.
    ///
    /// Gives every commit of the in-memory store a distinct, increasing
    /// server timestamp.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per call to `now()`
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        #[allow(clippy::unwrap_used)] // Poisoning only follows a panicking test
        fn now(&self) -> DateTime<Utc> {
            let mut next = self.next.lock().unwrap();
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// Stepping clock starting at the test epoch, one second per read
    #[must_use]
    pub fn stepping_clock() -> SteppingClock {
        SteppingClock::new(test_epoch(), Duration::seconds(1))
    }

    #[allow(clippy::expect_used)]
    fn test_epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

/// Record fixtures
pub mod fixtures {
    use ticketdesk_core::customer::Customer;

    /// Customer with valid contact details derived from `name`
    #[must_use]
    pub fn customer(name: &str) -> Customer {
        let local = name.to_lowercase().replace(' ', ".");
        Customer::new(name, "0912345678", format!("{local}@example.com"))
    }
}

// Re-export commonly used items
pub use mailer::MockMailer;
pub use memory::InMemoryDocumentStore;
pub use mocks::{FixedClock, SteppingClock, stepping_clock, test_clock};
