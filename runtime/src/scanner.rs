//! QR ticket lookup and check-in.

use crate::notice::Notice;
use crate::repository::CustomerRepository;
use std::sync::Arc;
use ticketdesk_core::customer::{Customer, CustomerPatch};
use ticketdesk_core::environment::Clock;
use tracing::{info, warn};

/// Shown when a ticket is checked in.
pub const VERIFY_SUCCESS: &str = "Ticket has been successfully verified";
/// Shown when a check-in cannot be completed.
pub const VERIFY_FAILED: &str = "Failed to verify the ticket. Please try again";
/// Shown when a ticket was checked in before.
pub const ALREADY_VERIFIED: &str = "Ticket has already been verified";
/// Shown when a scanned code matches no ticket.
pub const NOT_VALID: &str = "Ticket is not valid";

/// Result of scanning one QR payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No ticket has this ID
    Unknown(String),
    /// Ticket found and not yet checked in
    Found(Customer),
    /// Ticket found and already checked in
    AlreadyVerified(Customer),
    /// Ticket found and checked in by this scan
    Verified(Customer),
    /// Ticket found, but checking it in failed
    VerifyFailed(Customer, Notice),
}

impl ScanOutcome {
    /// The notice to show for this outcome, if any
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Unknown(_) => Some(Notice::error(NOT_VALID)),
            Self::Found(_) => None,
            Self::AlreadyVerified(_) => Some(Notice::error(ALREADY_VERIFIED)),
            Self::Verified(_) => Some(Notice::success(VERIFY_SUCCESS)),
            Self::VerifyFailed(_, notice) => Some(notice.clone()),
        }
    }
}

/// Ticket scanner backed by the repository list.
///
/// The payload is compared for equality against the IDs currently in the
/// list; there is no signature or expiry.
pub struct TicketScanner {
    repository: Arc<CustomerRepository>,
    clock: Arc<dyn Clock>,
    verify_automatically: bool,
}

impl TicketScanner {
    /// Scanner that checks tickets in on scan when `verify_automatically` is set
    pub fn new(repository: Arc<CustomerRepository>, clock: Arc<dyn Clock>, verify_automatically: bool) -> Self {
        Self {
            repository,
            clock,
            verify_automatically,
        }
    }

    /// Look up a scanned payload.
    pub async fn scan(&self, payload: &str) -> ScanOutcome {
        let Some(customer) = self.repository.find(payload) else {
            info!(payload, "Scanned unknown ticket");
            return ScanOutcome::Unknown(payload.to_string());
        };

        if customer.verified() {
            return ScanOutcome::AlreadyVerified(customer);
        }
        if !self.verify_automatically {
            return ScanOutcome::Found(customer);
        }

        let notice = self.confirm(&customer).await;
        if notice.is_success() {
            let mut verified = customer;
            CustomerPatch::new().verified(true).apply_to(&mut verified, self.clock.now());
            ScanOutcome::Verified(verified)
        } else {
            ScanOutcome::VerifyFailed(customer, notice)
        }
    }

    /// Check a ticket in.
    ///
    /// Fails for tickets that were never saved or are already checked in,
    /// judged by both `customer` and the mirrored record. Never panics;
    /// every outcome is a notice.
    pub async fn confirm(&self, customer: &Customer) -> Notice {
        let Some(id) = customer.id.as_ref() else {
            return Notice::error(VERIFY_FAILED);
        };
        let mirrored = self.repository.find(id.as_str());
        if customer.verified() || mirrored.is_some_and(|current| current.verified()) {
            return Notice::error(VERIFY_FAILED);
        }

        match self.repository.apply(id, CustomerPatch::new().verified(true)).await {
            Ok(()) => {
                info!(ticket = %id, "Ticket verified");
                Notice::success(VERIFY_SUCCESS)
            },
            Err(e) => {
                warn!(ticket = %id, error = %e, "Ticket verification failed");
                Notice::error(VERIFY_FAILED)
            },
        }
    }
}

impl std::fmt::Debug for TicketScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketScanner")
            .field("verify_automatically", &self.verify_automatically)
            .finish_non_exhaustive()
    }
}
