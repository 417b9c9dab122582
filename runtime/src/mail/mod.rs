//! Ticket delivery by email.
//!
//! [`TicketDelivery`] builds the ticket email for a customer, hands it to the
//! configured [`Mailer`] once, and records the attempt on the customer's
//! send counter.

mod console;
mod sendgrid;

pub use console::ConsoleMailer;
pub use sendgrid::{DEFAULT_ENDPOINT, SendGridMailer};

use crate::config::{MailConfig, SendOption};
use crate::notice::Notice;
use crate::repository::CustomerRepository;
use std::sync::Arc;
use ticketdesk_core::customer::{Customer, CustomerPatch};
use ticketdesk_core::mail::{Attachment, EmailMessage, MailError, Mailer};
use ticketdesk_core::validation::validate_email;
use tracing::{info, warn};

/// Shown when a ticket email was accepted.
pub const SEND_SUCCESS: &str = "Ticket has been successfully sent";

/// Mailer for the configured send option
#[must_use]
pub fn mailer_for(config: &MailConfig) -> Arc<dyn Mailer> {
    match config.send_option {
        SendOption::DefaultMail => Arc::new(ConsoleMailer::new()),
        SendOption::SendGrid => Arc::new(SendGridMailer::new(
            config.api_key.clone(),
            config.endpoint.clone(),
        )),
    }
}

/// Sends tickets and keeps the send counter current.
pub struct TicketDelivery {
    mailer: Arc<dyn Mailer>,
    repository: Arc<CustomerRepository>,
    sender: String,
    subject: String,
}

impl TicketDelivery {
    /// Deliver through `mailer`, with sender and subject from `config`
    pub fn new(mailer: Arc<dyn Mailer>, repository: Arc<CustomerRepository>, config: &MailConfig) -> Self {
        Self {
            mailer,
            repository,
            sender: config.sender.clone(),
            subject: config.subject.clone(),
        }
    }

    /// Email `customer` their ticket images.
    ///
    /// One attempt, no retry. Every attempt that reaches the provider bumps
    /// the customer's send counter, whether or not the provider accepts it.
    pub async fn send(&self, customer: &Customer, attachments: Vec<Attachment>) -> Notice {
        if !validate_email(&customer.email).is_success() {
            let error = MailError::InvalidRecipient(customer.email.clone());
            warn!(customer = ?customer.id, error = %error, "Not sending ticket");
            return Notice::error(error.to_string());
        }

        let message = self.message_for(customer, attachments);
        let result = self.mailer.send(&message).await;
        metrics::counter!(
            "delivery.attempts.total",
            "provider" => self.mailer.name(),
            "outcome" => if result.is_ok() { "sent" } else { "failed" }
        )
        .increment(1);

        self.record_attempt(customer).await;

        match result {
            Ok(()) => {
                info!(to = %message.to, provider = self.mailer.name(), "Ticket sent");
                Notice::success(SEND_SUCCESS)
            },
            Err(e) => {
                warn!(to = %message.to, provider = self.mailer.name(), error = %e, "Ticket not sent");
                Notice::error(e.to_string())
            },
        }
    }

    fn message_for(&self, customer: &Customer, attachments: Vec<Attachment>) -> EmailMessage {
        EmailMessage {
            from: self.sender.clone(),
            to: customer.email.clone(),
            subject: self.subject.clone(),
            html: ticket_html(&customer.name),
            plain: "ticket".to_string(),
            attachments,
        }
    }

    async fn record_attempt(&self, customer: &Customer) {
        let Some(id) = customer.id.as_ref() else {
            return;
        };
        // Count from the mirrored record; `customer` may be an older copy.
        let sent = self
            .repository
            .find(id.as_str())
            .map_or_else(|| customer.next_send_count(), |current| current.next_send_count());
        let patch = CustomerPatch::new().sent(sent);
        if let Err(e) = self.repository.apply(id, patch).await {
            warn!(customer = %id, error = %e, "Failed to record send attempt");
        }
    }
}

impl std::fmt::Debug for TicketDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketDelivery")
            .field("mailer", &self.mailer.name())
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

fn ticket_html(name: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<style> body {{ color: black; }} </style>\n</head>\n<body>\n\
         <p>Hello {},</p>\n<p>Your ticket is attached.</p>\n<img src=\"cid:ticket\" alt=\"ticket\">\n\
         </body>\n</html>\n",
        escape_html(name)
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_escaped_in_the_body() {
        let html = ticket_html("<Ann & Bo>");
        assert!(html.contains("&lt;Ann &amp; Bo&gt;"));
        assert!(html.contains("cid:ticket"));
    }

    #[test]
    fn send_option_picks_the_provider() {
        let mut config = MailConfig::default();
        assert_eq!(mailer_for(&config).name(), "console");
        config.send_option = SendOption::SendGrid;
        assert_eq!(mailer_for(&config).name(), "sendgrid");
    }
}
