//! Mock mailer for testing.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use std::sync::{Arc, Mutex};
use ticketdesk_core::mail::{EmailMessage, MailError, MailFuture, Mailer};

/// Mock mailer.
///
/// Records every message it is asked to send. Fails with the configured
/// error instead when one is set.
#[derive(Debug, Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failure: Arc<Mutex<Option<MailError>>>,
}

impl MockMailer {
    /// Create a mock mailer that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock mailer that fails every send with `error`.
    #[must_use]
    pub fn failing(error: MailError) -> Self {
        let mailer = Self::default();
        mailer.fail_with(Some(error));
        mailer
    }

    /// Switch between failing with `error` and succeeding (`None`)
    pub fn fail_with(&self, error: Option<MailError>) {
        *self.failure.lock().unwrap() = error;
    }

    /// Messages delivered so far
    #[must_use]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of messages delivered so far
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Mailer for MockMailer {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn send<'a>(&'a self, message: &'a EmailMessage) -> MailFuture<'a> {
        Box::pin(async move {
            if let Some(error) = self.failure.lock().unwrap().clone() {
                return Err(error);
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            from: "box-office@example.com".to_string(),
            to: "ann@example.com".to_string(),
            subject: "Your ticket".to_string(),
            html: "<p>Hi</p>".to_string(),
            plain: "Hi".to_string(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn records_successful_sends() {
        let mailer = MockMailer::new();
        mailer.send(&message()).await.unwrap();
        assert_eq!(mailer.sent_count(), 1);
        assert_eq!(mailer.sent()[0].to, "ann@example.com");
    }

    #[tokio::test]
    async fn failing_mailer_records_nothing() {
        let mailer = MockMailer::failing(MailError::MissingApiKey);
        assert_eq!(mailer.send(&message()).await, Err(MailError::MissingApiKey));
        assert_eq!(mailer.sent_count(), 0);
    }
}
