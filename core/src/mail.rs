//! Ticket email types and the mailer port.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Email delivery errors.
///
/// The `Display` text is shown to staff as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// The transactional email API key is not configured
    #[error("Email API key not found, check your environment variables")]
    MissingApiKey,

    /// This device/provider cannot send mail
    #[error("This device cannot send mail")]
    Unsupported,

    /// The recipient address is empty or malformed
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The provider rejected the message
    #[error("Failed to send the email: {0}")]
    Rejected(String),

    /// Network or transport failure
    #[error("Failed to send the email: {0}")]
    Transport(String),
}

/// Inline binary attachment (ticket image).
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient
    pub filename: String,
    /// MIME type, e.g. `image/jpeg`
    pub content_type: String,
    /// Content ID for inline references from the HTML body
    pub content_id: Option<String>,
    /// Raw bytes
    pub content: Vec<u8>,
}

impl Attachment {
    /// JPEG ticket image attached inline
    #[must_use]
    pub fn jpeg(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "image/jpeg".to_string(),
            content_id: Some("ticket".to_string()),
            content,
        }
    }
}

// Attachments can be large; only log their size
impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("content_id", &self.content_id)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// An outgoing email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    /// Sender address
    pub from: String,
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
    /// Plain-text alternative
    pub plain: String,
    /// Inline attachments
    pub attachments: Vec<Attachment>,
}

/// Boxed future returned by [`Mailer::send`].
pub type MailFuture<'a> = Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>>;

/// Email provider.
///
/// This trait abstracts over delivery backends (a transactional email API,
/// the console in development, a recorder in tests). One call is one attempt:
/// providers do not retry.
pub trait Mailer: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] if the provider is not configured, rejects the
    /// message, or cannot be reached.
    fn send<'a>(&'a self, message: &'a EmailMessage) -> MailFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_read_as_user_messages() {
        assert_eq!(
            MailError::Rejected("bad request".to_string()).to_string(),
            "Failed to send the email: bad request"
        );
    }

    #[test]
    fn attachment_debug_hides_bytes() {
        let attachment = Attachment::jpeg("ticket.jpeg", vec![0; 1024]);
        let debug = format!("{attachment:?}");
        assert!(debug.contains("bytes: 1024"));
    }
}
