//! Console mail provider for development.

use ticketdesk_core::mail::{EmailMessage, MailFuture, Mailer};
use tracing::info;

/// Console mailer.
///
/// Logs outgoing ticket emails instead of sending them. Stands in for the
/// device's own mail composer where none is available.
#[derive(Clone, Debug, Default)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    /// Create a new console mailer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Mailer for ConsoleMailer {
    fn name(&self) -> &'static str {
        "console"
    }

    fn send<'a>(&'a self, message: &'a EmailMessage) -> MailFuture<'a> {
        Box::pin(async move {
            info!(
                from = %message.from,
                to = %message.to,
                subject = %message.subject,
                attachments = message.attachments.len(),
                "📧 Ticket Email (Development Mode)"
            );
            println!("\n╔══════════════════════════════════════════════════════════════╗");
            println!("║                      TICKET EMAIL                            ║");
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ To: {:<57}║", message.to);
            println!("║ Subject: {:<52}║", message.subject);
            println!("║ Attachments: {:<48}║", message.attachments.len());
            println!("╚══════════════════════════════════════════════════════════════╝\n");
            Ok(())
        })
    }
}
