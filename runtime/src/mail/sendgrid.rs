//! Transactional email through the `SendGrid` v3 mail-send API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use ticketdesk_core::mail::{Attachment, EmailMessage, MailError, MailFuture, Mailer};
use tracing::{debug, warn};

/// Default mail-send endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// `SendGrid` mailer.
///
/// The API key is optional at construction so a missing key surfaces as
/// [`MailError::MissingApiKey`] on send, where staff can see it.
#[derive(Clone)]
pub struct SendGridMailer {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl SendGridMailer {
    /// Create a mailer posting to `endpoint`
    #[must_use]
    pub fn new(api_key: Option<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|key| !key.is_empty()),
            endpoint: endpoint.into(),
        }
    }

    async fn deliver(&self, message: &EmailMessage) -> Result<(), MailError> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("SendGrid API key not found, check your environment variables");
            return Err(MailError::MissingApiKey);
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&MailSendRequest::from(message))
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => {
                debug!(to = %message.to, status = %response.status(), "SendGrid accepted the message");
                Ok(())
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(MailError::Rejected("the API key was refused".to_string()))
            },
            status => {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "SendGrid rejected the message");
                Err(MailError::Rejected(format!("status {}", status.as_u16())))
            },
        }
    }
}

impl std::fmt::Debug for SendGridMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridMailer")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl Mailer for SendGridMailer {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    fn send<'a>(&'a self, message: &'a EmailMessage) -> MailFuture<'a> {
        Box::pin(self.deliver(message))
    }
}

#[derive(Serialize)]
struct MailSendRequest<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 2],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<EncodedAttachment<'a>>,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    mime: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct EncodedAttachment<'a> {
    content: String,
    #[serde(rename = "type")]
    mime: &'a str,
    filename: &'a str,
    disposition: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_id: Option<&'a str>,
}

impl<'a> From<&'a Attachment> for EncodedAttachment<'a> {
    fn from(attachment: &'a Attachment) -> Self {
        Self {
            content: STANDARD.encode(&attachment.content),
            mime: &attachment.content_type,
            filename: &attachment.filename,
            disposition: if attachment.content_id.is_some() { "inline" } else { "attachment" },
            content_id: attachment.content_id.as_deref(),
        }
    }
}

impl<'a> From<&'a EmailMessage> for MailSendRequest<'a> {
    fn from(message: &'a EmailMessage) -> Self {
        Self {
            personalizations: [Personalization {
                to: [Address { email: &message.to }],
            }],
            from: Address { email: &message.from },
            subject: &message.subject,
            // Plain text must come first
            content: [
                Content {
                    mime: "text/plain",
                    value: &message.plain,
                },
                Content {
                    mime: "text/html",
                    value: &message.html,
                },
            ],
            attachments: message.attachments.iter().map(EncodedAttachment::from).collect(),
        }
    }
}
