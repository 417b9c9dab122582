//! Configuration management for the ticket desk.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::index::DEFAULT_SAVE_DEBOUNCE;
use crate::mail::DEFAULT_ENDPOINT;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use ticketdesk_core::customer::UPDATED_AT;
use ticketdesk_core::validation::{DEFAULT_DEBOUNCE, DEFAULT_MAX_QUANTITY};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote collection configuration
    pub store: StoreConfig,
    /// Order form configuration
    pub forms: FormConfig,
    /// Ticket email configuration
    pub mail: MailConfig,
    /// Scanner configuration
    pub scanner: ScannerConfig,
}

/// Remote collection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Collection holding the customer documents
    pub collection: String,
    /// Field the live query is ordered by
    pub order_by: String,
    /// Whether the live query is ordered newest first
    pub descending: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: "customers".to_string(),
            order_by: UPDATED_AT.to_string(),
            descending: true,
        }
    }
}

/// Order form and detail editing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    /// Quiet period before a field is validated
    pub debounce: Duration,
    /// Quiet period before a detail edit is written back
    pub save_debounce: Duration,
    /// Largest quantity one order may have
    pub max_quantity: u32,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
            max_quantity: DEFAULT_MAX_QUANTITY,
        }
    }
}

/// How tickets are emailed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SendOption {
    /// The local mail client (logged to the console here)
    #[default]
    DefaultMail,
    /// The `SendGrid` transactional email API
    SendGrid,
}

/// Unknown send option name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown send option: {0} (expected defaultMail or sendGrid)")]
pub struct ParseSendOptionError(String);

impl FromStr for SendOption {
    type Err = ParseSendOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "defaultMail" => Ok(Self::DefaultMail),
            "sendGrid" => Ok(Self::SendGrid),
            other => Err(ParseSendOptionError(other.to_string())),
        }
    }
}

impl fmt::Display for SendOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefaultMail => f.write_str("defaultMail"),
            Self::SendGrid => f.write_str("sendGrid"),
        }
    }
}

/// Ticket email configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Delivery provider
    pub send_option: SendOption,
    /// `SendGrid` API key
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Sender address
    pub sender: String,
    /// Subject line
    pub subject: String,
    /// `SendGrid` mail-send endpoint
    pub endpoint: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            send_option: SendOption::DefaultMail,
            api_key: None,
            sender: "hello@world.com".to_string(),
            subject: "Your ticket".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("send_option", &self.send_option)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("sender", &self.sender)
            .field("subject", &self.subject)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Scanner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Check tickets in as soon as they are scanned
    pub verify_automatically: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store: StoreConfig {
                collection: env::var("TICKETDESK_COLLECTION").unwrap_or(defaults.store.collection),
                order_by: env::var("TICKETDESK_ORDER_BY").unwrap_or(defaults.store.order_by),
                descending: parsed("TICKETDESK_ORDER_DESCENDING").unwrap_or(defaults.store.descending),
            },
            forms: FormConfig {
                debounce: parsed("TICKETDESK_DEBOUNCE_MS")
                    .map_or(defaults.forms.debounce, Duration::from_millis),
                save_debounce: parsed("TICKETDESK_SAVE_DEBOUNCE_MS")
                    .map_or(defaults.forms.save_debounce, Duration::from_millis),
                max_quantity: parsed("TICKETDESK_MAX_QUANTITY").unwrap_or(defaults.forms.max_quantity),
            },
            mail: MailConfig {
                send_option: parsed("TICKETDESK_SEND_OPTION").unwrap_or(defaults.mail.send_option),
                api_key: env::var("SG_API_KEY").ok(),
                sender: env::var("TICKETDESK_MAIL_SENDER").unwrap_or(defaults.mail.sender),
                subject: env::var("TICKETDESK_MAIL_SUBJECT").unwrap_or(defaults.mail.subject),
                endpoint: env::var("SENDGRID_ENDPOINT").unwrap_or(defaults.mail.endpoint),
            },
            scanner: ScannerConfig {
                verify_automatically: parsed("TICKETDESK_VERIFY_AUTOMATICALLY")
                    .unwrap_or(defaults.scanner.verify_automatically),
            },
        }
    }
}

fn parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_box_office_setup() {
        let config = Config::default();
        assert_eq!(config.store.order_by, "updatedAt");
        assert!(config.store.descending);
        assert_eq!(config.forms.debounce, Duration::from_millis(500));
        assert_eq!(config.forms.save_debounce, Duration::from_millis(1500));
        assert_eq!(config.forms.max_quantity, 20);
        assert_eq!(config.mail.send_option, SendOption::DefaultMail);
        assert!(!config.scanner.verify_automatically);
    }

    #[test]
    fn send_option_names() {
        assert_eq!("sendGrid".parse::<SendOption>().unwrap(), SendOption::SendGrid);
        assert_eq!(SendOption::DefaultMail.to_string(), "defaultMail");
        assert!("carrier-pigeon".parse::<SendOption>().is_err());
    }

    #[test]
    fn api_key_is_not_serialized() {
        let config = MailConfig {
            api_key: Some("SG.secret".to_string()),
            ..MailConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(!format!("{config:?}").contains("secret"));
    }
}
