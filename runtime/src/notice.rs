//! User-facing outcome messages.

use std::fmt;

/// How a notice is presented
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    /// The operation succeeded
    Success,
    /// The operation failed
    Error,
}

/// A transient notification shown to staff after an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    /// Human-readable text
    pub message: String,
    /// Presentation style
    pub kind: NoticeKind,
}

impl Notice {
    /// Success notice
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NoticeKind::Success,
        }
    }

    /// Error notice
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NoticeKind::Error,
        }
    }

    /// Whether this reports success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.kind, NoticeKind::Success)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
