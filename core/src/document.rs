//! Document identification types.
//!
//! This module defines the strong identifier types used by the data layer:
//! [`DocumentId`] for identifiers assigned by (or allocated for) the remote
//! document store, and [`RecordKey`] which also covers records that have not
//! been acknowledged by the store yet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error type for `DocumentId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid document ID: {0}")]
pub struct ParseDocumentIdError(String);

/// Identifier of a single document inside a remote collection.
///
/// Document IDs are opaque strings. They are either assigned by the store on
/// creation or allocated client-side before a batched write (see
/// [`DocumentStore::allocate_id`](crate::remote::DocumentStore::allocate_id)).
/// The QR payload of a ticket is exactly this string.
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty strings)
/// - `From::from()` and `new()`: No validation (for internal use with trusted input)
///
/// Use `FromStr` when parsing scanned or user-supplied input.
///
/// # Examples
///
/// ```
/// use ticketdesk_core::document::DocumentId;
///
/// let id = DocumentId::new("Zq3kPp0sVn");
/// assert_eq!(id.as_str(), "Zq3kPp0sVn");
///
/// let parsed: DocumentId = "Zq3kPp0sVn".parse().unwrap();
/// assert_eq!(parsed, id);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new `DocumentId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the document ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `DocumentId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = ParseDocumentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseDocumentIdError("Document ID cannot be empty".to_string()));
        }
        if s.contains('/') {
            return Err(ParseDocumentIdError(format!(
                "Document ID cannot contain '/': {s}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Client-side key for a record whose document ID is not known yet.
///
/// Each pending record gets its own random key, so two unacknowledged records
/// never share an index slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PendingKey(Uuid);

impl PendingKey {
    /// Creates a new random `PendingKey`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PendingKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending:{}", self.0)
    }
}

/// Key of a record in the derived index.
///
/// Distinguishes records the store has acknowledged from records still
/// waiting for their ID.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// The store knows this record under the given ID
    Assigned(DocumentId),
    /// The record has not been written yet
    Pending(PendingKey),
}

impl RecordKey {
    /// The assigned document ID, if any.
    #[must_use]
    pub const fn document_id(&self) -> Option<&DocumentId> {
        match self {
            Self::Assigned(id) => Some(id),
            Self::Pending(_) => None,
        }
    }

    /// Whether the record is still waiting for its ID.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assigned(id) => write!(f, "{id}"),
            Self::Pending(key) => write!(f, "{key}"),
        }
    }
}

impl From<DocumentId> for RecordKey {
    fn from(id: DocumentId) -> Self {
        Self::Assigned(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod document_id_tests {
        use super::*;

        #[test]
        fn new_creates_document_id() {
            let id = DocumentId::new("abc123");
            assert_eq!(id.as_str(), "abc123");
        }

        #[test]
        #[allow(clippy::expect_used)]
        fn parse_from_str() {
            let id: DocumentId = "abc123".parse().expect("parse should succeed");
            assert_eq!(id, DocumentId::new("abc123"));
        }

        #[test]
        fn parse_empty_string_fails() {
            assert!("".parse::<DocumentId>().is_err());
        }

        #[test]
        fn parse_path_fails() {
            assert!("users2/abc".parse::<DocumentId>().is_err());
        }

        #[test]
        fn serializes_as_plain_string() {
            let json = serde_json::to_string(&DocumentId::new("abc")).unwrap_or_default();
            assert_eq!(json, "\"abc\"");
        }
    }

    mod record_key_tests {
        use super::*;

        #[test]
        fn pending_keys_never_collide() {
            let a = RecordKey::Pending(PendingKey::new());
            let b = RecordKey::Pending(PendingKey::new());
            assert_ne!(a, b);
        }

        #[test]
        fn assigned_key_exposes_document_id() {
            let key = RecordKey::from(DocumentId::new("abc"));
            assert_eq!(key.document_id(), Some(&DocumentId::new("abc")));
            assert!(!key.is_pending());
        }

        #[test]
        fn display() {
            let key = RecordKey::from(DocumentId::new("abc"));
            assert_eq!(format!("{key}"), "abc");
        }
    }
}
