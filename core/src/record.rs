//! Typed records stored as documents.
//!
//! [`Record`] is what the typed collection adapter needs to move a value in
//! and out of the document store: identity access plus encoding to a field
//! map and decoding from a delivered document.

use crate::document::{DocumentId, RecordKey};
use crate::remote::{FieldValue, Fields, RawDocument, RemoteError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Field name the document ID is exposed under when decoding.
pub const ID_FIELD: &str = "id";

/// A typed record that lives in a remote collection.
///
/// The document ID is not a stored field: it is stripped on encode and
/// injected from the document on decode.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Fields the store fills with its commit time when the record leaves
    /// them empty.
    const SERVER_TIMESTAMPS: &'static [&'static str];

    /// Assigned document ID, `None` until the first write is acknowledged.
    fn id(&self) -> Option<&DocumentId>;

    /// Attach a document ID.
    fn set_id(&mut self, id: DocumentId);

    /// Index key: the document ID, or a per-instance pending key.
    fn key(&self) -> RecordKey;

    /// Encode into a field map for a full write.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Serialization`] if the record does not encode
    /// to a JSON object.
    fn to_fields(&self) -> Result<Fields> {
        encode_fields(self, Self::SERVER_TIMESTAMPS)
    }

    /// Decode a delivered document.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if the stored fields do not
    /// match the record shape.
    fn from_document(document: RawDocument) -> std::result::Result<Self, serde_json::Error> {
        decode_document(document)
    }
}

/// Encode `value` into document fields.
///
/// The `id` field is dropped. Every name in `server_timestamps` that is
/// absent or null is sent as [`FieldValue::ServerTimestamp`].
///
/// # Errors
///
/// Returns [`RemoteError::Serialization`] if `value` is not a JSON object.
pub fn encode_fields<T: Serialize>(value: &T, server_timestamps: &[&str]) -> Result<Fields> {
    let Value::Object(mut map) =
        serde_json::to_value(value).map_err(|e| RemoteError::Serialization(e.to_string()))?
    else {
        return Err(RemoteError::Serialization(
            "record must encode to an object".to_string(),
        ));
    };
    map.remove(ID_FIELD);

    let mut fields: Fields = map
        .into_iter()
        .map(|(name, value)| (name, FieldValue::Value(value)))
        .collect();

    for name in server_timestamps {
        let missing = matches!(
            fields.get(*name),
            None | Some(FieldValue::Value(Value::Null))
        );
        if missing {
            fields.insert((*name).to_string(), FieldValue::ServerTimestamp);
        }
    }
    Ok(fields)
}

/// Decode a document into `T`, exposing its ID under [`ID_FIELD`].
///
/// # Errors
///
/// Returns the `serde_json` error if the fields do not fit `T`.
pub fn decode_document<T: DeserializeOwned>(
    document: RawDocument,
) -> std::result::Result<T, serde_json::Error> {
    let RawDocument { id, mut fields } = document;
    fields.insert(ID_FIELD.to_string(), Value::String(id.into_inner()));
    serde_json::from_value(Value::Object(fields))
}

/// JSON representation of a timestamp field.
///
/// Fixed microsecond precision so stored values sort lexically as well.
#[must_use]
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        #[serde(default, skip_serializing)]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created_at: Option<DateTime<Utc>>,
        text: String,
    }

    #[test]
    fn encode_marks_missing_server_timestamps() {
        let note = Note {
            id: Some("n1".to_string()),
            created_at: None,
            text: "hi".to_string(),
        };
        let fields = encode_fields(&note, &["createdAt"]).unwrap_or_default();

        assert_eq!(fields.get("createdAt"), Some(&FieldValue::ServerTimestamp));
        assert_eq!(fields.get("text"), Some(&FieldValue::Value(json!("hi"))));
        assert!(!fields.contains_key("id"));
    }

    #[test]
    fn encode_rejects_non_objects() {
        assert!(encode_fields(&42, &[]).is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn decode_injects_document_id() {
        let mut fields = serde_json::Map::new();
        fields.insert("text".to_string(), json!("hi"));
        let note: Note = decode_document(RawDocument::new(DocumentId::new("n1"), fields)).unwrap();

        assert_eq!(note.id.as_deref(), Some("n1"));
        assert_eq!(note.text, "hi");
    }

    #[test]
    fn decode_reports_shape_errors() {
        let mut fields = serde_json::Map::new();
        fields.insert("text".to_string(), json!(12));
        let result: std::result::Result<Note, _> =
            decode_document(RawDocument::new(DocumentId::new("n1"), fields));
        assert!(result.is_err());
    }
}
