//! The customer/ticket record.
//!
//! One [`Customer`] document is one ticket: an order for N tickets writes N
//! documents that share the contact details but carry distinct IDs. The
//! ticket's QR payload is the document ID.

use crate::document::{DocumentId, PendingKey, RecordKey};
use crate::record::{Record, timestamp_value};
use crate::remote::{FieldValue, Fields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Name of the creation timestamp field.
pub const CREATED_AT: &str = "createdAt";
/// Name of the last-modification timestamp field (display order key).
pub const UPDATED_AT: &str = "updatedAt";
/// Name of the verification flag field.
pub const VERIFIED: &str = "verified";
/// Name of the verification timestamp field.
pub const VERIFIED_AT: &str = "verifiedAt";
/// Name of the send counter field.
pub const SENT: &str = "sent";
/// Name of the last-send timestamp field.
pub const SENT_AT: &str = "sentAt";

/// Send counter value for tickets that were never sent.
pub const NOT_SENT: i32 = -1;

const fn not_sent() -> i32 {
    NOT_SENT
}

/// A customer holding one ticket.
///
/// # Invariants
///
/// - `verified_at` is present iff `verified` is true
/// - `sent_at` is present iff `sent > 0`
///
/// Both pairs are only changed together through [`Customer::set_verified`],
/// [`Customer::set_sent`] or a [`CustomerPatch`]. Decoding restores them for
/// documents that carry a flag without its timestamp, and rejects the
/// document when no server timestamp can stand in.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredCustomer")]
pub struct Customer {
    /// Document ID, absent until the first write completes
    #[serde(default, skip_serializing)]
    pub id: Option<DocumentId>,
    #[serde(skip)]
    pending_key: PendingKey,
    /// Server-assigned creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Server-assigned modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Customer name
    #[serde(default)]
    pub name: String,
    /// Phone number (free text)
    #[serde(default)]
    pub phone: String,
    /// Email address (free text)
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verified_at: Option<DateTime<Utc>>,
    #[serde(default = "not_sent")]
    sent: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sent_at: Option<DateTime<Utc>>,
}

/// A customer document exactly as stored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCustomer {
    #[serde(default)]
    id: Option<DocumentId>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    verified_at: Option<DateTime<Utc>>,
    #[serde(default = "not_sent")]
    sent: i32,
    #[serde(default)]
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<StoredCustomer> for Customer {
    type Error = String;

    fn try_from(stored: StoredCustomer) -> Result<Self, Self::Error> {
        // Older writers set `verified`/`sent` without the matching stamp;
        // the last server timestamp is the closest known time.
        let fallback = stored.updated_at.or(stored.created_at);
        let verified_at = if stored.verified {
            Some(stored.verified_at.or(fallback).ok_or("verified ticket has no verifiedAt")?)
        } else {
            None
        };
        let sent_at = if stored.sent > 0 {
            Some(stored.sent_at.or(fallback).ok_or("sent ticket has no sentAt")?)
        } else {
            None
        };

        Ok(Self {
            id: stored.id,
            pending_key: PendingKey::new(),
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            name: stored.name,
            phone: stored.phone,
            email: stored.email,
            verified: stored.verified,
            verified_at,
            sent: stored.sent,
            sent_at,
        })
    }
}

impl Default for Customer {
    fn default() -> Self {
        Self {
            id: None,
            pending_key: PendingKey::new(),
            created_at: None,
            updated_at: None,
            name: String::new(),
            phone: String::new(),
            email: String::new(),
            verified: false,
            verified_at: None,
            sent: NOT_SENT,
            sent_at: None,
        }
    }
}

impl Customer {
    /// Creates an unsaved customer with the given contact details
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    /// Same customer under the given document ID
    #[must_use]
    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether the ticket has been checked in
    #[must_use]
    pub const fn verified(&self) -> bool {
        self.verified
    }

    /// When the ticket was checked in
    #[must_use]
    pub const fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.verified_at
    }

    /// Number of send attempts, [`NOT_SENT`] if never attempted
    #[must_use]
    pub const fn sent(&self) -> i32 {
        self.sent
    }

    /// When the ticket was last sent
    #[must_use]
    pub const fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    /// Flip the verification flag, stamping or clearing `verified_at`.
    ///
    /// Setting the flag to its current value changes nothing.
    pub fn set_verified(&mut self, verified: bool, now: DateTime<Utc>) {
        if self.verified == verified {
            return;
        }
        self.verified = verified;
        self.verified_at = verified.then_some(now);
    }

    /// Change the send counter, stamping or clearing `sent_at`.
    pub fn set_sent(&mut self, sent: i32, now: DateTime<Utc>) {
        if self.sent == sent {
            return;
        }
        self.sent = sent;
        self.sent_at = (sent > 0).then_some(now);
    }

    /// Counter value after one more send attempt
    #[must_use]
    pub const fn next_send_count(&self) -> i32 {
        if self.sent < 0 { 1 } else { self.sent + 1 }
    }

    /// Display order: `updated_at` descending, unacknowledged records first.
    #[must_use]
    pub fn display_order(a: &Self, b: &Self) -> Ordering {
        match (a.updated_at, b.updated_at) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => y.cmp(&x),
        }
    }
}

impl PartialEq for Customer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
            && self.name == other.name
            && self.phone == other.phone
            && self.email == other.email
            && self.verified == other.verified
            && self.verified_at == other.verified_at
            && self.sent == other.sent
            && self.sent_at == other.sent_at
    }
}

impl Eq for Customer {}

impl Hash for Customer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Record for Customer {
    const SERVER_TIMESTAMPS: &'static [&'static str] = &[CREATED_AT, UPDATED_AT];

    fn id(&self) -> Option<&DocumentId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: DocumentId) {
        self.id = Some(id);
    }

    fn key(&self) -> RecordKey {
        self.id
            .clone()
            .map_or(RecordKey::Pending(self.pending_key), RecordKey::Assigned)
    }
}

/// Typed partial update of a [`Customer`].
///
/// Only the fields that may change after creation are expressible, and the
/// timestamp that belongs to a flag is always written together with it.
/// Every patch also refreshes `updatedAt` with the server time.
///
/// # Examples
///
/// ```
/// use ticketdesk_core::customer::CustomerPatch;
/// use chrono::Utc;
///
/// let fields = CustomerPatch::new().verified(true).into_fields(Utc::now());
/// assert!(fields.contains_key("verifiedAt"));
/// assert!(fields.contains_key("updatedAt"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerPatch {
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    verified: Option<bool>,
    sent: Option<i32>,
}

impl CustomerPatch {
    /// Create an empty patch (only refreshes `updatedAt`)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Change the phone number
    #[must_use]
    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Change the email address
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the verification flag (and its timestamp)
    #[must_use]
    pub const fn verified(mut self, verified: bool) -> Self {
        self.verified = Some(verified);
        self
    }

    /// Set the send counter (and its timestamp)
    #[must_use]
    pub const fn sent(mut self, sent: i32) -> Self {
        self.sent = Some(sent);
        self
    }

    /// Drop flag changes `current` already has.
    ///
    /// A flag is stamped only on a real transition, so re-verifying a
    /// checked-in ticket must not move its `verifiedAt`.
    #[must_use]
    pub fn relative_to(mut self, current: &Customer) -> Self {
        if self.verified == Some(current.verified) {
            self.verified = None;
        }
        if self.sent == Some(current.sent) {
            self.sent = None;
        }
        self
    }

    /// Whether the patch changes any field besides `updatedAt`
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.verified.is_none()
            && self.sent.is_none()
    }

    /// Apply the patch to a local copy, as the store will after commit.
    pub fn apply_to(&self, customer: &mut Customer, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            customer.name.clone_from(name);
        }
        if let Some(phone) = &self.phone {
            customer.phone.clone_from(phone);
        }
        if let Some(email) = &self.email {
            customer.email.clone_from(email);
        }
        if let Some(verified) = self.verified {
            customer.set_verified(verified, now);
        }
        if let Some(sent) = self.sent {
            customer.set_sent(sent, now);
        }
        customer.updated_at = Some(now);
    }

    /// Field map for a partial update stamped at `now`.
    ///
    /// Flags are written unconditionally; narrow the patch with
    /// [`CustomerPatch::relative_to`] first when the stored state is known.
    #[must_use]
    pub fn into_fields(self, now: DateTime<Utc>) -> Fields {
        let mut fields = Fields::new();
        if let Some(name) = self.name {
            fields.insert("name".to_string(), FieldValue::Value(Value::String(name)));
        }
        if let Some(phone) = self.phone {
            fields.insert("phone".to_string(), FieldValue::Value(Value::String(phone)));
        }
        if let Some(email) = self.email {
            fields.insert("email".to_string(), FieldValue::Value(Value::String(email)));
        }
        if let Some(verified) = self.verified {
            fields.insert(VERIFIED.to_string(), FieldValue::Value(Value::Bool(verified)));
            let stamp = if verified {
                FieldValue::Value(timestamp_value(now))
            } else {
                FieldValue::Delete
            };
            fields.insert(VERIFIED_AT.to_string(), stamp);
        }
        if let Some(sent) = self.sent {
            fields.insert(SENT.to_string(), FieldValue::Value(Value::from(sent)));
            let stamp = if sent > 0 {
                FieldValue::Value(timestamp_value(now))
            } else {
                FieldValue::Delete
            };
            fields.insert(SENT_AT.to_string(), stamp);
        }
        fields.insert(UPDATED_AT.to_string(), FieldValue::ServerTimestamp);
        fields
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    #[test]
    fn default_is_unsent_and_unverified() {
        let customer = Customer::default();
        assert_eq!(customer.sent(), NOT_SENT);
        assert!(!customer.verified());
        assert!(customer.key().is_pending());
    }

    #[test]
    fn verification_stamps_and_clears() {
        let mut customer = Customer::new("Ann", "0912345678", "ann@example.com");
        customer.set_verified(true, at(10));
        assert_eq!(customer.verified_at(), Some(at(10)));

        // No transition, no new stamp
        customer.set_verified(true, at(20));
        assert_eq!(customer.verified_at(), Some(at(10)));

        customer.set_verified(false, at(30));
        assert_eq!(customer.verified_at(), None);
    }

    #[test]
    fn zero_sends_carry_no_timestamp() {
        let mut customer = Customer::default();
        customer.set_sent(0, at(5));
        assert_eq!(customer.sent_at(), None);
        customer.set_sent(2, at(6));
        assert_eq!(customer.sent_at(), Some(at(6)));
    }

    #[test]
    fn next_send_count_starts_at_one() {
        let mut customer = Customer::default();
        assert_eq!(customer.next_send_count(), 1);
        customer.set_sent(3, at(1));
        assert_eq!(customer.next_send_count(), 4);
    }

    #[test]
    fn display_order_puts_pending_first_then_newest() {
        let mut old = Customer::default();
        old.updated_at = Some(at(1));
        let mut new = Customer::default();
        new.updated_at = Some(at(2));
        let pending = Customer::default();

        let mut list = vec![old.clone(), pending.clone(), new.clone()];
        list.sort_by(Customer::display_order);
        assert_eq!(list, vec![pending, new, old]);
    }

    #[test]
    fn equality_ignores_pending_key() {
        assert_eq!(Customer::default(), Customer::default());
        assert_ne!(Customer::default().key(), Customer::default().key());
    }

    #[test]
    fn encode_leaves_id_out_and_requests_server_timestamps() {
        let customer = Customer::new("Ann", "", "").with_id(DocumentId::new("a1"));
        let fields = customer.to_fields().unwrap_or_default();

        assert!(!fields.contains_key("id"));
        assert_eq!(fields.get(CREATED_AT), Some(&FieldValue::ServerTimestamp));
        assert_eq!(fields.get(UPDATED_AT), Some(&FieldValue::ServerTimestamp));
        assert_eq!(fields.get(SENT), Some(&FieldValue::Value(Value::from(-1))));
    }

    #[test]
    fn unverify_patch_deletes_timestamp() {
        let fields = CustomerPatch::new().verified(false).into_fields(at(1));
        assert_eq!(fields.get(VERIFIED_AT), Some(&FieldValue::Delete));
    }

    fn decode(fields: serde_json::Value) -> Result<Customer, serde_json::Error> {
        let serde_json::Value::Object(fields) = fields else {
            panic!("fixture must be an object");
        };
        crate::record::decode_document(crate::remote::RawDocument::new(DocumentId::new("x"), fields))
    }

    #[test]
    fn decoding_restores_missing_flag_stamps() {
        let customer = decode(serde_json::json!({
            "name": "Ann",
            "verified": true,
            "sent": 3,
            "updatedAt": "2024-05-01T10:00:00Z",
        }))
        .unwrap();

        let stamp = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single();
        assert_eq!(customer.verified_at(), stamp);
        assert_eq!(customer.sent_at(), stamp);
    }

    #[test]
    fn decoding_clears_stamps_without_their_flag() {
        let customer = decode(serde_json::json!({
            "name": "Ann",
            "verified": false,
            "verifiedAt": "2024-05-01T10:00:00Z",
            "sent": 0,
            "sentAt": "2024-05-01T10:00:00Z",
        }))
        .unwrap();

        assert_eq!(customer.verified_at(), None);
        assert_eq!(customer.sent_at(), None);
    }

    #[test]
    fn decoding_rejects_flags_with_no_time_at_all() {
        assert!(decode(serde_json::json!({ "name": "Ann", "verified": true })).is_err());
        assert!(decode(serde_json::json!({ "name": "Ann", "sent": 2 })).is_err());
    }

    #[test]
    fn relative_patch_skips_flags_already_set() {
        let mut current = Customer::default();
        current.set_verified(true, at(1));

        let fields = CustomerPatch::new().verified(true).relative_to(&current).into_fields(at(2));
        assert!(!fields.contains_key(VERIFIED));
        assert!(!fields.contains_key(VERIFIED_AT));
        assert!(fields.contains_key(UPDATED_AT));

        let fields = CustomerPatch::new().verified(false).relative_to(&current).into_fields(at(2));
        assert_eq!(fields.get(VERIFIED_AT), Some(&FieldValue::Delete));
    }

    proptest! {
        #[test]
        fn patches_keep_flag_and_stamp_together(verified in any::<bool>(), sent in -1_i32..50) {
            let mut customer = Customer::default();
            let patch = CustomerPatch::new().verified(verified).sent(sent);
            patch.apply_to(&mut customer, at(100));
            prop_assert_eq!(customer.verified(), customer.verified_at().is_some());
            prop_assert_eq!(customer.sent() > 0, customer.sent_at().is_some());

            let fields = patch.into_fields(at(100));
            let verified_stamp = matches!(fields.get(VERIFIED_AT), Some(FieldValue::Value(_)));
            let sent_stamp = matches!(fields.get(SENT_AT), Some(FieldValue::Value(_)));
            prop_assert_eq!(verified_stamp, verified);
            prop_assert_eq!(sent_stamp, sent > 0);
        }
    }
}
