//! Event envelope types.
//!
//! An envelope is the immutable unit of work read off the broker. Its fields are
//! private and only exposed through accessors, so nothing downstream of the consumer
//! can alter an envelope once it has been decoded.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Event type given to envelopes synthesised from undecodable broker messages.
pub const UNDECODABLE_EVENT_TYPE: &str = "UNDECODABLE";

/// Entity type given to envelopes synthesised from undecodable broker messages.
pub const UNKNOWN_ENTITY_TYPE: &str = "UNKNOWN";

/// A domain or change-data-capture event as produced upstream.
///
/// # Wire format
///
/// ```json
/// {
///   "eventType": "UPDATE",
///   "entityId": "42",
///   "entityType": "Order",
///   "payload": { "status": "SHIPPED" },
///   "createdAt": "2024-05-01T12:00:00Z"
/// }
/// ```
///
/// `createdAt` may also be an integer number of milliseconds since the Unix epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    event_type: String,
    entity_id: String,
    entity_type: String,
    #[serde(default)]
    payload: Value,
    #[serde(deserialize_with = "deserialize_timestamp")]
    created_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Create a new envelope.
    ///
    /// # Example
    ///
    /// ```
    /// use event_indexer_shared::EventEnvelope;
    /// use chrono::Utc;
    /// use serde_json::json;
    ///
    /// let envelope = EventEnvelope::new(
    ///     "UPDATE",
    ///     "42",
    ///     "Order",
    ///     json!({ "status": "SHIPPED" }),
    ///     Utc::now(),
    /// );
    /// assert_eq!(envelope.entity_id(), "42");
    /// ```
    pub fn new(
        event_type: impl Into<String>,
        entity_id: impl Into<String>,
        entity_type: impl Into<String>,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            payload,
            created_at,
        }
    }

    /// Build a placeholder envelope for a broker message that could not be decoded.
    ///
    /// The raw bytes are kept (lossily, as UTF-8 text) in the payload so the message
    /// can still be routed to the dead-letter channel and inspected later.
    pub fn undecodable(key: Option<&[u8]>, raw: &[u8], received_at: DateTime<Utc>) -> Self {
        let entity_id = key
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default();

        Self {
            event_type: UNDECODABLE_EVENT_TYPE.to_string(),
            entity_id,
            entity_type: UNKNOWN_ENTITY_TYPE.to_string(),
            payload: Value::String(String::from_utf8_lossy(raw).into_owned()),
            created_at: received_at,
        }
    }

    /// Decode an envelope from a JSON message body.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// The event discriminator (e.g. CREATE, UPDATE, DELETE).
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The target key in the index.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The logical category of the entity.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The producer-owned payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Producer-assigned creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Accepts RFC 3339 text or integer epoch milliseconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(millis) => Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", millis))),
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| serde::de::Error::custom(format!("invalid createdAt '{}': {}", text, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_rfc3339_envelope() {
        let body = br#"{
            "eventType": "UPDATE",
            "entityId": "42",
            "entityType": "Order",
            "payload": {"status": "SHIPPED"},
            "createdAt": "2024-05-01T12:00:00Z"
        }"#;

        let envelope = EventEnvelope::from_json(body).unwrap();

        assert_eq!(envelope.event_type(), "UPDATE");
        assert_eq!(envelope.entity_id(), "42");
        assert_eq!(envelope.entity_type(), "Order");
        assert_eq!(envelope.payload(), &json!({"status": "SHIPPED"}));
        assert_eq!(envelope.created_at().to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_decode_epoch_millis() {
        let body = br#"{
            "eventType": "CREATE",
            "entityId": "7",
            "entityType": "Customer",
            "payload": {},
            "createdAt": 1714564800000
        }"#;

        let envelope = EventEnvelope::from_json(body).unwrap();
        assert_eq!(envelope.created_at().timestamp_millis(), 1_714_564_800_000);
    }

    #[test]
    fn test_missing_payload_defaults_to_null() {
        let body = br#"{
            "eventType": "DELETE",
            "entityId": "7",
            "entityType": "Customer",
            "createdAt": "2024-05-01T12:00:00Z"
        }"#;

        let envelope = EventEnvelope::from_json(body).unwrap();
        assert!(envelope.payload().is_null());
    }

    #[test]
    fn test_missing_entity_id_is_rejected() {
        let body = br#"{
            "eventType": "DELETE",
            "entityType": "Customer",
            "createdAt": "2024-05-01T12:00:00Z"
        }"#;

        assert!(EventEnvelope::from_json(body).is_err());
    }

    #[test]
    fn test_invalid_timestamp_is_rejected() {
        let body = br#"{
            "eventType": "DELETE",
            "entityId": "1",
            "entityType": "Customer",
            "createdAt": "yesterday"
        }"#;

        assert!(EventEnvelope::from_json(body).is_err());
    }

    #[test]
    fn test_undecodable_keeps_raw_bytes() {
        let received_at = Utc::now();
        let envelope = EventEnvelope::undecodable(Some(b"order-9"), b"\x00garbage", received_at);

        assert_eq!(envelope.event_type(), UNDECODABLE_EVENT_TYPE);
        assert_eq!(envelope.entity_type(), UNKNOWN_ENTITY_TYPE);
        assert_eq!(envelope.entity_id(), "order-9");
        assert!(envelope.payload().as_str().unwrap().contains("garbage"));
        assert_eq!(envelope.created_at(), received_at);
    }

    #[test]
    fn test_serializes_camel_case() {
        let envelope = EventEnvelope::new("CREATE", "1", "Product", json!({"sku": "A"}), Utc::now());
        let value = serde_json::to_value(&envelope).unwrap();

        assert!(value.get("eventType").is_some());
        assert!(value.get("entityId").is_some());
        assert!(value.get("entityType").is_some());
        assert!(value.get("createdAt").is_some());
    }
}
