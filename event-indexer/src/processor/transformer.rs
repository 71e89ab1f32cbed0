//! Event transformer implementation.
//!
//! Maps an event envelope to the index mutation it implies. The mapping is a
//! pure function of the envelope: no I/O and no clock reads, so a replayed
//! envelope always produces the same mutation.

use event_indexer_shared::{DocumentKey, EventEnvelope, IndexDocument};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::errors::TransformError;

/// Entity types with indexing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Order,
    Customer,
    Product,
    Payment,
    Shipment,
}

impl EntityKind {
    /// Every entity kind with an index.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Order,
        EntityKind::Customer,
        EntityKind::Product,
        EntityKind::Payment,
        EntityKind::Shipment,
    ];

    /// Parse an envelope `entityType`, case-insensitively, singular or plural.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "order" | "orders" => Some(Self::Order),
            "customer" | "customers" => Some(Self::Customer),
            "product" | "products" => Some(Self::Product),
            "payment" | "payments" => Some(Self::Payment),
            "shipment" | "shipments" => Some(Self::Shipment),
            _ => None,
        }
    }

    /// Canonical name, used as the document's entity type and index name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Customer => "customer",
            Self::Product => "product",
            Self::Payment => "payment",
            Self::Shipment => "shipment",
        }
    }
}

/// Event kinds with indexing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    /// Parse an envelope `eventType`. Accepts domain-event and CDC spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREATE" | "CREATED" | "INSERT" | "C" => Some(Self::Create),
            "UPDATE" | "UPDATED" | "UPSERT" | "U" => Some(Self::Update),
            "DELETE" | "DELETED" | "REMOVE" | "D" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// The index change an envelope implies.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexMutation {
    /// Insert or replace the document.
    Upsert {
        key: DocumentKey,
        document: IndexDocument,
    },
    /// Remove the document.
    Delete { key: DocumentKey },
    /// Nothing to do for this envelope.
    Skip,
}

/// Transformer from event envelopes to index mutations.
#[derive(Debug, Clone, Default)]
pub struct EventTransformer;

impl EventTransformer {
    /// Create a new transformer.
    pub fn new() -> Self {
        Self
    }

    /// Map an envelope to its index mutation.
    ///
    /// Unknown entity or event types are skipped. A recognised envelope whose
    /// payload cannot be interpreted is a [`TransformError`].
    #[instrument(skip(self, envelope), fields(entity_type = %envelope.entity_type(), event_type = %envelope.event_type()))]
    pub fn transform(&self, envelope: &EventEnvelope) -> Result<IndexMutation, TransformError> {
        let (Some(entity), Some(event)) = (
            EntityKind::parse(envelope.entity_type()),
            EventKind::parse(envelope.event_type()),
        ) else {
            debug!("No indexing rule for envelope, skipping");
            return Ok(IndexMutation::Skip);
        };

        if envelope.entity_id().trim().is_empty() {
            return Err(TransformError::MissingEntityId);
        }
        let key = DocumentKey::new(entity.as_str(), envelope.entity_id());

        match (entity, event) {
            (_, EventKind::Delete) => Ok(IndexMutation::Delete { key }),
            (EntityKind::Order | EntityKind::Payment, EventKind::Create | EventKind::Update) => {
                let data = payload_object(envelope.payload())?;
                require_string_field(&data, "status")?;
                Ok(upsert(key, entity, event, envelope, data))
            }
            (
                EntityKind::Customer | EntityKind::Product | EntityKind::Shipment,
                EventKind::Create | EventKind::Update,
            ) => {
                let data = payload_object(envelope.payload())?;
                Ok(upsert(key, entity, event, envelope, data))
            }
        }
    }
}

fn upsert(
    key: DocumentKey,
    entity: EntityKind,
    event: EventKind,
    envelope: &EventEnvelope,
    data: Map<String, Value>,
) -> IndexMutation {
    let document = IndexDocument::new(
        envelope.entity_id(),
        entity.as_str(),
        event.as_str(),
        envelope.created_at(),
        data,
    );
    IndexMutation::Upsert { key, document }
}

/// The payload as a JSON object. String payloads are decoded once more, since
/// some producers double-encode.
fn payload_object(payload: &Value) -> Result<Map<String, Value>, TransformError> {
    match payload {
        Value::Object(map) => Ok(map.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(TransformError::malformed(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            ))),
            Err(e) => Err(TransformError::malformed(format!(
                "payload string is not JSON: {}",
                e
            ))),
        },
        other => Err(TransformError::malformed(format!(
            "expected a JSON object, got {}",
            json_type(other)
        ))),
    }
}

/// An optional field that must be a string when present.
fn require_string_field(data: &Map<String, Value>, field: &str) -> Result<(), TransformError> {
    match data.get(field) {
        None | Some(Value::String(_)) => Ok(()),
        Some(other) => Err(TransformError::invalid_field(
            field,
            format!("expected a string, got {}", json_type(other)),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn envelope(event_type: &str, entity_type: &str, payload: Value) -> EventEnvelope {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        EventEnvelope::new(event_type, "42", entity_type, payload, created_at)
    }

    #[test]
    fn test_update_order_upserts() {
        let transformer = EventTransformer::new();
        let mutation = transformer
            .transform(&envelope("UPDATE", "Order", json!({"status": "SHIPPED"})))
            .unwrap();

        match mutation {
            IndexMutation::Upsert { key, document } => {
                assert_eq!(key, DocumentKey::new("order", "42"));
                assert_eq!(document.entity_id, "42");
                assert_eq!(document.event_type, "update");
                assert_eq!(document.data["status"], "SHIPPED");
                assert_eq!(document.updated_at, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
            }
            other => panic!("unexpected mutation: {:?}", other),
        }
    }

    #[test]
    fn test_transform_is_deterministic() {
        let transformer = EventTransformer::new();
        let e = envelope("CREATE", "customers", json!({"name": "Ada"}));
        assert_eq!(transformer.transform(&e).unwrap(), transformer.transform(&e).unwrap());
    }

    #[test]
    fn test_delete_maps_to_delete() {
        let transformer = EventTransformer::new();
        for spelling in ["DELETE", "deleted", "REMOVE", "d"] {
            let mutation = transformer
                .transform(&envelope(spelling, "Product", Value::Null))
                .unwrap();
            assert_eq!(
                mutation,
                IndexMutation::Delete {
                    key: DocumentKey::new("product", "42")
                }
            );
        }
    }

    #[test]
    fn test_cdc_spellings() {
        assert_eq!(EventKind::parse("c"), Some(EventKind::Create));
        assert_eq!(EventKind::parse("INSERT"), Some(EventKind::Create));
        assert_eq!(EventKind::parse("u"), Some(EventKind::Update));
        assert_eq!(EventKind::parse("Upsert"), Some(EventKind::Update));
        assert_eq!(EventKind::parse("ARCHIVE"), None);
    }

    #[test]
    fn test_unknown_kinds_are_skipped() {
        let transformer = EventTransformer::new();
        assert_eq!(
            transformer.transform(&envelope("UPDATE", "Invoice", json!({}))).unwrap(),
            IndexMutation::Skip
        );
        assert_eq!(
            transformer.transform(&envelope("ARCHIVED", "Order", json!({}))).unwrap(),
            IndexMutation::Skip
        );
    }

    #[test]
    fn test_string_payload_that_is_not_json() {
        let transformer = EventTransformer::new();
        let result = transformer.transform(&envelope("UPDATE", "Order", json!("not-json")));
        assert!(matches!(result, Err(TransformError::MalformedPayload(_))));
    }

    #[test]
    fn test_double_encoded_payload() {
        let transformer = EventTransformer::new();
        let mutation = transformer
            .transform(&envelope("UPDATE", "Order", json!("{\"status\":\"PAID\"}")))
            .unwrap();

        match mutation {
            IndexMutation::Upsert { document, .. } => assert_eq!(document.data["status"], "PAID"),
            other => panic!("unexpected mutation: {:?}", other),
        }
    }

    #[test]
    fn test_non_object_payload_is_malformed() {
        let transformer = EventTransformer::new();
        for payload in [json!([1, 2]), json!(7), Value::Null] {
            let result = transformer.transform(&envelope("CREATE", "Shipment", payload));
            assert!(matches!(result, Err(TransformError::MalformedPayload(_))));
        }
    }

    #[test]
    fn test_status_must_be_string() {
        let transformer = EventTransformer::new();
        let result = transformer.transform(&envelope("UPDATE", "Payment", json!({"status": 3})));
        assert!(matches!(result, Err(TransformError::InvalidField { .. })));

        // Other entities don't constrain `status`.
        let result = transformer.transform(&envelope("UPDATE", "Shipment", json!({"status": 3})));
        assert!(result.is_ok());
    }

    #[test]
    fn test_blank_entity_id() {
        let transformer = EventTransformer::new();
        let e = EventEnvelope::new("DELETE", " ", "Order", Value::Null, Utc::now());
        assert_eq!(transformer.transform(&e), Err(TransformError::MissingEntityId));
    }
}
