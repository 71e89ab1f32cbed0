//! Dead-letter message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::event_envelope::EventEnvelope;

/// A message published to the dead-letter channel.
///
/// Carries the original envelope untouched together with why and after how many
/// attempts it was given up on. The `id` lets a reconciliation job deduplicate
/// records that were published more than once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub id: Uuid,
    pub envelope: EventEnvelope,
    pub reason: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    /// Create a new dead-letter record stamped with the current time.
    pub fn new(envelope: EventEnvelope, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            envelope,
            reason: reason.into(),
            attempts,
            failed_at: Utc::now(),
        }
    }

    /// Serialize the record to its JSON wire format.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let envelope = EventEnvelope::new("UPDATE", "42", "Order", json!("not-json"), Utc::now());
        let record = DeadLetterRecord::new(envelope, "malformed payload", 1);

        let value: serde_json::Value = serde_json::from_slice(&record.to_json().unwrap()).unwrap();

        assert_eq!(value["reason"], "malformed payload");
        assert_eq!(value["attempts"], 1);
        assert!(value["failedAt"].is_string());
        assert_eq!(value["envelope"]["entityId"], "42");
        assert_eq!(value["envelope"]["payload"], "not-json");
    }
}
