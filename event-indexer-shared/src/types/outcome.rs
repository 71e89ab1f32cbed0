//! Outcome record types.
//!
//! Outcome records are observability state: they describe how an envelope reached
//! its terminal state. The index (for applied events) and the dead-letter channel
//! (for failed ones) remain the systems of record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::event_envelope::EventEnvelope;

/// Terminal classification of an envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeState {
    /// The envelope was applied to the index (or intentionally skipped).
    Processed,
    /// The envelope was published to the dead-letter channel.
    DeadLettered,
}

/// The recorded outcome of one envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub envelope: EventEnvelope,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub classified_at: DateTime<Utc>,
    pub state: OutcomeState,
}

impl OutcomeRecord {
    /// Record for an envelope that reached the index.
    pub fn processed(envelope: EventEnvelope, attempts: u32) -> Self {
        Self {
            envelope,
            attempts,
            last_error: None,
            classified_at: Utc::now(),
            state: OutcomeState::Processed,
        }
    }

    /// Record for an envelope that was dead-lettered.
    pub fn dead_lettered(envelope: EventEnvelope, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            envelope,
            attempts,
            last_error: Some(reason.into()),
            classified_at: Utc::now(),
            state: OutcomeState::DeadLettered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> EventEnvelope {
        EventEnvelope::new("UPDATE", "42", "Order", json!({"status": "SHIPPED"}), Utc::now())
    }

    #[test]
    fn test_processed_record() {
        let record = OutcomeRecord::processed(envelope(), 2);
        assert_eq!(record.state, OutcomeState::Processed);
        assert_eq!(record.attempts, 2);
        assert!(record.last_error.is_none());
    }

    #[test]
    fn test_dead_lettered_record() {
        let record = OutcomeRecord::dead_lettered(envelope(), "boom", 5);
        assert_eq!(record.state, OutcomeState::DeadLettered);
        assert_eq!(record.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_state_serialization() {
        let value = serde_json::to_value(OutcomeRecord::dead_lettered(envelope(), "x", 1)).unwrap();
        assert_eq!(value["state"], "DEAD_LETTERED");
        assert_eq!(value["lastError"], "x");
        assert_eq!(value["envelope"]["entityId"], "42");
    }
}
