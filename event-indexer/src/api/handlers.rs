// HTTP request handlers
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use event_indexer_shared::OutcomeRecord;
use std::sync::Arc;
use tracing::debug;

use crate::outcome::OutcomeTracker;

/// Health check endpoint
pub async fn health_check(State(tracker): State<Arc<OutcomeTracker>>) -> impl IntoResponse {
    let counts = tracker.counts();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "processed": counts.processed,
            "errors": counts.errors,
        })),
    )
}

/// Snapshot of recently processed envelopes, oldest first.
pub async fn list_processed(State(tracker): State<Arc<OutcomeTracker>>) -> Json<Vec<OutcomeRecord>> {
    let records = tracker.list_processed();
    debug!(count = records.len(), "Serving processed events");
    Json(records)
}

/// Snapshot of recently dead-lettered envelopes, oldest first.
pub async fn list_errors(State(tracker): State<Arc<OutcomeTracker>>) -> Json<Vec<OutcomeRecord>> {
    let records = tracker.list_errors();
    debug!(count = records.len(), "Serving error events");
    Json(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use event_indexer_shared::{EventEnvelope, OutcomeState};
    use serde_json::json;

    fn envelope(id: &str) -> EventEnvelope {
        EventEnvelope::new("UPDATE", id, "Order", json!({"status": "SHIPPED"}), Utc::now())
    }

    #[tokio::test]
    async fn test_list_processed_returns_snapshot() {
        let tracker = Arc::new(OutcomeTracker::new(2, 2));
        tracker.record_processed(envelope("1"), 1);
        tracker.record_processed(envelope("2"), 1);
        tracker.record_processed(envelope("3"), 2);

        let Json(records) = list_processed(State(tracker)).await;

        let ids: Vec<&str> = records.iter().map(|r| r.envelope.entity_id()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert!(records.iter().all(|r| r.state == OutcomeState::Processed));
    }

    #[tokio::test]
    async fn test_list_errors_returns_dead_lettered() {
        let tracker = Arc::new(OutcomeTracker::default());
        tracker.record_processed(envelope("1"), 1);
        tracker.record_dead_lettered(envelope("42"), "malformed payload", 1);

        let Json(records) = list_errors(State(tracker)).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].envelope.entity_id(), "42");
        assert_eq!(records[0].attempts, 1);
        assert_eq!(records[0].last_error.as_deref(), Some("malformed payload"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let tracker = Arc::new(OutcomeTracker::default());
        let response = health_check(State(tracker)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
