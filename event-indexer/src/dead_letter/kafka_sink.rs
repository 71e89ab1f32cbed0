//! Kafka-backed dead-letter sink.

use async_trait::async_trait;
use event_indexer_kafka::{create_dead_letter_producer, FutureRecord, Header, KafkaClientConfig, OwnedHeaders};
use event_indexer_shared::DeadLetterRecord;
use rdkafka::producer::FutureProducer;
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::dead_letter::DeadLetterSink;
use crate::errors::{DeadLetterError, IngestError};

/// Header carrying the failure reason.
pub const REASON_HEADER: &str = "dead-letter-reason";

/// Header carrying the number of attempts made.
pub const ATTEMPTS_HEADER: &str = "dead-letter-attempts";

/// How long to wait for the broker to acknowledge a record.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Dead-letter topic paired with a source topic.
pub fn dead_letter_topic_for(source_topic: &str) -> String {
    format!("{}.dlq", source_topic)
}

/// Publishes dead-letter records to a Kafka topic.
///
/// Records are keyed by entity id so that all failures for one entity land on
/// the same partition, in order.
pub struct KafkaDeadLetterSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaDeadLetterSink {
    /// Create a sink publishing to `topic`.
    pub fn new(config: &KafkaClientConfig, topic: impl Into<String>) -> Result<Self, IngestError> {
        let producer =
            create_dead_letter_producer(config).map_err(|e| IngestError::kafka(e.to_string()))?;
        let topic = topic.into();

        info!(topic = %topic, "Created Kafka dead-letter producer");

        Ok(Self { producer, topic })
    }
}

fn record_headers(record: &DeadLetterRecord) -> OwnedHeaders {
    let attempts = record.attempts.to_string();
    OwnedHeaders::new()
        .insert(Header {
            key: REASON_HEADER,
            value: Some(record.reason.as_str()),
        })
        .insert(Header {
            key: ATTEMPTS_HEADER,
            value: Some(attempts.as_str()),
        })
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterSink {
    #[instrument(skip(self, record), fields(entity_id = %record.envelope.entity_id(), attempts = record.attempts))]
    async fn publish(&self, record: &DeadLetterRecord) -> Result<(), DeadLetterError> {
        let payload = record
            .to_json()
            .map_err(|e| DeadLetterError::serialization(e.to_string()))?;

        let kafka_record = FutureRecord::to(&self.topic)
            .key(record.envelope.entity_id())
            .payload(&payload)
            .headers(record_headers(record));

        match self.producer.send(kafka_record, Timeout::After(SEND_TIMEOUT)).await {
            Ok((partition, offset)) => {
                info!(
                    topic = %self.topic,
                    partition = partition,
                    offset = offset,
                    record_id = %record.id,
                    "Dead-letter record published"
                );
                Ok(())
            }
            Err((kafka_err, _)) => {
                error!(topic = %self.topic, error = %kafka_err, "Failed to publish dead-letter record");
                Err(DeadLetterError::publish(kafka_err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use event_indexer_shared::EventEnvelope;
    use rdkafka::message::Headers;
    use serde_json::json;

    #[test]
    fn test_dead_letter_topic() {
        assert_eq!(dead_letter_topic_for("domain.events"), "domain.events.dlq");
    }

    #[test]
    fn test_record_headers() {
        let envelope = EventEnvelope::new("UPDATE", "42", "Order", json!("not-json"), Utc::now());
        let record = DeadLetterRecord::new(envelope, "transform error: malformed payload", 1);

        let headers = record_headers(&record);

        assert_eq!(headers.count(), 2);
        let reason = headers.get(0);
        assert_eq!(reason.key, REASON_HEADER);
        assert_eq!(reason.value, Some("transform error: malformed payload".as_bytes()));
        let attempts = headers.get(1);
        assert_eq!(attempts.key, ATTEMPTS_HEADER);
        assert_eq!(attempts.value, Some("1".as_bytes()));
    }
}
