//! Dead-letter sink for the event indexer.
//!
//! Envelopes that cannot be applied are published to a durable side channel
//! together with the reason and attempt count, for later reconciliation.

mod kafka_sink;

use async_trait::async_trait;
use event_indexer_shared::DeadLetterRecord;

use crate::errors::DeadLetterError;

pub use kafka_sink::{dead_letter_topic_for, KafkaDeadLetterSink};

/// Durable destination for envelopes that reached a terminal failure.
///
/// `publish` returns only once the record is durable. Callers never advance
/// past an envelope before its dead-letter record is published.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Publish a dead-letter record.
    async fn publish(&self, record: &DeadLetterRecord) -> Result<(), DeadLetterError>;
}
