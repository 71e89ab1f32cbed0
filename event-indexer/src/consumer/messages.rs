//! Message types for the consumer.
//!
//! Defines what flows from the consumer to the orchestrator and back.

use event_indexer_shared::EventEnvelope;

/// Position of a message in the broker log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl PartitionOffset {
    /// Create a new position.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }

    /// Topic and partition, the unit of ordering.
    pub fn partition_key(&self) -> (String, i32) {
        (self.topic.clone(), self.partition)
    }
}

/// Messages sent from the consumer to the orchestrator.
#[derive(Debug)]
pub enum StreamMessage {
    /// A decoded envelope.
    Envelope {
        envelope: EventEnvelope,
        position: PartitionOffset,
    },
    /// A message that could not be decoded, wrapped in a placeholder envelope.
    Malformed {
        envelope: EventEnvelope,
        reason: String,
        position: PartitionOffset,
    },
    /// A message without a payload. Nothing to index, but its offset still counts.
    Tombstone { position: PartitionOffset },
    /// Stream has ended.
    End,
    /// An error occurred.
    Error(String),
}

impl StreamMessage {
    /// The broker position this message came from, if any.
    pub fn position(&self) -> Option<&PartitionOffset> {
        match self {
            Self::Envelope { position, .. }
            | Self::Malformed { position, .. }
            | Self::Tombstone { position } => Some(position),
            Self::End | Self::Error(_) => None,
        }
    }
}

/// Sent back to the consumer once the message at `position` reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgment {
    pub position: PartitionOffset,
}

impl Acknowledgment {
    pub fn new(position: PartitionOffset) -> Self {
        Self { position }
    }
}
