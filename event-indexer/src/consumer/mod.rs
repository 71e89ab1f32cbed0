//! Consumer module for the event indexer.
//!
//! Provides Kafka consumer functionality for receiving event envelopes.

mod flow;
mod kafka_consumer;
mod messages;

pub use flow::{FlowChange, InFlight, DEFAULT_MAX_IN_FLIGHT};
pub use kafka_consumer::{decode_message, KafkaConsumer};
pub use messages::{Acknowledgment, PartitionOffset, StreamMessage};
