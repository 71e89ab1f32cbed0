//! # Event Indexer Shared
//!
//! This crate defines shared data structures used across the event indexer ecosystem:
//! the immutable event envelope read off the broker, the document written to the
//! search index, and the outcome/dead-letter records produced by the consumer loop.

pub mod types;

pub use types::dead_letter::DeadLetterRecord;
pub use types::event_envelope::{EventEnvelope, UNDECODABLE_EVENT_TYPE, UNKNOWN_ENTITY_TYPE};
pub use types::index_document::{DocumentKey, IndexDocument};
pub use types::outcome::{OutcomeRecord, OutcomeState};
