//! This module defines the core data structures and types used across the event indexer.
//! It re-exports the envelope, document and outcome types.

pub mod dead_letter;
pub mod event_envelope;
pub mod index_document;
pub mod outcome;

pub use dead_letter::DeadLetterRecord;
pub use event_envelope::EventEnvelope;
pub use index_document::{DocumentKey, IndexDocument};
pub use outcome::{OutcomeRecord, OutcomeState};
