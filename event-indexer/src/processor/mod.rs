//! Processor module for the event indexer.
//!
//! Turns event envelopes into index mutations.

mod transformer;

pub use transformer::{EntityKind, EventKind, EventTransformer, IndexMutation};
