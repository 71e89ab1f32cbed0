//! # Event Indexer
//!
//! Consumes domain events from Kafka, applies them to OpenSearch and routes
//! events that cannot be applied to a dead-letter topic.
//!
//! ## Architecture
//!
//! The indexer follows the Consumer-Processor-Loader pattern:
//!
//! 1. **Consumer**: Receives event envelopes from Kafka and commits offsets
//! 2. **Processor**: Transforms envelopes into index mutations
//! 3. **Loader**: Applies mutations to OpenSearch under a bounded timeout
//! 4. **Orchestrator**: Runs one sequential worker per partition, with retries
//!    and dead-lettering
//!
//! Terminal outcomes are kept in a bounded [`outcome::OutcomeTracker`] and
//! served over HTTP by [`api`].
//!
//! ## Modules
//!
//! - [`api`]: Read API for processed and dead-lettered events
//! - [`config`]: Settings and dependency initialization
//! - [`consumer`]: Kafka consumer for event envelopes
//! - [`dead_letter`]: Durable sink for envelopes that cannot be applied
//! - [`processor`]: Transforms envelopes into index mutations
//! - [`loader`]: Applies mutations to the index
//! - [`orchestrator`]: Coordinates the ingest flow
//! - [`outcome`]: Bounded record of recent outcomes
//! - [`errors`]: Error types for the indexer

pub mod api;
pub mod config;
pub mod consumer;
pub mod dead_letter;
pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod outcome;
pub mod processor;

pub use config::{Dependencies, IndexerSettings};
pub use errors::IngestError;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use outcome::OutcomeTracker;

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] IngestError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
