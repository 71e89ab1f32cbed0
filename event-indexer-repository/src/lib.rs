//! # Event Indexer Repository
//!
//! This crate provides the indexing client used by the event indexer: a trait
//! describing the upsert/delete/get capabilities of a search engine, a unified
//! error type that classifies failures as transient or permanent, and a concrete
//! implementation for OpenSearch.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod utils;

pub use config::IndexingClientConfig;
pub use errors::{IndexError, IndexErrorKind};
pub use interfaces::IndexingClient;
pub use opensearch::{IndexConfig, OpenSearchIndexingClient};
pub use utils::validate_document_key;
