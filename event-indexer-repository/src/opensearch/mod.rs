//! OpenSearch implementation of the indexing client.

mod client;
mod index_config;

pub use client::OpenSearchIndexingClient;
pub use index_config::{get_index_settings, IndexConfig, MAX_DOCUMENT_ID_BYTES};
