//! Configuration types for the indexing client.

use std::time::Duration;

use crate::opensearch::IndexConfig;

/// Default time budget for a single request to the search engine.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`crate::OpenSearchIndexingClient`].
#[derive(Debug, Clone)]
pub struct IndexingClientConfig {
    /// The search engine URL (e.g., "http://localhost:9200").
    pub url: String,
    /// Alias prefix and physical index version.
    pub index_config: IndexConfig,
    /// Upper bound for a single request. Exceeding it is a transient failure.
    pub request_timeout: Duration,
}

impl IndexingClientConfig {
    /// Create a config for `url` with the default index layout and timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index_config: IndexConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the index layout.
    pub fn with_index_config(mut self, index_config: IndexConfig) -> Self {
        self.index_config = index_config;
        self
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}
