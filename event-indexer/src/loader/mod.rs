//! Loader module for the event indexer.
//!
//! Applies index mutations through the indexing client, one call per mutation,
//! each bounded by a timeout.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use crate::errors::IngestError;
use crate::processor::{EntityKind, IndexMutation};
use event_indexer_repository::{IndexError, IndexingClient};

/// Default upper bound for one indexing call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Loader that applies mutations to the search index.
///
/// The loader never retries and never interprets failures beyond turning an
/// elapsed timeout into a transient [`IndexError`].
pub struct IndexLoader {
    client: Arc<dyn IndexingClient>,
    request_timeout: Duration,
}

impl IndexLoader {
    /// Create a new loader with the default request timeout.
    pub fn new(client: Arc<dyn IndexingClient>) -> Self {
        Self::with_timeout(client, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a new loader with a custom request timeout.
    pub fn with_timeout(client: Arc<dyn IndexingClient>, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Apply one mutation.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The mutation was applied, or there was nothing to apply
    /// * `Err(IndexError)` - Classified failure from the client, or a timeout
    #[instrument(skip(self, mutation))]
    pub async fn apply(&self, mutation: &IndexMutation) -> Result<(), IndexError> {
        let call = async {
            match mutation {
                IndexMutation::Upsert { key, document } => self.client.upsert(key, document).await,
                IndexMutation::Delete { key } => self.client.delete(key).await,
                IndexMutation::Skip => Ok(()),
            }
        };

        match timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(IndexError::timeout(format!(
                "index request exceeded {}ms",
                self.request_timeout.as_millis()
            ))),
        }
    }

    /// Create the index for every entity kind that has indexing rules.
    pub async fn ensure_indices(&self) -> Result<(), IngestError> {
        for kind in EntityKind::ALL {
            self.client
                .ensure_index_exists(kind.as_str())
                .await
                .map_err(|e| {
                    IngestError::loader(format!("Failed to ensure index for {}: {}", kind.as_str(), e))
                })?;
            debug!(entity_type = kind.as_str(), "Index ready");
        }

        info!(count = EntityKind::ALL.len(), "All entity indices ready");
        Ok(())
    }

    /// Check that the index answers and every entity index exists.
    ///
    /// Each round trip is bounded by the request timeout.
    pub async fn check_ready(&self) -> Result<(), IngestError> {
        for kind in EntityKind::ALL {
            let check = self.client.ensure_index_exists(kind.as_str());
            match timeout(self.request_timeout, check).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(IngestError::loader(format!(
                        "Index for {} is not ready: {}",
                        kind.as_str(),
                        e
                    )))
                }
                Err(_) => {
                    return Err(IngestError::loader(format!(
                        "Readiness check for {} exceeded {}ms",
                        kind.as_str(),
                        self.request_timeout.as_millis()
                    )))
                }
            }
        }

        debug!("Index is ready");
        Ok(())
    }
}
