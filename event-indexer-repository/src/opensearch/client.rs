//! OpenSearch indexing client implementation.
//!
//! This module provides the concrete implementation of `IndexingClient`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use event_indexer_shared::{DocumentKey, IndexDocument};
use opensearch::{
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    DeleteParts, GetParts, IndexParts, OpenSearch,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::IndexingClientConfig;
use crate::errors::IndexError;
use crate::interfaces::IndexingClient;
use crate::opensearch::index_config::{get_index_settings, IndexConfig};
use crate::utils::validate_document_key;

/// OpenSearch indexing client.
///
/// Every document operation addresses the entity type's alias, never the
/// versioned index directly.
///
/// # Example
///
/// ```ignore
/// use event_indexer_repository::{IndexingClientConfig, OpenSearchIndexingClient};
///
/// let client = OpenSearchIndexingClient::new(IndexingClientConfig::new("http://localhost:9200"))?;
/// client.ensure_index_exists("Order").await?;
///
/// let key = DocumentKey::new("Order", "42");
/// client.upsert(&key, &document).await?;
/// ```
pub struct OpenSearchIndexingClient {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchIndexingClient {
    /// Create a new client connected to the configured URL.
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchIndexingClient)` - A new client instance
    /// * `Err(IndexError)` - If the URL is invalid or the transport cannot be built
    pub fn new(config: IndexingClientConfig) -> Result<Self, IndexError> {
        let parsed_url =
            Url::parse(&config.url).map_err(|e| IndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %config.url,
            prefix = %config.index_config.prefix,
            version = config.index_config.version,
            timeout_ms = config.request_timeout.as_millis() as u64,
            "Created OpenSearch indexing client"
        );

        Ok(Self {
            client,
            index_config: config.index_config,
        })
    }

    /// Turn an unsuccessful response into a classified error.
    async fn error_from_response(response: Response, operation: &str) -> IndexError {
        let status = response.status_code().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!(status, body = %body, operation, "OpenSearch request failed");
        IndexError::from_status(status, body)
    }
}

#[async_trait]
impl IndexingClient for OpenSearchIndexingClient {
    /// Create the versioned index with the alias attached, unless the alias already exists.
    async fn ensure_index_exists(&self, entity_type: &str) -> Result<(), IndexError> {
        let alias = self.index_config.alias_for(entity_type);
        let index_name = self.index_config.versioned_index_for(entity_type);

        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[alias.as_str()]))
            .send()
            .await
            .map_err(|e| IndexError::connection(e.to_string()))?;

        if response.status_code().is_success() {
            debug!(alias = %alias, "Index already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&index_name))
            .body(get_index_settings(&alias))
            .send()
            .await
            .map_err(|e| IndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %index_name, alias = %alias, "Created index");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();

        // Another instance won the race.
        if status.as_u16() == 400 && body.contains("resource_already_exists_exception") {
            warn!(index = %index_name, "Index was created concurrently");
            return Ok(());
        }

        error!(status = %status, body = %body, "Create index request failed");
        if status.is_server_error() {
            return Err(IndexError::from_status(status.as_u16(), body));
        }
        Err(IndexError::index_creation(format!(
            "Create index {} failed with status {}: {}",
            index_name, status, body
        )))
    }

    /// Index the document with replace semantics.
    ///
    /// The whole `_source` is overwritten, so the stored document never mixes
    /// fields from different events.
    async fn upsert(&self, key: &DocumentKey, document: &IndexDocument) -> Result<(), IndexError> {
        validate_document_key(key)?;

        let alias = self.index_config.alias_for(&key.entity_type);
        let body =
            serde_json::to_value(document).map_err(|e| IndexError::serialization(e.to_string()))?;

        let response = self
            .client
            .index(IndexParts::IndexId(&alias, &key.entity_id))
            .body(body)
            .send()
            .await
            .map_err(|e| IndexError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            return Err(Self::error_from_response(response, "upsert").await);
        }

        debug!(key = %key, "Document indexed");
        Ok(())
    }

    async fn delete(&self, key: &DocumentKey) -> Result<(), IndexError> {
        validate_document_key(key)?;

        let alias = self.index_config.alias_for(&key.entity_type);

        let response = self
            .client
            .delete(DeleteParts::IndexId(&alias, &key.entity_id))
            .send()
            .await
            .map_err(|e| IndexError::connection(e.to_string()))?;

        let status = response.status_code();

        // 404 is acceptable - document may not exist
        if !status.is_success() && status.as_u16() != 404 {
            return Err(Self::error_from_response(response, "delete").await);
        }

        debug!(key = %key, "Document deleted");
        Ok(())
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<IndexDocument>, IndexError> {
        validate_document_key(key)?;

        let alias = self.index_config.alias_for(&key.entity_type);

        let response = self
            .client
            .get(GetParts::IndexId(&alias, &key.entity_id))
            .send()
            .await
            .map_err(|e| IndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::error_from_response(response, "get").await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IndexError::parse(e.to_string()))?;

        parse_source(body)
    }
}

/// Extract the stored document from a get response body.
fn parse_source(mut body: Value) -> Result<Option<IndexDocument>, IndexError> {
    if body.get("found").and_then(Value::as_bool) == Some(false) {
        return Ok(None);
    }

    let source = body
        .get_mut("_source")
        .map(Value::take)
        .ok_or_else(|| IndexError::parse("response has no _source"))?;

    serde_json::from_value(source)
        .map(Some)
        .map_err(|e| IndexError::parse(e.to_string()))
}
