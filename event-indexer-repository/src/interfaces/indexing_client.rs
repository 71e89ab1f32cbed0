//! Indexing client trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations (OpenSearch, Elasticsearch, etc.).

use async_trait::async_trait;
use event_indexer_shared::{DocumentKey, IndexDocument};

use crate::errors::IndexError;

/// Abstracts the underlying search engine.
///
/// Implementations are injected into the event indexer loader, which keeps the
/// consumer loop testable with mock implementations.
///
/// Implementations only classify failures (see [`IndexError::kind`]); they never
/// retry internally. Retrying is the caller's decision.
///
/// # Idempotence
///
/// `upsert` has replace semantics: the stored document becomes exactly the one
/// given, so applying the same document twice yields the same index state.
/// `delete` of a missing document succeeds. Together these make at-least-once
/// delivery safe to replay.
#[async_trait]
pub trait IndexingClient: Send + Sync {
    /// Ensure the index (and alias) for an entity type exists, creating it if necessary.
    ///
    /// Called at startup before any document operations.
    async fn ensure_index_exists(&self, entity_type: &str) -> Result<(), IndexError>;

    /// Insert or replace the document addressed by `key`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was stored
    /// * `Err(IndexError)` - Transient or permanent failure
    async fn upsert(&self, key: &DocumentKey, document: &IndexDocument) -> Result<(), IndexError>;

    /// Delete the document addressed by `key`.
    ///
    /// If the document doesn't exist, the operation is considered successful.
    async fn delete(&self, key: &DocumentKey) -> Result<(), IndexError>;

    /// Fetch the document addressed by `key`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(document))` - If the document exists
    /// * `Ok(None)` - If it does not
    /// * `Err(IndexError)` - If the lookup fails
    async fn get(&self, key: &DocumentKey) -> Result<Option<IndexDocument>, IndexError>;
}
