//! Utility functions for the indexing client.

use event_indexer_shared::DocumentKey;

use crate::errors::IndexError;
use crate::opensearch::MAX_DOCUMENT_ID_BYTES;

/// Validate a document key before it is sent to the engine.
///
/// # Returns
///
/// * `Ok(())` - If both parts of the key are usable
/// * `Err(IndexError::ValidationError)` - If the entity type or id is blank, or
///   the id exceeds the engine's id length limit
pub fn validate_document_key(key: &DocumentKey) -> Result<(), IndexError> {
    if key.entity_type.trim().is_empty() {
        return Err(IndexError::validation("entity_type cannot be empty"));
    }

    if key.entity_id.trim().is_empty() {
        return Err(IndexError::validation("entity_id cannot be empty"));
    }

    if key.entity_id.len() > MAX_DOCUMENT_ID_BYTES {
        return Err(IndexError::validation(format!(
            "entity_id is {} bytes, limit is {}",
            key.entity_id.len(),
            MAX_DOCUMENT_ID_BYTES
        )));
    }

    Ok(())
}
