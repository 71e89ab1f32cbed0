//! Index document types.
//!
//! This module defines the document structure stored in the search engine and the
//! key used to address it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identifies a single document in the search index.
///
/// The entity type selects the index, the entity id is the document id within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub entity_type: String,
    pub entity_id: String,
}

impl DocumentKey {
    /// Create a new document key.
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// Document representation for the search index.
///
/// Documents are written with replace semantics, so every field here is derived
/// from the envelope that produced it. Writing the same document twice leaves the
/// index unchanged.
///
/// # Fields
///
/// - `entity_id`: Document id, copied from the envelope
/// - `entity_type`: Canonical entity type name
/// - `event_type`: Canonical name of the event that produced this version
/// - `updated_at`: The producing envelope's `createdAt`
/// - `data`: The envelope payload object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDocument {
    pub entity_id: String,
    pub entity_type: String,
    pub event_type: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl IndexDocument {
    /// Create a new document.
    ///
    /// # Example
    ///
    /// ```
    /// use event_indexer_shared::IndexDocument;
    /// use chrono::Utc;
    /// use serde_json::{json, Map};
    ///
    /// let mut data = Map::new();
    /// data.insert("status".to_string(), json!("SHIPPED"));
    ///
    /// let doc = IndexDocument::new("42", "order", "update", Utc::now(), data);
    /// assert_eq!(doc.key().entity_id, "42");
    /// ```
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: impl Into<String>,
        event_type: impl Into<String>,
        updated_at: DateTime<Utc>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            event_type: event_type.into(),
            updated_at,
            data,
        }
    }

    /// The key addressing this document.
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.entity_type.clone(), self.entity_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_key_display() {
        let key = DocumentKey::new("order", "42");
        assert_eq!(key.to_string(), "order/42");
    }

    #[test]
    fn test_document_key_from_document() {
        let doc = IndexDocument::new("42", "order", "update", Utc::now(), Map::new());
        assert_eq!(doc.key(), DocumentKey::new("order", "42"));
    }

    #[test]
    fn test_serialization() {
        let mut data = Map::new();
        data.insert("status".to_string(), json!("SHIPPED"));
        let doc = IndexDocument::new("42", "order", "update", Utc::now(), data);

        let json = serde_json::to_string(&doc).unwrap();
        let deserialized: IndexDocument = serde_json::from_str(&json).unwrap();

        assert_eq!(doc, deserialized);
    }

    #[test]
    fn test_deserialize_without_data() {
        let value = json!({
            "entity_id": "1",
            "entity_type": "product",
            "event_type": "create",
            "updated_at": "2024-05-01T12:00:00Z"
        });

        let doc: IndexDocument = serde_json::from_value(value).unwrap();
        assert!(doc.data.is_empty());
    }
}
