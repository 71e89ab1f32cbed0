//! OpenSearch index configuration and mappings.
//!
//! Each entity type gets its own index. Operations always go through an alias so
//! the physical index can be rebuilt under a new version and swapped in.

use serde_json::{json, Value};

/// Maximum length of a document id accepted by OpenSearch.
pub const MAX_DOCUMENT_ID_BYTES: usize = 512;

/// Configuration for the per-entity search indices.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Prefix shared by all aliases (e.g., "events" for "events_order").
    pub prefix: String,
    /// The version number for physical indices (e.g., 0 for "events_order_v0").
    pub version: u32,
}

impl IndexConfig {
    /// Create a new index configuration.
    ///
    /// # Arguments
    ///
    /// * `prefix` - The alias prefix
    /// * `version` - The version number
    pub fn new(prefix: impl Into<String>, version: u32) -> Self {
        Self {
            prefix: prefix.into(),
            version,
        }
    }

    /// Alias used for all document operations on an entity type.
    ///
    /// Index names must be lower-case, so the entity type is lower-cased and any
    /// character other than an ASCII letter or digit becomes an underscore.
    pub fn alias_for(&self, entity_type: &str) -> String {
        let normalized: String = entity_type
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}", self.prefix, normalized)
    }

    /// Physical index behind the alias for an entity type.
    pub fn versioned_index_for(&self, entity_type: &str) -> String {
        format!("{}_v{}", self.alias_for(entity_type), self.version)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new("events", 0)
    }
}

/// Get the settings, mappings and alias for a new entity index.
///
/// Envelope metadata is mapped explicitly; the payload under `data` is mapped
/// dynamically since its schema belongs to the upstream producer.
pub fn get_index_settings(alias: &str) -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "properties": {
                "entity_id": {
                    "type": "keyword"
                },
                "entity_type": {
                    "type": "keyword"
                },
                "event_type": {
                    "type": "keyword"
                },
                "updated_at": {
                    "type": "date"
                },
                "data": {
                    "type": "object",
                    "dynamic": true
                }
            }
        },
        "aliases": {
            alias: {}
        }
    })
}
