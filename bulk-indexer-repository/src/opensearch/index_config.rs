//! OpenSearch index configuration.
//!
//! Defines the settings used when the bulk indexer creates its target index.
//! The defaults favour ingest throughput: a long refresh interval, a single
//! primary shard and replicas expanded to every node.

use serde_json::{json, Map, Value};

/// Default refresh interval while ingesting.
pub const DEFAULT_REFRESH_INTERVAL: &str = "60s";

/// Default replica expansion range.
pub const DEFAULT_AUTO_EXPAND_REPLICAS: &str = "0-all";

/// Configuration for the target index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// The index name.
    pub name: String,
    /// How often the index refreshes (e.g. "60s", "-1" to disable).
    pub refresh_interval: String,
    /// Number of primary shards.
    pub number_of_shards: u32,
    /// Replica expansion range (e.g. "0-all").
    pub auto_expand_replicas: String,
    /// Optional mappings body. When `None` the index uses dynamic mappings.
    pub mappings: Option<Value>,
}

impl IndexConfig {
    /// Create an index configuration with ingest-friendly defaults.
    ///
    /// # Arguments
    ///
    /// * `name` - The index name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL.to_string(),
            number_of_shards: 1,
            auto_expand_replicas: DEFAULT_AUTO_EXPAND_REPLICAS.to_string(),
            mappings: None,
        }
    }

    /// Set explicit mappings for the index.
    pub fn with_mappings(mut self, mappings: Value) -> Self {
        self.mappings = Some(mappings);
        self
    }

    /// Set the refresh interval.
    pub fn with_refresh_interval(mut self, refresh_interval: impl Into<String>) -> Self {
        self.refresh_interval = refresh_interval.into();
        self
    }

    /// Build the body of the create-index request.
    pub fn create_body(&self) -> Value {
        let mut body = Map::new();
        body.insert(
            "settings".to_string(),
            json!({
                "refresh_interval": self.refresh_interval,
                "number_of_shards": self.number_of_shards,
                "auto_expand_replicas": self.auto_expand_replicas
            }),
        );
        if let Some(ref mappings) = self.mappings {
            body.insert("mappings".to_string(), mappings.clone());
        }
        Value::Object(body)
    }
}
