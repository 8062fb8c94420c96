use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::change_feed::TableFilter;
use crate::constants::{FEED_CHANNEL, FEED_SCHEMA, FEED_TABLE, RELAY_CHANNEL};

/// Channel names and the table the session syncs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Broadcast channel shared by tabs of one browser
    pub relay_channel: String,
    /// Change-feed subscription name
    pub feed_channel: String,
    pub schema: String,
    pub table: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relay_channel: RELAY_CHANNEL.to_string(),
            feed_channel: FEED_CHANNEL.to_string(),
            schema: FEED_SCHEMA.to_string(),
            table: FEED_TABLE.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn table_filter(&self) -> TableFilter {
        TableFilter::new(&self.schema, &self.table)
    }

    /// Load from a JSON file; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize sync config")
    }
}
