//! Retrieval configuration from TOML (`[retrieval]` section)

use crate::retrieval::DEFAULT_RETRIEVAL_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw retrieval configuration from TOML
///
/// ```toml
/// [retrieval]
/// retrieval_size = 3
///
/// [retrieval.collections]
/// notes = "~/notes"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRetrievalConfig {
    /// Passages returned per prompt
    pub retrieval_size: usize,
    /// Collection name to document directory
    pub collections: BTreeMap<String, String>,
}

impl Default for FileRetrievalConfig {
    fn default() -> Self {
        Self {
            retrieval_size: DEFAULT_RETRIEVAL_SIZE,
            collections: BTreeMap::new(),
        }
    }
}
