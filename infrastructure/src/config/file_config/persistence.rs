//! Persistence configuration from TOML (`[persistence]` section)

use crate::storage::FileSessionStore;
use parley_domain::CURRENT_FORMAT_VERSION;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw persistence configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePersistenceConfig {
    /// Directory holding saved sessions (default: `<data dir>/parley/sessions`)
    pub sessions_dir: Option<String>,
    /// Format version used when saving
    pub format_version: i32,
}

impl Default for FilePersistenceConfig {
    fn default() -> Self {
        Self {
            sessions_dir: None,
            format_version: CURRENT_FORMAT_VERSION,
        }
    }
}

impl FilePersistenceConfig {
    /// Resolved sessions directory, `None` when no data directory exists.
    pub fn sessions_dir(&self) -> Option<PathBuf> {
        self.sessions_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(FileSessionStore::default_dir)
    }
}
