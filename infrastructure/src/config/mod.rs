//! Configuration file loading for parley
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `PARLEY_`-prefixed environment variables
//! 2. `--config <path>` specified file
//! 3. Project root: `./parley.toml` or `./.parley.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/parley/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, DEFAULT_CONTEXT_SIZE, FileConfig, FileGenerationConfig,
    FileLoggingConfig, FilePersistenceConfig, FileRetrievalConfig, FileWorkerConfig,
};
pub use loader::{ConfigLoader, ENV_PREFIX};
