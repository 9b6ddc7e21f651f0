//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! [`FileConfig::to_session_config`] turns them into the application's
//! [`SessionConfig`].

mod generation;
mod logging;
mod persistence;
mod retrieval;
mod worker;

pub use generation::FileGenerationConfig;
pub use logging::FileLoggingConfig;
pub use persistence::FilePersistenceConfig;
pub use retrieval::FileRetrievalConfig;
pub use worker::{DEFAULT_CONTEXT_SIZE, FileWorkerConfig};

use parley_application::SessionConfig;
use parley_domain::check_version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("generation.n_predict must be positive, got {0}")]
    InvalidPredict(i32),

    #[error("generation.n_batch must be positive, got {0}")]
    InvalidBatch(i32),

    #[error("worker.threads cannot be 0")]
    ZeroThreads,

    #[error("persistence.format_version {0} is not supported")]
    UnsupportedFormatVersion(i32),

    #[error("worker.default_model cannot be empty")]
    EmptyModelName,
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Generation defaults and prompt template
    pub generation: FileGenerationConfig,
    /// Worker and backend settings
    pub worker: FileWorkerConfig,
    /// Session storage
    pub persistence: FilePersistenceConfig,
    /// Local document collections
    pub retrieval: FileRetrievalConfig,
    /// Log destinations
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Check the values the session relies on.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.generation.n_predict <= 0 {
            return Err(ConfigValidationError::InvalidPredict(
                self.generation.n_predict,
            ));
        }
        if self.generation.n_batch <= 0 {
            return Err(ConfigValidationError::InvalidBatch(self.generation.n_batch));
        }
        if self.worker.threads == 0 {
            return Err(ConfigValidationError::ZeroThreads);
        }
        if check_version(self.persistence.format_version).is_err() {
            return Err(ConfigValidationError::UnsupportedFormatVersion(
                self.persistence.format_version,
            ));
        }
        if self
            .worker
            .default_model
            .as_deref()
            .is_some_and(|m| m.trim().is_empty())
        {
            return Err(ConfigValidationError::EmptyModelName);
        }
        Ok(())
    }

    /// Validate and convert into the controller's parameters.
    pub fn to_session_config(&self) -> Result<SessionConfig, ConfigValidationError> {
        self.validate()?;
        Ok(SessionConfig::default()
            .with_generation(self.generation.to_params())
            .with_prompt_template(self.generation.prompt_template.clone())
            .with_threads(self.worker.threads)
            .with_format_version(self.persistence.format_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_domain::{CURRENT_FORMAT_VERSION, GenerationParams};

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[generation]
n_predict = 256
temperature = 0.2
prompt_template = "Q: %1\nA: "

[worker]
threads = 8
default_model = "echo"
models = ["echo", "echo-large"]

[persistence]
sessions_dir = "/tmp/parley"
format_version = 2

[retrieval]
retrieval_size = 5

[retrieval.collections]
notes = "/home/me/notes"

[logging]
conversation_log = "/tmp/parley/transcript.jsonl"
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.generation.n_predict, 256);
        assert_eq!(config.generation.top_k, 40);
        assert_eq!(config.worker.threads, 8);
        assert_eq!(config.worker.default_model.as_deref(), Some("echo"));
        assert_eq!(config.worker.models.len(), 2);
        assert_eq!(config.persistence.format_version, 2);
        assert_eq!(config.retrieval.retrieval_size, 5);
        assert_eq!(
            config.retrieval.collections.get("notes").map(String::as_str),
            Some("/home/me/notes")
        );
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: FileConfig = toml::from_str("[worker]\nthreads = 2\n").unwrap();
        assert_eq!(config.worker.threads, 2);
        // Defaults should apply
        assert_eq!(config.generation, FileGenerationConfig::default());
        assert_eq!(config.persistence.format_version, CURRENT_FORMAT_VERSION);
        assert_eq!(config.worker.context_size, DEFAULT_CONTEXT_SIZE);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = FileConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(
            config.to_session_config().unwrap(),
            SessionConfig::default()
        );
    }

    #[test]
    fn test_to_session_config() {
        let mut config = FileConfig::default();
        config.generation.n_predict = 64;
        config.generation.prompt_template = "%1".to_string();
        config.worker.threads = 2;
        config.persistence.format_version = 1;

        let session = config.to_session_config().unwrap();
        assert_eq!(
            session.generation,
            GenerationParams::default().with_n_predict(64)
        );
        assert_eq!(session.prompt_template, "%1");
        assert_eq!(session.n_threads, 2);
        assert_eq!(session.format_version, 1);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = FileConfig::default();
        config.generation.n_predict = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::InvalidPredict(0))
        );

        let mut config = FileConfig::default();
        config.generation.n_batch = -1;
        assert_eq!(config.validate(), Err(ConfigValidationError::InvalidBatch(-1)));

        let mut config = FileConfig::default();
        config.worker.threads = 0;
        assert_eq!(config.validate(), Err(ConfigValidationError::ZeroThreads));

        let mut config = FileConfig::default();
        config.persistence.format_version = 4;
        assert_eq!(
            config.to_session_config(),
            Err(ConfigValidationError::UnsupportedFormatVersion(4))
        );

        let mut config = FileConfig::default();
        config.worker.default_model = Some(" ".to_string());
        assert_eq!(config.validate(), Err(ConfigValidationError::EmptyModelName));
    }
}
