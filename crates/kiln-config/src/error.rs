//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid builder '{builder}' field '{field}': {reason}")]
    InvalidBuilder {
        builder: String,
        field: String,
        reason: String,
    },

    #[error("Invalid catalog entry '{entry}': {reason}")]
    InvalidCatalog { entry: String, reason: String },

    #[error("Builder '{definition}' names unknown parent '{parent}'")]
    UnknownParent { definition: String, parent: String },

    #[error("Cyclic ancestry among builders: {}", .members.join(", "))]
    CyclicAncestry { members: Vec<String> },

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    pub(crate) fn builder(builder: &str, field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidBuilder {
            builder: builder.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
