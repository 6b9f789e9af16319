//! Application settings.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix; nested keys use `__` (`KILN_LOG__LEVEL`).
pub const ENV_PREFIX: &str = "KILN";

/// Settings file looked up in the working directory when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "kiln";

/// Kiln settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KilnSettings {
    /// Directory every job runs under.
    #[serde(default = "default_job_root")]
    pub job_root: String,
    /// Builder definition file.
    #[serde(default = "default_definitions")]
    pub definitions: PathBuf,
    /// Resource catalog file.
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
    /// Property overrides applied to every job.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_job_root() -> String {
    "/build".to_string()
}

fn default_definitions() -> PathBuf {
    PathBuf::from("builders.yaml")
}

fn default_catalog() -> PathBuf {
    PathBuf::from("catalog.yaml")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for KilnSettings {
    fn default() -> Self {
        Self {
            job_root: default_job_root(),
            definitions: default_definitions(),
            catalog: default_catalog(),
            properties: BTreeMap::new(),
            log: LogSettings::default(),
        }
    }
}

impl KilnSettings {
    /// Load settings: `.env`, then the settings file, then `KILN_*` variables.
    ///
    /// An explicit `path` must exist; otherwise `kiln.{yaml,toml,json}` in the
    /// working directory is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "Loaded environment file");
        }

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        };
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(false),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
