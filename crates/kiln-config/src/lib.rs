//! Kiln CI Configuration
//!
//! Loads builder definitions and resource catalogs from YAML and application
//! settings from files and the environment.

pub mod catalog;
pub mod error;
pub mod graph;
pub mod loader;
pub mod settings;

pub use catalog::StaticCatalog;
pub use error::{ConfigError, Result};
pub use graph::AncestryGraph;
pub use loader::{load_definitions, parse_definitions};
pub use settings::{KilnSettings, LogFormat, LogSettings};
