//! Engine configuration from `fsroutes.toml`.
//!
//! # Sections
//!
//! | Section    | Purpose                                     |
//! |------------|---------------------------------------------|
//! | `[routes]` | Routes directory and debounce window        |
//! | `[data]`   | Records file consumed by the JSON store     |
//! | `[output]` | Where the page manifest is written          |
//!
//! # Example
//!
//! ```toml
//! [routes]
//! dir = "routes"
//! debounce_ms = 50
//!
//! [data]
//! file = "records.json"
//!
//! [output]
//! dir = "public"
//! ```

use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::cli::Cli;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),
}

mod defaults {
    use std::path::PathBuf;

    pub mod routes {
        use super::PathBuf;

        pub fn dir() -> PathBuf {
            PathBuf::from("routes")
        }

        pub fn debounce_ms() -> u64 {
            crate::watch::DEFAULT_DEBOUNCE_MS
        }
    }

    pub mod data {
        use super::PathBuf;

        pub fn file() -> PathBuf {
            PathBuf::from("records.json")
        }
    }

    pub mod output {
        use super::PathBuf;

        pub fn dir() -> PathBuf {
            PathBuf::from("public")
        }
    }
}

/// `[routes]` section - the watched template directory.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct RoutesConfig {
    /// Directory of route template files, relative to the project root.
    #[serde(default = "defaults::routes::dir")]
    #[educe(Default = defaults::routes::dir())]
    pub dir: PathBuf,

    /// Debounce window for filesystem events, in milliseconds.
    #[serde(default = "defaults::routes::debounce_ms")]
    #[educe(Default = defaults::routes::debounce_ms())]
    pub debounce_ms: u64,
}

/// `[data]` section - the record store backing file.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// JSON records file, relative to the project root.
    #[serde(default = "defaults::data::file")]
    #[educe(Default = defaults::data::file())]
    pub file: PathBuf,
}

/// `[output]` section - where produced page state lands.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Output directory for the page manifest.
    #[serde(default = "defaults::output::dir")]
    #[educe(Default = defaults::output::dir())]
    pub dir: PathBuf,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub routes: RoutesConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Project root; all relative paths resolve against it.
    #[serde(skip)]
    pub root: PathBuf,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(toml::from_str(&raw)?)
    }

    /// Apply CLI argument overrides on top of file values.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        self.root = cli.root.clone().unwrap_or_else(|| PathBuf::from("./"));
        if let Some(dir) = &cli.routes {
            self.routes.dir = dir.clone();
        }
        if let Some(file) = &cli.data {
            self.data.file = file.clone();
        }
        if let Some(dir) = &cli.output {
            self.output.dir = dir.clone();
        }
    }

    /// Routes directory resolved against the project root.
    pub fn routes_dir(&self) -> PathBuf {
        self.root.join(&self.routes.dir)
    }

    /// Records file resolved against the project root.
    pub fn data_file(&self) -> PathBuf {
        self.root.join(&self.data.file)
    }

    /// Output directory resolved against the project root.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }

    /// Validate that the configured paths exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let routes = self.routes_dir();
        if !routes.is_dir() {
            return Err(ConfigError::Validation(format!(
                "routes directory `{}` does not exist",
                routes.display()
            )));
        }
        let data = self.data_file();
        if !data.is_file() {
            return Err(ConfigError::Validation(format!(
                "records file `{}` does not exist",
                data.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.routes.dir, PathBuf::from("routes"));
        assert_eq!(config.routes.debounce_ms, 50);
        assert_eq!(config.data.file, PathBuf::from("records.json"));
        assert_eq!(config.output.dir, PathBuf::from("public"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [routes]
            dir = "templates"
        "#,
        )
        .unwrap();
        assert_eq!(config.routes.dir, PathBuf::from("templates"));
        assert_eq!(config.routes.debounce_ms, 50);
        assert_eq!(config.output.dir, PathBuf::from("public"));
    }

    #[test]
    fn test_unknown_field_rejection() {
        let result: Result<EngineConfig, _> = toml::from_str(
            r#"
            [routes]
            dirr = "typo"
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let mut config = EngineConfig::default();
        config.root = PathBuf::from("/project");
        assert_eq!(config.routes_dir(), PathBuf::from("/project/routes"));
        assert_eq!(config.data_file(), PathBuf::from("/project/records.json"));
    }

    #[test]
    fn test_validate_missing_routes_dir() {
        let mut config = EngineConfig::default();
        config.root = PathBuf::from("/nonexistent-fsroutes-test");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }
}
