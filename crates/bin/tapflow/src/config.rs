//! Configuration loading: a scenario file with environment variable overrides.
//!
//! The file format follows the extension: `.json`, `.yaml`/`.yml` or
//! `.toml`. Loading is read → parse → env overrides → validate → resolve
//! image paths; any failure stops before the device is touched.

use std::path::{Path, PathBuf};

use tapflow_domain::error::ValidationError;
use tapflow_domain::scenario::Scenario;

/// Scenario file used when neither `--config` nor `TAPFLOW_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

const DEFAULT_LOG_FILTER: &str = "tapflow=info,tapflow_app=info,tapflow_adapter_adb=info";

/// Supported scenario file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Deserialize a scenario written in this format.
    ///
    /// # Errors
    ///
    /// Returns the parser's error wrapped in the matching [`ConfigError`].
    pub fn parse(self, content: &str) -> Result<Scenario, ConfigError> {
        Ok(match self {
            Self::Json => serde_json::from_str(content)?,
            Self::Yaml => serde_yaml::from_str(content)?,
            Self::Toml => toml::from_str(content)?,
        })
    }
}

/// Load, override, validate and path-resolve the scenario at `path`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or
/// validated.
pub fn load_scenario(path: &Path, image_root: &Path) -> Result<Scenario, ConfigError> {
    load_scenario_with(path, image_root, |key| std::env::var(key).ok())
}

fn load_scenario_with(
    path: &Path,
    image_root: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Scenario, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut scenario = format.parse(&content)?;
    apply_env_overrides(&mut scenario, lookup);
    scenario.validate()?;
    scenario.resolve_image_paths(image_root);
    tracing::info!(
        path = %path.display(),
        steps = scenario.steps.len(),
        helpers = scenario.helper_steps.len(),
        monitor = scenario.global_monitor.is_some(),
        "scenario loaded"
    );
    Ok(scenario)
}

fn apply_env_overrides(scenario: &mut Scenario, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("TAPFLOW_ADB_PATH") {
        scenario.device.adb_path = val;
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl LoggingConfig {
    /// Default filter, overridden by `TAPFLOW_LOG` and then `RUST_LOG`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = lookup("TAPFLOW_LOG") {
            config.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            config.filter = val;
        }
        config
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("failed to read scenario file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// JSON parse failure.
    #[error("failed to parse JSON scenario")]
    Json(#[from] serde_json::Error),
    /// YAML parse failure.
    #[error("failed to parse YAML scenario")]
    Yaml(#[from] serde_yaml::Error),
    /// TOML parse failure.
    #[error("failed to parse TOML scenario")]
    Toml(#[from] toml::de::Error),
    /// Extension is not one of json, yaml, yml, toml.
    #[error("unsupported scenario format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    /// Semantic validation failure.
    #[error("invalid scenario")]
    Validation(#[from] ValidationError),
}
