//! Configuration for test runs.
//!
//! Settings come from an optional YAML file named by `TESTBED_CONFIG`,
//! overridden by individual environment variables:
//!
//! - `TESTBED_TAGS`: raw tag list, e.g. `small,-functional`
//! - `TESTBED_SMOKE`: `true`/`false`, adds the smoke tag
//! - `TESTBED_LOGGING_CONFIG`: `tracing` filter directive for captured logs

use crate::env;
use crate::tags::parse_tags;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "TESTBED_CONFIG";
pub const TAGS_ENV: &str = "TESTBED_TAGS";
pub const SMOKE_ENV: &str = "TESTBED_SMOKE";
pub const LOGGING_ENV: &str = "TESTBED_LOGGING_CONFIG";

/// Log filter used when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "debug";

fn default_logging() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Top-level test run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestbedConfig {
    /// Raw tag list selecting which tagged tests run.
    #[serde(default)]
    pub tags: String,

    /// Adds the smoke tag to the included tags.
    #[serde(default)]
    pub smoke: bool,

    /// Filter directive for logs captured by `LoggingSuite`.
    #[serde(default = "default_logging")]
    pub logging: String,

    /// Environment isolation settings.
    #[serde(default)]
    pub env: EnvConfig,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            tags: String::new(),
            smoke: false,
            logging: default_logging(),
            env: EnvConfig::default(),
        }
    }
}

/// Settings for `OsEnvSuite`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Variables kept when the environment is cleared, in addition to
    /// `PATH` and the platform's system variables.
    #[serde(default)]
    pub retain: Vec<String>,
}

impl TestbedConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!(
            tags = %config.tags,
            smoke = config.smoke,
            logging = %config.logging,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration using `lookup` to read variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_ENV).filter(|path| !path.is_empty()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Applies the per-setting environment overrides.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(tags) = lookup(TAGS_ENV) {
            debug!(tags = %tags, "Overriding tags from environment");
            self.tags = tags;
        }
        if let Some(smoke) = lookup(SMOKE_ENV) {
            self.smoke = parse_bool(SMOKE_ENV, &smoke)?;
        }
        // An empty value means "not configured", as if the variable were unset.
        if let Some(logging) = lookup(LOGGING_ENV).filter(|v| !v.is_empty()) {
            self.logging = logging;
        }
        Ok(())
    }

    /// Returns warnings for settings that are accepted but probably wrong.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let parsed = parse_tags(&self.tags);
        for tag in &parsed.included {
            if parsed.excluded.contains(tag) {
                warnings.push(ConfigWarning::ConflictingTag { tag: tag.clone() });
            }
        }

        if let Err(e) = EnvFilter::try_new(&self.logging) {
            warnings.push(ConfigWarning::InvalidLogFilter {
                filter: self.logging.clone(),
                message: e.to_string(),
            });
        }

        for name in &self.env.retain {
            if env::validate_name(name).is_err() {
                warnings.push(ConfigWarning::InvalidValue {
                    field: "env.retain".to_string(),
                    message: format!("'{}' is not a valid variable name and is ignored", name),
                });
            }
        }

        warnings
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Configuration warnings emitted during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A tag is both included and excluded; exclusion wins.
    ConflictingTag { tag: String },
    /// The logging directive does not parse.
    InvalidLogFilter { filter: String, message: String },
    /// A setting has an unusable value.
    InvalidValue { field: String, message: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::ConflictingTag { tag } => {
                write!(f, "Warning [tags]: '{}' is both included and excluded", tag)
            }
            ConfigWarning::InvalidLogFilter { filter, message } => {
                write!(f, "Warning [logging]: invalid filter '{}': {}", filter, message)
            }
            ConfigWarning::InvalidValue { field, message } => {
                write!(f, "Warning [{}]: {}", field, message)
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: '{value}'")]
    InvalidValue { field: String, value: String },
}
