//! Configuration management for the persistence codec
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (persist.toml)
//! - Environment variables (PERSIST__*)
//!
//! ## Example config file (persist.toml):
//! ```toml
//! [limits]
//! max_depth = 100
//! max_string_length = 1000000
//! max_collection_size = 10000
//! max_repr_length = 1000
//!
//! [serializer]
//! current_version = "1.0.0"
//! preferred_format = "msgpack"
//! validate_schema = true
//! fail_on_schema_derivation_error = false
//! module_aliases = [{ from = "familiar.legacy.tasks", to = "familiar.tasks" }]
//!
//! [migration]
//! strategy = "backward"
//! ```

use std::path::Path;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::Format;
use crate::migration::CompatibilityStrategy;

/// Main configuration for the codec
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Resource bounds applied while encoding and decoding
    #[serde(default)]
    pub limits: Limits,

    /// Envelope and schema settings
    #[serde(default)]
    pub serializer: SerializerConfig,

    /// Version handling
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Resource bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Deepest allowed container nesting
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Longest allowed string, in characters
    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,

    /// Largest allowed list, map, set or tuple
    #[serde(default = "default_max_collection_size")]
    pub max_collection_size: usize,

    /// Truncation length for the string form of opaque values
    #[serde(default = "default_max_repr_length")]
    pub max_repr_length: usize,
}

impl Limits {
    /// Raw bracket nesting tolerated by the JSON parser
    ///
    /// Each logical level can cost up to three brackets on the wire
    /// (record wrapper, `data`, then the container itself).
    pub fn wire_nesting_limit(&self) -> usize {
        self.max_depth.saturating_mul(3).saturating_add(8)
    }
}

/// A permitted module rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAlias {
    pub from: String,
    pub to: String,
}

/// Serializer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializerConfig {
    /// Version stamped on every written payload
    #[serde(default = "default_current_version")]
    pub current_version: String,

    /// Format the facade writes when the caller does not choose one
    #[serde(default)]
    pub preferred_format: Format,

    /// Validate envelopes against derived schemas
    #[serde(default = "default_true")]
    pub validate_schema: bool,

    /// Fail instead of skipping validation when a schema cannot be derived
    #[serde(default)]
    pub fail_on_schema_derivation_error: bool,

    /// Explicitly allowed module renames
    #[serde(default)]
    pub module_aliases: Vec<ModuleAlias>,
}

/// Migration configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub strategy: CompatibilityStrategy,
}

// Default value functions
fn default_max_depth() -> usize {
    100
}

fn default_max_string_length() -> usize {
    1_000_000
}

fn default_max_collection_size() -> usize {
    10_000
}

fn default_max_repr_length() -> usize {
    1_000
}

fn default_current_version() -> String {
    "1.0.0".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_string_length: default_max_string_length(),
            max_collection_size: default_max_collection_size(),
            max_repr_length: default_max_repr_length(),
        }
    }
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            current_version: default_current_version(),
            preferred_format: Format::Json,
            validate_schema: true,
            fail_on_schema_derivation_error: false,
            module_aliases: Vec::new(),
        }
    }
}

impl CodecConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["persist.toml", ".persist.toml", "config/persist.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "familiar", "persist") {
            let user_config = dirs.config_dir().join("persist.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        if let Some(path) = config_path {
            info!(path, "loading config file");
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // PERSIST__LIMITS__MAX_DEPTH=50
        builder = builder.add_source(
            Environment::with_prefix("PERSIST")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        info!(
            version = %config.serializer.current_version,
            strategy = %config.migration.strategy,
            format = %config.serializer.preferred_format,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
