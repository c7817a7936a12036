//! Configuration for translation graphs, loaded with Figment.
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables prefixed with `DAQ_TRANSLATE_`
//! 2. TOML configuration file (default: `config/translation.toml`)
//!
//! Nested keys are separated by a double underscore in environment variables:
//!
//! ```text
//! DAQ_TRANSLATE_APPLICATION__LOG_LEVEL=debug
//! DAQ_TRANSLATE_RECONSTRUCTION__SOURCE=dark_subtraction
//! DAQ_TRANSLATE_ALIGNMENT__POLICY=strict
//! ```
//!
//! Every section has defaults, so an empty file is a valid configuration.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::document::DEFAULT_STREAM_NAME;
use crate::error::{TranslateError, TranslateResult};
use crate::translation::AlignPolicy;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "DAQ_TRANSLATE_";

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/translation.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Defaults for extraction nodes
    pub extraction: ExtractionConfig,
    /// Defaults for reconstruction nodes
    pub reconstruction: ReconstructionConfig,
    /// Alignment node behaviour
    pub alignment: AlignmentConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level or filter directive (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub json_logs: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "daq-translation".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Defaults applied by `ExtractOptions::from_config`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Descriptor stream to follow; unset means every stream
    pub stream_name: Option<String>,
    /// Whether extraction nodes drive session lifecycles by default
    pub principal: bool,
}

/// Defaults applied by `ReconstructOptions::from_config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Stream name of reconstructed descriptors
    pub stream_name: String,
    /// `source` recorded in inferred data keys
    pub source: String,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            source: "analysis".to_string(),
        }
    }
}

/// Alignment node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// What to do with documents left over when sources have unequal lengths
    pub policy: AlignPolicy,
}

impl TranslationConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> TranslateResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> TranslateResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level parses as a tracing filter directive
    /// - Stream names are not empty
    pub fn validate(&self) -> TranslateResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = self.application.log_level.as_str();
        if !valid_levels.contains(&level) && !level.contains('=') {
            return Err(TranslateError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {} or a filter directive",
                level,
                valid_levels.join(", ")
            )));
        }

        if self.reconstruction.stream_name.is_empty() {
            return Err(TranslateError::Configuration(
                "reconstruction.stream_name must not be empty".to_string(),
            ));
        }

        if matches!(&self.extraction.stream_name, Some(name) if name.is_empty()) {
            return Err(TranslateError::Configuration(
                "extraction.stream_name must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as TOML, e.g. to write a template configuration file.
    pub fn to_toml(&self) -> TranslateResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TranslateError::Configuration(format!("cannot render TOML: {e}")))
    }
}
