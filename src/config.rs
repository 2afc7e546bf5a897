//! YAML configuration for the field survey service.
//!
//! One document carries every section. Each section is optional and falls back
//! to its defaults.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "canvass-fall"
//!
//! validation:
//!   max_text_length: 10000
//!   min_long_text_length: 10
//!   min_respondent_name_length: 2
//!   adult_age: 18
//!   max_age_years: 120
//!   rules:
//!     birth_date: "birth_date"
//!     age_range: "age_range"
//!
//! retry:
//!   max_attempts: 3
//!   base_delay: 1000      # milliseconds
//!   multiplier: 2.0
//!   max_delay: 30000
//!   jitter_ratio: 0.25
//!
//! idempotency:
//!   ttl: 600000           # ten minutes
//!
//! pipeline:
//!   default_tenant: "default"
//!   compensation_attempts: 3
//!
//! logging:
//!   level: "info"
//!   json: false
//! ```

use std::fs;
use std::path::Path;

use resilience::{IdempotencyConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validate::ValidationConfig;

use crate::record::Submitter;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid validation section: {0}")]
    Validation(#[from] validate::ConfigError),

    #[error("invalid retry or idempotency section: {0}")]
    Resilience(#[from] resilience::ConfigError),

    #[error("validation error: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub idempotency: IdempotencyConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SurveyConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: SurveyConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.validation.validate()?;
        self.retry.validate()?;
        self.idempotency.validate()?;
        self.pipeline.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            validation: ValidationConfig::default(),
            retry: RetryConfig::default(),
            idempotency: IdempotencyConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Submission pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tenant used when the calling layer supplies none.
    ///
    /// Default: `"default"`
    pub default_tenant: String,

    /// Attempts allowed for the compensating delete after a partial finalize.
    ///
    /// Default: `3`
    pub compensation_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_tenant: "default".to_string(),
            compensation_attempts: 3,
        }
    }
}

impl PipelineConfig {
    /// Scope for a volunteer's submissions. A missing or blank `tenant_id`
    /// falls back to [`default_tenant`](Self::default_tenant).
    pub fn submitter(&self, tenant_id: Option<&str>, volunteer_id: impl Into<String>) -> Submitter {
        let tenant = tenant_id
            .map(str::trim)
            .filter(|tenant| !tenant.is_empty())
            .unwrap_or(self.default_tenant.as_str());
        Submitter::new(tenant, volunteer_id)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.default_tenant.trim().is_empty() {
            return Err(ConfigLoadError::Invalid(
                "pipeline.default_tenant must not be empty".into(),
            ));
        }
        if self.compensation_attempts == 0 {
            return Err(ConfigLoadError::Invalid(
                "pipeline.compensation_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `fieldsurvey=debug,validate=info`.
    /// `FIELDSURVEY_LOG` overrides it at startup.
    ///
    /// Default: `"info"`
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    ///
    /// Default: `false`
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        tracing_subscriber::EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|err| ConfigLoadError::Invalid(format!("logging.level: {err}")))
    }
}
