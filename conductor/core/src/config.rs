//! TOML Configuration File Support
//!
//! Centralized configuration loading, supporting a TOML file at
//! `~/.config/companion/conductor.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`COMPANION_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [delivery]
//! inter_bubble_delay_ms = 500
//! long_text_threshold = 120
//!
//! [quota]
//! refresh_timeout_ms = 10000
//! fallback = "fail_soft"        # or "fail_closed"
//! fail_soft_allowance = 5
//!
//! [provider]
//! base_url = "https://api.example.com"
//! timeout_ms = 30000
//! max_continuations = 2
//!
//! [transcript]
//! max_entries = 500
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conductor::ConductorConfig;
use crate::quota::FallbackPolicy;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[delivery]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryToml {
    /// Pause before each bubble after the first, in milliseconds
    pub inter_bubble_delay_ms: Option<u64>,
    /// Characters above which unpunctuated replies are split
    pub long_text_threshold: Option<usize>,
}

/// `[quota]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaToml {
    /// Bound on a quota fetch, in milliseconds
    pub refresh_timeout_ms: Option<u64>,
    /// `fail_soft` or `fail_closed`
    pub fallback: Option<String>,
    /// Turns granted while degraded under `fail_soft`
    pub fail_soft_allowance: Option<u32>,
}

/// `[provider]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// Base URL of the companion service
    pub base_url: Option<String>,
    /// Bearer token for the companion service
    pub api_key: Option<String>,
    /// Bound on a turn request, in milliseconds
    pub timeout_ms: Option<u64>,
    /// Maximum unprompted continuation rounds per send
    pub max_continuations: Option<u32>,
    /// Text shown when a turn request fails
    pub fallback_message: Option<String>,
}

/// `[transcript]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptToml {
    /// Maximum retained entries (0 = unlimited)
    pub max_entries: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionToml {
    /// Delivery section
    pub delivery: DeliveryToml,
    /// Quota section
    pub quota: QuotaToml,
    /// Provider section
    pub provider: ProviderToml,
    /// Transcript section
    pub transcript: TranscriptToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Configuration resolved from every source
#[derive(Clone, Debug)]
pub struct CompanionConfig {
    /// Orchestrator settings
    pub conductor: ConductorConfig,
    /// Base URL of the companion service
    pub provider_base_url: Option<String>,
    /// Bearer token for the companion service
    pub api_key: Option<String>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            conductor: ConductorConfig::default(),
            provider_base_url: None,
            api_key: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl CompanionConfig {
    /// Primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Default configuration file path
///
/// `$XDG_CONFIG_HOME/companion/conductor.toml`, or the platform equivalent.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("companion").join("conductor.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or holds
/// an invalid value. A missing file is not an error.
pub fn load_config() -> Result<CompanionConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if a value is
/// invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CompanionConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CompanionConfig, ConfigError> {
    let mut config = CompanionConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CompanionToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;

    Ok(config)
}

/// Parse a fallback policy name
///
/// # Errors
///
/// Returns a validation error for anything but `fail_soft` or `fail_closed`.
pub fn parse_fallback(name: &str, allowance: u32) -> Result<FallbackPolicy, ConfigError> {
    match name.trim().to_lowercase().replace('-', "_").as_str() {
        "fail_soft" | "soft" => Ok(FallbackPolicy::FailSoft { allowance }),
        "fail_closed" | "closed" => Ok(FallbackPolicy::FailClosed),
        other => Err(ConfigError::ValidationError(format!(
            "unknown quota fallback '{other}' (expected fail_soft or fail_closed)"
        ))),
    }
}

fn current_allowance(policy: FallbackPolicy) -> u32 {
    match policy {
        FallbackPolicy::FailSoft { allowance } => allowance,
        FallbackPolicy::FailClosed => crate::quota::DEFAULT_FAIL_SOFT_ALLOWANCE,
    }
}

fn apply_toml_config(config: &mut CompanionConfig, toml: &CompanionToml) -> Result<(), ConfigError> {
    let conductor = &mut config.conductor;

    // Delivery
    if let Some(ms) = toml.delivery.inter_bubble_delay_ms {
        conductor.segmenter.inter_bubble_delay = Duration::from_millis(ms);
    }
    if let Some(threshold) = toml.delivery.long_text_threshold {
        if threshold == 0 {
            return Err(ConfigError::ValidationError(
                "delivery.long_text_threshold must be greater than 0".to_string(),
            ));
        }
        conductor.segmenter.long_text_threshold = threshold;
    }

    // Quota
    if let Some(ms) = toml.quota.refresh_timeout_ms {
        conductor.quota.refresh_timeout = Duration::from_millis(ms);
    }
    let allowance = toml
        .quota
        .fail_soft_allowance
        .unwrap_or_else(|| current_allowance(conductor.quota.fallback));
    conductor.quota.fallback = match toml.quota.fallback.as_deref() {
        Some(name) => parse_fallback(name, allowance)?,
        None => match conductor.quota.fallback {
            FallbackPolicy::FailSoft { .. } => FallbackPolicy::FailSoft { allowance },
            FallbackPolicy::FailClosed => FallbackPolicy::FailClosed,
        },
    };

    // Provider
    if toml.provider.base_url.is_some() {
        config.provider_base_url = toml.provider.base_url.clone();
    }
    if toml.provider.api_key.is_some() {
        config.api_key = toml.provider.api_key.clone();
    }
    if let Some(ms) = toml.provider.timeout_ms {
        config.conductor.provider_timeout = Duration::from_millis(ms);
    }
    if let Some(max) = toml.provider.max_continuations {
        config.conductor.max_continuations = max;
    }
    if let Some(ref message) = toml.provider.fallback_message {
        config.conductor.fallback_message = message.clone();
    }

    // Transcript
    if let Some(max) = toml.transcript.max_entries {
        config.conductor.max_transcript_entries = max;
    }

    Ok(())
}

fn apply_env_config(
    config: &mut CompanionConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(url) = env("COMPANION_PROVIDER_URL") {
        config.provider_base_url = Some(url);
        config.source = ConfigSource::Env;
    }
    if let Some(key) = env("COMPANION_API_KEY") {
        config.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env("COMPANION_PROVIDER_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.conductor.provider_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(max) = env("COMPANION_MAX_CONTINUATIONS").and_then(|v| v.parse::<u32>().ok()) {
        config.conductor.max_continuations = max;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env("COMPANION_INTER_BUBBLE_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.conductor.segmenter.inter_bubble_delay = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env("COMPANION_QUOTA_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.conductor.quota.refresh_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }

    let allowance = env("COMPANION_FAIL_SOFT_ALLOWANCE").and_then(|v| v.parse::<u32>().ok());
    if let Some(name) = env("COMPANION_QUOTA_FALLBACK") {
        let allowance =
            allowance.unwrap_or_else(|| current_allowance(config.conductor.quota.fallback));
        config.conductor.quota.fallback = parse_fallback(&name, allowance)?;
        config.source = ConfigSource::Env;
    } else if let Some(allowance) = allowance {
        if let FallbackPolicy::FailSoft { .. } = config.conductor.quota.fallback {
            config.conductor.quota.fallback = FallbackPolicy::FailSoft { allowance };
            config.source = ConfigSource::Env;
        }
    }

    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Provider base URL override
    pub provider_base_url: Option<String>,
    /// Continuation cap override
    pub max_continuations: Option<u32>,
    /// Quota fallback override
    pub fallback: Option<FallbackPolicy>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set provider base URL override
    #[must_use]
    pub fn with_provider_base_url(mut self, url: String) -> Self {
        self.provider_base_url = Some(url);
        self
    }

    /// Set continuation cap override
    #[must_use]
    pub fn with_max_continuations(mut self, max: u32) -> Self {
        self.max_continuations = Some(max);
        self
    }

    /// Set quota fallback override
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CompanionConfig) {
        if self.provider_base_url.is_some()
            || self.max_continuations.is_some()
            || self.fallback.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.provider_base_url {
            config.provider_base_url = Some(url.clone());
        }
        if let Some(max) = self.max_continuations {
            config.conductor.max_continuations = max;
        }
        if let Some(fallback) = self.fallback {
            config.conductor.quota.fallback = fallback;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
