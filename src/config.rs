//! Configuration management for openpipe
//!
//! Parses TOML configuration files and provides typed access to settings.
//! A [`Config`] is loaded once at startup and handed to the clients that need
//! it; nothing reads configuration from global state.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Environment variable consulted when `openpipe.api_key` is not set
pub const OPENPIPE_API_KEY_ENV: &str = "OPENPIPE_API_KEY";
/// Environment variable consulted when `provider.api_key` is not set
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Upper bound for provider request timeouts
const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 600;
/// Upper bound for report transmission timeouts
const MAX_REPORT_TIMEOUT_SECONDS: u64 = 60;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub openpipe: OpenPipeConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// OpenPipe API settings (routed completions and the report sink)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenPipeConfig {
    #[serde(default = "default_openpipe_base_url")]
    base_url: String,
    #[serde(default)]
    api_key: Option<String>,
}

impl OpenPipeConfig {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Get the API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configured API key, falling back to `OPENPIPE_API_KEY`
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(OPENPIPE_API_KEY_ENV).ok())
    }
}

impl Default for OpenPipeConfig {
    fn default() -> Self {
        Self::new(default_openpipe_base_url(), None)
    }
}

fn default_openpipe_base_url() -> String {
    "https://app.openpipe.ai/api/v1".to_string()
}

/// Wrapped provider settings (OpenAI-compatible API)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    base_url: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    request_timeout_seconds: u64,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            request_timeout_seconds: default_request_timeout(),
        }
    }

    /// Get the provider base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configured API key, falling back to `OPENAI_API_KEY`
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(OPENAI_API_KEY_ENV).ok())
    }

    /// Get the request timeout in seconds
    pub fn request_timeout_seconds(&self) -> u64 {
        self.request_timeout_seconds
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(default_provider_base_url(), None)
    }
}

fn default_provider_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// Report sink settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportingConfig {
    #[serde(default = "default_reporting_enabled")]
    pub enabled: bool,
    #[serde(default = "default_report_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: default_reporting_enabled(),
            timeout_seconds: default_report_timeout(),
        }
    }
}

fn default_reporting_enabled() -> bool {
    true
}

fn default_report_timeout() -> u64 {
    10
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Configuration pointing both clients at the given base URLs
    ///
    /// Used when there is no config file, e.g. in tests against mock servers.
    pub fn with_base_urls(openpipe_base_url: &str, provider_base_url: &str) -> Self {
        Self {
            openpipe: OpenPipeConfig::new(openpipe_base_url, None),
            provider: ProviderConfig::new(provider_base_url, None),
            reporting: ReportingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()` and `from_str()`, but can
    /// also be called explicitly when constructing Config via other means.
    pub fn validate(&self) -> AppResult<()> {
        for (section, base_url) in [
            ("openpipe", self.openpipe.base_url()),
            ("provider", self.provider.base_url()),
        ] {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "{}.base_url '{}' must start with 'http://' or 'https://'",
                    section, base_url
                )));
            }
            // Paths are appended verbatim ("/chat/completions", "/report")
            if base_url.ends_with('/') {
                return Err(AppError::Config(format!(
                    "{}.base_url '{}' must not end with '/'",
                    section, base_url
                )));
            }
        }

        let timeout = self.provider.request_timeout_seconds;
        if timeout == 0 || timeout > MAX_REQUEST_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "provider.request_timeout_seconds must be in 1..={}, got {}",
                MAX_REQUEST_TIMEOUT_SECONDS, timeout
            )));
        }

        let timeout = self.reporting.timeout_seconds;
        if timeout == 0 || timeout > MAX_REPORT_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "reporting.timeout_seconds must be in 1..={}, got {}",
                MAX_REPORT_TIMEOUT_SECONDS, timeout
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
