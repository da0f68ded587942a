//! Engine Configuration
//!
//! Two kinds of settings live here:
//!
//! - **Endpoint** settings (base URL, API key, model) that differ per install.
//!   They load from `$XDG_CONFIG_HOME/samaan/conductor.toml` and can be
//!   overridden by environment variables.
//! - **Engine limits** (token cap, history window, page text budget, request
//!   timeout). These are fixed constants; [`ConductorConfig`] carries them as
//!   fields so embedders and tests can build a config directly, but neither the
//!   file nor the environment can change them.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (`SAMAAN_BASE_URL`, `SAMAAN_MODEL`, `SAMAAN_API_KEY`)
//! 2. TOML configuration file
//! 3. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [endpoint]
//! base_url = "https://api.featherless.ai/v1"
//! model = "openai/gpt-oss-120b"
//! api_key = "rc_..."
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Response token cap sent with every request
pub const MAX_TOKENS: u32 = 800;
/// Sliding window of history turns included in a prompt
pub const MAX_HISTORY: usize = 8;
/// Page body characters included in a prompt
pub const CONTEXT_CHARS: usize = 6000;
/// Heading lines included in a prompt
pub const MAX_PROMPT_HEADINGS: usize = 15;
/// Longest an endpoint may stay silent during one streamed request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Shortest text selection that triggers the clarify flow
pub const MIN_SELECTION_LENGTH: usize = 20;
/// Sampling temperature
pub const TEMPERATURE: f32 = 0.3;
/// Nucleus sampling cutoff
pub const TOP_P: f32 = 0.9;
/// Paint opportunities per second while streaming
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Default completion endpoint base URL
pub const DEFAULT_BASE_URL: &str = "https://api.featherless.ai/v1";
/// Default model identifier
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-120b";

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

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Endpoint section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointToml {
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`)
    pub base_url: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Bearer token
    pub api_key: Option<String>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorToml {
    /// Completion endpoint settings
    pub endpoint: EndpointToml,
}

impl ConductorToml {
    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Conductor configuration
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// Base URL of the completion API
    pub base_url: String,
    /// Bearer token (empty means no Authorization header)
    pub api_key: String,
    /// Model to use
    pub model: String,
    /// Response token cap
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// History turns included in each prompt
    pub max_history: usize,
    /// Page body characters included in each prompt
    pub context_chars: usize,
    /// Inactivity timeout per request
    pub request_timeout: Duration,
    /// Interval between paint opportunities while streaming
    pub frame_interval: Duration,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_history: MAX_HISTORY,
            context_chars: CONTEXT_CHARS,
            request_timeout: REQUEST_TIMEOUT,
            frame_interval: FRAME_INTERVAL,
        }
    }
}

impl ConductorConfig {
    /// Apply endpoint values from a parsed TOML file
    #[must_use]
    pub fn with_toml(mut self, file: &ConductorToml) -> Self {
        if let Some(ref base_url) = file.endpoint.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(ref model) = file.endpoint.model {
            self.model = model.clone();
        }
        if let Some(ref api_key) = file.endpoint.api_key {
            self.api_key = api_key.clone();
        }
        self
    }

    /// Apply endpoint values from environment variables
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Some(base_url) = env_value("SAMAAN_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(model) = env_value("SAMAAN_MODEL") {
            self.model = model;
        }
        if let Some(api_key) = env_value("SAMAAN_API_KEY") {
            self.api_key = api_key;
        }
        self
    }

    /// Check the endpoint settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        let url = url::Url::parse(&self.base_url).map_err(|e| {
            ConfigError::ValidationError(format!("invalid base_url {:?}: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "base_url must use http or https, got {:?}",
                url.scheme()
            )));
        }

        Ok(())
    }

    /// Full URL of the chat completion endpoint
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Default config file location (`$XDG_CONFIG_HOME/samaan/conductor.toml`)
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("samaan").join("conductor.toml"))
}

/// Load configuration from a specific file, then apply the environment
pub fn load_config_from_path(path: &Path) -> Result<ConductorConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let file = ConductorToml::parse(&content)?;

    let config = ConductorConfig::default().with_toml(&file).with_env();
    config.validate()?;

    tracing::debug!(path = ?path, model = %config.model, "Loaded configuration file");
    Ok(config)
}

/// Load configuration from the default location.
///
/// A missing file is not an error: defaults plus environment are used.
pub fn load_config() -> Result<ConductorConfig, ConfigError> {
    match default_config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => {
            let config = ConductorConfig::default().with_env();
            config.validate()?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_engine_constants() {
        let config = ConductorConfig::default();
        assert_eq!(config.max_tokens, 800);
        assert_eq!(config.max_history, 8);
        assert_eq!(config.context_chars, 6000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_endpoint_only() {
        let file = ConductorToml::parse(
            r#"
            [endpoint]
            base_url = "http://localhost:8080/v1/"
            model = "local/tiny"
            "#,
        )
        .unwrap();

        let config = ConductorConfig::default().with_toml(&file);
        assert_eq!(config.model, "local/tiny");
        assert_eq!(config.completions_url(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(config.max_history, MAX_HISTORY);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_wrong_value_type_is_parse_error() {
        let err = ConductorToml::parse("[endpoint]\nmodel = 5").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation() {
        let config = ConductorConfig {
            model: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let config = ConductorConfig {
            base_url: "ftp://example.com".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[endpoint]\nmodel = \"from/file\"\napi_key = \"k\"").unwrap();

        let config = load_config_from_path(file.path()).unwrap();
        // SAMAAN_MODEL is not set in the test environment
        if std::env::var("SAMAAN_MODEL").is_err() {
            assert_eq!(config.model, "from/file");
        }
        assert_eq!(config.max_tokens, MAX_TOKENS);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_config_from_path(Path::new("/nonexistent/samaan.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
