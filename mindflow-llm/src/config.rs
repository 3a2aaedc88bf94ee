//! Connection settings for the generation backend.

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "MINDFLOW_API_KEY";

/// Generation backend settings (`[llm]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `openai`, `ollama` or `none`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Base URL of the API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key; falls back to `MINDFLOW_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    /// The configured key, or the environment fallback.
    #[must_use]
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }

    /// Reject unknown providers and out-of-range sampling values.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] naming the offending field.
    pub fn validate(&self) -> Result<(), LlmError> {
        if !matches!(self.provider.as_str(), "openai" | "ollama" | "none") {
            return Err(LlmError::ConfigError(format!(
                "unknown provider '{}'",
                self.provider
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(LlmError::ConfigError(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(LlmError::ConfigError(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}
fn default_model() -> String {
    "deepseek-chat".to_string()
}
fn default_temperature() -> f32 {
    0.32
}
fn default_timeout_ms() -> u64 {
    60_000
}
fn default_max_retries() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LlmConfig::default();
        assert_eq!(cfg.base_url, "https://api.deepseek.com");
        assert!((cfg.temperature - 0.32).abs() < f32::EPSILON);
        assert_eq!(cfg.request_timeout_ms, 60_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: LlmConfig = toml::from_str("provider = \"ollama\"\nmodel = \"qwen2.5\"").expect("parse");
        assert_eq!(cfg.provider, "ollama");
        assert_eq!(cfg.model, "qwen2.5");
        assert_eq!(cfg.max_retries, 2);
    }

    #[test]
    fn configured_key_wins() {
        let cfg = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        assert_eq!(cfg.resolved_api_key().as_deref(), Some("sk-test"));
    }

    #[test]
    fn validate_rejects_unknown_provider() {
        let cfg = LlmConfig {
            provider: "llamacpp".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(LlmError::ConfigError(_))));
    }
}
