//! Configuration management for Parlance
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ParlanceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Parlance
///
/// Holds provider settings and session behavior. A missing config file
/// is not an error: defaults apply, so `parlance chat` works against a
/// local Ollama out of the box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider configuration (OpenAI, Anthropic, Ollama)
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Session behavior configuration
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Provider configuration
///
/// Specifies which adapter to use and its per-vendor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use (openai, anthropic, ollama)
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// OpenAI-style adapter configuration
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Anthropic-style adapter configuration
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Ollama adapter configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_provider_type() -> String {
    "ollama".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            openai: OpenAiConfig::default(),
            anthropic: AnthropicConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// OpenAI-style adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API base URL (useful for tests and local mocks)
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,

    /// Model to request
    #[serde(default = "default_openai_model")]
    pub model: String,
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: default_openai_api_base(),
            model: default_openai_model(),
        }
    }
}

/// Anthropic-style adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// API base URL (useful for tests and local mocks)
    #[serde(default = "default_anthropic_api_base")]
    pub api_base: String,

    /// Model to request
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Value for the `anthropic-version` header
    #[serde(default = "default_anthropic_version")]
    pub version: String,
}

fn default_anthropic_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_base: default_anthropic_api_base(),
            model: default_anthropic_model(),
            version: default_anthropic_version(),
        }
    }
}

/// Ollama adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to request
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Session behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Auto-save debounce delay in seconds
    #[serde(default = "default_autosave_seconds")]
    pub autosave_seconds: u64,

    /// Identifier persisted sessions are scoped to
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Identifier recorded as the producing agent
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
}

fn default_autosave_seconds() -> u64 {
    30
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_agent_id() -> String {
    "assistant".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_seconds: default_autosave_seconds(),
            user_id: default_user_id(),
            agent_id: default_agent_id(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file with CLI overrides applied
    ///
    /// A missing file yields the default configuration; a present but
    /// malformed file is an error.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `provider_override` - Optional provider type from the CLI
    pub fn load(path: impl AsRef<Path>, provider_override: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&contents)?
        } else {
            tracing::debug!("config file {} not found, using defaults", path.display());
            Self::default()
        };

        if let Some(provider) = provider_override {
            config.provider.provider_type = provider.to_string();
        }

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ParlanceError::Config` for an unknown provider type or
    /// a zero auto-save delay.
    pub fn validate(&self) -> Result<()> {
        match self.provider.provider_type.as_str() {
            "openai" | "anthropic" | "ollama" => {}
            other => {
                return Err(ParlanceError::Config(format!(
                    "unknown provider type: {} (expected openai, anthropic, or ollama)",
                    other
                ))
                .into());
            }
        }

        if self.session.autosave_seconds == 0 {
            return Err(
                ParlanceError::Config("autosave_seconds must be greater than zero".into()).into(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.provider_type, "ollama");
        assert_eq!(config.session.autosave_seconds, 30);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/parlance.yaml", None).unwrap();
        assert_eq!(config.provider.provider_type, "ollama");
    }

    #[test]
    fn test_load_parses_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "provider:\n  type: openai\n  openai:\n    model: gpt-4o\nsession:\n  autosave_seconds: 5\n",
        )
        .unwrap();

        let config = Config::load(&path, None).unwrap();
        assert_eq!(config.provider.provider_type, "openai");
        assert_eq!(config.provider.openai.model, "gpt-4o");
        assert_eq!(config.session.autosave_seconds, 5);
        // Unspecified sections keep their defaults
        assert_eq!(config.provider.ollama.host, "http://localhost:11434");
    }

    #[test]
    fn test_load_malformed_yaml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "provider: [unclosed").unwrap();
        assert!(Config::load(&path, None).is_err());
    }

    #[test]
    fn test_cli_provider_override_wins() {
        let config = Config::load("/nonexistent/parlance.yaml", Some("anthropic")).unwrap();
        assert_eq!(config.provider.provider_type, "anthropic");
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = Config::default();
        config.provider.provider_type = "gemini".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown provider type"));
    }

    #[test]
    fn test_validate_rejects_zero_autosave() {
        let mut config = Config::default();
        config.session.autosave_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.provider.provider_type, config.provider.provider_type);
        assert_eq!(back.session.user_id, config.session.user_id);
    }
}
