//! Configuration types for the generator, the validator, and the gate.

use crate::{Error, Result};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Env var overriding the generator base URL.
pub const ENV_GENERATOR_URL: &str = "VIGIL_GENERATOR_URL";
/// Env var overriding the generator model.
pub const ENV_GENERATOR_MODEL: &str = "VIGIL_GENERATOR_MODEL";
/// Env var holding the generator API key.
pub const ENV_GENERATOR_API_KEY: &str = "VIGIL_GENERATOR_API_KEY";
/// Fallback env var for the generator API key.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Env var overriding the validator endpoint.
pub const ENV_VALIDATOR_URL: &str = "VIGIL_VALIDATOR_URL";
/// Env var overriding the validator model.
pub const ENV_VALIDATOR_MODEL: &str = "VIGIL_VALIDATOR_MODEL";
/// Env var overriding the validator timeout in milliseconds.
pub const ENV_VALIDATOR_TIMEOUT_MS: &str = "VIGIL_VALIDATOR_TIMEOUT_MS";

/// Complete configuration.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Streaming generation backend
    pub generator: GeneratorConfig,
    /// Safety classification backend
    pub validator: ValidatorConfig,
    /// Race gate behaviour
    pub gate: GateConfig,
}

/// Wire protocol spoken by the generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    /// OpenAI-compatible `/chat/completions` with server-sent events
    #[default]
    ChatCompletions,
    /// Ollama `/api/generate` with newline-delimited JSON
    Ollama,
}

impl GeneratorKind {
    /// Base URL used when none is configured.
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::ChatCompletions => "http://127.0.0.1:8001/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }

    /// Model used when none is configured.
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::ChatCompletions => "meta-llama/Llama-3.3-70B-Instruct",
            Self::Ollama => "llama3.2:3b",
        }
    }
}

/// Generation backend configuration.
///
/// `base_url` and `model` fall back to the defaults of `kind` when unset, so
/// switching protocols does not keep the other protocol's endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Protocol of the backend
    pub kind: GeneratorKind,
    /// Base URL, without the endpoint path
    pub base_url: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Bearer token, if the backend needs one
    pub api_key: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
}

impl GeneratorConfig {
    /// Configured base URL, or the default for `kind`.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }

    /// Configured model, or the default for `kind`.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.kind.default_model())
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::ChatCompletions,
            base_url: None,
            model: None,
            api_key: None,
            max_tokens: 512,
            temperature: 0.7,
        }
    }
}

/// Safety classifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Full chat completions endpoint
    pub url: String,
    /// Classifier model identifier
    pub model: String,
    /// Maximum tokens in the classifier reply
    pub max_tokens: usize,
    /// Upper bound on one classification, in milliseconds
    pub timeout_ms: u64,
}

impl ValidatorConfig {
    /// Returns the classification timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/v1/chat/completions".to_owned(),
            model: "meta-llama/Llama-3.2-3B-Instruct".to_owned(),
            max_tokens: 10,
            timeout_ms: 10_000,
        }
    }
}

/// Race gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Characters of the discarded buffer kept in an abort preview
    pub preview_chars: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { preview_chars: 50 }
    }
}

impl VigilConfig {
    /// Get the default config directory path (`~/.vigil`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".vigil"))
    }

    /// Get the default config file path (`~/.vigil/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from `path` if it exists, otherwise use defaults.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(
            "Loaded config from {:?}: generator={} validator={} generator_api_key={}",
            path,
            config.generator.base_url(),
            config.validator.url,
            if config.generator.api_key.is_some() {
                "present"
            } else {
                "missing"
            }
        );

        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns an error if an override has an invalid value
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_GENERATOR_URL) {
            self.generator.base_url = Some(url);
        }
        if let Some(model) = lookup(ENV_GENERATOR_MODEL) {
            self.generator.model = Some(model);
        }
        if let Some(key) = lookup(ENV_GENERATOR_API_KEY).or_else(|| lookup(ENV_OPENAI_API_KEY)) {
            self.generator.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_VALIDATOR_URL) {
            self.validator.url = url;
        }
        if let Some(model) = lookup(ENV_VALIDATOR_MODEL) {
            self.validator.model = model;
        }
        if let Some(raw) = lookup(ENV_VALIDATOR_TIMEOUT_MS) {
            self.validator.timeout_ms = raw.trim().parse().map_err(|error| {
                Error::Config(format!("{ENV_VALIDATOR_TIMEOUT_MS}={raw}: {error}"))
            })?;
        }
        self.validate()
    }

    /// Check values that would make a race meaningless.
    ///
    /// # Errors
    /// Returns an error if the validator timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.validator.timeout_ms == 0 {
            return Err(Error::Config(
                "validator.timeout_ms must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = VigilConfig::default();
        assert_eq!(config.generator.kind, GeneratorKind::ChatCompletions);
        assert_eq!(config.generator.max_tokens, 512);
        assert_eq!(config.generator.base_url(), "http://127.0.0.1:8001/v1");
        assert_eq!(config.generator.model(), "meta-llama/Llama-3.3-70B-Instruct");
        assert_eq!(
            config.validator.url,
            "http://127.0.0.1:8000/v1/chat/completions"
        );
        assert_eq!(config.validator.max_tokens, 10);
        assert_eq!(config.validator.timeout(), Duration::from_secs(10));
        assert_eq!(config.gate.preview_chars, 50);
    }

    #[test]
    fn test_load_partial_toml_keeps_defaults() {
        let toml_content = r#"
[generator]
kind = "ollama"
base_url = "http://localhost:11434"
model = "llama3.1:8b"

[validator]
timeout_ms = 2500
"#;
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(toml_content.as_bytes())
            .expect("Failed to write to temp file");

        let config =
            VigilConfig::load_from_file(temp_file.path()).expect("Failed to load config");

        assert_eq!(config.generator.kind, GeneratorKind::Ollama);
        assert_eq!(config.generator.model(), "llama3.1:8b");
        assert_eq!(config.validator.timeout_ms, 2500);
        assert_eq!(config.validator.model, "meta-llama/Llama-3.2-3B-Instruct");
        assert_eq!(config.gate, GateConfig::default());
    }

    #[test]
    fn test_ollama_kind_uses_ollama_defaults() {
        let config: VigilConfig =
            toml::from_str("[generator]\nkind = \"ollama\"\n").expect("valid toml");
        assert_eq!(config.generator.base_url(), "http://localhost:11434");
        assert_eq!(config.generator.model(), "llama3.2:3b");
    }

    #[test]
    fn test_explicit_generator_values_win_over_kind_defaults() {
        let config = GeneratorConfig {
            kind: GeneratorKind::Ollama,
            base_url: Some("http://gpu:11434".to_owned()),
            ..GeneratorConfig::default()
        };
        assert_eq!(config.base_url(), "http://gpu:11434");
        assert_eq!(config.model(), "llama3.2:3b");
    }

    #[test]
    fn test_load_rejects_zero_timeout() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"[validator]\ntimeout_ms = 0\n")
            .expect("Failed to write to temp file");

        let error = VigilConfig::load_from_file(temp_file.path()).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = VigilConfig::load_or_default(&dir.path().join("missing.toml"))
            .expect("defaults should load");
        assert_eq!(config, VigilConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = VigilConfig::default();
        config
            .apply_env(lookup_from(&[
                (ENV_VALIDATOR_URL, "http://guard:9000/v1/chat/completions"),
                (ENV_VALIDATOR_TIMEOUT_MS, "1500"),
                (ENV_GENERATOR_MODEL, "tiny"),
                (ENV_OPENAI_API_KEY, "sk-test"),
            ]))
            .expect("overrides should apply");

        assert_eq!(config.validator.url, "http://guard:9000/v1/chat/completions");
        assert_eq!(config.validator.timeout_ms, 1500);
        assert_eq!(config.generator.model(), "tiny");
        assert_eq!(config.generator.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_env_generator_key_wins_over_openai_key() {
        let mut config = VigilConfig::default();
        config
            .apply_env(lookup_from(&[
                (ENV_GENERATOR_API_KEY, "vigil-key"),
                (ENV_OPENAI_API_KEY, "openai-key"),
            ]))
            .expect("overrides should apply");
        assert_eq!(config.generator.api_key.as_deref(), Some("vigil-key"));
    }

    #[test]
    fn test_env_invalid_timeout() {
        let mut config = VigilConfig::default();
        let error = config
            .apply_env(lookup_from(&[(ENV_VALIDATOR_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(error.to_string().contains(ENV_VALIDATOR_TIMEOUT_MS));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = VigilConfig::default();
        let text = toml::to_string_pretty(&config).expect("serialize failed");
        assert!(text.contains("[validator]"));
        let parsed: VigilConfig = toml::from_str(&text).expect("deserialize failed");
        assert_eq!(parsed, config);
    }
}
