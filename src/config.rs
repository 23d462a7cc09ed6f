// src/config.rs

use std::{fs, path::Path};

use serde::Deserialize;

use crate::error::ExtractError;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub ai: AiSection,
}

#[derive(Debug, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            media_dir: default_media_dir(),
        }
    }
}

fn default_db_path() -> String {
    "receipts/receipts.db".to_string()
}

fn default_media_dir() -> String {
    "receipts/media".to_string()
}

/// Which path produces the structured record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiBackend {
    /// OpenAI-compatible remote endpoint, API key read from the environment.
    Remote,
    /// Local Ollama server.
    Ollama,
    /// Skip the AI call entirely and use pattern extraction.
    Patterns,
}

#[derive(Debug, Deserialize)]
pub struct AiSection {
    #[serde(default = "default_backend")]
    pub backend: AiBackend,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Outbound request timeout; expiry counts as an AI-path failure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend() -> AiBackend {
    AiBackend::Ollama
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load from `path`; a missing file yields the default configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| ExtractError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| ExtractError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: Config = toml::from_str("[ai]\nbackend = \"patterns\"\n").unwrap();
        assert_eq!(cfg.ai.backend, AiBackend::Patterns);
        assert_eq!(cfg.ai.timeout_secs, 30);
        assert_eq!(cfg.storage.db_path, "receipts/receipts.db");
    }

    #[test]
    fn empty_document_is_the_default_config() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.ai.backend, AiBackend::Ollama);
        assert_eq!(cfg.ai.base_url, "http://localhost:11434/v1");
        assert_eq!(cfg.storage.media_dir, "receipts/media");
    }
}
