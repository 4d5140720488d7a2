//! TOML configuration parsing and validation.
//!
//! Every command reads one configuration file (default
//! `./config/lsum.toml`). Sections other than `[db]` are optional and fall
//! back to the defaults documented on each field.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::EvictionPolicy;
use crate::generation::{load_model, ModelSettings};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Owning account for every collection this process touches.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    #[serde(default = "default_account")]
    pub name: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            name: default_account(),
        }
    }
}

fn default_account() -> String {
    "lecture_tool".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum segments returned by a topic query, before the file filter.
    #[serde(default = "default_topic_limit")]
    pub topic_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            topic_limit: default_topic_limit(),
        }
    }
}

fn default_topic_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    ["**/*.txt", "**/*.md", "**/*.pdf", "**/*.docx", "**/*.pptx"]
        .iter()
        .map(|g| g.to_string())
        .collect()
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    /// `ollama`, `openai`, or `disabled`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_true")]
    pub deterministic: bool,
    #[serde(default = "default_instruction")]
    pub instruction: String,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sentinel")]
    pub not_found_sentinel: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            temperature: 0.0,
            deterministic: true,
            instruction: default_instruction(),
            max_context_chars: default_max_context_chars(),
            timeout_secs: default_timeout_secs(),
            not_found_sentinel: default_sentinel(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    "llama3.1".to_string()
}
fn default_true() -> bool {
    true
}
fn default_instruction() -> String {
    "key points".to_string()
}
fn default_max_context_chars() -> usize {
    6000
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_sentinel() -> String {
    crate::points::NOT_FOUND_SENTINEL.to_string()
}

impl SummarizerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            deterministic: self.deterministic,
        }
    }

    /// Endpoint with the provider's well-known default filled in.
    pub fn endpoint(&self) -> String {
        match (&self.endpoint, self.provider.as_str()) {
            (Some(e), _) => e.trim_end_matches('/').to_string(),
            (None, "openai") => "https://api.openai.com".to_string(),
            (None, _) => "http://localhost:11434".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// `0` keeps every summary for the life of the process.
    #[serde(default)]
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn eviction_policy(&self) -> EvictionPolicy {
        match self.max_entries {
            0 => EvictionPolicy::Never,
            n => EvictionPolicy::MaxEntries(n),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.account.name.trim().is_empty() {
        bail!("account.name must not be empty");
    }

    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    if config.retrieval.topic_limit < 1 {
        bail!("retrieval.topic_limit must be >= 1");
    }

    let summarizer = &config.summarizer;
    match summarizer.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown summarizer provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if summarizer.max_context_chars == 0 {
        bail!("summarizer.max_context_chars must be > 0");
    }
    if summarizer.not_found_sentinel.trim().is_empty() {
        bail!("summarizer.not_found_sentinel must not be empty");
    }
    if summarizer.instruction.trim().is_empty() {
        bail!("summarizer.instruction must not be empty");
    }
    load_model(&summarizer.model_settings())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse("[db]\npath = \"./data/lsum.sqlite\"\n").unwrap();
        assert_eq!(cfg.account.name, "lecture_tool");
        assert_eq!(cfg.summarizer.instruction, "key points");
        assert_eq!(cfg.summarizer.not_found_sentinel, "Not Found");
        assert_eq!(cfg.summarizer.endpoint(), "http://localhost:11434");
        assert_eq!(cfg.cache.eviction_policy(), EvictionPolicy::Never);
        assert!(cfg.summarizer.deterministic);
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse("[db]\npath = \"x\"\n[summarizer]\nprovider = \"bard\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown summarizer provider"));
    }

    #[test]
    fn rejects_sampling_temperature_when_deterministic() {
        let err =
            parse("[db]\npath = \"x\"\n[summarizer]\ntemperature = 0.7\n").unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn cache_capacity_maps_to_policy() {
        let cfg = parse("[db]\npath = \"x\"\n[cache]\nmax_entries = 8\n").unwrap();
        assert_eq!(cfg.cache.eviction_policy(), EvictionPolicy::MaxEntries(8));
    }

    #[test]
    fn openai_endpoint_default() {
        let cfg = parse("[db]\npath = \"x\"\n[summarizer]\nprovider = \"openai\"\n").unwrap();
        assert_eq!(cfg.summarizer.endpoint(), "https://api.openai.com");
    }
}
