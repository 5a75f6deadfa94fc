//! TOML configuration.
//!
//! Every section carries defaults, so an empty file yields a usable
//! configuration. The model API key may also come from the
//! `GEMINI_API_KEY` environment variable, which wins over the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted for the model API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_prefix: default_api_prefix(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_api_prefix() -> String {
    "/api/v1".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            model: default_model_name(),
            base_url: default_model_base_url(),
            api_key: None,
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

fn default_model_provider() -> String {
    "gemini".to_string()
}
fn default_model_name() -> String {
    "gemini-pro".to_string()
}
fn default_model_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_model_timeout_secs() -> u64 {
    60
}

impl ModelConfig {
    /// Resolves the API key: environment first, then the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Sessions untouched for this long are dropped by the background sweep.
    #[serde(default = "default_session_idle_secs")]
    pub idle_ttl_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            idle_ttl_secs: default_session_idle_secs(),
        }
    }
}

fn default_max_turns() -> usize {
    5
}

fn default_session_idle_secs() -> u64 {
    86400
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Directory for scoped upload scratch files. Defaults to the OS temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            scratch_dir: None,
        }
    }
}

fn default_max_file_size() -> u64 {
    15 * 1024 * 1024
}

impl UploadConfig {
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_embedding_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Chunks submitted per build/add call during ingestion.
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
    /// Cached indexes older than this are dropped by the sweep.
    #[serde(default = "default_index_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: default_index_batch_size(),
            ttl_secs: default_index_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_index_batch_size() -> usize {
    1000
}
fn default_index_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_sweep_interval_secs() -> u64 {
    15 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_retrieval_k(),
        }
    }
}

fn default_retrieval_k() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: default_search_enabled(),
            max_results: default_max_results(),
            endpoint: default_search_endpoint(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_search_enabled() -> bool {
    true
}
fn default_max_results() -> usize {
    3
}
fn default_search_endpoint() -> String {
    "https://api.duckduckgo.com/".to_string()
}
fn default_search_timeout_secs() -> u64 {
    10
}

/// Token settings carried for API compatibility. The chat core does not read them.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_expire_minutes")]
    pub access_token_expire_minutes: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_expire_minutes: default_token_expire_minutes(),
        }
    }
}

fn default_token_expire_minutes() -> u64 {
    30
}

/// Parses and validates configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.conversation.max_turns == 0 {
        anyhow::bail!("conversation.max_turns must be > 0");
    }

    if config.search.max_results < 1 {
        anyhow::bail!("search.max_results must be >= 1");
    }

    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }

    if config.index.batch_size == 0 {
        anyhow::bail!("index.batch_size must be > 0");
    }

    if config.upload.max_file_size == 0 {
        anyhow::bail!("upload.max_file_size must be > 0");
    }

    if config.model.provider != "gemini" {
        anyhow::bail!(
            "Unknown model provider: '{}'. Must be gemini.",
            config.model.provider
        );
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.conversation.max_turns, 5);
        assert_eq!(config.upload.max_file_size, 15 * 1024 * 1024);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.index.batch_size, 1000);
        assert_eq!(config.retrieval.k, 2);
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.server.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.auth.access_token_expire_minutes, 30);
        assert_eq!(config.model.model, "gemini-pro");
    }

    #[test]
    fn overrides_are_read() {
        let config = parse_config(
            r#"
[conversation]
max_turns = 3

[server]
bind = "0.0.0.0:9000"
cors_origins = ["http://localhost:8501"]

[embedding]
provider = "ollama"
model = "nomic-embed-text"
"#,
        )
        .unwrap();
        assert_eq!(config.conversation.max_turns, 3);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.embedding.provider, "ollama");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn zero_turns_rejected() {
        assert!(parse_config("[conversation]\nmax_turns = 0\n").is_err());
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let err = parse_config("[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn remote_embedding_requires_model() {
        assert!(parse_config("[embedding]\nprovider = \"openai\"\n").is_err());
    }

    #[test]
    fn example_config_parses() {
        let config = parse_config(include_str!("../config/efiko.example.toml")).unwrap();
        assert_eq!(config.server.api_prefix, "/api/v1");
        assert_eq!(config.index.ttl_secs, 86400);
        assert_eq!(config.conversation.idle_ttl_secs, 86400);
        assert!(config.search.enabled);
    }
}
