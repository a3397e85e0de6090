use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub ai: AiConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    /// Path to the catalog SQLite database.
    pub path: PathBuf,
}

/// Connection settings for the external search engine. Host and API key
/// left empty means "not configured": indexing and index-backed search are
/// silently disabled and only the fallback path runs.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_engine_port")]
    pub port: u16,
    #[serde(default = "default_engine_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_engine_port(),
            protocol: default_engine_protocol(),
            api_key: String::new(),
            collection: default_collection(),
            timeout_secs: default_engine_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.api_key.is_empty()
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

fn default_engine_port() -> u16 {
    8108
}
fn default_engine_protocol() -> String {
    "http".to_string()
}
fn default_collection() -> String {
    "site_content".to_string()
}
fn default_engine_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Entity kinds eligible for indexing. An unscoped query is always
    /// filtered down to these.
    #[serde(default = "default_indexable_types")]
    pub types: Vec<String>,
    /// Resync pagination size.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Bulk import batch size for the CLI backfill.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Debounce delay before a scheduled full resync runs.
    #[serde(default = "default_resync_delay_secs")]
    pub resync_delay_secs: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            types: default_indexable_types(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            resync_delay_secs: default_resync_delay_secs(),
        }
    }
}

fn default_indexable_types() -> Vec<String> {
    vec![
        "post".to_string(),
        "page".to_string(),
        "product".to_string(),
    ]
}
fn default_page_size() -> u32 {
    100
}
fn default_batch_size() -> u32 {
    40
}
fn default_resync_delay_secs() -> u64 {
    5
}

/// AI collaborator settings. The API key is read from the `OPENAI_API_KEY`
/// environment variable, never from the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            transcription_model: default_transcription_model(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_transcription_model() -> String {
    "whisper-1".to_string()
}
fn default_ai_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.indexing.page_size == 0 {
        anyhow::bail!("indexing.page_size must be > 0");
    }
    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be > 0");
    }
    if config.indexing.types.iter().any(|t| t.trim().is_empty()) {
        anyhow::bail!("indexing.types must not contain empty entries");
    }

    match config.engine.protocol.as_str() {
        "http" | "https" => {}
        other => anyhow::bail!(
            "Unknown engine protocol: '{}'. Must be http or https.",
            other
        ),
    }

    if config.engine.is_configured() && config.engine.port == 0 {
        anyhow::bail!("engine.port must be set when the engine is configured");
    }

    Ok(config)
}
