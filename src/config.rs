use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    pub server: ServerConfig,
}

/// Where snapshot artifacts (index + metadata) live.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Root of the DocBook corpus.
    pub xml_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.xml".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1200
}

/// Metadata applied to every chunk whose document does not carry the field
/// itself.
#[derive(Debug, Deserialize, Clone)]
pub struct DefaultsConfig {
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_product")]
    pub product: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub rev: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_conditions")]
    pub conditions: serde_json::Value,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            product: default_product(),
            version: default_version(),
            audience: String::new(),
            rev: String::new(),
            tags: Vec::new(),
            conditions: default_conditions(),
        }
    }
}

fn default_lang() -> String {
    "en".to_string()
}
fn default_product() -> String {
    "generic".to_string()
}
fn default_version() -> String {
    "v1".to_string()
}
fn default_conditions() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// One of `local`, `openai`, `hash`.
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// The index is always asked for at least this many rows so post-filter
    /// truncation has something to work with.
    #[serde(default = "default_overfetch_floor")]
    pub overfetch_floor: usize,
    #[serde(default = "default_k")]
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            overfetch_floor: default_overfetch_floor(),
            default_k: default_k(),
        }
    }
}

fn default_overfetch_floor() -> usize {
    20
}
fn default_k() -> usize {
    5
}

/// Near-duplicate mining knobs. `k` and `threshold` carry no defaults:
/// a dups run refuses to start until config or CLI flags supply both.
#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default = "default_dedup_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_different_docs")]
    pub different_docs: bool,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    /// Restrict the scan to these languages; empty means all.
    #[serde(default)]
    pub langs: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            k: None,
            threshold: None,
            batch_size: default_dedup_batch_size(),
            different_docs: default_different_docs(),
            preview_chars: default_preview_chars(),
            langs: Vec::new(),
        }
    }
}

fn default_dedup_batch_size() -> usize {
    2048
}
fn default_different_docs() -> bool {
    true
}
fn default_preview_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("cannot read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::Configuration(format!("cannot parse config file: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        return Err(Error::Configuration("chunking.max_chars must be > 0".into()));
    }

    if config.retrieval.default_k == 0 {
        return Err(Error::Configuration("retrieval.default_k must be >= 1".into()));
    }
    if config.retrieval.overfetch_floor == 0 {
        return Err(Error::Configuration(
            "retrieval.overfetch_floor must be >= 1".into(),
        ));
    }

    match config.embedding.provider.as_str() {
        "local" | "openai" | "hash" => {}
        other => {
            return Err(Error::Configuration(format!(
                "unknown embedding provider: '{}'. Must be local, openai, or hash.",
                other
            )));
        }
    }
    if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
        return Err(Error::Configuration(format!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        )));
    }
    if config.embedding.model.is_none() && config.embedding.provider != "hash" {
        return Err(Error::Configuration(format!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        )));
    }
    if config.embedding.batch_size == 0 {
        return Err(Error::Configuration("embedding.batch_size must be >= 1".into()));
    }

    if let Some(k) = config.dedup.k {
        if k == 0 {
            return Err(Error::Configuration("dedup.k must be >= 1".into()));
        }
    }
    if let Some(threshold) = config.dedup.threshold {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::Configuration(
                "dedup.threshold must be in (0.0, 1.0]".into(),
            ));
        }
    }
    if config.dedup.batch_size == 0 {
        return Err(Error::Configuration("dedup.batch_size must be >= 1".into()));
    }
    if config.dedup.preview_chars == 0 {
        return Err(Error::Configuration("dedup.preview_chars must be >= 1".into()));
    }

    Ok(())
}
