//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`HashProvider`]** — deterministic hashed bag-of-words; no model, no
//!   network. Meant for air-gapped deployments, CI, and smoke tests.
//! - **[`OpenAIProvider`]** — calls the OpenAI embeddings API with batching,
//!   retry, and backoff.
//! - **`LocalProvider`** — runs models locally via fastembed; requires the
//!   `local-embeddings` feature. No network calls after model download.
//!
//! # The unit-norm contract
//!
//! Providers return raw model output. [`embed_texts`] and [`embed_query`]
//! enforce the pipeline contract on top: one vector per input, every vector
//! exactly `dims()` wide, L2-normalized so the index's inner product equals
//! cosine similarity. Callers go through the wrappers, never the trait
//! method directly.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate a provider from configuration:
//!
//! ```rust
//! # use docvec::config::EmbeddingConfig;
//! # use docvec::embedding::create_provider;
//! let config = EmbeddingConfig {
//!     provider: "hash".into(),
//!     model: None,
//!     dims: Some(256),
//!     batch_size: 64,
//!     max_retries: 5,
//!     timeout_secs: 30,
//! };
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.dims(), 256);
//! ```
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Added to the norm before division so a zero vector divides cleanly
/// (and stays zero) instead of producing NaNs.
const NORM_EPS: f32 = 1e-12;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one raw (un-normalized) vector per input,
    /// in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a batch of texts and enforce the pipeline contract.
///
/// Verifies the provider returned one vector per input and that every
/// vector matches the provider's declared dimensionality, then
/// L2-normalizes each vector in place.
///
/// # Errors
///
/// `Provider` if the response shape is wrong or the upstream call failed.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut rows = provider.embed(texts).await?;

    if rows.len() != texts.len() {
        return Err(Error::Provider(format!(
            "expected {} embeddings, provider '{}' returned {}",
            texts.len(),
            provider.model_name(),
            rows.len()
        )));
    }
    for row in &mut rows {
        if row.len() != provider.dims() {
            return Err(Error::Provider(format!(
                "provider '{}' returned a {}-dim vector, expected {}",
                provider.model_name(),
                row.len(),
                provider.dims()
            )));
        }
        l2_normalize(row);
    }

    Ok(rows)
}

/// Embed a single query text.
///
/// Convenience wrapper around [`embed_texts`] for single-text use cases
/// (e.g. embedding a search query).
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let rows = embed_texts(provider, &[text.to_string()]).await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| Error::Provider("empty embedding response".into()))
}

/// Scale `vec` to unit L2 norm in place. Zero vectors stay zero.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    let denom = norm + NORM_EPS;
    for v in vec.iter_mut() {
        *v /= denom;
    }
}

// ============ Hash Provider ============

/// Deterministic hashed bag-of-words embeddings.
///
/// Each lowercased alphanumeric token is SHA-256-hashed to pick a slot and
/// a sign; token counts accumulate into the slot. Identical texts always
/// produce identical vectors and heavy word overlap produces high cosine
/// similarity, which is exactly what offline tests and air-gapped smoke
/// deployments need. Not a semantic model.
pub struct HashProvider {
    dims: usize,
}

const HASH_MODEL_NAME: &str = "hash-bow-v1";

impl HashProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let dims = config.dims.ok_or_else(|| {
            Error::Configuration("embedding.dims required for hash provider".into())
        })?;
        Ok(Self { dims })
    }
}

fn token_slot(token: &str, dims: usize) -> (usize, f32) {
    let digest = Sha256::digest(token.as_bytes());
    let mut idx_bytes = [0u8; 8];
    idx_bytes.copy_from_slice(&digest[..8]);
    let slot = (u64::from_le_bytes(idx_bytes) % dims as u64) as usize;
    let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
    (slot, sign)
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        HASH_MODEL_NAME
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut rows = Vec::with_capacity(texts.len());
        for text in texts {
            let mut v = vec![0.0f32; self.dims];
            let lowered = text.to_lowercase();
            for token in lowered
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
            {
                let (slot, sign) = token_slot(token, self.dims);
                v[slot] += sign;
            }
            // A tokenless text still gets a valid unit direction.
            if v.iter().all(|x| *x == 0.0) {
                v[0] = 1.0;
            }
            rows.push(v);
        }
        Ok(rows)
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls the `POST /v1/embeddings` endpoint with the configured model.
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIProvider {
    /// Model name (e.g. `"text-embedding-3-small"`).
    model: String,
    /// Vector dimensionality (e.g. `1536`).
    dims: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// `Configuration` if `model` or `dims` is not set in config, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            Error::Configuration("embedding.model required for OpenAI provider".into())
        })?;
        let dims = config.dims.ok_or_else(|| {
            Error::Configuration("embedding.dims required for OpenAI provider".into())
        })?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(Error::Configuration(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }

        Ok(Self {
            model,
            dims,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    /// Call the OpenAI embeddings API with retry/backoff.
    ///
    /// Retry strategy:
    /// - HTTP 429 or 5xx → retry with exponential backoff
    /// - HTTP 4xx (not 429) → fail immediately
    /// - Network error → retry
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Configuration("OPENAI_API_KEY not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_openai_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Provider(format!(
                            "OpenAI API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::Provider(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Provider("embedding failed after retries".into())))
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays in response order, which the API
/// guarantees matches input order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Provider("invalid OpenAI response: missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                Error::Provider("invalid OpenAI response: missing embedding".into())
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference via fastembed.
///
/// Models are downloaded on first use from Hugging Face and cached. After
/// the initial download, embeddings run entirely offline. ORT is bundled;
/// no system dependencies.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config.model.clone().ok_or_else(|| {
            Error::Configuration("embedding.model required for local provider".into())
        })?;
        let dims = config.dims.ok_or_else(|| {
            Error::Configuration("embedding.dims required for local provider".into())
        })?;
        // Fail on unknown model names at construction, not mid-build.
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(Error::Configuration(format!(
            "unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let fastembed_model = config_to_fastembed_model(&self.model_name)?;
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| {
                Error::Provider(format!("failed to initialize local embedding model: {}", e))
            })?;

            model
                .embed(texts, Some(batch_size))
                .map_err(|e| Error::Provider(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| Error::Provider(format!("local embedding task failed: {}", e)))?
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hash"` | [`HashProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"local"` | `LocalProvider` (fastembed, see features) |
///
/// # Errors
///
/// `Configuration` for unknown provider names or a provider that cannot be
/// initialized (missing config keys, API key, or feature flag).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hash" => Ok(Box::new(HashProvider::new(config)?)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(Error::Configuration(
            "local embedding provider requires --features local-embeddings".into(),
        )),
        other => Err(Error::Configuration(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}
