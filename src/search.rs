//! Query pipeline: encode the query, overfetch from the index, apply
//! metadata filters in rank order, truncate to `k`.

use anyhow::Result as AnyResult;
use std::sync::Arc;
use tracing::debug;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{SearchFilters, SearchHit};
use crate::snapshot::Snapshot;

/// Chars of chunk text shown in CLI excerpts.
const EXCERPT_CHARS: usize = 240;

/// Executes searches against one snapshot with one provider.
///
/// Cheap to construct per request: both members are `Arc`s, so the server
/// builds a fresh engine from the live snapshot handle on every call while
/// the CLI builds one and uses it once.
pub struct SearchEngine {
    snapshot: Arc<Snapshot>,
    provider: Arc<dyn EmbeddingProvider>,
    overfetch_floor: usize,
}

impl SearchEngine {
    pub fn new(
        snapshot: Arc<Snapshot>,
        provider: Arc<dyn EmbeddingProvider>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            snapshot,
            provider,
            overfetch_floor: retrieval.overfetch_floor,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Top-`k` chunks for `query`, honoring the filters.
    ///
    /// The index is asked for `max(k, overfetch_floor)` candidates and the
    /// filters are applied in rank order until `k` survive. The window is
    /// fixed: highly selective filters can return fewer than `k` hits even
    /// when more matches exist deeper in the index, which is an accepted
    /// trade against re-querying.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embedding::embed_query(self.provider.as_ref(), query).await?;
        let overfetch = k.max(self.overfetch_floor);
        let candidates = self.snapshot.index().search(&query_vec, overfetch)?;
        debug!(
            k,
            overfetch,
            candidates = candidates.len(),
            "scored query against index"
        );

        let mut results = Vec::new();
        for candidate in candidates {
            let record = self.snapshot.record(candidate.row).ok_or_else(|| {
                Error::Integrity(format!(
                    "index row {} has no metadata record",
                    candidate.row
                ))
            })?;
            if !filters.matches(&record) {
                continue;
            }
            results.push(SearchHit {
                score: round4(candidate.score),
                id: record.id,
                text: record.text,
                path: record.path,
                title: record.title,
                product: record.product,
                version: record.version,
                lang: record.lang,
            });
            if results.len() == k {
                break;
            }
        }

        Ok(results)
    }
}

/// CLI entry point for `dvx search`.
pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    filters: &SearchFilters,
) -> AnyResult<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let snapshot = Arc::new(Snapshot::load(&config.data.dir)?);
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);
    let engine = SearchEngine::new(snapshot, provider, &config.retrieval);

    let k = k.unwrap_or(config.retrieval.default_k);
    let results = engine.search(query, k, filters).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} {} / {}",
            i + 1,
            hit.score,
            hit.product,
            hit.version,
            hit.title
        );
        println!("    path: {}", hit.path);
        println!("    lang: {}", hit.lang);
        println!("    excerpt: \"{}\"", excerpt(&hit.text, EXCERPT_CHARS));
        println!("    id: {}", hit.id);
        println!();
    }

    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if out.len() < text.len() {
        out.push_str("...");
    }
    out
}

/// Scores leave the engine at 4 decimals, the same precision the duplicate
/// report prints.
fn round4(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}
