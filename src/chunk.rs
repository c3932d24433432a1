//! Sentence-boundary text chunker.
//!
//! Splits section text into pieces that respect a configurable `max_chars`
//! limit. Splitting occurs greedily on `'.'` boundaries so each chunk holds
//! whole sentences; joining the returned pieces with `'.'` reproduces the
//! input exactly. The splitter is deliberately simple and lossy about what a
//! "sentence" is (abbreviations and decimal points also split), which is
//! acceptable for retrieval, where chunk cohesion matters more than grammar.
//!
//! Each chunk receives an id unique within the build run (`<doc_id>::<seq>`)
//! plus a SHA-256 hash prefix of its text for change tracking.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::config::DefaultsConfig;
use crate::models::ChunkRecord;

/// Per-sentence allowance for the `". "` separator a renderer re-inserts
/// when sentences are joined back together.
const JOIN_OVERHEAD: usize = 2;

/// Hex characters of the SHA-256 digest kept as the content hash.
const HASH_PREFIX_LEN: usize = 16;

/// Split `text` into sentence groups of roughly `max_chars` characters.
///
/// Text at or under the limit is returned unchanged as a single chunk. A
/// single sentence longer than `max_chars` becomes its own oversize chunk;
/// it is never broken mid-sentence and never produces an empty chunk.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for sentence in text.split('.') {
        let current_est: usize = current
            .iter()
            .map(|s| s.chars().count() + JOIN_OVERHEAD)
            .sum();
        if current_est + sentence.chars().count() < max_chars {
            current.push(sentence);
        } else {
            if !current.is_empty() {
                parts.push(current.join("."));
            }
            current = vec![sentence];
        }
    }

    if !current.is_empty() {
        parts.push(current.join("."));
    }

    parts
}

/// Issues chunk ids as `<doc_id>::<seq>` with a monotonic per-document
/// sequence starting at 1. One counter value lives for one build run; there
/// is no shared or process-wide state behind it.
#[derive(Debug, Default)]
pub struct ChunkIdCounter {
    next: HashMap<String, u64>,
}

impl ChunkIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, doc_id: &str) -> String {
        let seq = self.next.entry(doc_id.to_string()).or_insert(0);
        *seq += 1;
        format!("{}::{}", doc_id, seq)
    }
}

/// First 16 hex chars of the SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..HASH_PREFIX_LEN].to_string()
}

/// Assemble a [`ChunkRecord`] for one piece of section text.
///
/// The title is the last `>`-separated segment of `path`; metadata comes
/// from the per-document resolved defaults.
pub fn make_chunk(
    counter: &mut ChunkIdCounter,
    doc_id: &str,
    path: &str,
    text: &str,
    meta: &DefaultsConfig,
    source_file: &str,
) -> ChunkRecord {
    let title = path.rsplit('>').next().unwrap_or(path).trim().to_string();
    let conditions_json =
        serde_json::to_string(&meta.conditions).unwrap_or_else(|_| "{}".to_string());

    ChunkRecord {
        id: counter.next_id(doc_id),
        doc_id: doc_id.to_string(),
        path: path.to_string(),
        title,
        text: text.to_string(),
        lang: meta.lang.clone(),
        product: meta.product.clone(),
        version: meta.version.clone(),
        audience: meta.audience.clone(),
        tags: meta.tags.clone(),
        conditions_json,
        rev: meta.rev.clone(),
        hash: content_hash(text),
        source_file: source_file.to_string(),
    }
}
