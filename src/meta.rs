//! Columnar chunk metadata store.
//!
//! One `Vec` per chunk field, all the same length, in the exact row order
//! the vectors were appended to the index during the same build. The store
//! persists as a single JSON document: a header (snapshot id, row count,
//! embedding provenance, build time) plus the column arrays. Loading
//! re-validates every column length against the header so silent drift
//! between the two snapshot artifacts cannot reach query time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::ChunkRecord;

/// Embedding provenance recorded with a snapshot, so a later `search` or
/// `dups` run can tell when the configured provider no longer matches what
/// built the artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub provider: String,
    pub model: String,
    pub dims: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Columns {
    id: Vec<String>,
    doc_id: Vec<String>,
    path: Vec<String>,
    title: Vec<String>,
    text: Vec<String>,
    lang: Vec<String>,
    product: Vec<String>,
    version: Vec<String>,
    audience: Vec<String>,
    tags: Vec<Vec<String>>,
    conditions_json: Vec<String>,
    rev: Vec<String>,
    hash: Vec<String>,
    source_file: Vec<String>,
}

impl Columns {
    /// Column lengths in declaration order, for parity validation.
    fn lengths(&self) -> [(&'static str, usize); 14] {
        [
            ("id", self.id.len()),
            ("doc_id", self.doc_id.len()),
            ("path", self.path.len()),
            ("title", self.title.len()),
            ("text", self.text.len()),
            ("lang", self.lang.len()),
            ("product", self.product.len()),
            ("version", self.version.len()),
            ("audience", self.audience.len()),
            ("tags", self.tags.len()),
            ("conditions_json", self.conditions_json.len()),
            ("rev", self.rev.len()),
            ("hash", self.hash.len()),
            ("source_file", self.source_file.len()),
        ]
    }
}

/// In-memory columnar store plus its snapshot header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataStore {
    snapshot: Uuid,
    rows: usize,
    provider: String,
    model: String,
    dims: usize,
    built_at: DateTime<Utc>,
    columns: Columns,
}

impl MetadataStore {
    /// An empty store for a fresh build.
    pub fn new(snapshot: Uuid, build: BuildInfo) -> Self {
        Self {
            snapshot,
            rows: 0,
            provider: build.provider,
            model: build.model,
            dims: build.dims,
            built_at: Utc::now(),
            columns: Columns::default(),
        }
    }

    /// Append a record as the next row. Append order must mirror the order
    /// vectors were added to the index.
    pub fn append(&mut self, record: ChunkRecord) {
        self.columns.id.push(record.id);
        self.columns.doc_id.push(record.doc_id);
        self.columns.path.push(record.path);
        self.columns.title.push(record.title);
        self.columns.text.push(record.text);
        self.columns.lang.push(record.lang);
        self.columns.product.push(record.product);
        self.columns.version.push(record.version);
        self.columns.audience.push(record.audience);
        self.columns.tags.push(record.tags);
        self.columns.conditions_json.push(record.conditions_json);
        self.columns.rev.push(record.rev);
        self.columns.hash.push(record.hash);
        self.columns.source_file.push(record.source_file);
        self.rows += 1;
    }

    /// Reassemble the record at `row`, or `None` past the end.
    pub fn get(&self, row: usize) -> Option<ChunkRecord> {
        if row >= self.rows {
            return None;
        }
        Some(ChunkRecord {
            id: self.columns.id[row].clone(),
            doc_id: self.columns.doc_id[row].clone(),
            path: self.columns.path[row].clone(),
            title: self.columns.title[row].clone(),
            text: self.columns.text[row].clone(),
            lang: self.columns.lang[row].clone(),
            product: self.columns.product[row].clone(),
            version: self.columns.version[row].clone(),
            audience: self.columns.audience[row].clone(),
            tags: self.columns.tags[row].clone(),
            conditions_json: self.columns.conditions_json[row].clone(),
            rev: self.columns.rev[row].clone(),
            hash: self.columns.hash[row].clone(),
            source_file: self.columns.source_file[row].clone(),
        })
    }

    /// Direct column reads for hot paths that don't need a whole record.
    pub fn lang_at(&self, row: usize) -> Option<&str> {
        self.columns.lang.get(row).map(|s| s.as_str())
    }

    pub fn doc_id_at(&self, row: usize) -> Option<&str> {
        self.columns.doc_id.get(row).map(|s| s.as_str())
    }

    pub fn id_at(&self, row: usize) -> Option<&str> {
        self.columns.id.get(row).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn snapshot_id(&self) -> Uuid {
        self.snapshot
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Serialize the store to `path` as one JSON document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| Error::Integrity(format!("cannot serialize metadata: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate a store written by [`MetadataStore::save`].
    ///
    /// # Errors
    ///
    /// `Integrity` for a missing or unparseable file, or any column whose
    /// length disagrees with the header row count.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Integrity(format!(
                "cannot open metadata file {}: {}",
                path.display(),
                e
            ))
        })?;
        let store: MetadataStore = serde_json::from_str(&content).map_err(|e| {
            Error::Integrity(format!(
                "cannot parse metadata file {}: {}",
                path.display(),
                e
            ))
        })?;

        for (name, len) in store.columns.lengths() {
            if len != store.rows {
                return Err(Error::Integrity(format!(
                    "metadata column '{}' has {} entries, header says {} rows",
                    name, len, store.rows
                )));
            }
        }

        Ok(store)
    }
}
