//! Core data models used throughout docvec.
//!
//! These types represent the chunks, filters, and results that flow through
//! the build, search, and dedup pipelines.

use serde::{Deserialize, Serialize};

/// One embeddable unit of documentation text with its provenance metadata.
///
/// Records are produced by extraction, embedded in build order, and stored
/// column-wise in the metadata file; the record at row `i` always describes
/// the vector at row `i` of the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique within a build run: `<doc_id>::<seq>`.
    pub id: String,
    pub doc_id: String,
    /// Breadcrumb location, e.g. `Acme Install Guide > Prerequisites`.
    pub path: String,
    /// Last path segment.
    pub title: String,
    pub text: String,
    pub lang: String,
    pub product: String,
    pub version: String,
    pub audience: String,
    pub tags: Vec<String>,
    /// Serialized condition map, `{}` when unconditional.
    pub conditions_json: String,
    pub rev: String,
    /// sha256 hex prefix of `text`, for change tracking across builds.
    pub hash: String,
    pub source_file: String,
}

/// Optional exact-match facets applied after vector retrieval.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub product: Option<String>,
    pub version: Option<String>,
    pub lang: Option<String>,
}

impl SearchFilters {
    /// True when the record passes every non-null facet.
    pub fn matches(&self, record: &ChunkRecord) -> bool {
        if let Some(product) = &self.product {
            if &record.product != product {
                return false;
            }
        }
        if let Some(version) = &self.version {
            if &record.version != version {
                return false;
            }
        }
        if let Some(lang) = &self.lang {
            if &record.lang != lang {
                return false;
            }
        }
        true
    }
}

/// A ranked search hit in the shape both the CLI and the HTTP API return.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Inner-product similarity, rounded to 4 decimals.
    pub score: f32,
    pub id: String,
    pub text: String,
    pub path: String,
    pub title: String,
    pub product: String,
    pub version: String,
    pub lang: String,
}

/// One near-duplicate candidate pair, canonical order (`id_a` < `id_b`).
#[derive(Debug, Clone)]
pub struct DuplicatePair {
    pub sim: f32,
    pub id_a: String,
    pub id_b: String,
    pub doc_a: String,
    pub doc_b: String,
    pub title_a: String,
    pub title_b: String,
    pub path_a: String,
    pub path_b: String,
    pub lang_a: String,
    pub lang_b: String,
    pub version_a: String,
    pub version_b: String,
    pub product_a: String,
    pub product_b: String,
    pub text_a: String,
    pub text_b: String,
}

/// Per-run extraction accounting, printed at the end of a build.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Documents parsed and chunked.
    pub succeeded: usize,
    /// Documents parsed but contributing no chunks (empty or all-ignorable).
    pub skipped: usize,
    /// Documents that failed to parse.
    pub failed: usize,
    /// `(file, reason)` for each failure, in walk order.
    pub failures: Vec<(String, String)>,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(product: &str, version: &str, lang: &str) -> ChunkRecord {
        ChunkRecord {
            id: "doc::1".into(),
            doc_id: "doc".into(),
            path: "Doc > Sec".into(),
            title: "Sec".into(),
            text: "text".into(),
            lang: lang.into(),
            product: product.into(),
            version: version.into(),
            audience: String::new(),
            tags: Vec::new(),
            conditions_json: "{}".into(),
            rev: String::new(),
            hash: "abc".into(),
            source_file: "doc.xml".into(),
        }
    }

    #[test]
    fn empty_filters_match_everything() {
        let f = SearchFilters::default();
        assert!(f.matches(&record("AcmeX", "v3.2", "en")));
    }

    #[test]
    fn each_facet_is_exact_match() {
        let f = SearchFilters {
            product: Some("AcmeX".into()),
            version: None,
            lang: Some("en".into()),
        };
        assert!(f.matches(&record("AcmeX", "v3.2", "en")));
        assert!(!f.matches(&record("AcmeY", "v3.2", "en")));
        assert!(!f.matches(&record("AcmeX", "v3.2", "de")));
        // Case-sensitive, no normalization.
        assert!(!f.matches(&record("acmex", "v3.2", "en")));
    }
}
