//! Near-duplicate mining: a batched self-join over the snapshot, emitting
//! canonical chunk pairs above a similarity threshold as a CSV report.

use anyhow::{Context, Result as AnyResult};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, DedupConfig};
use crate::error::{Error, Result};
use crate::models::{ChunkRecord, DuplicatePair};
use crate::snapshot::Snapshot;

/// Report column order. `text_a`/`text_b` hold truncated previews.
const REPORT_COLUMNS: &[&str] = &[
    "sim", "id_a", "id_b", "doc_a", "doc_b", "title_a", "title_b", "path_a", "path_b", "lang_a",
    "lang_b", "version_a", "version_b", "product_a", "product_b", "text_a", "text_b",
];

/// Resolved knobs for one detection run.
///
/// `k` and `threshold` carry no defaults on purpose: they trade recall of
/// paraphrased duplicates against false positives, so every run has to
/// state them, in config or on the command line.
#[derive(Debug, Clone)]
pub struct DedupParams {
    pub k: usize,
    pub threshold: f32,
    pub batch_size: usize,
    pub different_docs: bool,
    pub preview_chars: usize,
    /// Restrict the scan to these languages; empty means all.
    pub langs: Vec<String>,
}

impl DedupParams {
    /// Merges `[dedup]` config with CLI overrides; the CLI wins.
    pub fn resolve(
        config: &DedupConfig,
        k: Option<usize>,
        threshold: Option<f32>,
        langs: Option<Vec<String>>,
        same_docs: bool,
    ) -> Result<Self> {
        let k = k.or(config.k).ok_or_else(|| {
            Error::Configuration(
                "duplicate scan needs a neighbor count: set [dedup] k or pass --k".into(),
            )
        })?;
        let threshold = threshold.or(config.threshold).ok_or_else(|| {
            Error::Configuration(
                "duplicate scan needs a similarity threshold: set [dedup] threshold or pass --threshold"
                    .into(),
            )
        })?;
        if k == 0 {
            return Err(Error::Configuration(
                "dedup k must be at least 1".into(),
            ));
        }
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::Configuration(format!(
                "dedup threshold must be in (0, 1], got {threshold}"
            )));
        }
        Ok(Self {
            k,
            threshold,
            batch_size: config.batch_size,
            different_docs: if same_docs { false } else { config.different_docs },
            preview_chars: config.preview_chars,
            langs: langs.unwrap_or_else(|| config.langs.clone()),
        })
    }
}

/// Result of one scan. `pairs` is sorted by similarity, highest first;
/// equal similarities keep discovery order.
#[derive(Debug)]
pub struct DedupOutcome {
    pub pairs: Vec<DuplicatePair>,
    pub rows_scanned: usize,
    pub cancelled: bool,
}

pub struct DuplicateDetector {
    snapshot: Arc<Snapshot>,
    params: DedupParams,
}

impl DuplicateDetector {
    pub fn new(snapshot: Arc<Snapshot>, params: DedupParams) -> Self {
        Self { snapshot, params }
    }

    /// Scans every row against its `k` nearest neighbors.
    ///
    /// Each qualifying unordered pair is emitted exactly once, ordered so
    /// `id_a` is the lexically smaller id. The stop flag is consulted
    /// between batches only, never mid-batch; a stopped run returns the
    /// pairs found so far with `cancelled` set.
    pub fn detect(&self, stop: Option<&AtomicBool>) -> Result<DedupOutcome> {
        let index = self.snapshot.index();
        let meta = self.snapshot.meta();
        let rows = index.len();

        let mut pairs: Vec<DuplicatePair> = Vec::new();
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut rows_scanned = 0;
        let mut cancelled = false;

        let mut start = 0;
        while start < rows {
            if stop.map(|flag| flag.load(Ordering::Acquire)).unwrap_or(false) {
                cancelled = true;
                break;
            }
            let end = (start + self.params.batch_size).min(rows);

            let mut anchors: Vec<usize> = Vec::with_capacity(end - start);
            for row in start..end {
                let lang = meta.lang_at(row).ok_or_else(|| row_integrity(row))?;
                if self.lang_in_scope(lang) {
                    anchors.push(row);
                }
            }
            let queries: Vec<Vec<f32>> =
                anchors.iter().map(|&row| index.row(row).to_vec()).collect();
            let neighbors = index.search_batch(&queries, self.params.k)?;

            for (&row, hits) in anchors.iter().zip(&neighbors) {
                let doc = meta.doc_id_at(row).ok_or_else(|| row_integrity(row))?;
                for hit in hits {
                    if hit.row == row || hit.score < self.params.threshold {
                        continue;
                    }
                    let other_lang =
                        meta.lang_at(hit.row).ok_or_else(|| row_integrity(hit.row))?;
                    if !self.lang_in_scope(other_lang) {
                        continue;
                    }
                    let other_doc =
                        meta.doc_id_at(hit.row).ok_or_else(|| row_integrity(hit.row))?;
                    if self.params.different_docs && doc == other_doc {
                        continue;
                    }
                    let key = (row.min(hit.row), row.max(hit.row));
                    if !seen.insert(key) {
                        continue;
                    }
                    let a = meta.get(row).ok_or_else(|| row_integrity(row))?;
                    let b = meta.get(hit.row).ok_or_else(|| row_integrity(hit.row))?;
                    pairs.push(self.pair(hit.score, a, b));
                }
            }
            rows_scanned = end;
            start = end;
        }

        // Vec::sort_by is stable, so ties keep discovery order.
        pairs.sort_by(|x, y| {
            y.sim
                .partial_cmp(&x.sim)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(DedupOutcome {
            pairs,
            rows_scanned,
            cancelled,
        })
    }

    fn lang_in_scope(&self, lang: &str) -> bool {
        self.params.langs.is_empty() || self.params.langs.iter().any(|l| l == lang)
    }

    fn pair(&self, sim: f32, a: ChunkRecord, b: ChunkRecord) -> DuplicatePair {
        let (a, b) = if a.id <= b.id { (a, b) } else { (b, a) };
        DuplicatePair {
            sim,
            id_a: a.id,
            id_b: b.id,
            doc_a: a.doc_id,
            doc_b: b.doc_id,
            title_a: a.title,
            title_b: b.title,
            path_a: a.path,
            path_b: b.path,
            lang_a: a.lang,
            lang_b: b.lang,
            version_a: a.version,
            version_b: b.version,
            product_a: a.product,
            product_b: b.product,
            text_a: preview(&a.text, self.params.preview_chars),
            text_b: preview(&b.text, self.params.preview_chars),
        }
    }
}

fn row_integrity(row: usize) -> Error {
    Error::Integrity(format!("index row {row} has no metadata record"))
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Writes the pair report as CSV, header first, one pair per row.
pub fn write_report(path: &Path, pairs: &[DuplicatePair]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", REPORT_COLUMNS.join(","))?;
    for pair in pairs {
        let fields = [
            format!("{:.4}", pair.sim),
            csv_escape(&pair.id_a),
            csv_escape(&pair.id_b),
            csv_escape(&pair.doc_a),
            csv_escape(&pair.doc_b),
            csv_escape(&pair.title_a),
            csv_escape(&pair.title_b),
            csv_escape(&pair.path_a),
            csv_escape(&pair.path_b),
            csv_escape(&pair.lang_a),
            csv_escape(&pair.lang_b),
            csv_escape(&pair.version_a),
            csv_escape(&pair.version_b),
            csv_escape(&pair.product_a),
            csv_escape(&pair.product_b),
            csv_escape(&pair.text_a),
            csv_escape(&pair.text_b),
        ];
        writeln!(out, "{}", fields.join(","))?;
    }
    out.flush()?;
    Ok(())
}

/// RFC 4180: fields containing commas, quotes, or line breaks are wrapped
/// in double quotes with embedded quotes doubled.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// CLI entry point for `dvx dups`.
pub async fn run_dups(
    config: &Config,
    k: Option<usize>,
    threshold: Option<f32>,
    langs: Vec<String>,
    same_docs: bool,
    out: &Path,
) -> AnyResult<()> {
    let langs = if langs.is_empty() { None } else { Some(langs) };
    let params = DedupParams::resolve(&config.dedup, k, threshold, langs, same_docs)?;
    let threshold = params.threshold;

    let snapshot = Arc::new(Snapshot::load(&config.data.dir)?);
    let rows = snapshot.index().len();
    info!(
        rows,
        k = params.k,
        threshold,
        "scanning snapshot for near-duplicates"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_on_signal = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, stopping after the current batch");
            stop_on_signal.store(true, Ordering::Release);
        }
    });

    let detector = DuplicateDetector::new(snapshot, params);
    let outcome = tokio::task::spawn_blocking(move || detector.detect(Some(&stop)))
        .await
        .context("duplicate scan task failed")??;

    write_report(out, &outcome.pairs)?;

    if outcome.cancelled {
        println!(
            "Cancelled after {} of {} rows; partial results follow.",
            outcome.rows_scanned, rows
        );
    }
    if outcome.pairs.is_empty() {
        println!("No duplicate pairs at threshold {threshold:.2}.");
    } else {
        println!(
            "Found {} candidate pairs (threshold {:.2}).",
            outcome.pairs.len(),
            threshold
        );
    }
    println!("Report written to {}", out.display());
    Ok(())
}
