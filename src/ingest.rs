//! Build pipeline orchestration.
//!
//! Coordinates the full build flow: corpus walk → extraction → chunking →
//! embedding → snapshot write. Extraction is per-document fault tolerant;
//! embedding is not, since a partial vector set could not stay row-aligned
//! with the metadata.

use anyhow::{bail, Result};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding;
use crate::extract;
use crate::index::VectorIndex;
use crate::meta::{BuildInfo, MetadataStore};
use crate::models::IngestReport;
use crate::snapshot::Snapshot;

pub async fn run_build(config: &Config, dry_run: bool) -> Result<()> {
    let (records, report) = extract::extract_corpus(config)?;

    if dry_run {
        println!("build (dry-run)");
        print_report(&report);
        println!("  chunks to embed: {}", records.len());
        println!(
            "  provider: {} / {}",
            config.embedding.provider,
            config.embedding.model.as_deref().unwrap_or("(default)")
        );
        return Ok(());
    }

    if records.is_empty() {
        bail!(
            "no chunks extracted from {}; nothing to build",
            config.ingest.xml_dir.display()
        );
    }

    let provider = embedding::create_provider(&config.embedding)?;
    info!(
        chunks = records.len(),
        provider = %config.embedding.provider,
        model = %provider.model_name(),
        "embedding corpus"
    );

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(records.len());
    for batch in records.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
        let embedded = embedding::embed_texts(provider.as_ref(), &texts).await?;
        vectors.extend(embedded);
    }

    let snapshot_id = Uuid::new_v4();
    let index = VectorIndex::build(vectors, snapshot_id)?;
    let mut meta = MetadataStore::new(
        snapshot_id,
        BuildInfo {
            provider: config.embedding.provider.clone(),
            model: provider.model_name().to_string(),
            dims: provider.dims(),
        },
    );
    let rows = records.len();
    for record in records {
        meta.append(record);
    }

    let snapshot = Snapshot::new(index, meta)?;
    snapshot.save(&config.data.dir)?;

    println!("build");
    print_report(&report);
    println!("  chunks embedded: {}", rows);
    println!("  dimensions: {}", snapshot.index().dim());
    println!("  snapshot: {}", snapshot_id);
    println!(
        "  wrote {}",
        Snapshot::index_path(&config.data.dir).display()
    );
    println!(
        "  wrote {}",
        Snapshot::meta_path(&config.data.dir).display()
    );
    println!("ok");
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!(
        "  documents: {} chunked, {} skipped, {} failed ({} total)",
        report.succeeded,
        report.skipped,
        report.failed,
        report.total()
    );
    for (file, reason) in &report.failures {
        println!("    failed {file}: {reason}");
    }
}
