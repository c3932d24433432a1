//! Corpus and snapshot overview.
//!
//! Gives a quick read on what `dvx build` would see: per-file parse results
//! with the extracted metadata, a sample of the first document's sections,
//! and the currently built snapshot if one exists. Used to debug corpus
//! markup before a costly embedding run.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::extract::{self, ParsedDoc};
use crate::snapshot::Snapshot;

/// One corpus file as the extractor sees it.
struct FileOverview {
    file: String,
    title: String,
    lang: String,
    product: String,
    version: String,
    sections: usize,
}

/// Run the inspect command: walk the corpus and print a summary.
pub fn run_inspect(config: &Config) -> Result<()> {
    let xml_dir = &config.ingest.xml_dir;

    println!("docvec - corpus overview");
    println!("========================");
    println!();
    println!("  Corpus dir:  {}", xml_dir.display());
    println!("  Data dir:    {}", config.data.dir.display());
    println!();

    if !xml_dir.exists() {
        println!("  corpus directory does not exist");
        println!();
        return Ok(());
    }

    let files = extract::list_corpus_files(
        xml_dir,
        &config.ingest.include_globs,
        &config.ingest.exclude_globs,
    )?;

    let mut overviews: Vec<FileOverview> = Vec::new();
    let mut failures: Vec<(String, String)> = Vec::new();
    let mut sample: Option<ParsedDoc> = None;

    for rel in files {
        let path = xml_dir.join(&rel);
        match extract::parse_docbook_file(&path, &rel) {
            Ok(doc) => {
                overviews.push(FileOverview {
                    file: rel,
                    title: doc.title.clone().unwrap_or_else(|| "-".into()),
                    lang: doc.lang.clone().unwrap_or_else(|| "-".into()),
                    product: doc.product.clone().unwrap_or_else(|| "-".into()),
                    version: doc.version.clone().unwrap_or_else(|| "-".into()),
                    sections: doc.sections.len(),
                });
                if sample.is_none() {
                    sample = Some(doc);
                }
            }
            Err(e) => failures.push((rel, e.to_string())),
        }
    }

    println!(
        "  Files:       {} matched, {} parseable, {} failed",
        overviews.len() + failures.len(),
        overviews.len(),
        failures.len()
    );

    if !overviews.is_empty() {
        println!();
        println!(
            "  {:<28} {:<26} {:<6} {:<10} {:<8} {:>8}",
            "FILE", "TITLE", "LANG", "PRODUCT", "VERSION", "SECTIONS"
        );
        println!("  {}", "-".repeat(92));
        for o in &overviews {
            println!(
                "  {:<28} {:<26} {:<6} {:<10} {:<8} {:>8}",
                clip(&o.file, 28),
                clip(&o.title, 26),
                o.lang,
                o.product,
                o.version,
                o.sections
            );
        }
    }

    if !failures.is_empty() {
        println!();
        println!("  Parse failures:");
        for (file, reason) in &failures {
            println!("    {file}: {reason}");
        }
    }

    if let Some(doc) = sample {
        print_sample(&doc);
    }

    println!();
    print_snapshot(&config.data.dir);
    println!();
    Ok(())
}

/// First parseable document's section outline, with short body previews.
fn print_sample(doc: &ParsedDoc) {
    println!();
    println!(
        "  Sample: {}",
        doc.title.as_deref().unwrap_or("(untitled)")
    );
    if doc.sections.is_empty() {
        match &doc.first_para {
            Some(para) => println!("    (no sections) {}", clip(para, 72)),
            None => println!("    (no sections, no text)"),
        }
        return;
    }
    for section in doc.sections.iter().take(5) {
        println!(
            "    {:<26} {}",
            section.title.as_deref().unwrap_or("(untitled)"),
            clip(&section.body, 60)
        );
    }
    if doc.sections.len() > 5 {
        println!("    ... {} more", doc.sections.len() - 5);
    }
}

fn print_snapshot(data_dir: &Path) {
    match Snapshot::load(data_dir) {
        Ok(snapshot) => {
            let meta = snapshot.meta();
            let index_size = file_size(&Snapshot::index_path(data_dir));
            let meta_size = file_size(&Snapshot::meta_path(data_dir));
            println!("  Snapshot:    {}", meta.snapshot_id());
            println!("  Built:       {}", meta.built_at().format("%Y-%m-%d %H:%M"));
            println!("  Provider:    {} / {}", meta.provider(), meta.model());
            println!("  Rows:        {}", meta.len());
            println!("  Dimensions:  {}", meta.dims());
            println!(
                "  Artifacts:   {} (index), {} (metadata)",
                format_bytes(index_size),
                format_bytes(meta_size)
            );
        }
        Err(e) => {
            println!("  Snapshot:    none ({e})");
        }
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Truncate a cell value so table columns stay aligned.
fn clip(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
