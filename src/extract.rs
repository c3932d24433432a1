//! DocBook 5 corpus extraction.
//!
//! Walks the configured corpus directory, parses each XML file with a
//! streaming event loop, and turns sections into [`ChunkRecord`]s. A file
//! that fails to parse is recorded in the [`IngestReport`] and skipped; one
//! bad export never aborts a build.
//!
//! Extraction rules:
//! - document id from the root element's `id`/`xml:id` attribute, falling
//!   back to the file stem
//! - document title is the first `<title>` in document order
//! - `xml:lang`, `<language>`, `<product>` and `<version>` on the document
//!   override the configured `[defaults]` for that document's chunks
//! - every top-level `<section>` becomes chunk text
//!   `"<doc title> > <section title> : <body>"`; nested sections fold into
//!   their ancestor; `role="legal"` and `role="copyright"` sections are
//!   dropped
//! - a document without sections contributes a single lead chunk
//!   `"<title>: <first para>"`
//! - all whitespace runs collapse to single spaces

use globset::{Glob, GlobSet, GlobSetBuilder};
use quick_xml::events::Event;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

use crate::chunk::{chunk_text, make_chunk, ChunkIdCounter};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{ChunkRecord, IngestReport};

/// Section roles that never reach the index.
const IGNORABLE_ROLES: [&str; 2] = ["legal", "copyright"];

/// One `<section>` with its accumulated text.
#[derive(Debug, Default)]
pub(crate) struct ParsedSection {
    pub(crate) title: Option<String>,
    pub(crate) role: Option<String>,
    /// All character data inside the section (title included), collapsed.
    pub(crate) body: String,
}

/// A parsed document before chunking.
#[derive(Debug, Default)]
pub(crate) struct ParsedDoc {
    pub(crate) doc_id: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) lang: Option<String>,
    pub(crate) product: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) first_para: Option<String>,
    pub(crate) sections: Vec<ParsedSection>,
}

/// Extract the whole corpus under `config.ingest.xml_dir`.
///
/// Returns the chunk records in deterministic order (files sorted by
/// relative path, sections in document order) and the per-file accounting.
pub fn extract_corpus(config: &Config) -> Result<(Vec<ChunkRecord>, IngestReport)> {
    let xml_dir = &config.ingest.xml_dir;
    if !xml_dir.exists() {
        return Err(Error::Configuration(format!(
            "ingest.xml_dir does not exist: {}",
            xml_dir.display()
        )));
    }

    let files = list_corpus_files(
        xml_dir,
        &config.ingest.include_globs,
        &config.ingest.exclude_globs,
    )?;

    let mut records = Vec::new();
    let mut report = IngestReport::default();
    let mut counter = ChunkIdCounter::new();

    for rel in files {
        let path = xml_dir.join(&rel);
        match parse_docbook_file(&path, &rel) {
            Ok(doc) => {
                let produced = chunk_document(&doc, &rel, config, &mut counter, &mut records);
                if produced == 0 {
                    report.skipped += 1;
                } else {
                    report.succeeded += 1;
                }
            }
            Err(e) => {
                warn!(file = %rel, error = %e, "skipping unparseable document");
                report.failed += 1;
                report.failures.push((rel, e.to_string()));
            }
        }
    }

    Ok((records, report))
}

/// Walk `root` and return the relative paths selected by the glob sets,
/// sorted for deterministic ordering.
pub(crate) fn list_corpus_files(
    root: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<String>> {
    let include_set = build_globset(include_globs)?;
    let exclude_set = build_globset(exclude_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(rel_str);
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern)
                .map_err(|e| Error::Configuration(format!("invalid glob pattern: {}", e)))?,
        );
    }
    builder
        .build()
        .map_err(|e| Error::Configuration(format!("invalid glob set: {}", e)))
}

pub(crate) fn parse_docbook_file(path: &Path, file_label: &str) -> Result<ParsedDoc> {
    let bytes = std::fs::read(path).map_err(|e| Error::Parse {
        file: file_label.to_string(),
        message: e.to_string(),
    })?;
    parse_docbook(&bytes, file_label)
}

/// Append `text`'s words to `dst`, collapsing whitespace runs (including
/// runs across event boundaries) to single spaces.
fn push_words(dst: &mut String, text: &str) {
    for word in text.split_whitespace() {
        if !dst.is_empty() {
            dst.push(' ');
        }
        dst.push_str(word);
    }
}

fn parse_err(file: &str, message: impl std::fmt::Display) -> Error {
    Error::Parse {
        file: file.to_string(),
        message: message.to_string(),
    }
}

/// Streaming DocBook parse. Namespace prefixes are ignored; elements match
/// on local name.
pub(crate) fn parse_docbook(xml: &[u8], file: &str) -> Result<ParsedDoc> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut doc = ParsedDoc::default();
    let mut root_seen = false;
    let mut depth = 0usize;
    let mut section_depth = 0usize;
    let mut open_section: Option<ParsedSection> = None;

    let mut in_title = false;
    let mut title_text = String::new();
    let mut in_para = false;
    let mut para_text = String::new();
    let mut in_language = false;
    let mut language_text = String::new();
    let mut in_product = false;
    let mut product_text = String::new();
    let mut in_version = false;
    let mut version_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;

                if !root_seen {
                    root_seen = true;
                    read_root_attrs(&e, &mut doc, file)?;
                }

                match e.local_name().as_ref() {
                    b"section" => {
                        section_depth += 1;
                        if section_depth == 1 {
                            let mut section = ParsedSection::default();
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"role" {
                                    section.role = Some(
                                        attr.unescape_value()
                                            .map_err(|err| parse_err(file, err))?
                                            .into_owned(),
                                    );
                                }
                            }
                            open_section = Some(section);
                        }
                    }
                    b"title" => {
                        in_title = true;
                        title_text.clear();
                    }
                    b"para" => {
                        if doc.first_para.is_none() {
                            in_para = true;
                            para_text.clear();
                        }
                    }
                    b"language" => {
                        in_language = true;
                        language_text.clear();
                    }
                    b"product" => {
                        in_product = true;
                        product_text.clear();
                    }
                    b"version" => {
                        in_version = true;
                        version_text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                depth = depth.saturating_sub(1);
                match e.local_name().as_ref() {
                    b"section" => {
                        if section_depth == 1 {
                            if let Some(section) = open_section.take() {
                                doc.sections.push(section);
                            }
                        }
                        section_depth = section_depth.saturating_sub(1);
                    }
                    b"title" => {
                        in_title = false;
                        if !title_text.is_empty() {
                            if doc.title.is_none() {
                                doc.title = Some(title_text.clone());
                            }
                            if let Some(section) = open_section.as_mut() {
                                if section.title.is_none() {
                                    section.title = Some(title_text.clone());
                                }
                            }
                        }
                    }
                    b"para" => {
                        if in_para {
                            in_para = false;
                            if doc.first_para.is_none() && !para_text.is_empty() {
                                doc.first_para = Some(para_text.clone());
                            }
                        }
                    }
                    b"language" => {
                        in_language = false;
                        if doc.lang.is_none() && !language_text.is_empty() {
                            doc.lang = Some(language_text.clone());
                        }
                    }
                    b"product" => {
                        in_product = false;
                        if doc.product.is_none() && !product_text.is_empty() {
                            doc.product = Some(product_text.clone());
                        }
                    }
                    b"version" => {
                        in_version = false;
                        if doc.version.is_none() && !version_text.is_empty() {
                            doc.version = Some(version_text.clone());
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(te)) => {
                let text = te.unescape().map_err(|err| parse_err(file, err))?;
                route_text(
                    &text,
                    in_title.then_some(&mut title_text),
                    in_para.then_some(&mut para_text),
                    in_language.then_some(&mut language_text),
                    in_product.then_some(&mut product_text),
                    in_version.then_some(&mut version_text),
                    open_section.as_mut(),
                );
            }
            Ok(Event::CData(e)) => {
                let bytes = e.into_inner();
                let text = String::from_utf8_lossy(&bytes);
                route_text(
                    &text,
                    in_title.then_some(&mut title_text),
                    in_para.then_some(&mut para_text),
                    in_language.then_some(&mut language_text),
                    in_product.then_some(&mut product_text),
                    in_version.then_some(&mut version_text),
                    open_section.as_mut(),
                );
            }
            Ok(Event::Empty(e)) => {
                // A self-closing root is a parseable (if empty) document.
                if !root_seen {
                    root_seen = true;
                    read_root_attrs(&e, &mut doc, file)?;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_err(file, e)),
            _ => {}
        }
        buf.clear();
    }

    if !root_seen {
        return Err(parse_err(file, "no document element"));
    }
    if depth != 0 {
        return Err(parse_err(file, "unexpected end of file inside an element"));
    }

    Ok(doc)
}

fn read_root_attrs(
    e: &quick_xml::events::BytesStart,
    doc: &mut ParsedDoc,
    file: &str,
) -> Result<()> {
    let mut id_attr = None;
    let mut xml_id_attr = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| parse_err(file, err))?;
        let value = attr
            .unescape_value()
            .map_err(|err| parse_err(file, err))?
            .into_owned();
        match attr.key.as_ref() {
            b"id" => id_attr = Some(value),
            b"xml:id" => xml_id_attr = Some(value),
            b"xml:lang" => doc.lang = Some(value),
            _ => {}
        }
    }
    doc.doc_id = id_attr.or(xml_id_attr);
    Ok(())
}

/// Fan one text event out to every active capture buffer plus the open
/// section body.
fn route_text(
    text: &str,
    title: Option<&mut String>,
    para: Option<&mut String>,
    language: Option<&mut String>,
    product: Option<&mut String>,
    version: Option<&mut String>,
    section: Option<&mut ParsedSection>,
) {
    if let Some(buf) = title {
        push_words(buf, text);
    }
    if let Some(buf) = para {
        push_words(buf, text);
    }
    if let Some(buf) = language {
        push_words(buf, text);
    }
    if let Some(buf) = product {
        push_words(buf, text);
    }
    if let Some(buf) = version {
        push_words(buf, text);
    }
    if let Some(section) = section {
        push_words(&mut section.body, text);
    }
}

/// Turn one parsed document into chunk records. Returns how many were
/// produced (zero means the document was empty or all-ignorable).
fn chunk_document(
    doc: &ParsedDoc,
    source_file: &str,
    config: &Config,
    counter: &mut ChunkIdCounter,
    out: &mut Vec<ChunkRecord>,
) -> usize {
    let doc_id = doc
        .doc_id
        .clone()
        .unwrap_or_else(|| file_stem(source_file));
    let topic_title = doc.title.clone().unwrap_or_else(|| doc_id.clone());

    let mut meta = config.defaults.clone();
    if let Some(lang) = &doc.lang {
        meta.lang = lang.clone();
    }
    if let Some(product) = &doc.product {
        meta.product = product.clone();
    }
    if let Some(version) = &doc.version {
        meta.version = version.clone();
    }

    let before = out.len();
    let max_chars = config.chunking.max_chars;

    let sections: Vec<&ParsedSection> = doc
        .sections
        .iter()
        .filter(|s| !s.body.is_empty())
        .filter(|s| !matches!(&s.role, Some(role) if IGNORABLE_ROLES.contains(&role.as_str())))
        .collect();

    if sections.is_empty() {
        if let Some(para) = &doc.first_para {
            let lead = format!("{}: {}", topic_title, para);
            for piece in chunk_text(&lead, max_chars) {
                out.push(make_chunk(
                    counter,
                    &doc_id,
                    &topic_title,
                    &piece,
                    &meta,
                    source_file,
                ));
            }
        }
    } else {
        for section in sections {
            let sec_title = section.title.clone().unwrap_or_else(|| topic_title.clone());
            let path = format!("{} > {}", topic_title, sec_title);
            let full = format!("{} : {}", path, section.body);
            for piece in chunk_text(&full, max_chars) {
                out.push(make_chunk(counter, &doc_id, &path, &piece, &meta, source_file));
            }
        }
    }

    out.len() - before
}

fn file_stem(source_file: &str) -> String {
    Path::new(source_file)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| source_file.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChunkingConfig, DataConfig, DedupConfig, DefaultsConfig, EmbeddingConfig, IngestConfig,
        RetrievalConfig, ServerConfig,
    };
    use std::path::PathBuf;

    const GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<article xmlns="http://docbook.org/ns/docbook" version="5.0" xml:id="acme-install">
  <info>
    <title>Acme Install Guide</title>
    <product>AcmeX</product>
    <version>v3.2</version>
  </info>
  <section>
    <title>Prerequisites</title>
    <para>Install the runtime.   Verify the
      checksum carefully.</para>
  </section>
  <section>
    <title>Agent setup</title>
    <para>Run the installer. Restart the host.</para>
  </section>
  <section role="legal">
    <title>Legal notice</title>
    <para>All rights reserved.</para>
  </section>
</article>"#;

    fn test_config(xml_dir: PathBuf) -> Config {
        Config {
            data: DataConfig {
                dir: PathBuf::from("unused"),
            },
            ingest: IngestConfig {
                xml_dir,
                include_globs: vec!["**/*.xml".to_string()],
                exclude_globs: Vec::new(),
            },
            chunking: ChunkingConfig::default(),
            defaults: DefaultsConfig::default(),
            embedding: EmbeddingConfig {
                provider: "hash".into(),
                model: None,
                dims: Some(64),
                batch_size: 64,
                max_retries: 5,
                timeout_secs: 30,
            },
            retrieval: RetrievalConfig::default(),
            dedup: DedupConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:0".into(),
            },
        }
    }

    #[test]
    fn parses_titles_metadata_and_sections() {
        let doc = parse_docbook(GUIDE.as_bytes(), "guide.xml").unwrap();
        assert_eq!(doc.doc_id.as_deref(), Some("acme-install"));
        assert_eq!(doc.title.as_deref(), Some("Acme Install Guide"));
        assert_eq!(doc.product.as_deref(), Some("AcmeX"));
        assert_eq!(doc.version.as_deref(), Some("v3.2"));
        assert_eq!(doc.sections.len(), 3);
        assert_eq!(doc.sections[0].title.as_deref(), Some("Prerequisites"));
        assert_eq!(doc.sections[2].role.as_deref(), Some("legal"));
        // Whitespace runs collapse to single spaces, title text included.
        assert_eq!(
            doc.sections[0].body,
            "Prerequisites Install the runtime. Verify the checksum carefully."
        );
    }

    #[test]
    fn root_version_attribute_is_not_document_version() {
        // version="5.0" on the root is the schema version, not the product's.
        let xml = r#"<article version="5.0" id="a"><title>T</title>
            <section><title>S</title><para>Body text here.</para></section></article>"#;
        let doc = parse_docbook(xml.as_bytes(), "a.xml").unwrap();
        assert_eq!(doc.version, None);
    }

    #[test]
    fn nested_sections_fold_into_their_ancestor() {
        let xml = r#"<article id="n"><title>Outer</title>
            <section><title>Top</title><para>Top text.</para>
              <section><title>Inner</title><para>Inner text.</para></section>
            </section></article>"#;
        let doc = parse_docbook(xml.as_bytes(), "n.xml").unwrap();
        assert_eq!(doc.sections.len(), 1);
        let body = &doc.sections[0].body;
        assert!(body.contains("Top text."));
        assert!(body.contains("Inner text."));
    }

    #[test]
    fn xml_lang_attribute_overrides_language() {
        let xml = r#"<article id="l" xml:lang="de"><title>Titel</title>
            <section><title>S</title><para>Text.</para></section></article>"#;
        let doc = parse_docbook(xml.as_bytes(), "l.xml").unwrap();
        assert_eq!(doc.lang.as_deref(), Some("de"));
    }

    #[test]
    fn garbage_input_is_a_parse_error() {
        let err = parse_docbook(b"{\"json\": true}", "bad.xml").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn mismatched_tags_are_a_parse_error() {
        let err =
            parse_docbook(b"<article><section></wrong></article>", "bad.xml").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn truncated_document_is_a_parse_error() {
        let err = parse_docbook(b"<article><section><para>x</para>", "cut.xml").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn sections_become_breadcrumbed_chunks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("guide.xml"), GUIDE).unwrap();
        let config = test_config(dir.path().to_path_buf());

        let (records, report) = extract_corpus(&config).unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        // Two content sections; the legal one is dropped.
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].id, "acme-install::1");
        assert_eq!(records[0].path, "Acme Install Guide > Prerequisites");
        assert_eq!(records[0].title, "Prerequisites");
        assert!(records[0]
            .text
            .starts_with("Acme Install Guide > Prerequisites : "));
        assert_eq!(records[0].product, "AcmeX");
        assert_eq!(records[0].version, "v3.2");
        assert_eq!(records[0].lang, "en"); // config default, doc has none
        assert_eq!(records[0].source_file, "guide.xml");

        assert_eq!(records[1].id, "acme-install::2");
        assert_eq!(records[1].path, "Acme Install Guide > Agent setup");
    }

    #[test]
    fn sectionless_document_contributes_a_lead_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let xml = r#"<article id="faq"><title>Acme FAQ</title>
            <para>Answers to common questions about the agent.</para></article>"#;
        std::fs::write(dir.path().join("faq.xml"), xml).unwrap();
        let config = test_config(dir.path().to_path_buf());

        let (records, report) = extract_corpus(&config).unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "faq::1");
        assert_eq!(records[0].path, "Acme FAQ");
        assert_eq!(records[0].title, "Acme FAQ");
        assert_eq!(
            records[0].text,
            "Acme FAQ: Answers to common questions about the agent."
        );
    }

    #[test]
    fn malformed_file_is_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.xml"), GUIDE).unwrap();
        std::fs::write(dir.path().join("broken.xml"), "<article><secti").unwrap();
        let config = test_config(dir.path().to_path_buf());

        let (records, report) = extract_corpus(&config).unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(!records.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "broken.xml");
    }

    #[test]
    fn document_without_id_uses_the_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let xml = r#"<article><title>Notes</title>
            <section><title>S</title><para>Some text.</para></section></article>"#;
        std::fs::write(dir.path().join("release-notes.xml"), xml).unwrap();
        let config = test_config(dir.path().to_path_buf());

        let (records, _) = extract_corpus(&config).unwrap();
        assert_eq!(records[0].doc_id, "release-notes");
        assert_eq!(records[0].id, "release-notes::1");
    }

    #[test]
    fn corpus_walk_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.xml"), "<a/>").unwrap();
        std::fs::write(dir.path().join("a.xml"), "<a/>").unwrap();
        std::fs::write(dir.path().join("sub/c.xml"), "<a/>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not xml").unwrap();

        let files = list_corpus_files(
            dir.path(),
            &["**/*.xml".to_string()],
            &["sub/**".to_string()],
        )
        .unwrap();
        assert_eq!(files, vec!["a.xml".to_string(), "b.xml".to_string()]);
    }
}
