use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dvx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dvx");
    path
}

/// Four-file corpus: a cross-document duplicated section (install/upgrade),
/// one AcmeY document, and one malformed file.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let xml_dir = root.join("xml");
    fs::create_dir_all(&xml_dir).unwrap();
    fs::write(
        xml_dir.join("install.xml"),
        r#"<?xml version="1.0" encoding="UTF-8"?>
<article xmlns="http://docbook.org/ns/docbook" version="5.0" xml:id="install-acmex">
  <info>
    <title>AcmeX Install Guide</title>
    <product>AcmeX</product>
    <version>v3.2</version>
  </info>
  <section>
    <title>Prerequisites</title>
    <para>Install the runtime packages and verify the checksum of every download before starting.</para>
  </section>
  <section>
    <title>Agent setup</title>
    <para>Install the agent on every node, register it with the controller, and restart the service to apply the change.</para>
  </section>
</article>"#,
    )
    .unwrap();
    fs::write(
        xml_dir.join("upgrade.xml"),
        r#"<?xml version="1.0" encoding="UTF-8"?>
<article xmlns="http://docbook.org/ns/docbook" version="5.0" xml:id="upgrade-acmex">
  <info>
    <title>AcmeX Upgrade Guide</title>
    <product>AcmeX</product>
    <version>v3.2</version>
  </info>
  <section>
    <title>Agent setup</title>
    <para>Install the agent on every node, register it with the controller, and restart the service to apply the change.</para>
  </section>
  <section>
    <title>Rollback</title>
    <para>Restore the previous snapshot from backup storage if validation fails after the upgrade.</para>
  </section>
</article>"#,
    )
    .unwrap();
    fs::write(
        xml_dir.join("legacy.xml"),
        r#"<?xml version="1.0" encoding="UTF-8"?>
<article xmlns="http://docbook.org/ns/docbook" version="5.0" xml:id="setup-acmey">
  <info>
    <title>AcmeY Proxy Setup</title>
    <product>AcmeY</product>
    <version>v1.0</version>
  </info>
  <section>
    <title>Gateway credentials</title>
    <para>Configure the proxy gateway credentials and rotate the access keys monthly.</para>
  </section>
</article>"#,
    )
    .unwrap();
    fs::write(xml_dir.join("broken.xml"), "<article><secti").unwrap();

    let config_content = format!(
        r#"[data]
dir = "{}/data"

[ingest]
xml_dir = "{}/xml"

[chunking]
max_chars = 1200

[embedding]
provider = "hash"
dims = 256

[retrieval]
overfetch_floor = 20
default_k = 5

[server]
bind = "127.0.0.1:8787"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("dvx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dvx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dvx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dvx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_build_creates_snapshot_artifacts() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_dvx(&config_path, &["build"]);
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 3 chunked, 0 skipped, 1 failed (4 total)"));
    assert!(stdout.contains("chunks embedded: 5"));
    assert!(stdout.contains("ok"));

    assert!(tmp.path().join("data/index.dvx").exists());
    assert!(tmp.path().join("data/meta.json").exists());
}

#[test]
fn test_build_reports_malformed_files() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_dvx(&config_path, &["build"]);
    assert!(success, "one bad file must not abort the build");
    assert!(
        stdout.contains("failed broken.xml:"),
        "Expected per-file failure line, got: {}",
        stdout
    );
}

#[test]
fn test_build_dry_run() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_dvx(&config_path, &["build", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("build (dry-run)"));
    assert!(stdout.contains("chunks to embed: 5"));
    assert!(!tmp.path().join("data/index.dvx").exists());
}

#[test]
fn test_build_twice_replaces_snapshot() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_dvx(&config_path, &["build"]);
    assert!(success1, "First build failed");

    let (stdout, _, success2) = run_dvx(&config_path, &["build"]);
    assert!(success2, "Rebuild over an existing snapshot failed");
    assert!(stdout.contains("chunks embedded: 5"));
}

#[test]
fn test_build_missing_corpus_dir_fails() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_dir_all(tmp.path().join("xml")).unwrap();

    let (_, stderr, success) = run_dvx(&config_path, &["build"]);
    assert!(!success, "build without a corpus should fail");
    assert!(
        stderr.contains("xml_dir"),
        "Should name the missing directory, got: {}",
        stderr
    );
}

#[test]
fn test_search_ranks_duplicated_section_first() {
    let (_tmp, config_path) = setup_test_env();

    run_dvx(&config_path, &["build"]);
    let (stdout, stderr, success) =
        run_dvx(&config_path, &["search", "install the agent on every node"]);
    assert!(success, "search failed: stderr={}", stderr);
    let first = stdout.lines().next().unwrap_or("");
    assert!(
        first.contains("Agent setup"),
        "Expected an Agent setup chunk at rank 1, got: {}",
        stdout
    );
}

#[test]
fn test_search_product_filter() {
    let (_tmp, config_path) = setup_test_env();

    run_dvx(&config_path, &["build"]);
    let (stdout, _, success) = run_dvx(
        &config_path,
        &["search", "agent setup", "--product", "AcmeY"],
    );
    assert!(success);
    assert!(stdout.contains("AcmeY"));
    assert!(stdout.contains("Gateway credentials"));
    assert!(
        !stdout.contains("AcmeX"),
        "Filtered-out product leaked into results: {}",
        stdout
    );
}

#[test]
fn test_search_lang_filter_without_matches() {
    let (_tmp, config_path) = setup_test_env();

    run_dvx(&config_path, &["build"]);
    let (stdout, _, success) = run_dvx(&config_path, &["search", "agent", "--lang", "de"]);
    assert!(success);
    assert!(stdout.contains("No results"));
}

#[test]
fn test_search_k_limits_results() {
    let (_tmp, config_path) = setup_test_env();

    run_dvx(&config_path, &["build"]);
    let (stdout, _, success) = run_dvx(&config_path, &["search", "agent", "--k", "1"]);
    assert!(success);
    assert!(stdout.contains("1. ["));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();

    run_dvx(&config_path, &["build"]);
    let (stdout1, _, _) = run_dvx(&config_path, &["search", "verify the checksum"]);
    let (stdout2, _, _) = run_dvx(&config_path, &["search", "verify the checksum"]);
    assert_eq!(
        stdout1, stdout2,
        "Search results should be deterministic across runs"
    );
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();

    run_dvx(&config_path, &["build"]);
    let (stdout, _, success) = run_dvx(&config_path, &["search", ""]);
    assert!(success, "Empty query should not panic");
    assert!(stdout.contains("No results"));
}

#[test]
fn test_search_without_snapshot_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_dvx(&config_path, &["search", "agent"]);
    assert!(!success, "search without a built snapshot should fail");
    assert!(!stderr.is_empty());
}

#[test]
fn test_dups_finds_cross_document_pair() {
    let (tmp, config_path) = setup_test_env();
    let out = tmp.path().join("dups.csv");
    let out_str = out.to_str().unwrap();

    run_dvx(&config_path, &["build"]);
    let (stdout, stderr, success) = run_dvx(
        &config_path,
        &["dups", "--k", "5", "--threshold", "0.9", "--out", out_str],
    );
    assert!(success, "dups failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Found 1 candidate pairs"));
    assert!(stdout.contains("Report written to"));

    let csv = fs::read_to_string(&out).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("sim,id_a,id_b,"));
    // The pasted "Agent setup" section, install before upgrade (lexical).
    let row = lines.next().unwrap();
    assert!(
        row.contains("install-acmex::2,upgrade-acmex::1"),
        "Expected the duplicated section pair, got: {}",
        row
    );
}

#[test]
fn test_dups_requires_k_and_threshold() {
    let (tmp, config_path) = setup_test_env();
    let out = tmp.path().join("dups.csv");

    run_dvx(&config_path, &["build"]);
    let (_, stderr, success) =
        run_dvx(&config_path, &["dups", "--out", out.to_str().unwrap()]);
    assert!(!success, "dups without k/threshold should refuse to run");
    assert!(
        stderr.contains("--k") || stderr.contains("--threshold"),
        "Should point at the missing flag, got: {}",
        stderr
    );
}

#[test]
fn test_dups_lang_scope_excludes_everything() {
    let (tmp, config_path) = setup_test_env();
    let out = tmp.path().join("dups.csv");
    let out_str = out.to_str().unwrap();

    run_dvx(&config_path, &["build"]);
    let (stdout, _, success) = run_dvx(
        &config_path,
        &[
            "dups", "--k", "5", "--threshold", "0.9", "--lang", "de", "--out", out_str,
        ],
    );
    assert!(success);
    assert!(stdout.contains("No duplicate pairs"));

    // Header-only report.
    let csv = fs::read_to_string(&out).unwrap();
    assert_eq!(csv.lines().count(), 1);
}

#[test]
fn test_inspect_before_build() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_dvx(&config_path, &["inspect"]);
    assert!(success);
    assert!(stdout.contains("docvec - corpus overview"));
    assert!(stdout.contains("4 matched, 3 parseable, 1 failed"));
    assert!(stdout.contains("broken.xml"));
    assert!(stdout.contains("Snapshot:    none"));
}

#[test]
fn test_inspect_after_build() {
    let (_tmp, config_path) = setup_test_env();

    run_dvx(&config_path, &["build"]);
    let (stdout, _, success) = run_dvx(&config_path, &["inspect"]);
    assert!(success);
    assert!(stdout.contains("Rows:        5"));
    assert!(stdout.contains("Dimensions:  256"));
    assert!(stdout.contains("hash-bow-v1"));
}
