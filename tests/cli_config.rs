//! Configuration loading, JSON-lines reports and the command-line binary

use assocmem::{AnalysisConfig, AnalysisError, Analyzer, BlockHeader, ByteSource, JsonLines};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn write_dump(dir: &Path, name: &str, capacity: u16, used: u16, payload: &[u8]) -> PathBuf {
    let mut bytes = BlockHeader::new(0, capacity, used, true, None).to_bytes();
    bytes.extend_from_slice(payload);
    bytes.resize(capacity as usize, 0);
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn records(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_load_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("assocmem.toml");
    fs::write(
        &path,
        "min_string_len = 6\nactive_root = 2\nfree_root = 128\nlineage = true\n",
    )
    .unwrap();

    let config = AnalysisConfig::load(&path).unwrap();
    assert_eq!(config.min_string_len, 6);
    assert_eq!(config.active_root, Some(2));
    assert_eq!(config.free_root, Some(128));
    assert!(config.lineage);
    assert!(!config.scan_unclassified);

    let analyzer = Analyzer::builder().config(config).build().unwrap();
    assert_eq!(analyzer.roots().free, Some(128));
}

#[test]
fn test_missing_config_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = AnalysisConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AnalysisError::Io(_)));
    assert!(!err.is_format_violation());
}

#[test]
fn test_report_lines() {
    let dir = TempDir::new().unwrap();
    let path = write_dump(dir.path(), "form.m", 10, 4, b"Madam!");

    let source = ByteSource::open(&path).unwrap();
    let analysis = Analyzer::default().analyze(&source).unwrap();
    let mut out = JsonLines::new(Vec::new());
    out.write_analysis(&source, 0, &analysis).unwrap();
    let lines = records(&out.into_inner());

    assert_eq!(lines[0]["record"], "source");
    assert_eq!(lines[0]["length"], 10);
    assert_eq!(lines[0]["sha256"].as_str().unwrap().len(), 64);

    let regions: Vec<_> = lines.iter().filter(|l| l["record"] == "region").collect();
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[1]["kind"], "slack");
    assert_eq!(regions[1]["offset"], 4);
    assert_eq!(regions[1]["length"], 6);

    let strings: Vec<_> = lines.iter().filter(|l| l["record"] == "string").collect();
    assert_eq!(strings.len(), 1);
    assert_eq!(strings[0]["text"], "Madam!");
}

#[test]
fn test_binary_success() {
    let dir = TempDir::new().unwrap();
    let path = write_dump(dir.path(), "form.m", 20, 9, b"Dear\0Madam,\0");

    let output = Command::new(env!("CARGO_BIN_EXE_assocmem"))
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let lines = records(&output.stdout);
    assert_eq!(lines[0]["record"], "source");
    let edges: Vec<_> = lines.iter().filter(|l| l["record"] == "edge").collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["evidence"], "truncation");
    assert_eq!(edges[0]["earlier"]["offset"], 9);
    assert_eq!(edges[0]["later"]["offset"], 4);
}

#[test]
fn test_printable_header_bytes_stay_out_of_strings() {
    // Capacity 0x48 is 'H' and used length 0x20 is a space.
    let dir = TempDir::new().unwrap();
    let path = write_dump(dir.path(), "form.m", 0x48, 0x20, b"Dear Sir\0");

    let output = Command::new(env!("CARGO_BIN_EXE_assocmem"))
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let lines = records(&output.stdout);
    let strings: Vec<_> = lines.iter().filter(|l| l["record"] == "string").collect();
    assert_eq!(strings.len(), 1);
    assert_eq!(strings[0]["text"], "Dear Sir");
    assert_eq!(strings[0]["offset"], 4);
}

#[test]
fn test_binary_format_violation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.m");
    fs::write(&path, BlockHeader::new(0, 8, 12, true, None).to_bytes()).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_assocmem"))
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("offset 0"), "stderr: {stderr}");
}

#[test]
fn test_binary_usage_errors() {
    let dir = TempDir::new().unwrap();
    let path = write_dump(dir.path(), "form.m", 10, 4, b"Madam!");

    let missing = Command::new(env!("CARGO_BIN_EXE_assocmem"))
        .arg(dir.path().join("absent.m"))
        .output()
        .unwrap();
    assert_eq!(missing.status.code(), Some(2));

    let bad_flag = Command::new(env!("CARGO_BIN_EXE_assocmem"))
        .args(["--min-len", "0"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(bad_flag.status.code(), Some(2));

    let no_files = Command::new(env!("CARGO_BIN_EXE_assocmem"))
        .output()
        .unwrap();
    assert_eq!(no_files.status.code(), Some(2));
}

#[test]
fn test_binary_reports_every_file_despite_io_error() {
    let dir = TempDir::new().unwrap();
    let broken = dir.path().join("broken.m");
    fs::write(&broken, BlockHeader::new(0, 8, 12, true, None).to_bytes()).unwrap();
    let good = write_dump(dir.path(), "form.m", 10, 4, b"Madam!");

    let output = Command::new(env!("CARGO_BIN_EXE_assocmem"))
        .arg(dir.path().join("absent.m"))
        .args([&broken, &good])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.m"), "stderr: {stderr}");
    assert!(stderr.contains("broken.m"), "stderr: {stderr}");

    let lines = records(&output.stdout);
    let sources: Vec<_> = lines.iter().filter(|l| l["record"] == "source").collect();
    assert_eq!(sources.len(), 1);
    assert!(sources[0]["path"].as_str().unwrap().ends_with("form.m"));
}

#[test]
fn test_binary_lineage() {
    let dir = TempDir::new().unwrap();
    let old = write_dump(dir.path(), "form.m.1", 24, 20, b"Dear Mr Jones,\0\0");
    let new = write_dump(dir.path(), "form.m.2", 24, 20, b"Dear Mr Smithers");

    let output = Command::new(env!("CARGO_BIN_EXE_assocmem"))
        .arg("--lineage")
        .args([&old, &new])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let lines = records(&output.stdout);
    let sources: Vec<_> = lines.iter().filter(|l| l["record"] == "source").collect();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[1]["origin"], 1);

    let edges: Vec<_> = lines.iter().filter(|l| l["record"] == "edge").collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["evidence"], "partial_overwrite");
    assert_eq!(edges[0]["earlier"]["origin"], 0);
    assert_eq!(edges[0]["later"]["origin"], 1);
}
