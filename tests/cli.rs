//! Command-line behavior of the `pdf-resurrect` binary

mod common;

use assert_cmd::Command;
use common::PdfBuilder;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn cmd() -> Command {
    Command::cargo_bin("pdf-resurrect").unwrap()
}

fn four_versions() -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    pdf.object(4, "<< /Producer (Writer One) /ModDate (D:20230405060708+02'00') >>");
    pdf.object(5, "<< /Secret (first notes) >>");
    pdf.xref_table("/Root 1 0 R /Info 4 0 R");
    pdf.object(3, "<< /Type /Page /Parent 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.xref_table("/Root 1 0 R /Info 4 0 R");
    pdf.object(4, "<< /Producer (Writer Two) >>");
    pdf.object(5, "<< /Secret (old notes) >>");
    pdf.xref_table("/Root 1 0 R /Info 4 0 R");
    pdf.object(5, "<< /Secret (new notes) >>");
    pdf.xref_table("/Root 1 0 R /Info 4 0 R");
    pdf.finish()
}

fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

#[test]
fn test_summary_on_stdout() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture(temp.path(), "doc.pdf", &four_versions());

    cmd()
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 4 '%%EOF' markers"))
        .stdout(predicate::str::contains("doc.pdf: --A-- Version 2 -- Object 3 0 n (Page)"))
        .stdout(predicate::str::contains("doc.pdf: --M-- Version 3 -- Object 4 0 n (Unknown)"))
        .stdout(predicate::str::ends_with("doc.pdf: 4\n"));
}

#[test]
fn test_quiet_prints_count_only() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture(temp.path(), "doc.pdf", &four_versions());

    cmd().arg("-q").arg(&input).assert().success().stdout("4\n");
}

#[test]
fn test_single_version_message() {
    let temp = TempDir::new().unwrap();
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog >>");
    pdf.xref_table("/Root 1 0 R");
    let input = write_fixture(temp.path(), "one.pdf", &pdf.finish());

    cmd()
        .arg("-w")
        .arg(&input)
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("one.pdf: There is only one version of this PDF"));
    assert!(!temp.path().join("one-versions").exists());
}

#[test]
fn test_write_versions_and_summary() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture(temp.path(), "doc.pdf", &four_versions());

    cmd()
        .arg("-w")
        .arg(&input)
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Object").not());

    let dir = temp.path().join("doc-versions");
    for version in 1..=4 {
        assert!(dir.join(format!("doc-version-{}.pdf", version)).is_file());
    }
    let summary = std::fs::read_to_string(dir.join("doc.summary")).unwrap();
    assert!(summary.contains("doc.pdf: --M-- Version 4 -- Object 5 0 n (Unknown)"));
    assert!(summary.ends_with("doc.pdf: 4\n"));
}

#[test]
fn test_quiet_write_still_prints_count() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture(temp.path(), "doc.pdf", &four_versions());

    cmd()
        .arg("-q")
        .arg("-w")
        .arg(&input)
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout("4\n");

    let dir = temp.path().join("doc-versions");
    assert!(dir.join("doc-version-4.pdf").is_file());
    assert_eq!(std::fs::read_to_string(dir.join("doc.summary")).unwrap(), "4\n");
}

#[test]
fn test_write_into_output_dir() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture(temp.path(), "doc.pdf", &four_versions());
    let out = temp.path().join("out").join("nested");

    cmd().arg("-w").arg("-o").arg(&out).arg(&input).assert().success();
    assert!(out.join("doc-versions").join("doc-version-2.pdf").is_file());
}

#[test]
fn test_existing_versions_dir_is_not_touched() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture(temp.path(), "doc.pdf", &four_versions());
    let dir = temp.path().join("doc-versions");
    std::fs::create_dir(&dir).unwrap();

    cmd()
        .arg("-w")
        .arg(&input)
        .current_dir(temp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("PDF version extraction will not occur"))
        .stdout(predicate::str::contains("doc.pdf: 4"));
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
}

#[test]
fn test_scrub_writes_sibling_once() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture(temp.path(), "doc.pdf", &four_versions());
    let scrubbed = temp.path().join("doc-scrubbed.pdf");

    cmd()
        .arg("-s")
        .arg(&input)
        .assert()
        .success()
        .stderr(predicate::str::contains("experimental"))
        .stdout(predicate::str::contains("doc.pdf: scrubbed 1 objects"));
    let data = std::fs::read(&scrubbed).unwrap();
    let text = String::from_utf8_lossy(&data);
    assert!(!text.contains("old notes"));
    assert!(text.contains("new notes"));
    assert!(text.contains("first notes"));
    assert_eq!(data.len(), four_versions().len());

    cmd()
        .arg("-s")
        .arg(&input)
        .assert()
        .success()
        .stderr(predicate::str::contains("scrubbing will not occur"));
    assert_eq!(std::fs::read(&scrubbed).unwrap(), data);
}

#[test]
fn test_creator_info() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture(temp.path(), "doc.pdf", &four_versions());

    cmd()
        .arg("-i")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("PDF Version: 1.4"))
        .stdout(predicate::str::contains("--- Version 1 ---\nProducer: Writer One"))
        .stdout(predicate::str::contains("ModDate: D:20230405060708+02'00' (2023-04-05 06:07:08 +02:00)"))
        .stdout(predicate::str::contains("--- Version 3 ---\nProducer: Writer Two"))
        .stdout(predicate::str::contains("--- Version 2 ---").not());
}

#[test]
fn test_not_a_pdf_fails() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture(temp.path(), "notes.txt", b"plain text, not a document\n");

    cmd()
        .arg(&input)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("'notes.txt' specified is not a valid PDF"));
}

#[test]
fn test_one_bad_file_does_not_stop_the_rest() {
    let temp = TempDir::new().unwrap();
    let bad = write_fixture(temp.path(), "bad.pdf", b"nope");
    let good = write_fixture(temp.path(), "good.pdf", &four_versions());

    cmd()
        .arg("-q")
        .arg(&bad)
        .arg(&good)
        .assert()
        .failure()
        .stdout("4\n")
        .stderr(predicate::str::contains("not a valid PDF"));
}

#[test]
fn test_glob_without_matches_fails() {
    let temp = TempDir::new().unwrap();
    cmd()
        .arg("*.pdf")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No files matched pattern"));
}

#[test]
fn test_no_args_shows_usage() {
    cmd().assert().failure().stderr(predicate::str::contains("Usage"));
}
