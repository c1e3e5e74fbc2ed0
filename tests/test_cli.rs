
use fixtures::*;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn it_lists_records_as_text() {
    let d = tempdir().unwrap();
    let sample = write_sample(
        d.path(),
        "signed.webm",
        &webm_with_records(&[br#"<seal seal=1 d="example.com" b='F~S,s~f' s="abc"/>"#]),
    );

    let mut cmd = Command::new(assert_cmd::cargo_bin!("seal_dump"));
    cmd.arg(&sample);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Record 1"))
        .stdout(predicate::str::contains("d = example.com"))
        .stdout(predicate::str::contains("s = abc"))
        .stdout(predicate::str::contains("signature at"));
}

#[test]
fn it_prints_digest_ranges_as_json() {
    let d = tempdir().unwrap();
    let buf = webm_with_records(&[br#"<seal seal=1 b='F~S,s~f' s="abc"/>"#]);
    let sample = write_sample(d.path(), "signed.webm", &buf);

    let mut cmd = Command::new(assert_cmd::cargo_bin!("seal_dump"));
    cmd.args(["-o", "json", "--ranges"]).arg(&sample);

    let output = cmd.output().unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["status"], "signatures");

    let record = &doc["records"][0];
    assert_eq!(record["fields"]["s"], "abc");

    let start = buf.len() - br#"abc"/>"#.len();
    let end = start + 3;
    assert_eq!(
        record["ranges"],
        serde_json::json!([[0, start], [end, buf.len()]])
    );
}

#[test]
fn it_reports_files_that_are_not_matroska() {
    let d = tempdir().unwrap();
    let sample = write_sample(d.path(), "notes.txt", b"just some text, nothing to see here");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("seal_dump"));
    cmd.arg(&sample);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("not a Matroska file"));
}

#[test]
fn it_keeps_going_after_a_missing_file() {
    let d = tempdir().unwrap();
    let sample = write_sample(d.path(), "plain.webm", &plain_webm());
    let missing = d.path().join("missing.webm");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("seal_dump"));
    cmd.arg(&missing).arg(&sample);

    cmd.assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("no SEAL records"))
        .stderr(predicate::str::contains("failed to read"));
}
