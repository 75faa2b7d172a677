//! End-to-end tests for the codify binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn codify(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("codify").unwrap();
    cmd.arg("--path").arg(workspace);
    cmd
}

#[test]
fn test_init_and_status() {
    let dir = tempfile::tempdir().unwrap();

    codify(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized Codify"));

    assert!(dir.path().join(".codify").join("codify.db").exists());
    assert!(dir.path().join(".codify").join("config.toml").exists());

    codify(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Codify Status"));

    // A second init without --force refuses
    codify(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn test_commands_require_init() {
    let dir = tempfile::tempdir().unwrap();

    codify(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn test_ingest_confirm_and_merge_flow() {
    let dir = tempfile::tempdir().unwrap();
    codify(dir.path()).arg("init").assert().success();

    codify(dir.path())
        .args(["document", "add", "--id", "doc-1", "--name", "q1-budget.pdf"])
        .args(["--project", "proj-1"])
        .assert()
        .success();

    let items = dir.path().join("items.json");
    std::fs::write(
        &items,
        r#"[
            {
                "id": "a",
                "original_name": "Gross Revenue",
                "value": "£1,250.50",
                "suggested_code": "REV01",
                "mapping_status": "suggested",
                "confidence": 0.82
            },
            {
                "id": "b",
                "original_name": "Unknown Line",
                "value": "N/A",
                "mapping_status": "pending_review"
            }
        ]"#,
    )
    .unwrap();

    codify(dir.path())
        .args(["ingest", "--document", "doc-1"])
        .arg("--items")
        .arg(&items)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 suggested, 1 pending"));

    // Extraction id comes from the show command's output in JSON form
    let output = codify(dir.path())
        .args(["--format", "json", "show", "doc-1"])
        .output()
        .unwrap();
    let extraction: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let extraction_id = extraction["id"].as_str().unwrap().to_string();

    codify(dir.path())
        .args(["confirm-all", &extraction_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Confirmed 1 suggested item(s)"));

    // Skipping the last open item completes the extraction and the
    // auto-drained outbox merges it
    codify(dir.path())
        .args(["skip", &extraction_id, "b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fully confirmed"))
        .stdout(predicate::str::contains("Merge outbox: 1 task(s), 1 succeeded"));

    codify(dir.path())
        .args(["library", "proj-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("REV01"))
        .stdout(predicate::str::contains("1250.5"));

    // Merging again reports the sentinel, not an error
    codify(dir.path())
        .args(["merge", &extraction_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("already merged"));
}

#[test]
fn test_ingest_rejects_unknown_status() {
    let dir = tempfile::tempdir().unwrap();
    codify(dir.path()).arg("init").assert().success();
    codify(dir.path())
        .args(["document", "add", "--id", "doc-1", "--name", "a.pdf"])
        .assert()
        .success();

    let items = dir.path().join("items.json");
    std::fs::write(
        &items,
        r#"[{"id": "a", "original_name": "X", "value": 1, "mapping_status": "approved"}]"#,
    )
    .unwrap();

    codify(dir.path())
        .args(["ingest", "--document", "doc-1"])
        .arg("--items")
        .arg(&items)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse items file"));
}
