use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::collections::HashSet;
use std::fs;
use tempfile::{tempdir, TempDir};

fn create_test_files(dir: &TempDir, files: &[(&str, &str)]) -> Result<()> {
    for (name, content) in files {
        fs::write(dir.path().join(name), content)?;
    }
    Ok(())
}

fn line_set(content: &str) -> HashSet<&str> {
    content.lines().collect()
}

#[test]
fn test_default_output_in_scanned_dir() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(
        &temp_dir,
        &[
            ("a.txt", "apple pie\nbanana\n"),
            ("b.txt", "apple tart\napple pie\n"),
            ("notes.md", "apple crumble\n"),
        ],
    )?;

    let mut cmd = Command::cargo_bin("filefetch-cli")?;
    cmd.args(["apple", "-d", temp_dir.path().to_str().unwrap()]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Processing complete. Files have been combined into",
        ))
        .stdout(predicate::str::contains("apple.txt"));

    let output = fs::read_to_string(temp_dir.path().join("apple.txt"))?;
    assert_eq!(line_set(&output), HashSet::from(["apple pie", "apple tart"]));
    Ok(())
}

#[test]
fn test_explicit_output_and_extensions() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(
        &temp_dir,
        &[("a.txt", "apple pie\n"), ("notes.md", "apple crumble\n")],
    )?;
    let output = temp_dir.path().join("result.out");

    let mut cmd = Command::cargo_bin("filefetch-cli")?;
    cmd.args([
        "apple",
        "-d",
        temp_dir.path().to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "-e",
        "txt,md",
        "-j",
        "2",
        "-P",
        "3",
    ]);
    cmd.assert().success();

    let content = fs::read_to_string(&output)?;
    assert_eq!(
        line_set(&content),
        HashSet::from(["apple pie", "apple crumble"])
    );
    Ok(())
}

#[test]
fn test_json_report() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(&temp_dir, &[("a.txt", "apple\napple\npear\n")])?;

    let mut cmd = Command::cargo_bin("filefetch-cli")?;
    cmd.args(["apple", "-d", temp_dir.path().to_str().unwrap(), "--json"]);

    let assert = cmd.assert().success();
    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(report["files_scanned"], 1);
    assert_eq!(report["merged_lines"], 2);
    assert_eq!(report["unique_lines"], 1);
    assert_eq!(report["files_skipped"], 0);
    Ok(())
}

#[test]
fn test_empty_keyword_rejected_on_request() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(&temp_dir, &[("a.txt", "anything\n")])?;

    let mut cmd = Command::cargo_bin("filefetch-cli")?;
    cmd.args(["", "-d", temp_dir.path().to_str().unwrap(), "--reject-empty"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid keyword"));
    Ok(())
}

#[test]
fn test_missing_directory_fails() -> Result<()> {
    let temp_dir = tempdir()?;
    let missing = temp_dir.path().join("nope");

    let mut cmd = Command::cargo_bin("filefetch-cli")?;
    cmd.args(["apple", "-d", missing.to_str().unwrap()]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to extract 'apple'"));
    Ok(())
}

#[test]
fn test_missing_keyword_prints_usage() -> Result<()> {
    let mut cmd = Command::cargo_bin("filefetch-cli")?;
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
    Ok(())
}
