use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn patchmark(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("patchmark").expect("binary exists");
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("PATCHMARK_HIGHLIGHT")
        .env_remove("PATCHMARK_LANGUAGE")
        .env_remove("PATCHMARK_LOG");
    cmd
}

fn workspace(document: &str, patch: &str) -> TempDir {
    let temp = tempfile::tempdir().expect("temp dir");
    fs::write(temp.path().join("doc.md"), document).expect("write document");
    fs::write(temp.path().join("edit.patch"), patch).expect("write patch");
    temp
}

fn read(temp: &TempDir, name: &str) -> String {
    fs::read_to_string(temp.path().join(name)).expect("read file")
}

#[test]
fn help_displays_usage() {
    let temp = tempfile::tempdir().unwrap();
    patchmark(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn parse_prints_hunks_as_json() {
    let temp = workspace("", "Here you go:\n@# \n-Title\n+Heading\n[EOF]\nThanks");
    patchmark(temp.path())
        .args(["parse", "edit.patch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"))
        .stdout(predicate::str::contains("\"kind\": \"delete\""));
}

#[test]
fn parse_rejects_prose() {
    let temp = workspace("", "Nothing to change here.");
    patchmark(temp.path())
        .args(["parse", "edit.patch", "--format", "yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("success: false"));
}

#[test]
fn apply_then_review_each_change() {
    let temp = workspace(
        "# Title\nHello world\n",
        "@# \n-Title\n+Heading\n@Hello \n-world\n+there\n[EOF]",
    );

    patchmark(temp.path())
        .args(["apply", "doc.md", "edit.patch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("applied 2 change(s)"));
    assert_eq!(
        read(&temp, "doc.md"),
        "# [{-}Title{+}Heading]\nHello [{-}world{+}there]\n"
    );
    assert!(temp.path().join(".patchmark/doc.md.review.json").exists());

    patchmark(temp.path())
        .args(["status", "doc.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"markers\": 2"))
        .stdout(predicate::str::contains("change-2"));

    patchmark(temp.path())
        .args(["apply", "doc.md", "edit.patch"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("awaiting review"));

    patchmark(temp.path())
        .args(["reject", "doc.md", "--id", "change-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rejected change-2"));
    assert_eq!(read(&temp, "doc.md"), "# [{-}Title{+}Heading]\nHello world\n");

    patchmark(temp.path())
        .args(["reject", "doc.md", "--id", "change-2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already rejected"));

    patchmark(temp.path())
        .args(["accept", "doc.md"])
        .assert()
        .success();
    assert_eq!(read(&temp, "doc.md"), "# Heading\nHello world\n");
    assert!(!temp.path().join(".patchmark/doc.md.review.json").exists());
}

#[test]
fn plain_apply_edits_directly() {
    let temp = workspace("Body text", "+# New Title\n+\n[EOF]");
    patchmark(temp.path())
        .args(["apply", "--plain", "doc.md", "edit.patch"])
        .assert()
        .success();
    assert_eq!(read(&temp, "doc.md"), "# New Title\n\nBody text");
    assert!(!temp.path().join(".patchmark").exists());
}

#[test]
fn dry_run_leaves_document_alone() {
    let temp = workspace("Hello world", "@Hello \n-world\n+there\n@Missing\n+x\n[EOF]");
    patchmark(temp.path())
        .args(["apply", "--dry-run", "doc.md", "edit.patch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 of 2 hunk(s) would apply"))
        .stderr(predicate::str::contains("context not found"));
    assert_eq!(read(&temp, "doc.md"), "Hello world");
}

#[test]
fn workspace_config_disables_highlight() {
    let temp = workspace("Hello world", "@Hello \n-world\n+there\n[EOF]");
    fs::create_dir_all(temp.path().join(".patchmark")).unwrap();
    fs::write(
        temp.path().join(".patchmark/config.toml"),
        "[apply]\nhighlight = false\n",
    )
    .unwrap();

    patchmark(temp.path())
        .args(["apply", "doc.md", "edit.patch"])
        .assert()
        .success();
    assert_eq!(read(&temp, "doc.md"), "Hello there");
}

#[test]
fn prompt_includes_document_and_instruction() {
    let temp = workspace("# Draft\n", "");
    patchmark(temp.path())
        .args(["prompt", "doc.md", "--instruction", "Polish the title", "--language", "de"])
        .assert()
        .success()
        .stdout(predicate::str::contains("=== system ==="))
        .stdout(predicate::str::contains("# Draft"))
        .stdout(predicate::str::contains("Polish the title"))
        .stdout(predicate::str::contains("Write added text in: de"));
}

#[test]
fn completions_are_generated() {
    let temp = tempfile::tempdir().unwrap();
    patchmark(temp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("patchmark"));
}
