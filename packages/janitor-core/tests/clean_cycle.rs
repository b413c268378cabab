//! Mutate-verify-commit cycle over scratch projects.

use std::path::{Path, PathBuf};

use janitor_core::features::mutation::{EntryStatus, SessionManifest};
use janitor_core::{LanguageSelector, Orchestrator, RunOptions, Verdict};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

const APP: &str = "def used():\n    return 1\n\ndef unused_helper():\n    return 2\n";
const MAIN: &str = "from app import used\n\nif __name__ == \"__main__\":\n    used()\n";

fn orchestrator(root: &Path, test_command: &str) -> Orchestrator {
    Orchestrator::new(
        RunOptions::new(root, LanguageSelector::Python).with_test_command(test_command),
    )
    .unwrap()
}

#[test]
fn clean_commits_when_tests_stay_green() {
    let dir = TempDir::new().unwrap();
    let app = write(dir.path(), "app.py", APP);
    write(dir.path(), "main.py", MAIN);

    let report = orchestrator(dir.path(), "true").clean().unwrap();
    assert_eq!(report.verdict, Verdict::Success);
    assert_eq!(report.verdict.exit_code(), 0);
    let mutation = report.mutation.unwrap();
    assert_eq!(mutation.symbols_removed, 1);

    let mutated = std::fs::read_to_string(&app).unwrap();
    assert!(!mutated.contains("unused_helper"));
    assert!(mutated.contains("def used"));

    // backups deleted, manifest persisted as committed
    let session_dir = dir
        .path()
        .join(".janitor_trash")
        .join(report.session_id.unwrap());
    let manifest = SessionManifest::load(&session_dir).unwrap();
    assert!(manifest.entries.iter().all(|e| e.status == EntryStatus::Committed));
    assert!(manifest.entries.iter().all(|e| !e.backup.exists()));
}

#[test]
fn clean_rolls_back_on_new_test_failure() {
    let dir = TempDir::new().unwrap();
    let app = write(dir.path(), "app.py", APP);
    write(dir.path(), "main.py", MAIN);
    // Fails once the symbol disappears: a stand-in for a regressing suite.
    write(
        dir.path(),
        "check.sh",
        "#!/bin/sh\nif grep -q unused_helper app.py; then\n  exit 0\nelse\n  echo \"FAILED tests/test_app.py::test_symbol_present\"\n  exit 1\nfi\n",
    );

    let original = std::fs::read(&app).unwrap();
    let report = orchestrator(dir.path(), "sh check.sh").clean().unwrap();

    assert_eq!(report.verdict, Verdict::RolledBack);
    assert_eq!(report.verdict.exit_code(), 1);
    assert!(report
        .new_failures
        .contains("tests/test_app.py::test_symbol_present"));

    // every touched file byte-identical to its pre-mutation state
    assert_eq!(std::fs::read(&app).unwrap(), original);

    let session_dir = dir
        .path()
        .join(".janitor_trash")
        .join(report.session_id.unwrap());
    let manifest = SessionManifest::load(&session_dir).unwrap();
    assert!(manifest
        .entries
        .iter()
        .all(|e| e.status == EntryStatus::RolledBack));
}

#[test]
fn clean_without_findings_creates_no_trash_directory() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "main.py",
        "def main():\n    pass\n\nif __name__ == \"__main__\":\n    main()\n",
    );

    let report = orchestrator(dir.path(), "true").clean().unwrap();
    assert_eq!(report.verdict, Verdict::Success);
    assert!(report.session_id.is_none());
    assert!(!dir.path().join(".janitor_trash").exists());
}

#[test]
fn dry_run_reports_without_mutating() {
    let dir = TempDir::new().unwrap();
    let app = write(dir.path(), "app.py", APP);
    write(dir.path(), "main.py", MAIN);

    let options = RunOptions::new(dir.path(), LanguageSelector::Python)
        .with_test_command("true")
        .with_dry_run(true);
    let report = Orchestrator::new(options).unwrap().clean().unwrap();

    assert_eq!(report.verdict, Verdict::Flagged);
    assert!(report.mutation.is_none());
    assert_eq!(std::fs::read_to_string(&app).unwrap(), APP);
    assert!(!dir.path().join(".janitor_trash").exists());
}

#[test]
fn clean_deletes_orphan_files_and_restores_them_on_failure() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "main.py",
        "def main():\n    pass\n\nif __name__ == \"__main__\":\n    main()\n",
    );
    let orphan = write(dir.path(), "forgotten.py", "def old():\n    return 0\n");
    write(
        dir.path(),
        "check.sh",
        "#!/bin/sh\nif [ -f forgotten.py ]; then\n  exit 0\nelse\n  echo \"FAILED tests/test_app.py::test_needs_forgotten\"\n  exit 1\nfi\n",
    );

    let report = orchestrator(dir.path(), "sh check.sh").clean().unwrap();
    assert_eq!(report.verdict, Verdict::RolledBack);
    assert!(orphan.exists());
    assert_eq!(
        std::fs::read_to_string(&orphan).unwrap(),
        "def old():\n    return 0\n"
    );
}

#[test]
fn clean_commits_orphan_deletion_when_tests_pass() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "main.py",
        "def main():\n    pass\n\nif __name__ == \"__main__\":\n    main()\n",
    );
    let orphan = write(dir.path(), "forgotten.py", "def old():\n    return 0\n");

    let report = orchestrator(dir.path(), "true").clean().unwrap();
    assert_eq!(report.verdict, Verdict::Success);
    assert_eq!(report.orphans_deleted, 1);
    assert!(!orphan.exists());
}
