//! Safe mutation engine.
//!
//! Backup → byte-range splice → atomic write, with the backup mirror under
//! `<root>/.janitor_trash/<session_id>/` as the single source of truth for
//! rollback. Per file: verify the analysis-time hash, back up on first
//! touch, splice entity ranges bottom-to-top with UTF-8 boundary snapping,
//! sweep imports that only referenced removed names, then write back via
//! temp-file + rename. The backup directory is deleted only on explicit
//! commit.

mod manifest;

pub use manifest::{any_pending_session, EntryStatus, ManifestEntry, SessionManifest};

use std::path::{Path, PathBuf};

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::features::cache::hash_file;
use crate::shared::models::{ByteRange, Entity, JanitorError, Language, Result};
use crate::shared::utils::paths;

/// Result summary of one `delete_symbols` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub files_touched: usize,
    pub symbols_removed: usize,
    pub imports_swept: usize,
    /// entities skipped because their range could not be snapped safely
    pub symbols_skipped: usize,
}

/// Partial-success report of a restore pass.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: usize,
    pub errors: Vec<String>,
}

pub struct SafeMutator {
    project_root: PathBuf,
    session_dir: PathBuf,
    session_id: String,
    manifest: SessionManifest,
    backed_up: FxHashSet<PathBuf>,
}

impl SafeMutator {
    /// Begin a mutation session. Refuses to start while another session on
    /// the same project still has pending entries.
    pub fn begin_session(project_root: &Path) -> Result<Self> {
        let trash_root = project_root.join(".janitor_trash");
        if any_pending_session(&trash_root) {
            return Err(JanitorError::backup(
                "another mutation session is already in progress",
            ));
        }

        let session_id = format!(
            "{}_{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..6]
        );
        let session_dir = trash_root.join(&session_id);
        std::fs::create_dir_all(&session_dir)
            .map_err(|e| JanitorError::backup(format!("trash directory unwritable: {}", e)))?;
        let manifest = SessionManifest::create(&session_dir, &session_id)?;

        Ok(Self {
            project_root: project_root.to_path_buf(),
            session_dir,
            session_id,
            manifest,
            backed_up: FxHashSet::default(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn manifest(&self) -> &SessionManifest {
        &self.manifest
    }

    /// Remove the given entities from their files.
    ///
    /// `expected_hashes` carries the content hash captured at analysis time
    /// per file; every file is re-hashed and compared before anything is
    /// written, so a concurrent edit aborts the whole session untouched.
    pub fn delete_symbols(
        &mut self,
        plan: &FxHashMap<PathBuf, Vec<Entity>>,
        expected_hashes: &FxHashMap<PathBuf, String>,
    ) -> Result<MutationOutcome> {
        // Pre-flight: no write happens if any file moved under us.
        for file in plan.keys() {
            let current = hash_file(file)
                .map_err(|e| JanitorError::from(e))?;
            if let Some(expected) = expected_hashes.get(file) {
                if *expected != current {
                    return Err(JanitorError::concurrent_modification(format!(
                        "file changed since analysis: {}",
                        file.display()
                    )));
                }
            }
        }

        let mut outcome = MutationOutcome::default();
        for (file, entities) in plan {
            if entities.is_empty() {
                continue;
            }
            if let Err(err) = self.backup_file(file) {
                // earlier files in this session may already be spliced
                self.restore_all();
                return Err(err);
            }
            match self.splice_file(file, entities) {
                Ok((removed, swept, skipped)) => {
                    outcome.files_touched += 1;
                    outcome.symbols_removed += removed;
                    outcome.imports_swept += swept;
                    outcome.symbols_skipped += skipped;
                }
                Err(err) => {
                    // A failed write poisons the session: roll back now.
                    tracing::warn!(file = %file.display(), %err, "mutation write failed, restoring");
                    self.restore_all();
                    return Err(JanitorError::mutation_write(format!(
                        "write failed for {}: {}",
                        file.display(),
                        err
                    )));
                }
            }
        }
        Ok(outcome)
    }

    /// Delete whole files (orphans). Same hash pre-flight and backup
    /// machinery as symbol deletion; restore copies the file back.
    pub fn delete_files(
        &mut self,
        files: &[PathBuf],
        expected_hashes: &FxHashMap<PathBuf, String>,
    ) -> Result<usize> {
        for file in files {
            let current = hash_file(file)?;
            if let Some(expected) = expected_hashes.get(file) {
                if *expected != current {
                    return Err(JanitorError::concurrent_modification(format!(
                        "file changed since analysis: {}",
                        file.display()
                    )));
                }
            }
        }

        let mut deleted = 0;
        for file in files {
            self.backup_file(file)?;
            std::fs::remove_file(file)
                .map_err(|e| JanitorError::mutation_write(format!("{}: {}", file.display(), e)))?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Copy the file into the session mirror on first touch.
    fn backup_file(&mut self, file: &Path) -> Result<()> {
        if self.backed_up.contains(file) {
            return Ok(());
        }
        let relative = paths::relative_to(file, &self.project_root);
        let backup = self.session_dir.join(relative);
        if let Some(parent) = backup.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| JanitorError::backup(format!("cannot create backup dir: {}", e)))?;
        }
        std::fs::copy(file, &backup)
            .map_err(|e| JanitorError::backup(format!("cannot back up {}: {}", file.display(), e)))?;
        let hash = hash_file(file)?;
        self.manifest
            .add_entry(file.to_path_buf(), backup, hash)?;
        self.backed_up.insert(file.to_path_buf());
        Ok(())
    }

    fn splice_file(&self, file: &Path, entities: &[Entity]) -> Result<(usize, usize, usize)> {
        let bytes = std::fs::read(file)?;
        let language = Language::from_path(file);

        let mut ranges: Vec<ByteRange> = entities.iter().map(Entity::removal_range).collect();
        // bottom-to-top so earlier offsets stay valid
        ranges.sort_by(|a, b| b.start.cmp(&a.start));

        let (mut content, removed, skipped) = splice_ranges(bytes, &ranges);

        let removed_names: FxHashSet<&str> =
            entities.iter().map(|e| e.name.as_str()).collect();
        let swept = match language {
            Some(Language::Python) => sweep_orphan_imports_python(&mut content, &removed_names),
            Some(Language::JavaScript) | Some(Language::TypeScript) => {
                sweep_orphan_imports_js(&mut content, &removed_names)
            }
            None => 0,
        };

        atomic_write(file, &content)?;
        Ok((removed, swept, skipped))
    }

    /// Copy every backup back to its original path. Idempotent and
    /// partial-success tolerant; the manifest records `rolled-back`.
    pub fn restore_all(&mut self) -> RestoreReport {
        let mut report = RestoreReport::default();
        for entry in self.manifest.entries.clone() {
            if !entry.backup.exists() {
                report
                    .errors
                    .push(format!("backup missing: {}", entry.backup.display()));
                continue;
            }
            if let Some(parent) = entry.original.parent() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    report
                        .errors
                        .push(format!("{}: {}", entry.original.display(), err));
                    continue;
                }
            }
            match std::fs::copy(&entry.backup, &entry.original) {
                Ok(_) => report.restored += 1,
                Err(err) => report
                    .errors
                    .push(format!("{}: {}", entry.original.display(), err)),
            }
        }
        if let Err(err) = self.manifest.set_all_status(EntryStatus::RolledBack) {
            report.errors.push(format!("manifest: {}", err));
        }
        report
    }

    /// Delete the backup mirror and persist the manifest as committed. The
    /// manifest itself stays behind as the session record.
    pub fn commit(&mut self) -> Result<()> {
        for entry in self.manifest.entries.clone() {
            if entry.backup.exists() {
                std::fs::remove_file(&entry.backup).ok();
            }
        }
        self.manifest.set_all_status(EntryStatus::Committed)
    }
}

/// Splice sorted-descending ranges out of the buffer, snapping each range
/// to UTF-8 character boundaries. An entity whose range cannot be snapped
/// safely (invalid UTF-8 at the cut points) is skipped, not mangled.
/// Returns (content, spliced_count, skipped_count).
fn splice_ranges(bytes: Vec<u8>, ranges: &[ByteRange]) -> (Vec<u8>, usize, usize) {
    match String::from_utf8(bytes) {
        Ok(mut text) => {
            let mut spliced = 0;
            for range in ranges {
                match range.snap_to_char_boundaries(&text) {
                    Some(snapped) if !snapped.is_empty() => {
                        text.replace_range(snapped.start..snapped.end, "");
                        spliced += 1;
                    }
                    _ => {}
                }
            }
            (text.into_bytes(), spliced, 0)
        }
        Err(err) => {
            // Lossy input: splice on raw bytes, but only where both cut
            // points sit on UTF-8 sequence boundaries.
            let mut bytes = err.into_bytes();
            let mut spliced = 0;
            let mut skipped = 0;
            for range in ranges {
                let end = range.end.min(bytes.len());
                let start = range.start.min(end);
                if start >= end {
                    continue;
                }
                if is_sequence_boundary(&bytes, start) && is_sequence_boundary(&bytes, end) {
                    bytes.drain(start..end);
                    spliced += 1;
                } else {
                    skipped += 1;
                }
            }
            (bytes, spliced, skipped)
        }
    }
}

/// A byte offset is a safe cut point when it does not land inside a UTF-8
/// continuation sequence.
fn is_sequence_boundary(bytes: &[u8], offset: usize) -> bool {
    offset == 0 || offset >= bytes.len() || (bytes[offset] & 0b1100_0000) != 0b1000_0000
}

/// Remove single-line Python imports whose every imported name was removed
/// and no longer occurs in the remaining content.
fn sweep_orphan_imports_python(content: &mut Vec<u8>, removed_names: &FxHashSet<&str>) -> usize {
    let from_re = Regex::new(r"^\s*from\s+\S+\s+import\s+([^()\\]+?)\s*$").unwrap();
    let import_re = Regex::new(r"^\s*import\s+([^()\\]+?)\s*$").unwrap();
    sweep_lines(content, |line| {
        let names_part = from_re
            .captures(line)
            .or_else(|| import_re.captures(line))
            .map(|c| c[1].to_string())?;
        let names: Vec<String> = names_part
            .split(',')
            .map(|piece| {
                // local binding: alias when present, otherwise the last
                // dotted segment
                let piece = piece.trim();
                match piece.split_once(" as ") {
                    Some((_, alias)) => alias.trim().to_string(),
                    None => piece.rsplit('.').next().unwrap_or(piece).to_string(),
                }
            })
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return None;
        }
        Some(names)
    }, removed_names)
}

/// Remove JS/TS import statements (`import {..} from '..'`, bare default
/// imports, `require()` bindings) whose bindings were all removed.
fn sweep_orphan_imports_js(content: &mut Vec<u8>, removed_names: &FxHashSet<&str>) -> usize {
    let es_re = Regex::new(r#"^\s*import\s+(.+?)\s+from\s+['"].+['"];?\s*$"#).unwrap();
    let require_re =
        Regex::new(r#"^\s*(?:const|let|var)\s+(.+?)\s*=\s*require\(.+\);?\s*$"#).unwrap();
    sweep_lines(content, |line| {
        let clause = es_re
            .captures(line)
            .or_else(|| require_re.captures(line))
            .map(|c| c[1].to_string())?;
        let names: Vec<String> = clause
            .trim_matches(|c| c == '{' || c == '}')
            .split(',')
            .map(|piece| {
                let piece = piece.trim();
                match piece.split_once(" as ") {
                    Some((_, alias)) => alias.trim().to_string(),
                    None => piece.to_string(),
                }
            })
            .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$'))
            .collect();
        if names.is_empty() {
            return None;
        }
        Some(names)
    }, removed_names)
}

/// Drop every line whose extracted bindings are all in `removed_names` and
/// absent from the rest of the content.
fn sweep_lines<F>(content: &mut Vec<u8>, extract: F, removed_names: &FxHashSet<&str>) -> usize
where
    F: Fn(&str) -> Option<Vec<String>>,
{
    let text = String::from_utf8_lossy(content).into_owned();
    let lines: Vec<&str> = text.split_inclusive('\n').collect();

    let mut keep: Vec<bool> = vec![true; lines.len()];
    for (i, line) in lines.iter().enumerate() {
        let Some(names) = extract(line.trim_end_matches(['\n', '\r'])) else {
            continue;
        };
        let all_removed = names.iter().all(|n| removed_names.contains(n.as_str()));
        if !all_removed {
            continue;
        }
        // a name still used anywhere outside this line keeps the import
        let rest: String = lines
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, l)| *l)
            .collect();
        if names.iter().all(|n| !rest.contains(n.as_str())) {
            keep[i] = false;
        }
    }

    let swept = keep.iter().filter(|k| !**k).count();
    if swept > 0 {
        let new_text: String = lines
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(l, _)| *l)
            .collect();
        *content = new_text.into_bytes();
    }
    swept
}

/// Temp-file + rename in the target's directory.
fn atomic_write(file: &Path, content: &[u8]) -> Result<()> {
    let tmp = file.with_extension("janitor_tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{EntityKind, Span};
    use tempfile::TempDir;

    fn entity_for(file: &Path, name: &str, range: ByteRange) -> Entity {
        Entity {
            name: name.to_string(),
            kind: EntityKind::Function,
            file_path: file.to_path_buf(),
            byte_range: range,
            decorated_byte_range: None,
            span: Span::zero(),
            qualified_name: name.to_string(),
            parent_class: None,
            base_classes: Vec::new(),
            decorators: Vec::new(),
            text: String::new(),
            structural_hash: None,
            protected_by: None,
        }
    }

    fn range_of(content: &str, needle: &str) -> ByteRange {
        let start = content.find(needle).unwrap();
        ByteRange::new(start, start + needle.len())
    }

    #[test]
    fn test_delete_and_restore_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        let original = "def keep():\n    pass\n\ndef dead():\n    pass\n";
        std::fs::write(&file, original).unwrap();

        let mut mutator = SafeMutator::begin_session(dir.path()).unwrap();
        let mut plan = FxHashMap::default();
        plan.insert(
            file.clone(),
            vec![entity_for(&file, "dead", range_of(original, "def dead():\n    pass\n"))],
        );
        let mut hashes = FxHashMap::default();
        hashes.insert(file.clone(), hash_file(&file).unwrap());

        let outcome = mutator.delete_symbols(&plan, &hashes).unwrap();
        assert_eq!(outcome.symbols_removed, 1);
        let mutated = std::fs::read_to_string(&file).unwrap();
        assert!(!mutated.contains("def dead"));
        assert!(mutated.contains("def keep"));

        let report = mutator.restore_all();
        assert_eq!(report.restored, 1);
        assert!(report.errors.is_empty());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), original);

        // idempotent
        let again = mutator.restore_all();
        assert_eq!(again.restored, 1);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), original);
    }

    #[test]
    fn test_concurrent_modification_aborts_before_write() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "def dead(): pass\n").unwrap();

        let mut hashes = FxHashMap::default();
        hashes.insert(file.clone(), hash_file(&file).unwrap());

        // file changes between analysis and mutation
        std::fs::write(&file, "def dead(): pass\n# edited\n").unwrap();
        let content_before = std::fs::read_to_string(&file).unwrap();

        let mut mutator = SafeMutator::begin_session(dir.path()).unwrap();
        let mut plan = FxHashMap::default();
        plan.insert(
            file.clone(),
            vec![entity_for(&file, "dead", ByteRange::new(0, 17))],
        );

        let err = mutator.delete_symbols(&plan, &hashes).unwrap_err();
        assert_eq!(
            err.kind,
            crate::shared::models::ErrorKind::ConcurrentModification
        );
        assert_eq!(std::fs::read_to_string(&file).unwrap(), content_before);
        // no backup was taken
        assert!(mutator.manifest().entries.is_empty());
    }

    #[test]
    fn test_descending_splice_multiple_symbols() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        let original = "def a():\n    pass\n\ndef b():\n    pass\n\ndef c():\n    pass\n";
        std::fs::write(&file, original).unwrap();

        let mut mutator = SafeMutator::begin_session(dir.path()).unwrap();
        let mut plan = FxHashMap::default();
        plan.insert(
            file.clone(),
            vec![
                entity_for(&file, "a", range_of(original, "def a():\n    pass\n")),
                entity_for(&file, "c", range_of(original, "def c():\n    pass\n")),
            ],
        );
        let mut hashes = FxHashMap::default();
        hashes.insert(file.clone(), hash_file(&file).unwrap());

        mutator.delete_symbols(&plan, &hashes).unwrap();
        let mutated = std::fs::read_to_string(&file).unwrap();
        assert!(mutated.contains("def b"));
        assert!(!mutated.contains("def a"));
        assert!(!mutated.contains("def c"));
    }

    #[test]
    fn test_orphan_import_sweep() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        let original = "from helpers import dead_fn\nimport os\n\ndef dead_fn_caller():\n    return dead_fn()\n";
        // remove the caller AND treat dead_fn as removed in helpers; the
        // sweep applies to names removed in THIS file, so craft the case
        // where the import's only user disappears and the imported name was
        // itself removed.
        std::fs::write(&file, original).unwrap();

        let mut removed = FxHashSet::default();
        removed.insert("dead_fn");
        removed.insert("dead_fn_caller");

        let mut content = {
            // splice out the caller first
            let range = range_of(original, "def dead_fn_caller():\n    return dead_fn()\n");
            let (content, n, _) = splice_ranges(original.as_bytes().to_vec(), &[range]);
            assert_eq!(n, 1);
            content
        };

        let swept = sweep_orphan_imports_python(&mut content, &removed);
        assert_eq!(swept, 1);
        let text = String::from_utf8(content).unwrap();
        assert!(!text.contains("from helpers import dead_fn"));
        assert!(text.contains("import os"));
    }

    #[test]
    fn test_js_import_sweep() {
        let mut content =
            b"import { deadFn, liveFn } from './util';\nimport { gone } from './old';\nliveFn();\n"
                .to_vec();
        let mut removed = FxHashSet::default();
        removed.insert("gone");
        removed.insert("deadFn");

        let swept = sweep_orphan_imports_js(&mut content, &removed);
        // the first import still binds liveFn which is used; only the
        // second is swept
        assert_eq!(swept, 1);
        let text = String::from_utf8(content).unwrap();
        assert!(text.contains("deadFn"));
        assert!(!text.contains("./old"));
    }

    #[test]
    fn test_splice_skips_unsafe_cut_in_invalid_utf8() {
        // 0xC3 0xA9 is "é"; cutting between them must be refused
        let bytes = vec![b'a', 0xC3, 0xA9, b'b', 0xFF, b'c'];
        let (content, spliced, skipped) = splice_ranges(bytes.clone(), &[ByteRange::new(1, 2)]);
        assert_eq!(spliced, 0);
        assert_eq!(skipped, 1);
        assert_eq!(content, bytes);

        // a safe cut in the same buffer works
        let (content, spliced, skipped) = splice_ranges(bytes, &[ByteRange::new(3, 4)]);
        assert_eq!(spliced, 1);
        assert_eq!(skipped, 0);
        assert_eq!(content, vec![b'a', 0xC3, 0xA9, 0xFF, b'c']);
    }

    #[test]
    fn test_symbol_spanning_final_byte() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        let original = "def keep():\n    pass\n\ndef tail():\n    pass";
        std::fs::write(&file, original).unwrap();

        let mut mutator = SafeMutator::begin_session(dir.path()).unwrap();
        let mut plan = FxHashMap::default();
        plan.insert(
            file.clone(),
            vec![entity_for(&file, "tail", range_of(original, "def tail():\n    pass"))],
        );
        let mut hashes = FxHashMap::default();
        hashes.insert(file.clone(), hash_file(&file).unwrap());

        mutator.delete_symbols(&plan, &hashes).unwrap();
        let mutated = std::fs::read_to_string(&file).unwrap();
        assert_eq!(mutated, "def keep():\n    pass\n\n");
    }

    #[test]
    fn test_commit_removes_backups_keeps_manifest() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        let original = "def dead():\n    pass\n";
        std::fs::write(&file, original).unwrap();

        let mut mutator = SafeMutator::begin_session(dir.path()).unwrap();
        let mut plan = FxHashMap::default();
        plan.insert(
            file.clone(),
            vec![entity_for(&file, "dead", range_of(original, original))],
        );
        let mut hashes = FxHashMap::default();
        hashes.insert(file.clone(), hash_file(&file).unwrap());
        mutator.delete_symbols(&plan, &hashes).unwrap();

        let backup = mutator.manifest().entries[0].backup.clone();
        assert!(backup.exists());

        mutator.commit().unwrap();
        assert!(!backup.exists());

        let loaded = SessionManifest::load(
            &dir.path().join(".janitor_trash").join(mutator.session_id()),
        )
        .unwrap();
        assert_eq!(loaded.entries[0].status, EntryStatus::Committed);
    }

    #[test]
    fn test_second_session_refused_while_pending() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "def dead():\n    pass\n").unwrap();

        let mut first = SafeMutator::begin_session(dir.path()).unwrap();
        let mut plan = FxHashMap::default();
        plan.insert(
            file.clone(),
            vec![entity_for(&file, "dead", ByteRange::new(0, 21))],
        );
        let mut hashes = FxHashMap::default();
        hashes.insert(file.clone(), hash_file(&file).unwrap());
        first.delete_symbols(&plan, &hashes).unwrap();

        assert!(SafeMutator::begin_session(dir.path()).is_err());

        first.commit().unwrap();
        assert!(SafeMutator::begin_session(dir.path()).is_ok());
    }

    #[test]
    fn test_bom_and_crlf_preserved() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        let original = "\u{FEFF}def keep():\r\n    pass\r\n\r\ndef dead():\r\n    pass\r\n";
        std::fs::write(&file, original).unwrap();

        let mut mutator = SafeMutator::begin_session(dir.path()).unwrap();
        let mut plan = FxHashMap::default();
        plan.insert(
            file.clone(),
            vec![entity_for(&file, "dead", range_of(original, "def dead():\r\n    pass\r\n"))],
        );
        let mut hashes = FxHashMap::default();
        hashes.insert(file.clone(), hash_file(&file).unwrap());

        mutator.delete_symbols(&plan, &hashes).unwrap();
        let mutated = std::fs::read_to_string(&file).unwrap();
        assert!(mutated.starts_with('\u{FEFF}'));
        assert!(mutated.contains("def keep():\r\n"));
        assert!(!mutated.contains("def dead"));
    }
}
