//! Mutation-session manifest.
//!
//! `manifest.json` inside the session's trash directory enumerates every
//! touched file with its pre-mutation hash and status. The backup mirror
//! plus this manifest are the single source of truth for rollback.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::models::{JanitorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryStatus {
    Pending,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original: PathBuf,
    pub backup: PathBuf,
    /// blake3 of the pre-mutation content
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub status: EntryStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionManifest {
    pub version: String,
    pub session_id: String,
    pub entries: Vec<ManifestEntry>,
    #[serde(skip)]
    path: PathBuf,
}

impl SessionManifest {
    pub fn create(session_dir: &Path, session_id: &str) -> Result<Self> {
        std::fs::create_dir_all(session_dir)?;
        let manifest = Self {
            version: "1".to_string(),
            session_id: session_id.to_string(),
            entries: Vec::new(),
            path: session_dir.join("manifest.json"),
        };
        manifest.save()?;
        Ok(manifest)
    }

    pub fn load(session_dir: &Path) -> Result<Self> {
        let path = session_dir.join("manifest.json");
        let content = std::fs::read_to_string(&path)?;
        let mut manifest: SessionManifest = serde_json::from_str(&content)
            .map_err(|e| JanitorError::internal(format!("manifest unreadable: {}", e)))?;
        manifest.path = path;
        Ok(manifest)
    }

    pub fn add_entry(&mut self, original: PathBuf, backup: PathBuf, hash: String) -> Result<()> {
        self.entries.push(ManifestEntry {
            original,
            backup,
            hash,
            timestamp: Utc::now(),
            status: EntryStatus::Pending,
        });
        self.save()
    }

    pub fn set_all_status(&mut self, status: EntryStatus) -> Result<()> {
        for entry in &mut self.entries {
            entry.status = status;
        }
        self.save()
    }

    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(|e| e.status == EntryStatus::Pending)
    }

    /// Session summary: (pending, committed, rolled-back) entry counts.
    pub fn stats(&self) -> (usize, usize, usize) {
        let mut pending = 0;
        let mut committed = 0;
        let mut rolled_back = 0;
        for entry in &self.entries {
            match entry.status {
                EntryStatus::Pending => pending += 1,
                EntryStatus::Committed => committed += 1,
                EntryStatus::RolledBack => rolled_back += 1,
            }
        }
        (pending, committed, rolled_back)
    }

    /// Atomic write: temp file in the same directory, then rename.
    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// True when any session under `trash_root` still has pending entries;
/// a second concurrent mutation session must be refused.
pub fn any_pending_session(trash_root: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(trash_root) else {
        return false;
    };
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        if let Ok(manifest) = SessionManifest::load(&entry.path()) {
            if manifest.has_pending() {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_roundtrip() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("s1");
        let mut manifest = SessionManifest::create(&session, "s1").unwrap();
        manifest
            .add_entry(
                PathBuf::from("/p/a.py"),
                session.join("a.py"),
                "hash1".to_string(),
            )
            .unwrap();

        let loaded = SessionManifest::load(&session).unwrap();
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].status, EntryStatus::Pending);
        assert!(loaded.has_pending());
    }

    #[test]
    fn test_status_transition_persists() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("s1");
        let mut manifest = SessionManifest::create(&session, "s1").unwrap();
        manifest
            .add_entry(PathBuf::from("/p/a.py"), session.join("a.py"), "h".into())
            .unwrap();
        manifest.set_all_status(EntryStatus::RolledBack).unwrap();

        let loaded = SessionManifest::load(&session).unwrap();
        assert_eq!(loaded.entries[0].status, EntryStatus::RolledBack);
        assert!(!loaded.has_pending());
        assert_eq!(loaded.stats(), (0, 0, 1));
    }

    #[test]
    fn test_pending_session_detection() {
        let dir = TempDir::new().unwrap();
        assert!(!any_pending_session(dir.path()));

        let session = dir.path().join("s1");
        let mut manifest = SessionManifest::create(&session, "s1").unwrap();
        assert!(!any_pending_session(dir.path()));

        manifest
            .add_entry(PathBuf::from("/p/a.py"), session.join("a.py"), "h".into())
            .unwrap();
        assert!(any_pending_session(dir.path()));

        manifest.set_all_status(EntryStatus::Committed).unwrap();
        assert!(!any_pending_session(dir.path()));
    }
}
