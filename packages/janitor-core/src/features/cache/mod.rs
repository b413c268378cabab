//! Incremental analysis cache.
//!
//! SQLite store at `<project_root>/.janitor_cache/analysis.db` keyed by
//! per-file content hashes. Validation is two-step: an mtime+size pre-check
//! reuses the stored hash without re-reading the file, any mismatch
//! re-hashes. Stale rows are ignored, never deleted; they simply stop
//! being read once the hash moves on. WAL journaling plus a busy timeout
//! lets concurrent runs share the store (readers lock-free, writers
//! serialised).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::models::{CandidateRef, Entity};

const BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Fast-path identity of one file version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub mtime_ns: u64,
    pub size: u64,
    pub content_hash: String,
}

/// Everything the per-file stages produce; one row kind per table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileArtifact {
    pub entities: Vec<Entity>,
    pub candidates: Vec<CandidateRef>,
    pub dependencies: Vec<PathBuf>,
    pub package_exports: Vec<(PathBuf, String)>,
    pub metaprogramming_danger: bool,
}

/// The whole-project fast-path row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResult {
    pub dead_symbols: Vec<Entity>,
    pub orphan_files: Vec<PathBuf>,
}

#[derive(Serialize, Deserialize)]
struct ReferenceRow {
    candidates: Vec<CandidateRef>,
    package_exports: Vec<(PathBuf, String)>,
    metaprogramming_danger: bool,
}

pub struct AnalysisCache {
    conn: Arc<Mutex<Connection>>,
}

impl AnalysisCache {
    /// Open (or create) the store under `<project_root>/.janitor_cache/`.
    pub fn open(project_root: &Path) -> CacheResult<Self> {
        let cache_dir = project_root.join(".janitor_cache");
        std::fs::create_dir_all(&cache_dir)?;
        let conn = Connection::open(cache_dir.join("analysis.db"))?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> CacheResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;

        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> CacheResult<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS file_metadata (
                file_path TEXT PRIMARY KEY,
                mtime INTEGER NOT NULL,
                size INTEGER NOT NULL,
                content_hash TEXT NOT NULL
            )",
            [],
        )?;

        for table in ["symbol_definitions", "file_references", "file_dependencies"] {
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        file_path TEXT NOT NULL,
                        content_hash TEXT NOT NULL,
                        data TEXT NOT NULL,
                        PRIMARY KEY (file_path, content_hash)
                    )",
                    table
                ),
                [],
            )?;
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS analysis_result (
                project_hash TEXT PRIMARY KEY,
                dead_symbols TEXT NOT NULL,
                orphan_files TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    // ---------------------------------------------------------- fingerprints

    /// Current stamp for a file. When the recorded mtime+size still match,
    /// the stored content hash is reused without reading the file; otherwise
    /// the content is re-hashed.
    pub fn stamp_file(&self, path: &Path) -> CacheResult<FileStamp> {
        let metadata = std::fs::metadata(path)?;
        let mtime_ns = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let size = metadata.len();

        let recorded: Option<(u64, u64, String)> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT mtime, size, content_hash FROM file_metadata WHERE file_path = ?1",
                params![path.to_string_lossy()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
        };

        if let Some((rec_mtime, rec_size, rec_hash)) = recorded {
            if rec_mtime == mtime_ns && rec_size == size {
                return Ok(FileStamp {
                    mtime_ns,
                    size,
                    content_hash: rec_hash,
                });
            }
        }

        Ok(FileStamp {
            mtime_ns,
            size,
            content_hash: hash_file(path)?,
        })
    }

    // -------------------------------------------------------- per-file rows

    /// Fetch the artifact for `(path, stamp.content_hash)`; corrupt or
    /// partial rows count as a miss.
    pub fn get_artifact(&self, path: &Path, stamp: &FileStamp) -> Option<FileArtifact> {
        let conn = self.conn.lock();
        let key = path.to_string_lossy();

        let entities: Vec<Entity> = read_row(&conn, "symbol_definitions", &key, &stamp.content_hash)?;
        let references: ReferenceRow = read_row(&conn, "file_references", &key, &stamp.content_hash)?;
        let dependencies: Vec<PathBuf> =
            read_row(&conn, "file_dependencies", &key, &stamp.content_hash)?;

        Some(FileArtifact {
            entities,
            candidates: references.candidates,
            dependencies,
            package_exports: references.package_exports,
            metaprogramming_danger: references.metaprogramming_danger,
        })
    }

    pub fn put_artifact(
        &self,
        path: &Path,
        stamp: &FileStamp,
        artifact: &FileArtifact,
    ) -> CacheResult<()> {
        let key = path.to_string_lossy().into_owned();
        let entities = serde_json::to_string(&artifact.entities)?;
        let references = serde_json::to_string(&ReferenceRow {
            candidates: artifact.candidates.clone(),
            package_exports: artifact.package_exports.clone(),
            metaprogramming_danger: artifact.metaprogramming_danger,
        })?;
        let dependencies = serde_json::to_string(&artifact.dependencies)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO file_metadata (file_path, mtime, size, content_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, stamp.mtime_ns, stamp.size, stamp.content_hash],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO symbol_definitions (file_path, content_hash, data)
             VALUES (?1, ?2, ?3)",
            params![key, stamp.content_hash, entities],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO file_references (file_path, content_hash, data)
             VALUES (?1, ?2, ?3)",
            params![key, stamp.content_hash, references],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO file_dependencies (file_path, content_hash, data)
             VALUES (?1, ?2, ?3)",
            params![key, stamp.content_hash, dependencies],
        )?;
        tx.commit()?;
        Ok(())
    }

    // --------------------------------------------------- whole-project row

    pub fn get_project_result(&self, project_hash: &str) -> Option<ProjectResult> {
        let conn = self.conn.lock();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT dead_symbols, orphan_files FROM analysis_result WHERE project_hash = ?1",
                params![project_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .ok()
            .flatten();

        let (dead, orphans) = row?;
        let dead_symbols = match serde_json::from_str(&dead) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "corrupt project result row, treating as miss");
                return None;
            }
        };
        let orphan_files = serde_json::from_str(&orphans).ok()?;
        Some(ProjectResult {
            dead_symbols,
            orphan_files,
        })
    }

    pub fn put_project_result(&self, project_hash: &str, result: &ProjectResult) -> CacheResult<()> {
        let dead = serde_json::to_string(&result.dead_symbols)?;
        let orphans = serde_json::to_string(&result.orphan_files)?;
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO analysis_result (project_hash, dead_symbols, orphan_files, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![project_hash, dead, orphans, now],
        )?;
        Ok(())
    }
}

fn read_row<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    table: &str,
    file_path: &str,
    content_hash: &str,
) -> Option<T> {
    let data: Option<String> = conn
        .query_row(
            &format!(
                "SELECT data FROM {} WHERE file_path = ?1 AND content_hash = ?2",
                table
            ),
            params![file_path, content_hash],
            |row| row.get(0),
        )
        .optional()
        .ok()
        .flatten();

    match data {
        Some(json) => match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(table, file_path, %err, "corrupt cache row, treating as miss");
                None
            }
        },
        None => None,
    }
}

/// Blake3 content hash, hex-encoded, streamed in chunks.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Whole-project hash: blake3 over the sorted `(path, content_hash)` pairs.
pub fn project_hash(stamps: &[(PathBuf, String)]) -> String {
    let mut pairs: Vec<(String, &str)> = stamps
        .iter()
        .map(|(path, hash)| (path.to_string_lossy().into_owned(), hash.as_str()))
        .collect();
    pairs.sort();

    let mut hasher = blake3::Hasher::new();
    for (path, hash) in pairs {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}
