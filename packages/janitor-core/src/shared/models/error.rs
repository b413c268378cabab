//! Unified error type for the crate.
//!
//! Parse- and resolution-level failures are local and never surface past
//! their component; mutation-level failures trigger rollback and surface a
//! single summary to the caller.

use std::fmt;
use std::path::PathBuf;

/// Error kind, one per failure class of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// CST could not be produced for a file.
    Parse,
    /// Import or reference could not be resolved unambiguously.
    Resolution,
    /// Rule pack or run configuration problem.
    Config,
    /// Analysis cache row missing or corrupt.
    Cache,
    /// File hash changed between analysis and mutation.
    ConcurrentModification,
    /// Backup could not be created; the session aborts before any write.
    Backup,
    /// A spliced buffer could not be written back.
    MutationWrite,
    /// Test runner failed to even collect tests.
    TestCollection,
    /// Test wall-clock exceeded.
    Timeout,
    Io,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Config => "config",
            ErrorKind::Cache => "cache",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::Backup => "backup",
            ErrorKind::MutationWrite => "mutation_write",
            ErrorKind::TestCollection => "test_collection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Unified error carrying kind, message and optional file context.
#[derive(Debug)]
pub struct JanitorError {
    pub kind: ErrorKind,
    pub message: String,
    pub file_path: Option<PathBuf>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl JanitorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file_path: None,
            source: None,
        }
    }

    pub fn with_file(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cache, message)
    }

    pub fn concurrent_modification(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConcurrentModification, message)
    }

    pub fn backup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backup, message)
    }

    pub fn mutation_write(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MutationWrite, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for JanitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        if let Some(ref file) = self.file_path {
            write!(f, " in {}", file.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for JanitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for JanitorError {
    fn from(err: std::io::Error) -> Self {
        JanitorError::new(ErrorKind::Io, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for JanitorError {
    fn from(err: serde_json::Error) -> Self {
        JanitorError::cache(format!("JSON serialization error: {}", err)).with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, JanitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_kind_and_file() {
        let err = JanitorError::parse("invalid syntax").with_file("/proj/broken.py");
        let msg = err.to_string();
        assert!(msg.contains("parse"));
        assert!(msg.contains("invalid syntax"));
        assert!(msg.contains("broken.py"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: JanitorError = io.into();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
