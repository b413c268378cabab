//! Path predicates and canonicalisation.
//!
//! Graph keys are always canonical absolute paths (symlinks resolved, `..`
//! normalised) so that string-separator aliasing can never split one file
//! into two nodes.

use std::path::{Component, Path, PathBuf};

/// Vendored and build directories excluded wholesale from analysis.
pub const EXCLUDED_DIRS: &[&str] = &[
    "venv",
    ".venv",
    "env",
    ".virtualenv",
    "vendor",
    "extern",
    "third_party",
    "node_modules",
    "__pycache__",
    "site-packages",
    "dist",
    "build",
    ".tox",
    ".git",
    ".janitor_trash",
    ".janitor_cache",
];

/// Directories whose contents are never classified dead.
pub const IMMORTAL_DIRS: &[&str] = &[
    "tests",
    "test",
    "examples",
    "example",
    "docs",
    "docs_src",
    "documentation",
    "scripts",
    "script",
    "benchmarks",
    "benchmark",
    "tutorial",
    "tutorials",
    "migrations",
    "sandbox",
    "bin",
];

/// Canonicalise a path, falling back to lexical normalisation when the file
/// does not exist (unit-test fixtures, already-deleted files).
pub fn canonicalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| normalize(path))
}

/// Lexical normalisation: resolves `.` and `..` components without touching
/// the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True when any component of `path` names an excluded directory.
pub fn is_excluded(path: &Path) -> bool {
    has_component_in(path, EXCLUDED_DIRS)
}

/// True when any component of `path` names an immortal directory.
pub fn is_in_immortal_dir(path: &Path) -> bool {
    has_component_in(path, IMMORTAL_DIRS)
}

fn has_component_in(path: &Path, names: &[&str]) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| names.contains(&s))
            .unwrap_or(false)
    })
}

/// Strip `root` from `path` when possible, otherwise return `path` as-is.
pub fn relative_to<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
