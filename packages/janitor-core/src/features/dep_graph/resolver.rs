//! Import-to-file resolution.
//!
//! Python: relative imports walk `relative_level - 1` directories up from
//! the importer and descend into the module path, probing `.py` and
//! `/__init__.py`; absolute imports try the project root and a `src/` root.
//! JS/TS: relative specifiers resolve against the importer's directory with
//! the `.ts/.tsx/.js/.jsx` extension set and `index.*` directory forms;
//! bare specifiers get one project-root attempt and are otherwise external.
//! Unresolved imports are dropped silently.

use std::path::{Path, PathBuf};

use crate::shared::models::{Import, Language};
use crate::shared::utils::paths;

const JS_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

pub struct ModuleResolver {
    project_root: PathBuf,
}

impl ModuleResolver {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Resolve one import to zero or more existing target files
    /// (canonicalised).
    pub fn resolve(&self, import: &Import, language: Language) -> Vec<PathBuf> {
        let targets = match language {
            Language::Python => self.resolve_python(import),
            Language::JavaScript | Language::TypeScript => {
                self.resolve_js(import).into_iter().collect()
            }
        };
        targets.into_iter().map(|p| paths::canonicalize(&p)).collect()
    }

    fn resolve_python(&self, import: &Import) -> Vec<PathBuf> {
        if import.is_relative {
            self.resolve_python_relative(import)
        } else {
            self.resolve_python_absolute(import)
        }
    }

    fn resolve_python_relative(&self, import: &Import) -> Vec<PathBuf> {
        let Some(importer_dir) = import.file_path.parent() else {
            return Vec::new();
        };

        let mut base = importer_dir.to_path_buf();
        for _ in 1..import.relative_level {
            if !base.pop() {
                return Vec::new();
            }
        }

        let module_part = import.module.trim_start_matches('.');
        if module_part.is_empty() {
            // `from . import x, y`: each name may be a sibling module; when
            // none is, the package __init__ itself is the target.
            let mut resolved = Vec::new();
            for name in &import.names {
                if let Some(path) = check_python_variants(&base.join(name)) {
                    resolved.push(path);
                }
            }
            if resolved.is_empty() {
                let init = base.join("__init__.py");
                if init.is_file() {
                    resolved.push(init);
                }
            }
            return resolved;
        }

        let mut candidate = base;
        for part in module_part.split('.') {
            candidate.push(part);
        }
        check_python_variants(&candidate).into_iter().collect()
    }

    fn resolve_python_absolute(&self, import: &Import) -> Vec<PathBuf> {
        let parts: Vec<&str> = import.module.split('.').collect();
        let Some(first) = parts.first() else {
            return Vec::new();
        };

        let mut roots = vec![self.project_root.clone()];
        let src = self.project_root.join("src");
        if src.is_dir() {
            roots.push(src);
        }

        for root in roots {
            // cheap existence probe on the first component before descending
            if !root.join(first).exists() && !root.join(format!("{}.py", first)).exists() {
                continue;
            }
            let mut candidate = root;
            for part in &parts {
                candidate.push(part);
            }
            if let Some(path) = check_python_variants(&candidate) {
                // stop at the first resolution
                return vec![path];
            }
        }
        Vec::new()
    }

    fn resolve_js(&self, import: &Import) -> Option<PathBuf> {
        if import.is_relative {
            let importer_dir = import.file_path.parent()?;
            let candidate = paths::normalize(&importer_dir.join(&import.module));
            return probe_js_path(&candidate);
        }
        // Bare specifier: one project-root attempt, otherwise external.
        probe_js_path(&paths::normalize(&self.project_root.join(&import.module)))
    }
}

/// `<base>.py`, then `<base>/__init__.py`.
fn check_python_variants(base: &Path) -> Option<PathBuf> {
    let as_file = base.with_extension("py");
    if as_file.is_file() {
        return Some(as_file);
    }
    let as_package = base.join("__init__.py");
    if as_package.is_file() {
        return Some(as_package);
    }
    None
}

/// Exact file, extension probes, then `index.*` inside a directory.
fn probe_js_path(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    for ext in JS_EXTENSIONS {
        let with_ext = PathBuf::from(format!("{}.{}", candidate.display(), ext));
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    if candidate.is_dir() {
        for ext in JS_EXTENSIONS {
            let index = candidate.join(format!("index.{}", ext));
            if index.is_file() {
                return Some(index);
            }
        }
    }
    None
}
