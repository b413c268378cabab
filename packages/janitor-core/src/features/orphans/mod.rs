//! Orphan file detection.
//!
//! A file is an orphan iff its in-degree in the file graph is zero, it is
//! not inside an immortal directory, and it carries no entry-point marker
//! (syntactic `__main__` guard for Python, `index.*` naming for JS/TS, or a
//! metadata entry point declared in `pyproject.toml` / `package.json`).

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use super::dep_graph::FileGraph;
use crate::shared::models::Language;
use crate::shared::utils::paths;

pub struct OrphanDetector {
    project_root: PathBuf,
    metadata_entry_points: FxHashSet<PathBuf>,
}

impl OrphanDetector {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let metadata_entry_points = parse_metadata_entry_points(&project_root);
        Self {
            project_root,
            metadata_entry_points,
        }
    }

    /// Files with zero in-degree that are neither immortal nor entry points.
    pub fn detect(&self, graph: &FileGraph) -> Vec<PathBuf> {
        let mut orphans: Vec<PathBuf> = graph
            .files()
            .filter(|file| graph.in_degree(file) == 0)
            .filter(|file| !paths::is_in_immortal_dir(paths::relative_to(file, &self.project_root)))
            .filter(|file| !self.is_entry_point(file))
            .cloned()
            .collect();
        orphans.sort();
        orphans
    }

    fn is_entry_point(&self, file: &Path) -> bool {
        if self.metadata_entry_points.contains(file) {
            return true;
        }

        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        match Language::from_path(file) {
            Some(Language::Python) => {
                // `python -m package` entry
                if file_name == "__main__.py" {
                    return true;
                }
                std::fs::read_to_string(file)
                    .map(|content| content.contains("if __name__ =="))
                    .unwrap_or(false)
            }
            Some(Language::JavaScript) | Some(Language::TypeScript) => {
                file_name.starts_with("index.")
            }
            None => false,
        }
    }
}

/// Entry points declared in packaging metadata: `pyproject.toml`
/// `[project.scripts]` / `[project.entry-points]` module targets and
/// `package.json` `bin` / `main` / `module` paths.
fn parse_metadata_entry_points(project_root: &Path) -> FxHashSet<PathBuf> {
    let mut entry_points = FxHashSet::default();

    let pyproject = project_root.join("pyproject.toml");
    if let Ok(content) = std::fs::read_to_string(&pyproject) {
        if let Ok(doc) = content.parse::<toml::Value>() {
            let project = doc.get("project");
            let mut targets = Vec::new();
            if let Some(scripts) = project
                .and_then(|p| p.get("scripts"))
                .and_then(toml::Value::as_table)
            {
                targets.extend(scripts.values().filter_map(toml::Value::as_str));
            }
            if let Some(groups) = project
                .and_then(|p| p.get("entry-points"))
                .and_then(toml::Value::as_table)
            {
                for group in groups.values().filter_map(toml::Value::as_table) {
                    targets.extend(group.values().filter_map(toml::Value::as_str));
                }
            }
            for target in targets {
                let module = target.split(':').next().unwrap_or_default().trim();
                if module.is_empty() {
                    continue;
                }
                let rel: PathBuf = module.split('.').collect();
                for candidate in [
                    project_root.join(&rel).with_extension("py"),
                    project_root.join("src").join(&rel).with_extension("py"),
                    project_root.join(&rel).join("__init__.py"),
                    project_root.join("src").join(&rel).join("__init__.py"),
                ] {
                    if candidate.is_file() {
                        entry_points.insert(paths::canonicalize(&candidate));
                    }
                }
            }
        }
    }

    let package_json = project_root.join("package.json");
    if let Ok(content) = std::fs::read_to_string(&package_json) {
        if let Ok(doc) = serde_json::from_str::<serde_json::Value>(&content) {
            let mut paths_found: Vec<String> = Vec::new();
            match doc.get("bin") {
                Some(serde_json::Value::String(bin)) => paths_found.push(bin.clone()),
                Some(serde_json::Value::Object(bins)) => {
                    paths_found.extend(
                        bins.values()
                            .filter_map(serde_json::Value::as_str)
                            .map(str::to_string),
                    );
                }
                _ => {}
            }
            for key in ["main", "module"] {
                if let Some(value) = doc.get(key).and_then(serde_json::Value::as_str) {
                    paths_found.push(value.to_string());
                }
            }
            for rel in paths_found {
                let candidate = project_root.join(rel.trim_start_matches("./"));
                if candidate.is_file() {
                    entry_points.insert(paths::canonicalize(&candidate));
                }
            }
        }
    }

    entry_points
}
