//! File-level dependency graph.
//!
//! Node = canonical file path; edge A → B means "A textually imports
//! something resolving to B". Parallel edges collapse. Orphan detection
//! reads in-degrees off this graph, so cycles need no special treatment.

mod resolver;

pub use resolver::ModuleResolver;

use std::path::{Path, PathBuf};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rustc_hash::FxHashMap;
use walkdir::WalkDir;

use crate::config::LanguageSelector;
use crate::shared::models::{Import, Language};
use crate::shared::utils::paths;

/// Directed file graph with canonical-path nodes.
#[derive(Debug, Default)]
pub struct FileGraph {
    graph: DiGraph<PathBuf, ()>,
    indices: FxHashMap<PathBuf, NodeIndex>,
}

impl FileGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: &Path) -> NodeIndex {
        if let Some(&index) = self.indices.get(path) {
            return index;
        }
        let index = self.graph.add_node(path.to_path_buf());
        self.indices.insert(path.to_path_buf(), index);
        index
    }

    /// Add an import edge; parallel edges collapse into one.
    pub fn add_edge(&mut self, from: &Path, to: &Path) {
        let from = self.add_file(from);
        let to = self.add_file(to);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.indices.contains_key(path)
    }

    pub fn in_degree(&self, path: &Path) -> usize {
        self.indices
            .get(path)
            .map(|&idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .unwrap_or(0)
    }

    pub fn file_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.graph.node_weights()
    }
}

/// Resolves imports and assembles the file graph.
pub struct DependencyGraphBuilder {
    resolver: ModuleResolver,
}

impl DependencyGraphBuilder {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            resolver: ModuleResolver::new(project_root),
        }
    }

    /// Resolve a file's imports to existing target files, deduplicated.
    pub fn resolve_dependencies(&self, imports: &[Import], language: Language) -> Vec<PathBuf> {
        let mut targets = Vec::new();
        for import in imports {
            for target in self.resolver.resolve(import, language) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }

    /// Assemble the graph from per-file resolved edges. Every discovered
    /// file becomes a node even with no imports.
    pub fn build_graph(
        &self,
        files: &[PathBuf],
        edges: &FxHashMap<PathBuf, Vec<PathBuf>>,
    ) -> FileGraph {
        let mut graph = FileGraph::new();
        for file in files {
            graph.add_file(file);
        }
        for (file, targets) in edges {
            for target in targets {
                graph.add_edge(file, target);
            }
        }
        tracing::debug!(
            files = graph.file_count(),
            edges = graph.edge_count(),
            "file graph built"
        );
        graph
    }
}

/// Walk the project tree and collect source files for the selector,
/// canonicalised, skipping vendored/build directories unless asked not to.
pub fn discover_files(
    project_root: &Path,
    selector: LanguageSelector,
    include_vendored: bool,
) -> Vec<PathBuf> {
    let extensions = selector.extensions();
    let mut files = Vec::new();

    for entry in WalkDir::new(project_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if !e.file_type().is_dir() {
                return true;
            }
            if include_vendored {
                // the tool's own state directories are never analysed
                let name = e.file_name().to_string_lossy();
                return name != ".janitor_cache" && name != ".janitor_trash" && name != ".git";
            }
            !paths::is_excluded(Path::new(e.file_name()))
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| extensions.contains(&ext))
            .unwrap_or(false);
        if matches {
            files.push(paths::canonicalize(path));
        }
    }

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        paths::canonicalize(&path)
    }

    #[test]
    fn test_parallel_edges_collapse() {
        let mut graph = FileGraph::new();
        let a = PathBuf::from("/p/a.py");
        let b = PathBuf::from("/p/b.py");
        graph.add_edge(&a, &b);
        graph.add_edge(&a, &b);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.in_degree(&b), 1);
        assert_eq!(graph.in_degree(&a), 0);
    }

    #[test]
    fn test_cyclic_imports_two_edges() {
        let mut graph = FileGraph::new();
        let a = PathBuf::from("/p/a.py");
        let b = PathBuf::from("/p/b.py");
        graph.add_edge(&a, &b);
        graph.add_edge(&b, &a);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.in_degree(&a), 1);
        assert_eq!(graph.in_degree(&b), 1);
    }

    #[test]
    fn test_discover_skips_vendored() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/app.py", "");
        touch(dir.path(), "node_modules/lib/x.py", "");
        touch(dir.path(), ".venv/site.py", "");
        touch(dir.path(), "readme.md", "");

        let files = discover_files(dir.path(), LanguageSelector::Python, false);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/app.py"));
    }

    #[test]
    fn test_discover_include_vendored() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/app.py", "");
        touch(dir.path(), "vendor/x.py", "");
        touch(dir.path(), ".janitor_cache/fake.py", "");

        let files = discover_files(dir.path(), LanguageSelector::Python, true);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_build_graph_from_edges() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.py", "from b import f\n");
        let b = touch(dir.path(), "b.py", "def f(): pass\n");

        let builder = DependencyGraphBuilder::new(dir.path());
        let mut edges = FxHashMap::default();
        edges.insert(a.clone(), vec![b.clone()]);

        let graph = builder.build_graph(&[a.clone(), b.clone()], &edges);
        assert_eq!(graph.file_count(), 2);
        assert_eq!(graph.in_degree(&b), 1);
        assert_eq!(graph.in_degree(&a), 0);
    }
}
