//! Reference tracker: the symbol-level reference graph.
//!
//! Holds the definitions table (by `SymbolId` and by simple name), the
//! append-only reference graph for one run, the inheritance map, the
//! package-export set and the metaprogramming-danger file set. Candidates
//! collected by the ingestion walk resolve through three strategies in
//! order: cross-module import match, class-context match (with a mandatory
//! name fallback), then plain name/qualified-name match with one edge per
//! ambiguous candidate.

mod heuristics;
mod ingest;
mod inheritance;

pub use heuristics::collect_python_heuristics;
pub use ingest::{IngestOutput, ReferenceIngestor};
pub use inheritance::InheritanceMap;

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::shared::models::{
    CandidateRef, Entity, Reference, ReferenceKind, SymbolId,
};

/// Lifecycle methods guaranteed by test-framework base classes.
const FRAMEWORK_BASES: &[(&str, &[&str])] = &[
    (
        "unittest.TestCase",
        &["setUp", "tearDown", "setUpClass", "tearDownClass", "setUpModule", "tearDownModule"],
    ),
    ("TestCase", &["setUp", "tearDown", "setUpClass", "tearDownClass"]),
];

pub struct ReferenceTracker {
    definitions: FxHashMap<SymbolId, Entity>,
    /// simple-name multimap, the strategy-3 fallback index
    by_name: FxHashMap<String, Vec<SymbolId>>,
    by_qualified: FxHashMap<String, Vec<SymbolId>>,
    references: FxHashMap<SymbolId, Vec<Reference>>,
    inheritance: InheritanceMap,
    package_exports: FxHashSet<String>,
    meta_dangerous_files: FxHashSet<PathBuf>,
    /// classes whose dunder methods were already shielded this run
    constructor_shielded: FxHashSet<String>,
    /// (class, method) pairs whose family was already shielded this run
    family_shielded: FxHashSet<(String, String)>,
    /// files with a pytest import (conftest fixture shield input)
    pytest_importers: FxHashSet<PathBuf>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self {
            definitions: FxHashMap::default(),
            by_name: FxHashMap::default(),
            by_qualified: FxHashMap::default(),
            references: FxHashMap::default(),
            inheritance: InheritanceMap::new(),
            package_exports: FxHashSet::default(),
            meta_dangerous_files: FxHashSet::default(),
            constructor_shielded: FxHashSet::default(),
            family_shielded: FxHashSet::default(),
            pytest_importers: FxHashSet::default(),
        }
    }

    // ----------------------------------------------------------- definitions

    pub fn add_definition(&mut self, entity: Entity) {
        let symbol_id = entity.symbol_id();

        if entity.kind.is_class() {
            self.inheritance.add_class(&entity.name, &entity.base_classes);
        } else if let Some(parent) = &entity.parent_class {
            self.inheritance
                .add_method(parent, &entity.name, symbol_id.clone());
        }

        self.by_name
            .entry(entity.name.clone())
            .or_default()
            .push(symbol_id.clone());
        if entity.qualified_name != entity.name {
            self.by_qualified
                .entry(entity.qualified_name.clone())
                .or_default()
                .push(symbol_id.clone());
        }
        self.references.entry(symbol_id.clone()).or_default();
        self.definitions.insert(symbol_id, entity);
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&SymbolId, &Entity)> {
        self.definitions.iter()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    pub fn get_definition(&self, id: &SymbolId) -> Option<&Entity> {
        self.definitions.get(id)
    }

    pub fn inheritance(&self) -> &InheritanceMap {
        &self.inheritance
    }

    // ------------------------------------------------------------ references

    /// Resolve one candidate into the reference graph.
    pub fn add_candidate(&mut self, source_file: &Path, candidate: &CandidateRef) {
        if candidate.kind == ReferenceKind::Import && candidate.name == "pytest" {
            self.pytest_importers.insert(source_file.to_path_buf());
        }

        let reference = Reference {
            source_file: source_file.to_path_buf(),
            source_symbol: candidate.source_symbol.clone(),
            kind: candidate.kind,
            line: candidate.line,
        };

        // Strategy 1: cross-module import resolution.
        if let Some(target_file) = &candidate.target_file {
            let matches: Vec<SymbolId> = self
                .lookup(&candidate.name)
                .into_iter()
                .filter(|id| {
                    self.definitions
                        .get(id)
                        .map(|e| &e.file_path == target_file)
                        .unwrap_or(false)
                })
                .collect();
            if !matches.is_empty() {
                for id in matches {
                    self.bind(&id, reference.clone());
                }
                return;
            }
            // An imported name that matches no definition in the target file
            // stays a placeholder (e.g. a re-exported external symbol).
            self.references
                .entry(SymbolId::unknown(&candidate.name))
                .or_default()
                .push(reference);
            return;
        }

        // Strategy 2: self/cls method resolution within the class context.
        if let Some(class_context) = &candidate.class_context {
            let matches: Vec<SymbolId> = self
                .lookup(&candidate.name)
                .into_iter()
                .filter(|id| {
                    self.definitions
                        .get(id)
                        .map(|e| e.parent_class.as_deref() == Some(class_context.as_str()))
                        .unwrap_or(false)
                })
                .collect();
            if !matches.is_empty() {
                for id in matches {
                    self.bind(&id, reference.clone());
                }
                self.shield_method_family(class_context, &candidate.name, &reference);
                return;
            }
            // Mandatory fallback to strategy 3: without it, methods invoked
            // through `self._method()` across modules become false positives.
        }

        // Strategy 3: name / qualified-name fallback, one edge per match.
        let matches = self.lookup(&candidate.name);
        if matches.is_empty() {
            self.references
                .entry(SymbolId::unknown(&candidate.name))
                .or_default()
                .push(reference);
            return;
        }
        for id in matches {
            self.bind(&id, reference.clone());
        }
    }

    /// Replay a batch of candidates for one file (live walk or cache replay).
    pub fn add_candidates(&mut self, source_file: &Path, candidates: &[CandidateRef]) {
        for candidate in candidates {
            self.add_candidate(source_file, candidate);
        }
    }

    fn lookup(&self, name: &str) -> Vec<SymbolId> {
        let mut out = Vec::new();
        if let Some(ids) = self.by_name.get(name) {
            out.extend(ids.iter().cloned());
        }
        if name.contains('.') {
            if let Some(ids) = self.by_qualified.get(name) {
                for id in ids {
                    if !out.contains(id) {
                        out.push(id.clone());
                    }
                }
            }
        }
        out
    }

    /// Attach a reference and fire the synthetic shields the binding implies.
    fn bind(&mut self, id: &SymbolId, reference: Reference) {
        let (is_class, class_name, method_info) = match self.definitions.get(id) {
            Some(entity) => (
                entity.kind.is_class(),
                entity.name.clone(),
                entity
                    .parent_class
                    .clone()
                    .map(|parent| (parent, entity.name.clone())),
            ),
            None => return,
        };

        self.references.entry(id.clone()).or_default().push(reference.clone());

        if is_class {
            self.shield_constructors(&class_name, &reference);
        }
        if let Some((parent, method)) = method_info {
            self.shield_method_family(&parent, &method, &reference);
        }
    }

    /// Constructor shield: any reference to a class awards a synthetic
    /// reference to every dunder method of that class. Once per class per run.
    fn shield_constructors(&mut self, class_name: &str, origin: &Reference) {
        if !self.constructor_shielded.insert(class_name.to_string()) {
            return;
        }
        let dunder_ids: Vec<SymbolId> = self
            .definitions
            .iter()
            .filter(|(_, e)| e.parent_class.as_deref() == Some(class_name) && e.is_dunder())
            .map(|(id, _)| id.clone())
            .collect();

        for id in dunder_ids {
            self.references.entry(id).or_default().push(Reference {
                source_file: origin.source_file.clone(),
                source_symbol: origin.source_symbol.clone(),
                kind: ReferenceKind::ConstructorShield,
                line: origin.line,
            });
        }
    }

    /// Inheritance shield: a reference to `class.method` awards a synthetic
    /// reference to every override on descendant classes.
    fn shield_method_family(&mut self, class_name: &str, method_name: &str, origin: &Reference) {
        let key = (class_name.to_string(), method_name.to_string());
        if !self.family_shielded.insert(key) {
            return;
        }
        for id in self.inheritance.descendant_overrides(class_name, method_name) {
            self.references.entry(id).or_default().push(Reference {
                source_file: origin.source_file.clone(),
                source_symbol: origin.source_symbol.clone(),
                kind: ReferenceKind::InheritanceShield,
                line: origin.line,
            });
        }
    }

    /// Protect test-framework lifecycle methods on classes inheriting a
    /// known framework base. Call after all definitions are loaded.
    pub fn apply_framework_lifecycle_protection(&mut self) {
        let mut to_shield = Vec::new();
        for entity in self.definitions.values() {
            if !entity.kind.is_class() || entity.base_classes.is_empty() {
                continue;
            }
            for base in &entity.base_classes {
                for (framework_base, methods) in FRAMEWORK_BASES {
                    let matched = base == framework_base
                        || base.ends_with(&format!(".{}", framework_base));
                    if !matched {
                        continue;
                    }
                    for (id, method) in self.definitions.iter() {
                        if method.parent_class.as_deref() == Some(entity.name.as_str())
                            && methods.contains(&method.name.as_str())
                        {
                            to_shield.push((id.clone(), method.file_path.clone(), method.span.start_line));
                        }
                    }
                }
            }
        }
        for (id, file, line) in to_shield {
            self.references.entry(id).or_default().push(Reference {
                source_file: file,
                source_symbol: None,
                kind: ReferenceKind::Heuristic,
                line,
            });
        }
    }

    pub fn references_of(&self, id: &SymbolId) -> &[Reference] {
        self.references.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    // ------------------------------------------------- shields' side tables

    pub fn add_package_export(&mut self, module_file: &Path, name: &str) {
        self.package_exports
            .insert(format!("{}::{}", module_file.display(), name));
    }

    pub fn is_package_export(&self, entity: &Entity) -> bool {
        let id = format!("{}::{}", entity.file_path.display(), entity.qualified_name);
        if self.package_exports.contains(&id) {
            return true;
        }
        let by_name = format!("{}::{}", entity.file_path.display(), entity.name);
        self.package_exports.contains(&by_name)
    }

    pub fn mark_metaprogramming_file(&mut self, file: &Path) {
        self.meta_dangerous_files.insert(file.to_path_buf());
    }

    pub fn file_imports_pytest(&self, file: &Path) -> bool {
        self.pytest_importers.contains(file)
    }

    pub fn is_metaprogramming_dangerous(&self, file: &Path) -> bool {
        self.meta_dangerous_files.contains(file)
    }
}

impl Default for ReferenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
