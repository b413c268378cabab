//! The orchestrator drives the three analysis phases, the shield pipeline
//! and the mutate-verify-commit cycle.
//!
//! Audit: whole-project cache fast path, else phase 1 (file graph →
//! orphans), phase 2 (per-file parse + extract, cache-backed), phase 3
//! (reference resolution, replayed from cached candidates when possible),
//! then the shield pipeline. Clean: audit, baseline, mutate, verify, then
//! commit or restore. Per-file work fans out across rayon workers; the
//! reference graph merges under a single writer.

use std::collections::BTreeSet;
use std::path::PathBuf;

use dashmap::DashMap;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::config::RunOptions;
use crate::features::cache::{self, AnalysisCache, FileArtifact, FileStamp, ProjectResult};
use crate::features::config_scan::ConfigReferenceScanner;
use crate::features::dep_graph::{discover_files, DependencyGraphBuilder, ModuleResolver};
use crate::features::mutation::{MutationOutcome, SafeMutator};
use crate::features::orphans::OrphanDetector;
use crate::features::parsing::{EntityExtractor, ParserAdapter};
use crate::features::pipeline::ShieldPipeline;
use crate::features::references::{ReferenceIngestor, ReferenceTracker};
use crate::features::sandbox::TestSandbox;
use crate::features::wisdom::WisdomRegistry;
use crate::shared::models::{Entity, ErrorKind, JanitorError, Result};
use crate::shared::utils::paths;

/// Final verdict of a run, mapped onto the process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing flagged (audit) or deletions committed cleanly (clean).
    Success,
    /// Audit flagged one or more symbols or orphans.
    Flagged,
    /// Clean rolled the mutation back after new test failures.
    RolledBack,
    /// A file changed between analysis and mutation.
    ConcurrentModification,
    /// The test runner could not even collect tests.
    CollectionError,
    /// Unwritable trash directory or other pre-flight failure.
    PreflightFailure,
}

impl Verdict {
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Success => 0,
            Verdict::Flagged | Verdict::RolledBack => 1,
            Verdict::ConcurrentModification | Verdict::CollectionError => 2,
            Verdict::PreflightFailure => 3,
        }
    }
}

/// Structured audit output: orphans, dead symbols and spared symbols with
/// their protection tags.
#[derive(Debug)]
pub struct AuditReport {
    pub dead_symbols: Vec<Entity>,
    pub protected: Vec<Entity>,
    pub orphans: Vec<PathBuf>,
    pub files_analyzed: usize,
    pub from_cache: bool,
}

impl AuditReport {
    pub fn verdict(&self) -> Verdict {
        if self.dead_symbols.is_empty() && self.orphans.is_empty() {
            Verdict::Success
        } else {
            Verdict::Flagged
        }
    }
}

#[derive(Debug)]
pub struct CleanReport {
    pub audit: AuditReport,
    pub verdict: Verdict,
    pub mutation: Option<MutationOutcome>,
    pub orphans_deleted: usize,
    pub new_failures: BTreeSet<String>,
    pub session_id: Option<String>,
}

pub struct Orchestrator {
    options: RunOptions,
    cache: AnalysisCache,
}

impl Orchestrator {
    pub fn new(mut options: RunOptions) -> Result<Self> {
        options.project_root = paths::canonicalize(&options.project_root);
        let cache = AnalysisCache::open(&options.project_root)
            .map_err(|e| JanitorError::cache(format!("cannot open analysis cache: {}", e)))?;
        Ok(Self { options, cache })
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Full analysis; the whole-project cache short-circuits everything.
    pub fn audit(&self) -> Result<AuditReport> {
        let (report, _) = self.run_analysis()?;
        Ok(report)
    }

    fn run_analysis(&self) -> Result<(AuditReport, FxHashMap<PathBuf, String>)> {
        let files = discover_files(
            &self.options.project_root,
            self.options.language,
            self.options.include_vendored,
        );

        // Stamp every file (mtime+size fast path; re-hash on mismatch).
        let stamps: Vec<(PathBuf, FileStamp)> = files
            .iter()
            .filter_map(|file| {
                self.cache
                    .stamp_file(file)
                    .map(|stamp| (file.clone(), stamp))
                    .ok()
            })
            .collect();

        let hashes: FxHashMap<PathBuf, String> = stamps
            .iter()
            .map(|(file, stamp)| (file.clone(), stamp.content_hash.clone()))
            .collect();

        let pairs: Vec<(PathBuf, String)> = stamps
            .iter()
            .map(|(file, stamp)| (file.clone(), stamp.content_hash.clone()))
            .collect();
        let project_hash = cache::project_hash(&pairs);

        // Fast path: identical project already analysed.
        if let Some(result) = self.cache.get_project_result(&project_hash) {
            tracing::info!("whole-project cache hit");
            let report = AuditReport {
                dead_symbols: result.dead_symbols,
                protected: Vec::new(),
                orphans: result.orphan_files,
                files_analyzed: stamps.len(),
                from_cache: true,
            };
            return Ok((report, hashes));
        }

        // Phase 2 per-file work, fanned across workers. Each file either
        // replays its cached artifact or parses, extracts and ingests.
        let resolver = ModuleResolver::new(&self.options.project_root);
        let adapter = ParserAdapter::new();
        let artifact_map: DashMap<PathBuf, FileArtifact> = DashMap::new();
        stamps.par_iter().for_each(|(file, stamp)| {
            if let Some(artifact) = self.cache.get_artifact(file, stamp) {
                artifact_map.insert(file.clone(), artifact);
                return;
            }
            let artifact = self.compute_artifact(&adapter, &resolver, file);
            if let Err(err) = self.cache.put_artifact(file, stamp, &artifact) {
                tracing::debug!(file = %file.display(), %err, "cache write failed");
            }
            artifact_map.insert(file.clone(), artifact);
        });
        let mut artifacts: Vec<(PathBuf, FileArtifact)> = artifact_map.into_iter().collect();
        artifacts.sort_by(|a, b| a.0.cmp(&b.0));

        // Phase 1: file graph and orphans.
        let builder = DependencyGraphBuilder::new(&self.options.project_root);
        let mut edges = FxHashMap::default();
        for (file, artifact) in &artifacts {
            edges.insert(file.clone(), artifact.dependencies.clone());
        }
        let graph = builder.build_graph(&files, &edges);
        let orphans = OrphanDetector::new(&self.options.project_root).detect(&graph);

        // Phase 3: single-writer merge into the reference graph.
        // Definitions first, so every candidate resolves against the full
        // table; then candidates, exports and quarantine flags.
        let mut tracker = ReferenceTracker::new();
        for (_, artifact) in &artifacts {
            for entity in &artifact.entities {
                tracker.add_definition(entity.clone());
            }
        }
        tracker.apply_framework_lifecycle_protection();
        for (file, artifact) in &artifacts {
            tracker.add_candidates(file, &artifact.candidates);
            for (module_file, name) in &artifact.package_exports {
                tracker.add_package_export(module_file, name);
            }
            if artifact.metaprogramming_danger {
                tracker.mark_metaprogramming_file(file);
            }
        }

        // Config-file candidates stay in their own table: the pipeline
        // consults them at the config-reference stage so a serverless
        // handler reports as ConfigReference, not as a plain reference.
        let config_refs = ConfigReferenceScanner::new(&self.options.project_root).scan();

        // Shield pipeline.
        let wisdom = match &self.options.rules_dir {
            Some(dir) => WisdomRegistry::with_rules_dir(dir),
            None => WisdomRegistry::with_defaults(),
        };
        let outcome = ShieldPipeline::new(&tracker, &wisdom, &config_refs, &self.options).classify();

        let report = AuditReport {
            dead_symbols: outcome.dead,
            protected: outcome.protected,
            orphans,
            files_analyzed: artifacts.len(),
            from_cache: false,
        };

        let result = ProjectResult {
            dead_symbols: report.dead_symbols.clone(),
            orphan_files: report.orphans.clone(),
        };
        if let Err(err) = self.cache.put_project_result(&project_hash, &result) {
            tracing::debug!(%err, "whole-project cache write failed");
        }

        Ok((report, hashes))
    }

    fn compute_artifact(
        &self,
        adapter: &ParserAdapter,
        resolver: &ModuleResolver,
        file: &PathBuf,
    ) -> FileArtifact {
        let Some(parsed) = adapter.parse_file(file) else {
            // unparseable files contribute nothing but stay cached so they
            // are not re-read every run
            return FileArtifact::default();
        };

        let extraction = EntityExtractor::extract(&parsed);
        let ingest = ReferenceIngestor::new(resolver).ingest(&parsed);
        let builder = DependencyGraphBuilder::new(&self.options.project_root);
        let dependencies = builder.resolve_dependencies(&extraction.imports, parsed.language);

        FileArtifact {
            entities: extraction.entities,
            candidates: ingest.candidates,
            dependencies,
            package_exports: ingest.package_exports,
            metaprogramming_danger: ingest.metaprogramming_danger,
        }
    }

    /// Audit, then excise dead symbols and orphan files under test-suite
    /// verification.
    pub fn clean(&self) -> Result<CleanReport> {
        let (audit, hashes) = self.run_analysis()?;

        if self.options.dry_run || (audit.dead_symbols.is_empty() && audit.orphans.is_empty()) {
            let verdict = audit.verdict();
            return Ok(CleanReport {
                audit,
                verdict,
                mutation: None,
                orphans_deleted: 0,
                new_failures: BTreeSet::new(),
                session_id: None,
            });
        }

        let mut mutator = match SafeMutator::begin_session(&self.options.project_root) {
            Ok(mutator) => mutator,
            Err(err) => {
                tracing::warn!(%err, "mutation session refused");
                return Ok(CleanReport {
                    audit,
                    verdict: Verdict::PreflightFailure,
                    mutation: None,
                    orphans_deleted: 0,
                    new_failures: BTreeSet::new(),
                    session_id: None,
                });
            }
        };
        let session_id = mutator.session_id().to_string();

        let mut sandbox = TestSandbox::new(&self.options.project_root);
        if let Some(command) = &self.options.test_command {
            sandbox = sandbox.with_command(command.clone());
        }
        let baseline = sandbox.baseline();

        // group the kill list per file; a file that is itself an orphan is
        // deleted wholesale, not spliced
        let orphan_set: std::collections::HashSet<&PathBuf> = audit.orphans.iter().collect();
        let mut plan: FxHashMap<PathBuf, Vec<Entity>> = FxHashMap::default();
        for entity in &audit.dead_symbols {
            if orphan_set.contains(&entity.file_path) {
                continue;
            }
            plan.entry(entity.file_path.clone())
                .or_default()
                .push(entity.clone());
        }

        let mutation = match mutator.delete_symbols(&plan, &hashes) {
            Ok(outcome) => outcome,
            Err(err) if err.kind == ErrorKind::ConcurrentModification => {
                return Ok(CleanReport {
                    audit,
                    verdict: Verdict::ConcurrentModification,
                    mutation: None,
                    orphans_deleted: 0,
                    new_failures: BTreeSet::new(),
                    session_id: Some(session_id),
                });
            }
            Err(err) => return Err(err),
        };

        let orphans_deleted = match mutator.delete_files(&audit.orphans, &hashes) {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(%err, "orphan deletion failed, restoring");
                mutator.restore_all();
                return Ok(CleanReport {
                    audit,
                    verdict: if err.kind == ErrorKind::ConcurrentModification {
                        Verdict::ConcurrentModification
                    } else {
                        Verdict::RolledBack
                    },
                    mutation: Some(mutation),
                    orphans_deleted: 0,
                    new_failures: BTreeSet::new(),
                    session_id: Some(session_id),
                });
            }
        };

        let verify = sandbox.verify();
        let outcome = TestSandbox::compare(&baseline, &verify);

        if outcome.accepted {
            mutator.commit()?;
            tracing::info!(
                symbols = mutation.symbols_removed,
                orphans = orphans_deleted,
                "mutation committed"
            );
            return Ok(CleanReport {
                audit,
                verdict: Verdict::Success,
                mutation: Some(mutation),
                orphans_deleted,
                new_failures: BTreeSet::new(),
                session_id: Some(session_id),
            });
        }

        let report = mutator.restore_all();
        if !report.errors.is_empty() {
            tracing::warn!(errors = report.errors.len(), "partial restore");
        }
        let verdict = if outcome.collection_error {
            Verdict::CollectionError
        } else {
            Verdict::RolledBack
        };
        tracing::info!(?verdict, new_failures = outcome.new_failures.len(), "mutation rolled back");

        Ok(CleanReport {
            audit,
            verdict,
            mutation: Some(mutation),
            orphans_deleted,
            new_failures: outcome.new_failures,
            session_id: Some(session_id),
        })
    }
}
