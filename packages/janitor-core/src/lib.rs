//! janitor-core: dead-code detection and surgical removal for polyglot repos
//!
//! The engine walks a project root, builds a file-level dependency graph and a
//! symbol-level reference graph, filters false positives through a stack of
//! immortality shields, and (on demand) excises the surviving dead symbols
//! in place while verifying the project's test suite against a baseline
//! failure fingerprint.
//!
//! Pipeline: parsing → extraction → dependency graph → orphans, and
//! parsing → extraction → reference tracking → shield pipeline → kill list.
//! The analysis cache short-circuits any per-file stage on content-hash hit.

pub mod config;
pub mod features;
pub mod pipeline;
pub mod shared;

pub use config::{LanguageSelector, RunOptions};
pub use features::cache::AnalysisCache;
pub use features::config_scan::ConfigReferenceScanner;
pub use features::dep_graph::{DependencyGraphBuilder, FileGraph, ModuleResolver};
pub use features::mutation::{MutationOutcome, SafeMutator};
pub use features::orphans::OrphanDetector;
pub use features::parsing::{EntityExtractor, ParserAdapter};
pub use features::pipeline::ShieldPipeline;
pub use features::references::ReferenceTracker;
pub use features::sandbox::{TestOutcome, TestSandbox};
pub use features::wisdom::WisdomRegistry;
pub use pipeline::{AuditReport, CleanReport, Orchestrator, Verdict};
pub use shared::models::{
    ByteRange, Entity, EntityKind, Import, JanitorError, Language, ProtectionTag, Reference,
    ReferenceKind, Result, Span, SymbolId,
};
