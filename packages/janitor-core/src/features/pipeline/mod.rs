//! Dead-symbol shield pipeline.
//!
//! A symbol is classified by the first shield it satisfies; a symbol no
//! shield claims is dead. Order: immortal directory → references (cross-
//! then intra-file) → wisdom rules → library mode → package exports →
//! config references → metaprogramming quarantine → entry points →
//! enterprise framework heuristics → opt-in grep shield.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::config::RunOptions;
use crate::features::config_scan::ConfigReferences;
use crate::features::references::ReferenceTracker;
use crate::features::wisdom::WisdomRegistry;
use crate::shared::models::{Entity, EntityKind, ProtectionTag};
use crate::shared::utils::paths;

const QT_BASES: &[&str] = &["QMainWindow", "QWidget", "QDialog", "QFrame", "QWindow"];
const ORM_LIFECYCLE_METHODS: &[&str] = &["save", "delete", "update", "create", "get", "filter"];
const ORM_BASES: &[&str] = &["Model", "Base", "Document"];

fn qt_slot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^on_[A-Za-z0-9]+_[A-Za-z0-9]+$").expect("static regex"))
}

/// Classification result: the kill list plus every spared symbol with its
/// protection tag.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub dead: Vec<Entity>,
    pub protected: Vec<Entity>,
}

pub struct ShieldPipeline<'a> {
    tracker: &'a ReferenceTracker,
    wisdom: &'a WisdomRegistry,
    config_refs: &'a ConfigReferences,
    options: &'a RunOptions,
}

impl<'a> ShieldPipeline<'a> {
    pub fn new(
        tracker: &'a ReferenceTracker,
        wisdom: &'a WisdomRegistry,
        config_refs: &'a ConfigReferences,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            tracker,
            wisdom,
            config_refs,
            options,
        }
    }

    pub fn classify(&self) -> PipelineOutcome {
        let grep_corpus = if self.options.grep_shield {
            Some(self.build_grep_corpus())
        } else {
            None
        };

        let mut outcome = PipelineOutcome::default();
        for (symbol_id, entity) in self.tracker.definitions() {
            let mut entity = entity.clone();

            if let Some(tag) = self.first_matching_shield(&entity, grep_corpus.as_deref()) {
                entity.protect(tag);
                outcome.protected.push(entity);
                continue;
            }

            tracing::debug!(symbol = %symbol_id, "dead symbol");
            outcome.dead.push(entity);
        }

        outcome.dead.sort_by(|a, b| {
            (&a.file_path, a.byte_range.start).cmp(&(&b.file_path, b.byte_range.start))
        });
        outcome
    }

    fn first_matching_shield(&self, entity: &Entity, grep_corpus: Option<&[String]>) -> Option<ProtectionTag> {
        // Stage 0: immortal directory
        let relative = paths::relative_to(&entity.file_path, &self.options.project_root);
        if paths::is_in_immortal_dir(relative) {
            return Some(ProtectionTag::Directory);
        }

        // Stage 1a/1b: cross-file, then intra-file references (synthetic
        // shields included)
        let references = self.tracker.references_of(&entity.symbol_id());
        if references.iter().any(|r| r.source_file != entity.file_path) {
            return Some(ProtectionTag::Referenced);
        }
        if references.iter().any(|r| r.source_file == entity.file_path) {
            return Some(ProtectionTag::Referenced);
        }

        // Stage 2: wisdom rules
        let language = entity.language().map(|l| l.as_str()).unwrap_or("python");
        if self
            .wisdom
            .is_immortal(&entity.qualified_name, &entity.text, language)
            .is_some()
        {
            return Some(ProtectionTag::WisdomRule);
        }

        // Stage 2.5: library mode treats public names as externally used
        if self.options.library_mode && !entity.simple_name().starts_with('_') {
            return Some(ProtectionTag::LibraryMode);
        }

        // Stage 2.6: package exports
        if self.tracker.is_package_export(entity) {
            return Some(ProtectionTag::PackageExport);
        }

        // Stage 2.7: config references
        if self.config_refs.contains(&entity.name)
            || self.config_refs.contains(&entity.qualified_name)
        {
            return Some(ProtectionTag::ConfigReference);
        }

        // Stage 2.8: metaprogramming quarantine covers the whole file
        if self.tracker.is_metaprogramming_dangerous(&entity.file_path) {
            return Some(ProtectionTag::MetaprogrammingDanger);
        }

        // Stage 3 (dunders of used classes) is the constructor shield,
        // already applied as synthetic references at stage 1.

        // Stage 4: entry points
        if entity.name == "main"
            || entity.text.contains("@app.command")
            || entity.text.contains("@app.callback")
        {
            return Some(ProtectionTag::EntryPoint);
        }

        // Stage 4.x: enterprise heuristics
        if let Some(tag) = self.enterprise_shield(entity) {
            return Some(tag);
        }

        // Stage 5: opt-in grep shield over non-source files
        if let Some(corpus) = grep_corpus {
            if corpus.iter().any(|content| content.contains(&entity.name)) {
                return Some(ProtectionTag::GrepShield);
            }
        }

        None
    }

    fn enterprise_shield(&self, entity: &Entity) -> Option<ProtectionTag> {
        // Qt auto-connected slot: on_<object>_<signal> in a Qt widget class.
        // Reported as a wisdom rule: the pattern is framework knowledge.
        if let Some(parent) = &entity.parent_class {
            if qt_slot_pattern().is_match(&entity.name) && self.class_has_base(parent, QT_BASES) {
                return Some(ProtectionTag::WisdomRule);
            }
        }

        // SQLAlchemy metaprogramming
        if entity.text.contains("@declared_attr") || entity.text.contains("@hybrid_property") {
            return Some(ProtectionTag::SqlAlchemyMeta);
        }
        if matches!(
            entity.name.as_str(),
            "__tablename__" | "__mapper_args__" | "__abstract__" | "__table_args__"
        ) {
            return Some(ProtectionTag::SqlAlchemyMeta);
        }

        // ORM lifecycle methods on classes descending from an ORM base
        if let Some(parent) = &entity.parent_class {
            if ORM_LIFECYCLE_METHODS.contains(&entity.name.as_str())
                && self.class_has_orm_base(parent)
            {
                return Some(ProtectionTag::OrmLifecycle);
            }
        }

        // Pydantic alias-generated fields look unused under camelCase JSON
        if entity.kind == EntityKind::ModuleVariable {
            if let Some(parent) = &entity.parent_class {
                if self.class_text(parent, &entity.file_path).map_or(false, |text| {
                    text.contains("model_config") && text.contains("alias_generator")
                }) {
                    return Some(ProtectionTag::PydanticAlias);
                }
            }
        }

        // pytest fixtures are invoked by the runner, not by test code
        if entity.kind.is_function_like() {
            let decorated = entity
                .decorators
                .iter()
                .any(|d| d.contains("pytest.fixture") || d.starts_with("@fixture"));
            let in_conftest = entity
                .file_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n == "conftest.py")
                .unwrap_or(false)
                && self.tracker.file_imports_pytest(&entity.file_path);
            if decorated || in_conftest {
                return Some(ProtectionTag::PytestFixture);
            }
        }

        None
    }

    fn class_has_base(&self, class_name: &str, bases: &[&str]) -> bool {
        let inheritance = self.tracker.inheritance();
        inheritance
            .parents_of(class_name)
            .iter()
            .any(|p| bases.contains(&p.as_str()))
            || bases
                .iter()
                .any(|base| inheritance.is_descendant_of(class_name, base))
    }

    fn class_has_orm_base(&self, class_name: &str) -> bool {
        if self.class_has_base(class_name, ORM_BASES) {
            return true;
        }
        self.tracker
            .inheritance()
            .parents_of(class_name)
            .iter()
            .any(|base| base.ends_with(".Model") || base.ends_with(".Base"))
    }

    /// Source text of a class definition in the given file.
    fn class_text(&self, class_name: &str, file: &Path) -> Option<String> {
        self.tracker
            .definitions()
            .find(|(_, e)| {
                e.kind.is_class() && e.name == class_name && e.file_path == file
            })
            .map(|(_, e)| e.text.clone())
    }

    /// Contents of every non-source, non-excluded regular file in the tree.
    /// Binary-looking files (NUL in the first 8 KiB) are skipped.
    fn build_grep_corpus(&self) -> Vec<String> {
        let source_exts = self.options.language.extensions();
        let mut corpus = Vec::new();

        for entry in WalkDir::new(&self.options.project_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                !e.file_type().is_dir() || !paths::is_excluded(Path::new(e.file_name()))
            })
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let is_source = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| source_exts.contains(&ext))
                .unwrap_or(false);
            if is_source {
                continue;
            }
            let Ok(bytes) = std::fs::read(entry.path()) else {
                continue;
            };
            if bytes.iter().take(8192).any(|&b| b == 0) {
                continue;
            }
            corpus.push(String::from_utf8_lossy(&bytes).into_owned());
        }
        corpus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageSelector;
    use crate::shared::models::{ByteRange, CandidateRef, ReferenceKind, Span};
    use std::path::PathBuf;

    fn entity(file: &str, name: &str, kind: EntityKind, parent: Option<&str>, text: &str) -> Entity {
        let qualified = match parent {
            Some(p) => format!("{}.{}", p, name),
            None => name.to_string(),
        };
        Entity {
            name: name.to_string(),
            kind,
            file_path: PathBuf::from(file),
            byte_range: ByteRange::new(0, text.len().max(1)),
            decorated_byte_range: None,
            span: Span::zero(),
            qualified_name: qualified,
            parent_class: parent.map(str::to_string),
            base_classes: Vec::new(),
            decorators: Vec::new(),
            text: text.to_string(),
            structural_hash: None,
            protected_by: None,
        }
    }

    fn options() -> RunOptions {
        RunOptions::new("/proj", LanguageSelector::Python)
    }

    fn classify(tracker: &ReferenceTracker, options: &RunOptions) -> PipelineOutcome {
        let wisdom = WisdomRegistry::with_defaults();
        let config_refs = ConfigReferences::default();
        ShieldPipeline::new(tracker, &wisdom, &config_refs, options).classify()
    }

    #[test]
    fn test_unreferenced_symbol_is_dead() {
        let mut tracker = ReferenceTracker::new();
        tracker.add_definition(entity(
            "/proj/a.py",
            "unused_helper",
            EntityKind::Function,
            None,
            "def unused_helper():\n    return 1",
        ));
        let outcome = classify(&tracker, &options());
        assert_eq!(outcome.dead.len(), 1);
        assert_eq!(outcome.dead[0].name, "unused_helper");
        assert!(outcome.dead[0].protected_by.is_none());
    }

    #[test]
    fn test_referenced_symbol_is_protected() {
        let mut tracker = ReferenceTracker::new();
        tracker.add_definition(entity(
            "/proj/a.py",
            "used",
            EntityKind::Function,
            None,
            "def used(): ...",
        ));
        tracker.add_candidate(
            Path::new("/proj/b.py"),
            &CandidateRef {
                name: "used".to_string(),
                kind: ReferenceKind::Call,
                line: 3,
                class_context: None,
                target_file: None,
                source_symbol: None,
            },
        );
        let outcome = classify(&tracker, &options());
        assert!(outcome.dead.is_empty());
        assert_eq!(outcome.protected[0].protected_by, Some(ProtectionTag::Referenced));
    }

    #[test]
    fn test_immortal_directory_shield() {
        let mut tracker = ReferenceTracker::new();
        tracker.add_definition(entity(
            "/proj/tests/test_a.py",
            "helper",
            EntityKind::Function,
            None,
            "def helper(): ...",
        ));
        let outcome = classify(&tracker, &options());
        assert_eq!(outcome.protected[0].protected_by, Some(ProtectionTag::Directory));
    }

    #[test]
    fn test_wisdom_shield() {
        let mut tracker = ReferenceTracker::new();
        tracker.add_definition(entity(
            "/proj/web.py",
            "index",
            EntityKind::Function,
            None,
            "@app.route('/')\ndef index(): ...",
        ));
        let outcome = classify(&tracker, &options());
        assert_eq!(outcome.protected[0].protected_by, Some(ProtectionTag::WisdomRule));
    }

    #[test]
    fn test_library_mode_shield() {
        let mut tracker = ReferenceTracker::new();
        tracker.add_definition(entity(
            "/proj/lib.py",
            "public_api",
            EntityKind::Function,
            None,
            "def public_api(): ...",
        ));
        tracker.add_definition(entity(
            "/proj/lib.py",
            "_private",
            EntityKind::Function,
            None,
            "def _private(): ...",
        ));

        let options = options().with_library_mode(true);
        let outcome = classify(&tracker, &options);
        let public = outcome.protected.iter().find(|e| e.name == "public_api").unwrap();
        assert_eq!(public.protected_by, Some(ProtectionTag::LibraryMode));
        assert!(outcome.dead.iter().any(|e| e.name == "_private"));
    }

    #[test]
    fn test_config_reference_shield() {
        let mut tracker = ReferenceTracker::new();
        tracker.add_definition(entity(
            "/proj/handlers/image.py",
            "upload",
            EntityKind::Function,
            None,
            "def upload(event, ctx): ...",
        ));

        let mut config_refs = ConfigReferences::default();
        // simulate `handler: handlers.image.upload` in serverless.yml
        config_refs_add(&mut config_refs, "handlers.image.upload");

        let wisdom = WisdomRegistry::with_defaults();
        let opts = options();
        let outcome = ShieldPipeline::new(&tracker, &wisdom, &config_refs, &opts).classify();
        assert_eq!(
            outcome.protected[0].protected_by,
            Some(ProtectionTag::ConfigReference)
        );
    }

    fn config_refs_add(refs: &mut ConfigReferences, dotted: &str) {
        // round-trip through the public scanner surface: write a minimal
        // serverless.yml into a temp project and scan it
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("serverless.yml"),
            format!("functions:\n  fn:\n    handler: {}\n", dotted),
        )
        .unwrap();
        *refs = crate::features::config_scan::ConfigReferenceScanner::new(dir.path()).scan();
    }

    #[test]
    fn test_metaprogramming_shield() {
        let mut tracker = ReferenceTracker::new();
        tracker.add_definition(entity(
            "/proj/dispatch.py",
            "a",
            EntityKind::Function,
            None,
            "def a(): ...",
        ));
        tracker.mark_metaprogramming_file(Path::new("/proj/dispatch.py"));

        let outcome = classify(&tracker, &options());
        assert_eq!(
            outcome.protected[0].protected_by,
            Some(ProtectionTag::MetaprogrammingDanger)
        );
    }

    #[test]
    fn test_qt_slot_reported_as_wisdom_rule() {
        let mut tracker = ReferenceTracker::new();
        let mut main_win = entity(
            "/proj/ui.py",
            "Main",
            EntityKind::Class,
            None,
            "class Main(QMainWindow): ...",
        );
        main_win.base_classes = vec!["QMainWindow".to_string()];
        tracker.add_definition(main_win);
        tracker.add_definition(entity(
            "/proj/ui.py",
            "on_save_clicked",
            EntityKind::Method,
            Some("Main"),
            "def on_save_clicked(self): ...",
        ));
        // the class itself is referenced from main.py
        tracker.add_candidate(
            Path::new("/proj/main.py"),
            &CandidateRef {
                name: "Main".to_string(),
                kind: ReferenceKind::Call,
                line: 1,
                class_context: None,
                target_file: None,
                source_symbol: None,
            },
        );

        let outcome = classify(&tracker, &options());
        let slot = outcome
            .protected
            .iter()
            .find(|e| e.name == "on_save_clicked")
            .unwrap();
        assert_eq!(slot.protected_by, Some(ProtectionTag::WisdomRule));
    }

    #[test]
    fn test_orm_lifecycle_shield() {
        let mut tracker = ReferenceTracker::new();
        let mut model = entity(
            "/proj/models.py",
            "User",
            EntityKind::Class,
            None,
            "class User(Model): ...",
        );
        model.base_classes = vec!["Model".to_string()];
        tracker.add_definition(model);
        tracker.add_definition(entity(
            "/proj/models.py",
            "save",
            EntityKind::Method,
            Some("User"),
            "def save(self): ...",
        ));

        let outcome = classify(&tracker, &options());
        let save = outcome.protected.iter().find(|e| e.name == "save").unwrap();
        assert_eq!(save.protected_by, Some(ProtectionTag::OrmLifecycle));
    }

    #[test]
    fn test_pytest_fixture_shield() {
        let mut tracker = ReferenceTracker::new();
        let mut fixture = entity(
            "/proj/test_support.py",
            "db_connection",
            EntityKind::Function,
            None,
            "@pytest.fixture\ndef db_connection(): ...",
        );
        fixture.decorators = vec!["@pytest.fixture".to_string()];
        tracker.add_definition(fixture);

        let outcome = classify(&tracker, &options());
        assert_eq!(
            outcome.protected[0].protected_by,
            Some(ProtectionTag::PytestFixture)
        );
    }

    #[test]
    fn test_entry_point_shield() {
        let mut tracker = ReferenceTracker::new();
        tracker.add_definition(entity(
            "/proj/cli_cmds.py",
            "sync",
            EntityKind::Function,
            None,
            "@app.command()\ndef sync(): ...",
        ));
        let outcome = classify(&tracker, &options());
        assert_eq!(outcome.protected[0].protected_by, Some(ProtectionTag::EntryPoint));
    }

    #[test]
    fn test_first_shield_wins() {
        // a referenced symbol in an immortal dir gets the Directory tag,
        // because stage 0 runs before stage 1
        let mut tracker = ReferenceTracker::new();
        tracker.add_definition(entity(
            "/proj/tests/util.py",
            "helper",
            EntityKind::Function,
            None,
            "def helper(): ...",
        ));
        tracker.add_candidate(
            Path::new("/proj/tests/test_a.py"),
            &CandidateRef {
                name: "helper".to_string(),
                kind: ReferenceKind::Call,
                line: 1,
                class_context: None,
                target_file: None,
                source_symbol: None,
            },
        );
        let outcome = classify(&tracker, &options());
        assert_eq!(outcome.protected[0].protected_by, Some(ProtectionTag::Directory));
    }
}
