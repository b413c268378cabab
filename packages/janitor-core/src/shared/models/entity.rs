//! Entities, imports and references.
//!
//! An `Entity` is one named top-level or class-scoped declaration. Its
//! `SymbolId` (`"{canonical_file_path}::{qualified_name}"`) is the sole
//! identity used across the reference graph, the shield pipeline and the
//! mutation engine.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::span::{ByteRange, Span};

/// Source language, detected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext {
            "py" | "pyi" => Some(Language::Python),
            "js" | "jsx" => Some(Language::JavaScript),
            "ts" | "tsx" => Some(Language::TypeScript),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Language> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
    }

    pub fn is_js_family(&self) -> bool {
        matches!(self, Language::JavaScript | Language::TypeScript)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    /// Source extensions belonging to this language's family.
    pub fn source_extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::JavaScript | Language::TypeScript => &["js", "jsx", "ts", "tsx"],
        }
    }
}

/// Kind of a declared entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Function,
    AsyncFunction,
    Class,
    Method,
    ModuleVariable,
    /// JS/TS `export` declaration; default exports are implicitly protected
    /// in all non-library modes.
    Export {
        default: bool,
    },
}

impl EntityKind {
    pub fn is_class(&self) -> bool {
        matches!(self, EntityKind::Class)
    }

    pub fn is_function_like(&self) -> bool {
        matches!(
            self,
            EntityKind::Function | EntityKind::AsyncFunction | EntityKind::Method
        )
    }
}

/// Why a symbol was spared by the shield pipeline.
///
/// Assigned exactly once, by the first shield that matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtectionTag {
    Directory,
    Referenced,
    WisdomRule,
    LibraryMode,
    PackageExport,
    ConfigReference,
    MetaprogrammingDanger,
    EntryPoint,
    SqlAlchemyMeta,
    OrmLifecycle,
    PydanticAlias,
    DependencyOverride,
    PytestFixture,
    GrepShield,
}

impl fmt::Display for ProtectionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtectionTag::Directory => "Directory",
            ProtectionTag::Referenced => "Referenced",
            ProtectionTag::WisdomRule => "WisdomRule",
            ProtectionTag::LibraryMode => "LibraryMode",
            ProtectionTag::PackageExport => "PackageExport",
            ProtectionTag::ConfigReference => "ConfigReference",
            ProtectionTag::MetaprogrammingDanger => "MetaprogrammingDanger",
            ProtectionTag::EntryPoint => "EntryPoint",
            ProtectionTag::SqlAlchemyMeta => "SqlAlchemyMeta",
            ProtectionTag::OrmLifecycle => "OrmLifecycle",
            ProtectionTag::PydanticAlias => "PydanticAlias",
            ProtectionTag::DependencyOverride => "DependencyOverride",
            ProtectionTag::PytestFixture => "PytestFixture",
            ProtectionTag::GrepShield => "GrepShield",
        };
        f.write_str(name)
    }
}

/// Canonical identity of an entity: `"{file_path}::{qualified_name}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub String);

impl SymbolId {
    pub fn new(file_path: &Path, qualified_name: &str) -> Self {
        SymbolId(format!("{}::{}", file_path.display(), qualified_name))
    }

    /// Placeholder identity for references that never bound to a definition.
    pub fn unknown(name: &str) -> Self {
        SymbolId(format!("unknown::{}", name))
    }

    pub fn is_unknown(&self) -> bool {
        self.0.starts_with("unknown::")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single named declaration extracted from source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub file_path: PathBuf,
    pub byte_range: ByteRange,
    /// Byte range of the whole decorated definition when decorators are
    /// present; `byte_range` itself always starts at the declaration keyword.
    pub decorated_byte_range: Option<ByteRange>,
    pub span: Span,
    /// `Class.method` for methods, the plain name otherwise.
    pub qualified_name: String,
    pub parent_class: Option<String>,
    pub base_classes: Vec<String>,
    /// Decorator source fragments, `@` prefix and argument lists included.
    pub decorators: Vec<String>,
    /// Full source text of the declaration (decorators included); feeds the
    /// wisdom registry's substring matching.
    pub text: String,
    pub structural_hash: Option<u64>,
    pub protected_by: Option<ProtectionTag>,
}

impl Entity {
    pub fn symbol_id(&self) -> SymbolId {
        SymbolId::new(&self.file_path, &self.qualified_name)
    }

    /// The byte range a deletion must splice out: the decorated definition
    /// when decorators are present, the declaration alone otherwise.
    pub fn removal_range(&self) -> ByteRange {
        self.decorated_byte_range.unwrap_or(self.byte_range)
    }

    pub fn language(&self) -> Option<Language> {
        Language::from_path(&self.file_path)
    }

    /// Assign the protection tag. Set-once: the first shield wins and later
    /// calls are ignored.
    pub fn protect(&mut self, tag: ProtectionTag) {
        if self.protected_by.is_none() {
            self.protected_by = Some(tag);
        }
    }

    /// `__name__` with more than just the underscores.
    pub fn is_dunder(&self) -> bool {
        is_dunder_name(&self.name)
    }

    pub fn simple_name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }
}

pub(crate) fn is_dunder_name(name: &str) -> bool {
    name.starts_with("__") && name.ends_with("__") && name.len() > 4
}

/// One import-like statement, one record per imported name.
///
/// Multi-name imports emit one `Import` per name sharing the same `module`;
/// a bare `import x` has an empty `names` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub module: String,
    pub names: Vec<String>,
    pub is_relative: bool,
    /// Number of leading dots for Python relative imports (0 if absolute).
    pub relative_level: u32,
    pub line: u32,
    pub file_path: PathBuf,
}

/// How a reference binds to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    Call,
    Attribute,
    Import,
    TypeHint,
    StringRef,
    Usage,
    Decorator,
    Instantiation,
    Heuristic,
    ConstructorShield,
    InheritanceShield,
}

impl ReferenceKind {
    /// Synthetic references awarded by a shield, not observed in source.
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            ReferenceKind::ConstructorShield
                | ReferenceKind::InheritanceShield
                | ReferenceKind::Heuristic
        )
    }
}

/// A resolved reference in the reference graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// File where the reference textually occurs (a config file path for
    /// synthetic string references).
    pub source_file: PathBuf,
    /// Qualified name of the enclosing definition, when known.
    pub source_symbol: Option<String>,
    pub kind: ReferenceKind,
    pub line: u32,
}

/// Pre-resolution reference candidate produced by the ingestion walk.
///
/// Candidates are cached per file and replayed against a fresh definitions
/// table without re-parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRef {
    pub name: String,
    pub kind: ReferenceKind,
    pub line: u32,
    /// Enclosing class for `self.x` / `cls.x` dispatch, or the inferred
    /// class of the receiver for `v.m()` calls.
    pub class_context: Option<String>,
    /// Definition file resolved from an import, when the referrer imported
    /// the name.
    pub target_file: Option<PathBuf>,
    /// Qualified name of the enclosing definition, when any.
    pub source_symbol: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, qualified: &str) -> Entity {
        Entity {
            name: name.to_string(),
            kind: EntityKind::Function,
            file_path: PathBuf::from("/proj/a.py"),
            byte_range: ByteRange::new(0, 10),
            decorated_byte_range: None,
            span: Span::new(1, 0, 1, 10),
            qualified_name: qualified.to_string(),
            parent_class: None,
            base_classes: Vec::new(),
            decorators: Vec::new(),
            text: String::new(),
            structural_hash: None,
            protected_by: None,
        }
    }

    #[test]
    fn test_symbol_id_format() {
        let e = entity("run", "C.run");
        assert_eq!(e.symbol_id().as_str(), "/proj/a.py::C.run");
    }

    #[test]
    fn test_protect_is_set_once() {
        let mut e = entity("f", "f");
        e.protect(ProtectionTag::Referenced);
        e.protect(ProtectionTag::WisdomRule);
        assert_eq!(e.protected_by, Some(ProtectionTag::Referenced));
    }

    #[test]
    fn test_dunder_detection() {
        assert!(is_dunder_name("__init__"));
        assert!(is_dunder_name("__call__"));
        assert!(!is_dunder_name("____"));
        assert!(!is_dunder_name("__x"));
        assert!(!is_dunder_name("init"));
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("jsx"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("rs"), None);
    }

    #[test]
    fn test_unknown_symbol_id() {
        let id = SymbolId::unknown("ghost");
        assert!(id.is_unknown());
        assert_eq!(id.as_str(), "unknown::ghost");
    }
}
