//! Run configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shared::models::Language;

/// Which language family a run analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguageSelector {
    Python,
    JavaScriptTypeScript,
}

impl LanguageSelector {
    pub fn matches(&self, language: Language) -> bool {
        match self {
            LanguageSelector::Python => language == Language::Python,
            LanguageSelector::JavaScriptTypeScript => language.is_js_family(),
        }
    }

    /// File extensions scanned for this selector.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            LanguageSelector::Python => &["py", "pyi"],
            LanguageSelector::JavaScriptTypeScript => &["js", "jsx", "ts", "tsx"],
        }
    }

    /// Wisdom-registry language key for an entity of this family.
    pub fn wisdom_language(&self) -> &'static str {
        match self {
            LanguageSelector::Python => "python",
            LanguageSelector::JavaScriptTypeScript => "javascript",
        }
    }
}

/// Options for one audit or clean run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub project_root: PathBuf,
    pub language: LanguageSelector,
    /// Treat every non-underscore-prefixed name as referenced by unknown
    /// external callers.
    pub library_mode: bool,
    /// Opt-in final safety net: a literal name found in any non-source file
    /// protects the symbol.
    pub grep_shield: bool,
    /// Analyse vendored directories instead of skipping them.
    pub include_vendored: bool,
    /// Custom test command; autodetected when absent.
    pub test_command: Option<String>,
    /// Report what clean would delete without mutating anything.
    pub dry_run: bool,
    /// Optional directory holding premium rule packs.
    pub rules_dir: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(project_root: impl Into<PathBuf>, language: LanguageSelector) -> Self {
        Self {
            project_root: project_root.into(),
            language,
            library_mode: false,
            grep_shield: false,
            include_vendored: false,
            test_command: None,
            dry_run: false,
            rules_dir: None,
        }
    }

    pub fn with_library_mode(mut self, on: bool) -> Self {
        self.library_mode = on;
        self
    }

    pub fn with_grep_shield(mut self, on: bool) -> Self {
        self.grep_shield = on;
        self
    }

    pub fn with_test_command(mut self, command: impl Into<String>) -> Self {
        self.test_command = Some(command.into());
        self
    }

    pub fn with_dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches() {
        assert!(LanguageSelector::Python.matches(Language::Python));
        assert!(!LanguageSelector::Python.matches(Language::TypeScript));
        assert!(LanguageSelector::JavaScriptTypeScript.matches(Language::JavaScript));
        assert!(LanguageSelector::JavaScriptTypeScript.matches(Language::TypeScript));
    }

    #[test]
    fn test_builder_flags() {
        let opts = RunOptions::new("/proj", LanguageSelector::Python)
            .with_library_mode(true)
            .with_grep_shield(true)
            .with_test_command("pytest -q");
        assert!(opts.library_mode);
        assert!(opts.grep_shield);
        assert_eq!(opts.test_command.as_deref(), Some("pytest -q"));
        assert!(!opts.dry_run);
    }
}
