//! Parser adapter (tree-sitter) and entity extraction.
//!
//! The adapter selects a grammar by file extension and returns a concrete
//! syntax tree with byte ranges over the raw file bytes. Input is consumed
//! as bytes; nothing assumes UTF-8 until a byte range is sliced (and then
//! only lossily). Syntactically invalid files still yield a best-effort
//! tree with ERROR nodes, which the extractor skips subtree by subtree.

mod extractor;

pub use extractor::{EntityExtractor, ExtractionResult};

use std::path::{Path, PathBuf};

use tree_sitter::{Node, Parser, Tree};

use crate::shared::models::{ByteRange, Language, Span};

/// One parsed file: the tree plus the shared immutable byte buffer it
/// indexes into.
pub struct ParsedFile {
    pub language: Language,
    pub file_path: PathBuf,
    pub tree: Tree,
    pub source: Vec<u8>,
}

impl ParsedFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Lossy UTF-8 slice of a node's byte range.
    pub fn node_text(&self, node: &Node<'_>) -> String {
        slice_text(&self.source, node.start_byte(), node.end_byte())
    }

    pub fn node_range(&self, node: &Node<'_>) -> ByteRange {
        ByteRange::new(node.start_byte(), node.end_byte())
    }

    pub fn node_span(&self, node: &Node<'_>) -> Span {
        Span::new(
            node.start_position().row as u32 + 1,
            node.start_position().column as u32,
            node.end_position().row as u32 + 1,
            node.end_position().column as u32,
        )
    }
}

/// Lossy UTF-8 slice of `[start, end)` from raw bytes.
pub fn slice_text(source: &[u8], start: usize, end: usize) -> String {
    let end = end.min(source.len());
    let start = start.min(end);
    String::from_utf8_lossy(&source[start..end]).into_owned()
}

/// Grammar selection and parsing, one instance per run.
pub struct ParserAdapter;

impl ParserAdapter {
    pub fn new() -> Self {
        Self
    }

    fn grammar_for(language: Language, path: &Path) -> tree_sitter::Language {
        match language {
            Language::Python => tree_sitter_python::language(),
            // The TSX grammar is a superset covering plain JS, JSX and TS
            // with JSX; bare .ts needs the non-JSX variant because of the
            // `<T>` cast ambiguity.
            Language::TypeScript => {
                if path.extension().and_then(|e| e.to_str()) == Some("tsx") {
                    tree_sitter_typescript::language_tsx()
                } else {
                    tree_sitter_typescript::language_typescript()
                }
            }
            Language::JavaScript => tree_sitter_typescript::language_tsx(),
        }
    }

    /// Parse raw bytes. Returns `None` when no grammar matches the extension
    /// or tree-sitter cannot produce any tree; callers skip such files.
    pub fn parse_bytes(&self, file_path: &Path, source: Vec<u8>) -> Option<ParsedFile> {
        let language = Language::from_path(file_path)?;

        let mut parser = Parser::new();
        if parser
            .set_language(&Self::grammar_for(language, file_path))
            .is_err()
        {
            tracing::warn!(file = %file_path.display(), "grammar version mismatch");
            return None;
        }

        let tree = match parser.parse(&source, None) {
            Some(tree) => tree,
            None => {
                tracing::debug!(file = %file_path.display(), "parser produced no tree");
                return None;
            }
        };

        Some(ParsedFile {
            language,
            file_path: file_path.to_path_buf(),
            tree,
            source,
        })
    }

    /// Read and parse a file from disk. I/O or grammar failures return
    /// `None`; the rest of the pipeline treats the file as opaque.
    pub fn parse_file(&self, file_path: &Path) -> Option<ParsedFile> {
        let source = match std::fs::read(file_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(file = %file_path.display(), %err, "unreadable file skipped");
                return None;
            }
        };
        self.parse_bytes(file_path, source)
    }
}

impl Default for ParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_python_function() {
        let adapter = ParserAdapter::new();
        let parsed = adapter
            .parse_bytes(Path::new("test.py"), b"def hello():\n    pass\n".to_vec())
            .unwrap();
        assert_eq!(parsed.language, Language::Python);
        assert!(!parsed.root().has_error());
    }

    #[test]
    fn test_parse_typescript_class() {
        let adapter = ParserAdapter::new();
        let parsed = adapter
            .parse_bytes(
                Path::new("app.ts"),
                b"export class App { run(): void {} }\n".to_vec(),
            )
            .unwrap();
        assert_eq!(parsed.language, Language::TypeScript);
        assert!(!parsed.root().has_error());
    }

    #[test]
    fn test_invalid_input_still_yields_tree() {
        let adapter = ParserAdapter::new();
        let parsed = adapter
            .parse_bytes(Path::new("broken.py"), b"def broken(:\n".to_vec())
            .unwrap();
        assert!(parsed.root().has_error());
    }

    #[test]
    fn test_unknown_extension_is_skipped() {
        let adapter = ParserAdapter::new();
        assert!(adapter
            .parse_bytes(Path::new("data.csv"), b"a,b,c".to_vec())
            .is_none());
    }

    #[test]
    fn test_non_utf8_bytes_parse() {
        let adapter = ParserAdapter::new();
        let mut source = b"def f():\n    pass\n# ".to_vec();
        source.extend_from_slice(&[0xFF, 0xFE]);
        source.push(b'\n');
        let parsed = adapter.parse_bytes(Path::new("latin.py"), source).unwrap();
        let text = parsed.node_text(&parsed.root());
        assert!(text.contains("def f()"));
    }
}
