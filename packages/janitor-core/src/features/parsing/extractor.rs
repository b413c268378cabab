//! Entity and import extraction from parsed syntax trees.
//!
//! Walks the CST once per file and emits an `Entity` for every top-level
//! function, class, method and bare-name assignment (plus JS/TS export
//! declarations), and an `Import` per imported name. Malformed subtrees are
//! skipped, never fatal.

use std::hash::{Hash, Hasher};
use std::path::Path;

use rustc_hash::FxHasher;
use tree_sitter::Node;

use super::ParsedFile;
use crate::shared::models::{ByteRange, Entity, EntityKind, Import, Language};

/// Output of one extraction pass.
#[derive(Debug, Default)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub imports: Vec<Import>,
}

/// Extracts entities and imports for both language families.
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn extract(parsed: &ParsedFile) -> ExtractionResult {
        let mut result = ExtractionResult::default();
        match parsed.language {
            Language::Python => {
                Self::walk_python(parsed, parsed.root(), None, &mut result);
            }
            Language::JavaScript | Language::TypeScript => {
                Self::walk_js(parsed, parsed.root(), None, false, &mut result);
            }
        }
        result
    }

    // ---------------------------------------------------------------- python

    fn walk_python(
        parsed: &ParsedFile,
        node: Node<'_>,
        parent_class: Option<&str>,
        result: &mut ExtractionResult,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "decorated_definition" => {
                    Self::python_decorated(parsed, child, parent_class, result);
                }
                "function_definition" => {
                    Self::python_function(parsed, child, None, parent_class, result);
                }
                "class_definition" => {
                    Self::python_class(parsed, child, None, result);
                }
                "import_statement" | "import_from_statement" => {
                    Self::python_import(parsed, child, result);
                }
                "expression_statement" => {
                    Self::python_assignment(parsed, child, parent_class, result);
                }
                // Class bodies, module blocks and compound statements
                // (guarded imports, conditional defs) are transparent;
                // function bodies are not: nested defs are locals, not
                // declarations.
                "block" | "module" | "if_statement" | "elif_clause" | "else_clause"
                | "try_statement" | "except_clause" | "finally_clause" | "with_statement"
                | "for_statement" | "while_statement" => {
                    Self::walk_python(parsed, child, parent_class, result);
                }
                _ => {}
            }
        }
    }

    fn python_decorated(
        parsed: &ParsedFile,
        node: Node<'_>,
        parent_class: Option<&str>,
        result: &mut ExtractionResult,
    ) {
        let mut decorators = Vec::new();
        let mut inner = None;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "decorator" => decorators.push(parsed.node_text(&child).trim().to_string()),
                "function_definition" | "class_definition" => inner = Some(child),
                _ => {}
            }
        }

        let Some(inner) = inner else { return };
        let outer = Some((parsed.node_range(&node), decorators, parsed.node_text(&node)));
        match inner.kind() {
            "function_definition" => {
                Self::python_function(parsed, inner, outer, parent_class, result)
            }
            _ => Self::python_class(parsed, inner, outer, result),
        }
    }

    fn python_function(
        parsed: &ParsedFile,
        node: Node<'_>,
        outer: Option<(ByteRange, Vec<String>, String)>,
        parent_class: Option<&str>,
        result: &mut ExtractionResult,
    ) {
        let Some(name) = field_text(parsed, node, "name") else {
            return;
        };

        let is_async = node
            .child(0)
            .map(|c| c.kind() == "async")
            .unwrap_or(false);
        let kind = if parent_class.is_some() {
            EntityKind::Method
        } else if is_async {
            EntityKind::AsyncFunction
        } else {
            EntityKind::Function
        };

        result
            .entities
            .push(Self::build_entity(parsed, node, &name, kind, outer, parent_class));
    }

    fn python_class(
        parsed: &ParsedFile,
        node: Node<'_>,
        outer: Option<(ByteRange, Vec<String>, String)>,
        result: &mut ExtractionResult,
    ) {
        let Some(name) = field_text(parsed, node, "name") else {
            return;
        };

        let mut entity = Self::build_entity(parsed, node, &name, EntityKind::Class, outer, None);
        entity.base_classes = Self::python_base_classes(parsed, node);
        result.entities.push(entity);

        if let Some(body) = node.child_by_field_name("body") {
            Self::walk_python(parsed, body, Some(&name), result);
        }
    }

    fn python_base_classes(parsed: &ParsedFile, node: Node<'_>) -> Vec<String> {
        let mut bases = Vec::new();
        if let Some(args) = node.child_by_field_name("superclasses") {
            let mut cursor = args.walk();
            for arg in args.children(&mut cursor) {
                match arg.kind() {
                    "identifier" | "attribute" => bases.push(parsed.node_text(&arg)),
                    // class C(Base, metaclass=Meta): the keyword argument is
                    // not a base.
                    _ => {}
                }
            }
        }
        bases
    }

    /// Module-level or class-level `name = value` assignments.
    fn python_assignment(
        parsed: &ParsedFile,
        stmt: Node<'_>,
        parent_class: Option<&str>,
        result: &mut ExtractionResult,
    ) {
        let Some(assignment) = stmt.child(0).filter(|c| c.kind() == "assignment") else {
            return;
        };
        let Some(left) = assignment.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }

        let name = parsed.node_text(&left);
        result.entities.push(Self::build_entity(
            parsed,
            stmt,
            &name,
            EntityKind::ModuleVariable,
            None,
            parent_class,
        ));
    }

    fn python_import(parsed: &ParsedFile, node: Node<'_>, result: &mut ExtractionResult) {
        let line = node.start_position().row as u32 + 1;

        if node.kind() == "import_statement" {
            // import a.b, import a as b
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                let module = match child.kind() {
                    "dotted_name" | "identifier" => Some(parsed.node_text(&child)),
                    "aliased_import" => child
                        .child_by_field_name("name")
                        .map(|n| parsed.node_text(&n)),
                    _ => None,
                };
                if let Some(module) = module {
                    result.imports.push(Import {
                        module,
                        names: Vec::new(),
                        is_relative: false,
                        relative_level: 0,
                        line,
                        file_path: parsed.file_path.clone(),
                    });
                }
            }
            return;
        }

        // from module import a, b as c, (multi, line)
        let mut module = String::new();
        let mut relative_level = 0u32;
        if let Some(module_node) = node.child_by_field_name("module_name") {
            match module_node.kind() {
                "relative_import" => {
                    let text = parsed.node_text(&module_node);
                    relative_level = text.chars().take_while(|c| *c == '.').count() as u32;
                    module = text;
                }
                _ => module = parsed.node_text(&module_node),
            }
        }
        if module.is_empty() {
            return;
        }
        let is_relative = relative_level > 0;

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            match child.kind() {
                "aliased_import" => {
                    if let Some(original) = child.child_by_field_name("name") {
                        names.push(parsed.node_text(&original));
                    }
                }
                _ => names.push(parsed.node_text(&child)),
            }
        }

        if names.is_empty() {
            // `from m import *` or bare relative package import
            result.imports.push(Import {
                module,
                names: Vec::new(),
                is_relative,
                relative_level,
                line,
                file_path: parsed.file_path.clone(),
            });
            return;
        }

        for name in names {
            result.imports.push(Import {
                module: module.clone(),
                names: vec![name],
                is_relative,
                relative_level,
                line,
                file_path: parsed.file_path.clone(),
            });
        }
    }

    // ----------------------------------------------------------------- js/ts

    fn walk_js(
        parsed: &ParsedFile,
        node: Node<'_>,
        parent_class: Option<&str>,
        top_level: bool,
        result: &mut ExtractionResult,
    ) {
        let at_module_level = node.kind() == "program" || top_level;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_declaration" | "generator_function_declaration" => {
                    Self::js_function(parsed, child, parent_class, result);
                }
                "class_declaration" => {
                    Self::js_class(parsed, child, result);
                }
                "method_definition" => {
                    Self::js_method(parsed, child, parent_class, result);
                }
                "export_statement" => {
                    Self::js_export(parsed, child, result);
                }
                "import_statement" => {
                    Self::js_import(parsed, child, result);
                }
                "lexical_declaration" | "variable_declaration" if at_module_level => {
                    Self::js_variable(parsed, child, result);
                }
                "class_body" => {
                    Self::walk_js(parsed, child, parent_class, false, result);
                }
                _ => {}
            }
        }

        if node.kind() == "program" {
            // require() calls hide inside declarations anywhere in the file.
            Self::js_scan_requires(parsed, node, result);
        }
    }

    fn js_function(
        parsed: &ParsedFile,
        node: Node<'_>,
        parent_class: Option<&str>,
        result: &mut ExtractionResult,
    ) {
        let Some(name) = field_text(parsed, node, "name") else {
            return;
        };
        let is_async = node.child(0).map(|c| c.kind() == "async").unwrap_or(false);
        let kind = if parent_class.is_some() {
            EntityKind::Method
        } else if is_async {
            EntityKind::AsyncFunction
        } else {
            EntityKind::Function
        };
        result
            .entities
            .push(Self::build_entity(parsed, node, &name, kind, None, parent_class));
    }

    fn js_class(parsed: &ParsedFile, node: Node<'_>, result: &mut ExtractionResult) {
        let Some(name) = field_text(parsed, node, "name") else {
            return;
        };

        let mut entity = Self::build_entity(parsed, node, &name, EntityKind::Class, None, None);
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "class_heritage" {
                entity.base_classes = identifiers_in(parsed, child);
            }
        }
        result.entities.push(entity);

        if let Some(body) = node.child_by_field_name("body") {
            Self::walk_js(parsed, body, Some(&name), false, result);
        }
    }

    fn js_method(
        parsed: &ParsedFile,
        node: Node<'_>,
        parent_class: Option<&str>,
        result: &mut ExtractionResult,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = parsed.node_text(&name_node);
        result.entities.push(Self::build_entity(
            parsed,
            node,
            &name,
            EntityKind::Method,
            None,
            parent_class,
        ));
    }

    fn js_variable(parsed: &ParsedFile, node: Node<'_>, result: &mut ExtractionResult) {
        let mut cursor = node.walk();
        for declarator in node.children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name_node.kind() != "identifier" {
                continue;
            }
            let name = parsed.node_text(&name_node);
            result.entities.push(Self::build_entity(
                parsed,
                node,
                &name,
                EntityKind::ModuleVariable,
                None,
                None,
            ));
        }
    }

    /// `export` declarations: emit an Export entity per exported name (default
    /// tagged distinctly), extract the wrapped declaration, and record the
    /// import edge of a re-export.
    fn js_export(parsed: &ParsedFile, node: Node<'_>, result: &mut ExtractionResult) {
        let is_default = {
            let mut cursor = node.walk();
            let found = node.children(&mut cursor).any(|c| c.kind() == "default");
            found
        };

        let mut exported = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_declaration"
                | "generator_function_declaration"
                | "class_declaration"
                | "lexical_declaration"
                | "variable_declaration"
                | "method_definition" => {
                    let before = result.entities.len();
                    match child.kind() {
                        "class_declaration" => Self::js_class(parsed, child, result),
                        "lexical_declaration" | "variable_declaration" => {
                            Self::js_variable(parsed, child, result)
                        }
                        _ => Self::js_function(parsed, child, None, result),
                    }
                    for entity in &result.entities[before..] {
                        if entity.parent_class.is_none() {
                            exported.push(entity.name.clone());
                        }
                    }
                }
                "export_clause" => {
                    // export { a, b as c } [from './x']
                    let mut inner = child.walk();
                    for spec in child.children(&mut inner) {
                        if spec.kind() == "export_specifier" {
                            if let Some(name) = spec
                                .child_by_field_name("name")
                                .map(|n| parsed.node_text(&n))
                            {
                                exported.push(name);
                            }
                        }
                    }
                }
                "identifier" => exported.push(parsed.node_text(&child)),
                _ => {}
            }
        }

        if exported.is_empty() && is_default {
            // `export default <anonymous expr>`
            exported.push("default".to_string());
        }

        for name in exported {
            result.entities.push(Self::build_entity(
                parsed,
                node,
                &name,
                EntityKind::Export {
                    default: is_default,
                },
                None,
                None,
            ));
        }

        // Re-export: `export { a } from './x'` is also an import edge.
        if let Some(source) = node.child_by_field_name("source") {
            let module = strip_quotes(&parsed.node_text(&source));
            let is_relative = module.starts_with("./") || module.starts_with("../");
            result.imports.push(Import {
                module,
                names: Vec::new(),
                is_relative,
                relative_level: 0,
                line: node.start_position().row as u32 + 1,
                file_path: parsed.file_path.clone(),
            });
        }
    }

    fn js_import(parsed: &ParsedFile, node: Node<'_>, result: &mut ExtractionResult) {
        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let module = strip_quotes(&parsed.node_text(&source));
        let is_relative = module.starts_with("./") || module.starts_with("../");
        let line = node.start_position().row as u32 + 1;

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "import_clause" {
                continue;
            }
            let mut inner = child.walk();
            for part in child.children(&mut inner) {
                match part.kind() {
                    "identifier" => names.push(parsed.node_text(&part)),
                    "named_imports" => {
                        let mut specs = part.walk();
                        for spec in part.children(&mut specs) {
                            if spec.kind() == "import_specifier" {
                                if let Some(name) = spec
                                    .child_by_field_name("name")
                                    .map(|n| parsed.node_text(&n))
                                {
                                    names.push(name);
                                }
                            }
                        }
                    }
                    "namespace_import" => {
                        if let Some(alias) = identifiers_in(parsed, part).into_iter().next() {
                            names.push(alias);
                        }
                    }
                    _ => {}
                }
            }
        }

        if names.is_empty() {
            result.imports.push(Import {
                module,
                names: Vec::new(),
                is_relative,
                relative_level: 0,
                line,
                file_path: parsed.file_path.clone(),
            });
            return;
        }

        for name in names {
            result.imports.push(Import {
                module: module.clone(),
                names: vec![name],
                is_relative,
                relative_level: 0,
                line,
                file_path: parsed.file_path.clone(),
            });
        }
    }

    /// CommonJS `require("mod")` calls anywhere under `node`.
    fn js_scan_requires(parsed: &ParsedFile, node: Node<'_>, result: &mut ExtractionResult) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current.kind() == "call_expression" {
                let callee = current.child_by_field_name("function");
                let is_require = callee
                    .map(|f| f.kind() == "identifier" && parsed.node_text(&f) == "require")
                    .unwrap_or(false);
                if is_require {
                    if let Some(args) = current.child_by_field_name("arguments") {
                        let mut cursor = args.walk();
                        for arg in args.children(&mut cursor) {
                            if arg.kind() == "string" {
                                let module = strip_quotes(&parsed.node_text(&arg));
                                let is_relative =
                                    module.starts_with("./") || module.starts_with("../");
                                result.imports.push(Import {
                                    module,
                                    names: Vec::new(),
                                    is_relative,
                                    relative_level: 0,
                                    line: current.start_position().row as u32 + 1,
                                    file_path: parsed.file_path.clone(),
                                });
                                break;
                            }
                        }
                    }
                }
            }
            let mut cursor = current.walk();
            for child in current.children(&mut cursor) {
                stack.push(child);
            }
        }
    }

    // ---------------------------------------------------------------- shared

    fn build_entity(
        parsed: &ParsedFile,
        node: Node<'_>,
        name: &str,
        kind: EntityKind,
        outer: Option<(ByteRange, Vec<String>, String)>,
        parent_class: Option<&str>,
    ) -> Entity {
        let qualified_name = match parent_class {
            Some(class) => format!("{}.{}", class, name),
            None => name.to_string(),
        };

        let (decorated_range, decorators, text) = match outer {
            Some((range, decorators, text)) => (Some(range), decorators, text),
            None => (None, Vec::new(), parsed.node_text(&node)),
        };

        let structural_hash = {
            let mut hasher = FxHasher::default();
            for token in text.split_whitespace() {
                token.hash(&mut hasher);
            }
            Some(hasher.finish())
        };

        Entity {
            name: name.to_string(),
            kind,
            file_path: parsed.file_path.clone(),
            byte_range: parsed.node_range(&node),
            decorated_byte_range: decorated_range,
            span: parsed.node_span(&node),
            qualified_name,
            parent_class: parent_class.map(str::to_string),
            base_classes: Vec::new(),
            decorators,
            text,
            structural_hash,
            protected_by: None,
        }
    }
}

fn field_text(parsed: &ParsedFile, node: Node<'_>, field: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| parsed.node_text(&n))
}

fn identifiers_in(parsed: &ParsedFile, node: Node<'_>) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == "identifier" {
            out.push(parsed.node_text(&current));
            continue;
        }
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            stack.push(child);
        }
    }
    out.reverse();
    out
}

fn strip_quotes(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::ParserAdapter;
    use crate::shared::models::Language;

    fn parse(path: &str, source: &str) -> ParsedFile {
        ParserAdapter::new()
            .parse_bytes(Path::new(path), source.as_bytes().to_vec())
            .unwrap()
    }

    #[test]
    fn test_python_function_and_class() {
        let parsed = parse(
            "a.py",
            "def top():\n    pass\n\nclass C(Base):\n    def run(self):\n        pass\n",
        );
        let result = EntityExtractor::extract(&parsed);

        let names: Vec<&str> = result.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["top", "C", "run"]);

        let class = &result.entities[1];
        assert_eq!(class.kind, EntityKind::Class);
        assert_eq!(class.base_classes, vec!["Base"]);

        let method = &result.entities[2];
        assert_eq!(method.kind, EntityKind::Method);
        assert_eq!(method.qualified_name, "C.run");
        assert_eq!(method.parent_class.as_deref(), Some("C"));
    }

    #[test]
    fn test_python_decorated_function() {
        let parsed = parse(
            "a.py",
            "@app.route('/x')\n@cached\ndef handler():\n    pass\n",
        );
        let result = EntityExtractor::extract(&parsed);
        let entity = &result.entities[0];
        assert_eq!(entity.name, "handler");
        assert_eq!(
            entity.decorators,
            vec!["@app.route('/x')".to_string(), "@cached".to_string()]
        );
        // text includes decorators; byte_range starts at the def keyword
        assert!(entity.text.starts_with("@app.route"));
        let sliced = &parsed.source[entity.byte_range.start..entity.byte_range.end];
        assert!(sliced.starts_with(b"def handler"));
    }

    #[test]
    fn test_python_async_function() {
        let parsed = parse("a.py", "async def fetch():\n    pass\n");
        let result = EntityExtractor::extract(&parsed);
        assert_eq!(result.entities[0].kind, EntityKind::AsyncFunction);
    }

    #[test]
    fn test_python_module_variable() {
        let parsed = parse("a.py", "LIMIT = 10\nobj.attr = 3\n");
        let result = EntityExtractor::extract(&parsed);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].name, "LIMIT");
        assert_eq!(result.entities[0].kind, EntityKind::ModuleVariable);
    }

    #[test]
    fn test_python_nested_function_not_extracted() {
        let parsed = parse("a.py", "def outer():\n    def inner():\n        pass\n");
        let result = EntityExtractor::extract(&parsed);
        let names: Vec<&str> = result.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["outer"]);
    }

    #[test]
    fn test_python_imports() {
        let parsed = parse(
            "a.py",
            "import os.path\nfrom ..pkg import x, y as z\nfrom . import sibling\n",
        );
        let result = EntityExtractor::extract(&parsed);

        assert_eq!(result.imports[0].module, "os.path");
        assert!(result.imports[0].names.is_empty());

        // one Import per name, sharing the module
        let pkg_imports: Vec<&Import> = result
            .imports
            .iter()
            .filter(|i| i.module == "..pkg")
            .collect();
        assert_eq!(pkg_imports.len(), 2);
        assert_eq!(pkg_imports[0].names, vec!["x"]);
        assert_eq!(pkg_imports[1].names, vec!["y"]); // original name, not alias
        assert!(pkg_imports[0].is_relative);
        assert_eq!(pkg_imports[0].relative_level, 2);

        let dot = result.imports.iter().find(|i| i.module == ".").unwrap();
        assert_eq!(dot.relative_level, 1);
    }

    #[test]
    fn test_python_multiline_import() {
        let parsed = parse(
            "a.py",
            "from black.nodes import (\n    is_import,\n    is_with_stmt,\n)\n",
        );
        let result = EntityExtractor::extract(&parsed);
        let names: Vec<&str> = result
            .imports
            .iter()
            .flat_map(|i| i.names.iter().map(String::as_str))
            .collect();
        assert_eq!(names, vec!["is_import", "is_with_stmt"]);
    }

    #[test]
    fn test_js_entities_and_exports() {
        let parsed = parse(
            "app.ts",
            "import { helper } from './util';\n\
             export default function main() {}\n\
             export const limit = 5;\n\
             class Widget extends Base { draw() {} }\n",
        );
        assert_eq!(parsed.language, Language::TypeScript);
        let result = EntityExtractor::extract(&parsed);

        let default_export = result
            .entities
            .iter()
            .find(|e| matches!(e.kind, EntityKind::Export { default: true }))
            .unwrap();
        assert_eq!(default_export.name, "main");

        let named_export = result
            .entities
            .iter()
            .find(|e| matches!(e.kind, EntityKind::Export { default: false }))
            .unwrap();
        assert_eq!(named_export.name, "limit");

        let widget = result.entities.iter().find(|e| e.name == "Widget").unwrap();
        assert_eq!(widget.base_classes, vec!["Base"]);

        let draw = result.entities.iter().find(|e| e.name == "draw").unwrap();
        assert_eq!(draw.qualified_name, "Widget.draw");

        let import = &result.imports[0];
        assert_eq!(import.module, "./util");
        assert_eq!(import.names, vec!["helper"]);
        assert!(import.is_relative);
    }

    #[test]
    fn test_js_require() {
        let parsed = parse("a.js", "const fs = require('fs');\nconst u = require('./util');\n");
        let result = EntityExtractor::extract(&parsed);
        let modules: Vec<&str> = result.imports.iter().map(|i| i.module.as_str()).collect();
        assert!(modules.contains(&"fs"));
        assert!(modules.contains(&"./util"));
    }

    #[test]
    fn test_malformed_subtree_is_skipped() {
        let parsed = parse("a.py", "def ok():\n    pass\n\ndef broken(:\n");
        let result = EntityExtractor::extract(&parsed);
        assert!(result.entities.iter().any(|e| e.name == "ok"));
    }

    #[test]
    fn test_byte_range_starts_with_keyword() {
        let parsed = parse("a.py", "class C:\n    pass\n\ndef f():\n    pass\n");
        let result = EntityExtractor::extract(&parsed);
        for entity in &result.entities {
            let sliced = &parsed.source[entity.byte_range.start..entity.byte_range.end];
            match entity.kind {
                EntityKind::Class => assert!(sliced.starts_with(b"class")),
                EntityKind::Function => assert!(sliced.starts_with(b"def")),
                _ => {}
            }
        }
    }
}
