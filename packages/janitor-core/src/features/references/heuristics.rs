//! File-level Python heuristics.
//!
//! Patterns whose evidence spans a whole definition rather than a single
//! expression: teardown code after `yield` in `@asynccontextmanager`
//! functions, and SQLAlchemy polymorphic classes that the ORM registry
//! instantiates by discriminator.

use tree_sitter::Node;

use crate::features::parsing::ParsedFile;
use crate::shared::models::{CandidateRef, ReferenceKind};

/// Run every file-level heuristic, appending synthetic candidates.
pub fn collect_python_heuristics(parsed: &ParsedFile, out: &mut Vec<CandidateRef>) {
    lifespan_teardown(parsed, parsed.root(), out);
    polymorphic_orm(parsed, parsed.root(), out);
}

/// Inside a function decorated with `@asynccontextmanager`, everything
/// textually after the `yield` is teardown code that runs on shutdown;
/// every identifier there gets a synthetic reference.
fn lifespan_teardown(parsed: &ParsedFile, node: Node<'_>, out: &mut Vec<CandidateRef>) {
    if node.kind() == "decorated_definition" {
        let mut has_acm = false;
        let mut body = None;

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "decorator" => {
                    if parsed.node_text(&child).contains("asynccontextmanager") {
                        has_acm = true;
                    }
                }
                "function_definition" => body = child.child_by_field_name("body"),
                _ => {}
            }
        }

        if has_acm {
            if let Some(body) = body {
                if let Some(yield_end) = find_first_yield_end(body) {
                    mark_identifiers_after(parsed, body, yield_end, out);
                }
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        lifespan_teardown(parsed, child, out);
    }
}

fn find_first_yield_end(node: Node<'_>) -> Option<usize> {
    if node.kind() == "yield" {
        return Some(node.end_byte());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(end) = find_first_yield_end(child) {
            return Some(end);
        }
    }
    None
}

fn mark_identifiers_after(
    parsed: &ParsedFile,
    node: Node<'_>,
    after_byte: usize,
    out: &mut Vec<CandidateRef>,
) {
    if node.kind() == "identifier" && node.start_byte() >= after_byte {
        out.push(CandidateRef {
            name: parsed.node_text(&node),
            kind: ReferenceKind::Heuristic,
            line: node.start_position().row as u32 + 1,
            class_context: None,
            target_file: None,
            source_symbol: None,
        });
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        mark_identifiers_after(parsed, child, after_byte, out);
    }
}

/// A class whose `__mapper_args__` carries `polymorphic_identity` is
/// instantiated by the ORM registry; the class itself gets a synthetic
/// reference.
fn polymorphic_orm(parsed: &ParsedFile, node: Node<'_>, out: &mut Vec<CandidateRef>) {
    if node.kind() == "class_definition" {
        if let Some(name_node) = node.child_by_field_name("name") {
            if let Some(body) = node.child_by_field_name("body") {
                let body_text = parsed.node_text(&body);
                if body_text.contains("__mapper_args__") && body_text.contains("polymorphic_identity")
                {
                    out.push(CandidateRef {
                        name: parsed.node_text(&name_node),
                        kind: ReferenceKind::Heuristic,
                        line: name_node.start_position().row as u32 + 1,
                        class_context: None,
                        target_file: None,
                        source_symbol: None,
                    });
                }
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        polymorphic_orm(parsed, child, out);
    }
}
