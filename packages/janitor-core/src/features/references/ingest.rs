//! Reference ingestion walk.
//!
//! Second pass over each file's CST, collecting pre-resolution
//! `CandidateRef`s: calls, attribute expressions, decorator identifiers,
//! type-hint identifiers (including string forward references and
//! `Depends(...)`-style injections), string literals inside recognised
//! idioms, imports, and plain identifier usages. Candidates are pure
//! syntax plus import-resolution results, so the cache can replay them
//! against a fresh definitions table without re-parsing.

use std::path::PathBuf;
use std::sync::OnceLock;

use aho_corasick::AhoCorasick;
use rustc_hash::FxHashMap;
use tree_sitter::Node;

use super::heuristics::collect_python_heuristics;
use crate::features::dep_graph::ModuleResolver;
use crate::features::parsing::ParsedFile;
use crate::shared::models::{CandidateRef, Import, Language, ReferenceKind};

/// Metaprogramming markers that quarantine a whole file.
const META_DANGER_PATTERNS: &[&str] = &[
    "getattr(",
    "setattr(",
    "hasattr(",
    "delattr(",
    "eval(",
    "exec(",
    "compile(",
    "importlib.",
    "__import__(",
    "type(",
    ".__dict__",
];

const STRING_TASK_FUNCTIONS: &[&str] = &["signature", "s", "si", "task", "get_model", "get_task"];
const INJECTION_FUNCTIONS: &[&str] = &["Depends", "Security", "Inject"];

fn meta_danger_matcher() -> &'static AhoCorasick {
    static MATCHER: OnceLock<AhoCorasick> = OnceLock::new();
    MATCHER.get_or_init(|| AhoCorasick::new(META_DANGER_PATTERNS).expect("static patterns"))
}

/// Per-file output of the ingestion walk; serialised as-is into the cache.
#[derive(Debug, Default)]
pub struct IngestOutput {
    pub candidates: Vec<CandidateRef>,
    /// `(module_file, name)` pairs imported into an `__init__`-style module.
    pub package_exports: Vec<(PathBuf, String)>,
    pub metaprogramming_danger: bool,
}

/// Walks one parsed file and emits reference candidates.
pub struct ReferenceIngestor<'a> {
    resolver: &'a ModuleResolver,
}

struct PyWalk<'a> {
    parsed: &'a ParsedFile,
    resolver: &'a ModuleResolver,
    out: IngestOutput,
    is_package_init: bool,
    /// file-scope inferred variable types: name → class
    var_types: FxHashMap<String, String>,
    /// isinstance-narrowed bindings, innermost last
    narrowed: Vec<(String, String)>,
}

impl<'a> ReferenceIngestor<'a> {
    pub fn new(resolver: &'a ModuleResolver) -> Self {
        Self { resolver }
    }

    pub fn ingest(&self, parsed: &ParsedFile) -> IngestOutput {
        let text = String::from_utf8_lossy(&parsed.source);
        let metaprogramming_danger = parsed.language == Language::Python
            && meta_danger_matcher().find(text.as_ref()).is_some();

        let mut out = match parsed.language {
            Language::Python => {
                let is_package_init = parsed
                    .file_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n == "__init__.py")
                    .unwrap_or(false);
                let mut walk = PyWalk {
                    parsed,
                    resolver: self.resolver,
                    out: IngestOutput::default(),
                    is_package_init,
                    var_types: FxHashMap::default(),
                    narrowed: Vec::new(),
                };
                walk.walk(parsed.root(), None, None);
                let mut out = walk.out;
                collect_python_heuristics(parsed, &mut out.candidates);
                out
            }
            Language::JavaScript | Language::TypeScript => {
                let mut out = IngestOutput::default();
                self.walk_js(parsed, parsed.root(), &mut out);
                out
            }
        };

        out.metaprogramming_danger = metaprogramming_danger;
        out
    }

    // ----------------------------------------------------------------- js/ts

    fn walk_js(&self, parsed: &ParsedFile, node: Node<'_>, out: &mut IngestOutput) {
        match node.kind() {
            "import_statement" => {
                self.js_import_candidates(parsed, node, out);
                return;
            }
            "export_statement" => {
                // `export { a, b }` references the local declarations.
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() == "export_clause" {
                        let mut inner = child.walk();
                        for spec in child.children(&mut inner) {
                            if spec.kind() == "export_specifier" {
                                if let Some(name) = spec.child_by_field_name("name") {
                                    out.candidates.push(CandidateRef {
                                        name: parsed.node_text(&name),
                                        kind: ReferenceKind::Usage,
                                        line: name.start_position().row as u32 + 1,
                                        class_context: None,
                                        target_file: None,
                                        source_symbol: None,
                                    });
                                }
                            }
                        }
                    }
                }
            }
            "call_expression" => {
                if let Some(func) = node.child_by_field_name("function") {
                    match func.kind() {
                        "identifier" => out.candidates.push(CandidateRef {
                            name: parsed.node_text(&func),
                            kind: ReferenceKind::Call,
                            line: func.start_position().row as u32 + 1,
                            class_context: None,
                            target_file: None,
                            source_symbol: None,
                        }),
                        "member_expression" => {
                            if let Some(prop) = func.child_by_field_name("property") {
                                out.candidates.push(CandidateRef {
                                    name: parsed.node_text(&prop),
                                    kind: ReferenceKind::Call,
                                    line: prop.start_position().row as u32 + 1,
                                    class_context: None,
                                    target_file: None,
                                    source_symbol: None,
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            "new_expression" => {
                if let Some(ctor) = node.child_by_field_name("constructor") {
                    if ctor.kind() == "identifier" {
                        out.candidates.push(CandidateRef {
                            name: parsed.node_text(&ctor),
                            kind: ReferenceKind::Instantiation,
                            line: ctor.start_position().row as u32 + 1,
                            class_context: None,
                            target_file: None,
                            source_symbol: None,
                        });
                    }
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_js(parsed, child, out);
        }
    }

    fn js_import_candidates(&self, parsed: &ParsedFile, node: Node<'_>, out: &mut IngestOutput) {
        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let module = parsed
            .node_text(&source)
            .trim_matches(|c| c == '"' || c == '\'' || c == '`')
            .to_string();
        let is_relative = module.starts_with("./") || module.starts_with("../");
        let import = Import {
            module,
            names: Vec::new(),
            is_relative,
            relative_level: 0,
            line: node.start_position().row as u32 + 1,
            file_path: parsed.file_path.clone(),
        };
        let target_file = self
            .resolver
            .resolve(&import, parsed.language)
            .into_iter()
            .next();

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "import_clause" {
                continue;
            }
            let mut names = Vec::new();
            collect_js_import_names(parsed, child, &mut names);
            for (name, line) in names {
                out.candidates.push(CandidateRef {
                    name,
                    kind: ReferenceKind::Import,
                    line,
                    class_context: None,
                    target_file: target_file.clone(),
                    source_symbol: None,
                });
            }
        }
    }
}

fn collect_js_import_names(parsed: &ParsedFile, node: Node<'_>, out: &mut Vec<(String, u32)>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" => out.push((
                parsed.node_text(&child),
                child.start_position().row as u32 + 1,
            )),
            "named_imports" => {
                let mut specs = child.walk();
                for spec in child.children(&mut specs) {
                    if spec.kind() == "import_specifier" {
                        if let Some(name) = spec.child_by_field_name("name") {
                            out.push((
                                parsed.node_text(&name),
                                name.start_position().row as u32 + 1,
                            ));
                        }
                    }
                }
            }
            "namespace_import" => {
                let mut inner = child.walk();
                for part in child.children(&mut inner) {
                    if part.kind() == "identifier" {
                        out.push((
                            parsed.node_text(&part),
                            part.start_position().row as u32 + 1,
                        ));
                    }
                }
            }
            _ => {}
        }
    }
}

// -------------------------------------------------------------------- python

impl<'a> PyWalk<'a> {
    fn push(&mut self, name: String, kind: ReferenceKind, node: &Node<'_>, enclosing: Option<&str>) {
        self.push_full(name, kind, node, None, None, enclosing);
    }

    fn push_full(
        &mut self,
        name: String,
        kind: ReferenceKind,
        node: &Node<'_>,
        class_context: Option<String>,
        target_file: Option<PathBuf>,
        enclosing: Option<&str>,
    ) {
        self.out.candidates.push(CandidateRef {
            name,
            kind,
            line: node.start_position().row as u32 + 1,
            class_context,
            target_file,
            source_symbol: enclosing.map(str::to_string),
        });
    }

    /// Main dispatch. `class_ctx` is the enclosing class name, `enclosing`
    /// the qualified name of the enclosing definition.
    fn walk(&mut self, node: Node<'_>, class_ctx: Option<&str>, enclosing: Option<&str>) {
        match node.kind() {
            "class_definition" => self.walk_class(node, enclosing),
            "function_definition" => self.walk_function(node, class_ctx, enclosing),
            "decorated_definition" => self.walk_decorated(node, class_ctx, enclosing),
            "import_from_statement" => self.walk_from_import(node, enclosing),
            "import_statement" => self.walk_plain_import(node, enclosing),
            "assignment" => self.walk_assignment(node, class_ctx, enclosing),
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.walk(value, class_ctx, enclosing);
                }
            }
            "attribute" => self.walk_attribute(node, class_ctx, enclosing),
            "call" => self.walk_call(node, class_ctx, enclosing),
            "type" => self.walk_type_annotation(node, enclosing),
            "if_statement" => self.walk_if(node, class_ctx, enclosing),
            "identifier" => {
                self.push(self.parsed.node_text(&node), ReferenceKind::Usage, &node, enclosing)
            }
            "string" | "comment" => {}
            _ => self.walk_children(node, class_ctx, enclosing),
        }
    }

    fn walk_children(&mut self, node: Node<'_>, class_ctx: Option<&str>, enclosing: Option<&str>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, class_ctx, enclosing);
        }
    }

    fn walk_class(&mut self, node: Node<'_>, enclosing: Option<&str>) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.parsed.node_text(&n));

        // base classes are references to the bases
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            self.walk_children(superclasses, None, enclosing);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, name.as_deref(), name.as_deref());
        }
    }

    fn walk_function(&mut self, node: Node<'_>, class_ctx: Option<&str>, _enclosing: Option<&str>) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.parsed.node_text(&n));
        let qualified = match (class_ctx, &name) {
            (Some(class), Some(n)) => Some(format!("{}.{}", class, n)),
            (None, Some(n)) => Some(n.clone()),
            _ => None,
        };
        let enclosing = qualified.as_deref();

        if let Some(parameters) = node.child_by_field_name("parameters") {
            // parameter names are bindings; their annotations and defaults
            // are usages
            let mut cursor = parameters.walk();
            for param in parameters.children(&mut cursor) {
                match param.kind() {
                    "typed_parameter" | "typed_default_parameter" => {
                        if let Some(annotation) = param.child_by_field_name("type") {
                            self.walk_type_annotation(annotation, enclosing);
                        }
                        if let Some(default) = param.child_by_field_name("value") {
                            self.walk(default, class_ctx, enclosing);
                        }
                    }
                    "default_parameter" => {
                        if let Some(default) = param.child_by_field_name("value") {
                            self.walk(default, class_ctx, enclosing);
                        }
                    }
                    _ => {}
                }
            }
        }
        if let Some(return_type) = node.child_by_field_name("return_type") {
            self.walk_type_annotation(return_type, enclosing);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, class_ctx, enclosing);
        }
    }

    fn walk_decorated(&mut self, node: Node<'_>, class_ctx: Option<&str>, enclosing: Option<&str>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "decorator" => self.walk_decorator(child, enclosing),
                _ => self.walk(child, class_ctx, enclosing),
            }
        }
    }

    fn walk_decorator(&mut self, node: Node<'_>, enclosing: Option<&str>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    self.push(self.parsed.node_text(&child), ReferenceKind::Decorator, &child, enclosing)
                }
                "attribute" => {
                    // @module.decorator references the base name
                    if let Some(base) = leftmost_identifier(child) {
                        self.push(
                            self.parsed.node_text(&base),
                            ReferenceKind::Decorator,
                            &base,
                            enclosing,
                        );
                    }
                }
                "call" => {
                    if let Some(func) = child.child_by_field_name("function") {
                        let target = match func.kind() {
                            "identifier" => Some(func),
                            "attribute" => leftmost_identifier(func),
                            _ => None,
                        };
                        if let Some(target) = target {
                            self.push(
                                self.parsed.node_text(&target),
                                ReferenceKind::Decorator,
                                &target,
                                enclosing,
                            );
                        }
                    }
                    // decorator arguments may reference symbols
                    if let Some(args) = child.child_by_field_name("arguments") {
                        self.walk_children(args, None, enclosing);
                    }
                }
                _ => {}
            }
        }
    }

    fn walk_from_import(&mut self, node: Node<'_>, enclosing: Option<&str>) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let module = self.parsed.node_text(&module_node);
        let relative_level = module.chars().take_while(|c| *c == '.').count() as u32;

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            let (name_node, name) = match child.kind() {
                "aliased_import" => match child.child_by_field_name("name") {
                    Some(n) => (n, self.parsed.node_text(&n)),
                    None => continue,
                },
                _ => (child, self.parsed.node_text(&child)),
            };
            names.push((name_node, name));
        }

        let import = Import {
            module: module.clone(),
            names: names.iter().map(|(_, n)| n.clone()).collect(),
            is_relative: relative_level > 0,
            relative_level,
            line: node.start_position().row as u32 + 1,
            file_path: self.parsed.file_path.clone(),
        };
        let target_file = self
            .resolver
            .resolve(&import, Language::Python)
            .into_iter()
            .next();

        for (name_node, name) in names {
            if self.is_package_init {
                if let Some(target) = &target_file {
                    self.out.package_exports.push((target.clone(), name.clone()));
                }
            }
            self.push_full(
                name,
                ReferenceKind::Import,
                &name_node,
                None,
                target_file.clone(),
                enclosing,
            );
        }
    }

    fn walk_plain_import(&mut self, node: Node<'_>, enclosing: Option<&str>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "dotted_name" | "identifier" => {
                    self.push(self.parsed.node_text(&child), ReferenceKind::Import, &child, enclosing)
                }
                "aliased_import" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        self.push(
                            self.parsed.node_text(&name),
                            ReferenceKind::Import,
                            &name,
                            enclosing,
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn walk_assignment(&mut self, node: Node<'_>, class_ctx: Option<&str>, enclosing: Option<&str>) {
        let left = node.child_by_field_name("left");
        let right = node.child_by_field_name("right");

        // v = ClassName(...) feeds the variable-type registry
        if let (Some(left), Some(right)) = (&left, &right) {
            if left.kind() == "identifier" && right.kind() == "call" {
                if let Some(func) = right.child_by_field_name("function") {
                    if func.kind() == "identifier" {
                        let type_name = self.parsed.node_text(&func);
                        if type_name.chars().next().map(char::is_uppercase).unwrap_or(false) {
                            self.var_types
                                .insert(self.parsed.node_text(left), type_name);
                        }
                    }
                }
            }

            // app.dependency_overrides[T] = F references F (and T)
            if left.kind() == "subscript" {
                let subscript_text = self.parsed.node_text(left);
                if subscript_text.contains("dependency_overrides") && right.kind() == "identifier" {
                    self.push(
                        self.parsed.node_text(right),
                        ReferenceKind::Heuristic,
                        right,
                        enclosing,
                    );
                }
            }
        }

        // LHS bare name is a binding; any other LHS shape (attribute,
        // subscript, tuple) contains usages. RHS is always usages.
        if let Some(left) = left {
            if left.kind() != "identifier" {
                self.walk(left, class_ctx, enclosing);
            }
        }
        if let Some(annotation) = node.child_by_field_name("type") {
            self.walk_type_annotation(annotation, enclosing);
        }
        if let Some(right) = right {
            self.walk(right, class_ctx, enclosing);
        }
    }

    fn walk_attribute(&mut self, node: Node<'_>, class_ctx: Option<&str>, enclosing: Option<&str>) {
        if let Some(object) = node.child_by_field_name("object") {
            self.walk(object, class_ctx, enclosing);
        }
        if let Some(attribute) = node.child_by_field_name("attribute") {
            let class_context = self.receiver_class(node, class_ctx);
            self.push_full(
                self.parsed.node_text(&attribute),
                ReferenceKind::Attribute,
                &attribute,
                class_context,
                None,
                enclosing,
            );
        }
    }

    fn walk_call(&mut self, node: Node<'_>, class_ctx: Option<&str>, enclosing: Option<&str>) {
        if let Some(func) = node.child_by_field_name("function") {
            match func.kind() {
                "identifier" => {
                    let name = self.parsed.node_text(&func);
                    self.push(name, ReferenceKind::Call, &func, enclosing);
                }
                "attribute" => {
                    if let Some(object) = func.child_by_field_name("object") {
                        self.walk(object, class_ctx, enclosing);
                    }
                    if let Some(method) = func.child_by_field_name("attribute") {
                        let class_context = self.receiver_class(func, class_ctx);
                        self.push_full(
                            self.parsed.node_text(&method),
                            ReferenceKind::Call,
                            &method,
                            class_context,
                            None,
                            enclosing,
                        );
                    }
                }
                _ => self.walk(func, class_ctx, enclosing),
            }

            self.special_call_idioms(node, &func, enclosing);
        }

        if let Some(args) = node.child_by_field_name("arguments") {
            self.walk_children(args, class_ctx, enclosing);
        }
    }

    /// `Depends(f)` / `Security(f)` / `Inject(f)` injections and
    /// string-addressed task calls (`signature('x.y')`, `get_model('a.M')`).
    fn special_call_idioms(&mut self, call: Node<'_>, func: &Node<'_>, enclosing: Option<&str>) {
        let func_name = match func.kind() {
            "identifier" => self.parsed.node_text(func),
            "attribute" => func
                .child_by_field_name("attribute")
                .map(|a| self.parsed.node_text(&a))
                .unwrap_or_default(),
            _ => return,
        };

        let Some(args) = call.child_by_field_name("arguments") else {
            return;
        };

        if INJECTION_FUNCTIONS.contains(&func_name.as_str()) {
            let mut cursor = args.walk();
            for arg in args.children(&mut cursor) {
                if arg.kind() == "identifier" {
                    self.push(
                        self.parsed.node_text(&arg),
                        ReferenceKind::TypeHint,
                        &arg,
                        enclosing,
                    );
                }
            }
        }

        if STRING_TASK_FUNCTIONS.contains(&func_name.as_str()) {
            let mut cursor = args.walk();
            for arg in args.children(&mut cursor) {
                if arg.kind() == "string" {
                    let raw = self.parsed.node_text(&arg);
                    let value = raw.trim_matches(|c| c == '"' || c == '\'');
                    if let Some(last) = value.rsplit('.').next() {
                        if !last.is_empty() && is_identifier(last) {
                            self.push(last.to_string(), ReferenceKind::StringRef, &arg, enclosing);
                        }
                    }
                }
            }
        }
    }

    /// Type annotations: identifiers are type-hint references; string
    /// literals are Pydantic-style forward references.
    fn walk_type_annotation(&mut self, node: Node<'_>, enclosing: Option<&str>) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match current.kind() {
                "identifier" => self.push(
                    self.parsed.node_text(&current),
                    ReferenceKind::TypeHint,
                    &current,
                    enclosing,
                ),
                "string" => {
                    let raw = self.parsed.node_text(&current);
                    let value = raw.trim_matches(|c| c == '"' || c == '\'').to_string();
                    if is_identifier(&value) {
                        self.push(value, ReferenceKind::TypeHint, &current, enclosing);
                    }
                }
                "call" => {
                    // Annotated[str, Depends(get_token)]
                    self.walk_call(current, None, enclosing);
                    continue;
                }
                _ => {
                    let mut cursor = current.walk();
                    for child in current.children(&mut cursor) {
                        stack.push(child);
                    }
                }
            }
        }
    }

    /// `if isinstance(v, T):` narrows `v` to `T` inside the consequence.
    fn walk_if(&mut self, node: Node<'_>, class_ctx: Option<&str>, enclosing: Option<&str>) {
        let narrowing = node
            .child_by_field_name("condition")
            .and_then(|cond| extract_isinstance(self.parsed, cond));

        if let Some(condition) = node.child_by_field_name("condition") {
            self.walk(condition, class_ctx, enclosing);
        }

        if let Some((var, ty)) = narrowing.clone() {
            self.narrowed.push((var, ty));
        }
        if let Some(consequence) = node.child_by_field_name("consequence") {
            self.walk(consequence, class_ctx, enclosing);
        }
        if narrowing.is_some() {
            self.narrowed.pop();
        }

        // elif/else chains appear as repeated alternative children
        let alternatives: Vec<Node<'_>> = {
            let mut cursor = node.walk();
            node.children_by_field_name("alternative", &mut cursor)
                .collect()
        };
        for alternative in alternatives {
            self.walk(alternative, class_ctx, enclosing);
        }
    }

    /// Class context for `receiver.member`: the enclosing class for
    /// `self`/`cls`, otherwise the registry type of the receiver variable
    /// (narrowed bindings take precedence).
    fn receiver_class(&self, attribute: Node<'_>, class_ctx: Option<&str>) -> Option<String> {
        let object = attribute.child_by_field_name("object")?;
        if object.kind() != "identifier" {
            return None;
        }
        let receiver = self.parsed.node_text(&object);
        if receiver == "self" || receiver == "cls" {
            return class_ctx.map(str::to_string);
        }
        for (var, ty) in self.narrowed.iter().rev() {
            if *var == receiver {
                return Some(ty.clone());
            }
        }
        self.var_types.get(&receiver).cloned()
    }
}

fn leftmost_identifier(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node;
    loop {
        match current.kind() {
            "identifier" => return Some(current),
            "attribute" => current = current.child_by_field_name("object")?,
            _ => return None,
        }
    }
}

fn extract_isinstance(parsed: &ParsedFile, node: Node<'_>) -> Option<(String, String)> {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == "call" {
            let func = current.child_by_field_name("function")?;
            if func.kind() == "identifier" && parsed.node_text(&func) == "isinstance" {
                let args = current.child_by_field_name("arguments")?;
                let mut actual = Vec::new();
                let mut cursor = args.walk();
                for arg in args.children(&mut cursor) {
                    if arg.kind() == "identifier" {
                        actual.push(parsed.node_text(&arg));
                    }
                }
                if actual.len() >= 2 {
                    return Some((actual[0].clone(), actual[1].clone()));
                }
                return None;
            }
        }
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            stack.push(child);
        }
    }
    None
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || if i == 0 { c.is_alphabetic() } else { c.is_alphanumeric() })
}
