//! Wisdom registry: framework-aware symbol immortality rules.
//!
//! Rule packs are JSON files in one of three shapes (immortality rules,
//! meta patterns, framework-keyed marker sets), grouped into a community
//! tier that is always loaded and an optional premium tier. `is_immortal`
//! resolves in a fixed order and the first match wins.
//!
//! Substring scans (decorator patterns and syntax markers) run on a
//! multi-pattern Aho-Corasick automaton built once at load; exact, prefix
//! and suffix checks run on plain tables.

use std::path::Path;

use aho_corasick::AhoCorasick;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shared::models::is_dunder_name;

const COMMUNITY_PACKS: &[(&str, &str)] = &[
    (
        "python_frameworks.json",
        include_str!("../../../rules/community/python_frameworks.json"),
    ),
    (
        "python_meta.json",
        include_str!("../../../rules/community/python_meta.json"),
    ),
    (
        "js_frameworks.json",
        include_str!("../../../rules/community/js_frameworks.json"),
    ),
];

/// Licensing tier a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleTier {
    Community,
    Premium,
}

/// Why a symbol is immortal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmortalReason {
    pub reason: String,
    pub framework: String,
    pub tier: RuleTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchType {
    Exact,
    Prefix,
    Suffix,
    Decorator,
    Syntax,
}

#[derive(Debug, Clone)]
struct NormalizedRule {
    pattern: String,
    match_type: MatchType,
    framework: String,
    tier: RuleTier,
}

#[derive(Default)]
struct LookupTables {
    exact: FxHashMap<String, (String, RuleTier)>,
    prefix: Vec<(String, String, RuleTier)>,
    suffix: Vec<(String, String, RuleTier)>,
    decorator: Option<AhoCorasick>,
    decorator_meta: Vec<(String, String, RuleTier)>,
    syntax: Option<AhoCorasick>,
    syntax_meta: Vec<(String, String, RuleTier)>,
}

impl LookupTables {
    fn build(rules: &[NormalizedRule]) -> Self {
        let mut tables = LookupTables::default();
        let mut decorator_patterns = Vec::new();
        let mut syntax_patterns = Vec::new();

        for rule in rules {
            let meta = (rule.pattern.clone(), rule.framework.clone(), rule.tier);
            match rule.match_type {
                MatchType::Exact => {
                    tables
                        .exact
                        .insert(rule.pattern.clone(), (rule.framework.clone(), rule.tier));
                }
                MatchType::Prefix => tables.prefix.push(meta),
                MatchType::Suffix => tables.suffix.push(meta),
                MatchType::Decorator => {
                    decorator_patterns.push(rule.pattern.clone());
                    tables.decorator_meta.push(meta);
                }
                MatchType::Syntax => {
                    syntax_patterns.push(rule.pattern.clone());
                    tables.syntax_meta.push(meta);
                }
            }
        }

        if !decorator_patterns.is_empty() {
            tables.decorator = AhoCorasick::new(&decorator_patterns).ok();
        }
        if !syntax_patterns.is_empty() {
            tables.syntax = AhoCorasick::new(&syntax_patterns).ok();
        }
        tables
    }
}

/// Loads rule packs and answers immortality queries.
pub struct WisdomRegistry {
    python: LookupTables,
    js: LookupTables,
    community_rules: usize,
    premium_rules: usize,
}

impl WisdomRegistry {
    /// Embedded community packs only.
    pub fn with_defaults() -> Self {
        Self::build(None)
    }

    /// Embedded community packs plus premium packs from `rules_dir/premium/`
    /// when that directory exists.
    pub fn with_rules_dir(rules_dir: &Path) -> Self {
        Self::build(Some(rules_dir))
    }

    fn build(rules_dir: Option<&Path>) -> Self {
        let mut python_rules = Vec::new();
        let mut js_rules = Vec::new();
        let mut community_rules = 0;
        let mut premium_rules = 0;

        for (name, content) in COMMUNITY_PACKS {
            match serde_json::from_str::<Value>(content) {
                Ok(data) => {
                    community_rules += load_pack(
                        &data,
                        RuleTier::Community,
                        &mut python_rules,
                        &mut js_rules,
                    );
                }
                Err(err) => tracing::warn!(pack = name, %err, "embedded rule pack unreadable"),
            }
        }

        if let Some(dir) = rules_dir {
            // An on-disk community dir layers on top of the embedded packs.
            community_rules += load_pack_dir(
                &dir.join("community"),
                RuleTier::Community,
                &mut python_rules,
                &mut js_rules,
            );
            premium_rules += load_pack_dir(
                &dir.join("premium"),
                RuleTier::Premium,
                &mut python_rules,
                &mut js_rules,
            );
        }

        Self {
            python: LookupTables::build(&python_rules),
            js: LookupTables::build(&js_rules),
            community_rules,
            premium_rules,
        }
    }

    pub fn has_premium(&self) -> bool {
        self.premium_rules > 0
    }

    pub fn rule_counts(&self) -> (usize, usize) {
        (self.community_rules, self.premium_rules)
    }

    /// First-match-wins immortality check.
    ///
    /// Resolution order: exact name → prefix (including the segment after
    /// the last `.`) → decorator substring → suffix on a decorator line →
    /// syntax marker → dunder → property/staticmethod/classmethod.
    pub fn is_immortal(&self, name: &str, text: &str, language: &str) -> Option<ImmortalReason> {
        match language {
            "python" => self.check_python(name, text),
            "javascript" | "typescript" => self.check_js(name, text),
            _ => None,
        }
    }

    fn check_python(&self, name: &str, text: &str) -> Option<ImmortalReason> {
        let tables = &self.python;

        if let Some((framework, tier)) = tables.exact.get(name) {
            return Some(reason(format!("Exact match: {}", name), framework, *tier));
        }

        let simple = name.rsplit('.').next().unwrap_or(name);
        for (prefix, framework, tier) in &tables.prefix {
            if name.starts_with(prefix.as_str()) || simple.starts_with(prefix.as_str()) {
                return Some(reason(format!("Prefix match: {}", prefix), framework, *tier));
            }
        }

        if let Some(ac) = &tables.decorator {
            if let Some(hit) = ac.find(text) {
                let (pattern, framework, tier) = &tables.decorator_meta[hit.pattern().as_usize()];
                return Some(reason(format!("Decorator: {}", pattern), framework, *tier));
            }
        }

        for (suffix, framework, tier) in &tables.suffix {
            for line in text.lines() {
                let trimmed = line.trim();
                if trimmed.starts_with('@') && trimmed.ends_with(suffix.as_str()) {
                    return Some(reason(format!("Suffix match: {}", suffix), framework, *tier));
                }
            }
            // Suffix tables also apply to the symbol name itself.
            if simple.ends_with(suffix.as_str()) {
                return Some(reason(format!("Suffix match: {}", suffix), framework, *tier));
            }
        }

        if let Some(ac) = &tables.syntax {
            if let Some(hit) = ac.find(text) {
                let (pattern, framework, tier) = &tables.syntax_meta[hit.pattern().as_usize()];
                return Some(reason(format!("Syntax marker: {}", pattern), framework, *tier));
            }
        }

        if is_dunder_name(simple) {
            return Some(reason("Dunder method", "Python", RuleTier::Community));
        }

        if text.contains("@property") || text.contains("@staticmethod") || text.contains("@classmethod")
        {
            return Some(reason("Property/class method", "Python", RuleTier::Community));
        }

        None
    }

    fn check_js(&self, name: &str, text: &str) -> Option<ImmortalReason> {
        let tables = &self.js;

        if let Some((framework, tier)) = tables.exact.get(name) {
            return Some(reason(format!("Exact match: {}", name), framework, *tier));
        }

        for (suffix, framework, tier) in &tables.suffix {
            if name.ends_with(suffix.as_str()) {
                return Some(reason(format!("Suffix match: {}", suffix), framework, *tier));
            }
        }

        if let Some(ac) = &tables.syntax {
            if let Some(hit) = ac.find(text) {
                let (pattern, framework, tier) = &tables.syntax_meta[hit.pattern().as_usize()];
                return Some(reason(format!("Syntax marker: {}", pattern), framework, *tier));
            }
        }

        if text.contains("export default") || text.contains("export {") || text.contains("module.exports")
        {
            return Some(reason("Export statement", "JavaScript", RuleTier::Community));
        }

        None
    }
}

impl Default for WisdomRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn reason(text: impl Into<String>, framework: &str, tier: RuleTier) -> ImmortalReason {
    ImmortalReason {
        reason: text.into(),
        framework: framework.to_string(),
        tier,
    }
}

/// Load every `*.json` pack in a directory. Malformed packs are skipped with
/// a warning, never fatal.
fn load_pack_dir(
    dir: &Path,
    tier: RuleTier,
    python: &mut Vec<NormalizedRule>,
    js: &mut Vec<NormalizedRule>,
) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut loaded = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(data) => loaded += load_pack(&data, tier, python, js),
            Err(err) => {
                tracing::warn!(pack = %path.display(), %err, "skipping malformed rule pack")
            }
        }
    }
    loaded
}

/// Dispatch one parsed pack to the loader for its shape. Returns the number
/// of rules loaded.
fn load_pack(
    data: &Value,
    tier: RuleTier,
    python: &mut Vec<NormalizedRule>,
    js: &mut Vec<NormalizedRule>,
) -> usize {
    let Some(object) = data.as_object() else {
        tracing::warn!("rule pack is not a JSON object, skipping");
        return 0;
    };

    if object.contains_key("immortality_rules") {
        load_immortality_rules(object, tier, python)
    } else if object.contains_key("exact_matches") || object.contains_key("suffix_matches") {
        load_meta_patterns(object, tier, python)
    } else {
        load_framework_keyed(object, tier, js)
    }
}

fn load_immortality_rules(
    object: &serde_json::Map<String, Value>,
    tier: RuleTier,
    out: &mut Vec<NormalizedRule>,
) -> usize {
    let mut count = 0;
    let Some(rules) = object.get("immortality_rules").and_then(Value::as_array) else {
        return 0;
    };
    for rule in rules {
        let framework = rule
            .get("framework")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        for pattern in string_list(rule.get("patterns")) {
            let match_type = if pattern.starts_with('@') {
                MatchType::Decorator
            } else {
                MatchType::Syntax
            };
            out.push(NormalizedRule {
                pattern,
                match_type,
                framework: framework.clone(),
                tier,
            });
            count += 1;
        }
    }
    count
}

fn load_meta_patterns(
    object: &serde_json::Map<String, Value>,
    tier: RuleTier,
    out: &mut Vec<NormalizedRule>,
) -> usize {
    let mut count = 0;
    let groups = [
        ("exact_matches", MatchType::Exact),
        ("prefix_matches", MatchType::Prefix),
        ("suffix_matches", MatchType::Suffix),
        ("syntax_markers", MatchType::Syntax),
    ];
    for (key, match_type) in groups {
        for pattern in string_list(object.get(key)) {
            out.push(NormalizedRule {
                pattern,
                match_type,
                framework: "Meta".to_string(),
                tier,
            });
            count += 1;
        }
    }
    count
}

fn load_framework_keyed(
    object: &serde_json::Map<String, Value>,
    tier: RuleTier,
    out: &mut Vec<NormalizedRule>,
) -> usize {
    let mut count = 0;
    for (framework, rules) in object {
        let Some(rules) = rules.as_object() else {
            continue;
        };
        for pattern in string_list(rules.get("syntax_markers")) {
            out.push(NormalizedRule {
                pattern,
                match_type: MatchType::Syntax,
                framework: framework.clone(),
                tier,
            });
            count += 1;
        }
    }
    count
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
