//! Class inheritance map.
//!
//! Bidirectional hierarchy derived from `base_classes`, plus a method-family
//! index. The inheritance shield walks descendants only: a reference to
//! `B.m` protects every override of `m` below `B`, never above it.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::shared::models::SymbolId;

#[derive(Debug, Default)]
pub struct InheritanceMap {
    /// class → direct parents
    parents: FxHashMap<String, Vec<String>>,
    /// class → direct children
    children: FxHashMap<String, Vec<String>>,
    /// (class, method) → symbol ids of its implementations
    methods: FxHashMap<(String, String), Vec<SymbolId>>,
}

impl InheritanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class_name: &str, base_classes: &[String]) {
        if base_classes.is_empty() {
            return;
        }
        self.parents
            .insert(class_name.to_string(), base_classes.to_vec());
        for base in base_classes {
            self.children
                .entry(base.clone())
                .or_default()
                .push(class_name.to_string());
        }
    }

    pub fn add_method(&mut self, class_name: &str, method_name: &str, symbol_id: SymbolId) {
        self.methods
            .entry((class_name.to_string(), method_name.to_string()))
            .or_default()
            .push(symbol_id);
    }

    pub fn parents_of(&self, class_name: &str) -> &[String] {
        self.parents
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// True when `ancestor` is reachable upward from `class_name`.
    pub fn is_descendant_of(&self, class_name: &str, ancestor: &str) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![class_name];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for parent in self.parents_of(current) {
                if parent == ancestor {
                    return true;
                }
                stack.push(parent);
            }
        }
        false
    }

    /// Overrides of `method_name` on `class_name` and every class below it.
    /// Cycle-safe: each class is visited once.
    pub fn descendant_overrides(&self, class_name: &str, method_name: &str) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack = vec![class_name.to_string()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(ids) = self.methods.get(&(current.clone(), method_name.to_string())) {
                out.extend(ids.iter().cloned());
            }
            if let Some(children) = self.children.get(&current) {
                stack.extend(children.iter().cloned());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(file: &str, qualified: &str) -> SymbolId {
        SymbolId(format!("{}::{}", file, qualified))
    }

    #[test]
    fn test_descendant_overrides() {
        let mut map = InheritanceMap::new();
        map.add_class("Child", &["Base".to_string()]);
        map.add_class("GrandChild", &["Child".to_string()]);
        map.add_method("Base", "run", id("a.py", "Base.run"));
        map.add_method("Child", "run", id("a.py", "Child.run"));
        map.add_method("GrandChild", "run", id("a.py", "GrandChild.run"));

        let family = map.descendant_overrides("Base", "run");
        assert_eq!(family.len(), 3);

        // downward only: asking from Child must not include Base.run
        let from_child = map.descendant_overrides("Child", "run");
        assert_eq!(from_child.len(), 2);
        assert!(!from_child.contains(&id("a.py", "Base.run")));
    }

    #[test]
    fn test_is_descendant_of() {
        let mut map = InheritanceMap::new();
        map.add_class("Child", &["Base".to_string()]);
        map.add_class("GrandChild", &["Child".to_string()]);

        assert!(map.is_descendant_of("GrandChild", "Base"));
        assert!(map.is_descendant_of("Child", "Base"));
        assert!(!map.is_descendant_of("Base", "Child"));
    }

    #[test]
    fn test_inheritance_cycle_terminates() {
        let mut map = InheritanceMap::new();
        map.add_class("A", &["B".to_string()]);
        map.add_class("B", &["A".to_string()]);
        map.add_method("A", "m", id("x.py", "A.m"));
        map.add_method("B", "m", id("x.py", "B.m"));

        let family = map.descendant_overrides("A", "m");
        assert_eq!(family.len(), 2);
        assert!(!map.is_descendant_of("A", "C"));
    }
}
