use indexmap::IndexMap;

use crate::config::Comparison;
use crate::environment::Frame;
use crate::value::Value;

/// The bindings of one frame at one instant.
///
/// Values are shared with the frame, not duplicated: a list mutated in place
/// after the snapshot is mutated in the snapshot too.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    bindings: IndexMap<String, Value>,
}

impl Snapshot {
    pub fn of(frame: &Frame) -> Self {
        Snapshot {
            bindings: frame.bindings().clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Position of `name` in binding order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.bindings.get_index_of(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Compute what changed between `self` (before) and `after`.
    ///
    /// Added and changed names come out in `after`'s binding order, removed
    /// names in `self`'s.
    pub fn diff(&self, after: &Snapshot, comparison: Comparison) -> Delta {
        let mut entries = Vec::new();
        for (name, value) in &after.bindings {
            match self.bindings.get(name) {
                None => entries.push((name.clone(), BindingChange::Added)),
                Some(old) if differs(old, value, comparison) => {
                    entries.push((name.clone(), BindingChange::Changed))
                }
                Some(_) => {}
            }
        }
        for name in self.bindings.keys() {
            if !after.contains(name) {
                entries.push((name.clone(), BindingChange::Removed));
            }
        }
        Delta { entries }
    }
}

pub(crate) fn differs(old: &Value, new: &Value, comparison: Comparison) -> bool {
    match comparison {
        Comparison::Identity => !old.is(new),
        Comparison::Equality => old != new,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingChange {
    Added,
    Changed,
    Removed,
}

/// Names that differ between two snapshots of the same frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    entries: Vec<(String, BindingChange)>,
}

impl Delta {
    pub fn iter(&self) -> impl Iterator<Item = (&str, BindingChange)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), *c))
    }

    /// Names whose final value belongs in the namespace: added or changed.
    pub fn captured(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, c)| *c != BindingChange::Removed)
            .map(|(n, _)| n)
    }

    pub fn of_kind(&self, kind: BindingChange) -> impl Iterator<Item = &str> {
        self.iter().filter(move |(_, c)| *c == kind).map(|(n, _)| n)
    }

    pub fn change(&self, name: &str) -> Option<BindingChange> {
        self.iter().find(|(n, _)| *n == name).map(|(_, c)| c)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|(n, _)| keep(n));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    fn snap(env: &Environment) -> Snapshot {
        Snapshot::of(env.current_frame())
    }

    #[test]
    fn unrelated_names_are_not_in_the_delta() {
        let mut env = Environment::new();
        env.set("m", 1);
        let before = snap(&env);
        env.set("n", 2);
        let delta = before.diff(&snap(&env), Comparison::Identity);
        assert_eq!(delta.change("n"), Some(BindingChange::Added));
        assert_eq!(delta.change("m"), None);
        assert_eq!(delta.len(), 1);
    }

    #[test]
    fn in_place_mutation_keeps_identity() {
        let mut env = Environment::new();
        env.set("x", Value::list(vec![1.into()]));
        let before = snap(&env);
        env.get("x").unwrap().as_list().unwrap().borrow_mut().push(2.into());
        assert!(before.diff(&snap(&env), Comparison::Identity).is_empty());
        // The snapshot shares the list, so equality sees no change either.
        assert!(before.diff(&snap(&env), Comparison::Equality).is_empty());
    }

    #[test]
    fn equal_rebinding_depends_on_comparison() {
        let mut env = Environment::new();
        env.set("x", Value::list(vec![1.into()]));
        let before = snap(&env);
        env.set("x", Value::list(vec![1.into()]));
        let after = snap(&env);
        assert_eq!(
            before.diff(&after, Comparison::Identity).change("x"),
            Some(BindingChange::Changed)
        );
        assert!(before.diff(&after, Comparison::Equality).is_empty());
    }

    #[test]
    fn removed_names_are_reported_but_not_captured() {
        let mut env = Environment::new();
        env.set("a", 1);
        env.set("b", 2);
        let before = snap(&env);
        env.delete("a").unwrap();
        env.set("c", 3);
        env.set("b", 20);
        let delta = before.diff(&snap(&env), Comparison::Identity);
        assert_eq!(delta.captured().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(
            delta.of_kind(BindingChange::Removed).collect::<Vec<_>>(),
            vec!["a"]
        );
    }
}
