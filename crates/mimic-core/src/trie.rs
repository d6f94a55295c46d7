//! Character trie over dot-delimited principal names.
//!
//! Supports exact rules (`com.vendor.app`) and trailing-wildcard rules
//! (`com.vendor.*`). A lookup returns the most specific value: an exact
//! terminal match wins over any wildcard, and among wildcards the longest
//! matching prefix wins. Absence of a match is `None`, never an error.
//!
//! A trie is built once per rule-file reload and then published immutably;
//! it is never mutated concurrently with reads.

use std::collections::HashMap;

struct Node<T> {
    children: HashMap<char, Node<T>>,
    value: Option<T>,
    wildcard: Option<T>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            value: None,
            wildcard: None,
        }
    }
}

/// Prefix/wildcard rule set keyed by opaque character sequences.
///
/// Rules are case-sensitive; a node may hold an exact value and a wildcard
/// value simultaneously (`a.b` and `a.b.*` both present).
pub struct RuleTrie<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for RuleTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RuleTrie<T> {
    pub fn new() -> Self {
        Self {
            root: Node::new(),
            len: 0,
        }
    }

    /// Insert a rule. A trailing `*` marks a wildcard-prefix rule: the
    /// marker is stripped and the value stored as the wildcard value at the
    /// end of the remaining prefix.
    pub fn add(&mut self, rule: &str, value: T) {
        self.len += 1;
        let (effective, is_wildcard) = match rule.strip_suffix('*') {
            Some(prefix) => (prefix, true),
            None => (rule, false),
        };

        let mut node = &mut self.root;
        for ch in effective.chars() {
            node = node.children.entry(ch).or_insert_with(Node::new);
        }

        if is_wildcard {
            node.wildcard = Some(value);
        } else {
            node.value = Some(value);
        }
    }

    /// Walk `name` from the root, returning the most specific match.
    ///
    /// Every wildcard value passed on the way down is recorded as the
    /// current best candidate (deeper overwrites shallower). The walk stops
    /// at the first missing child; a fully consumed name prefers the exact
    /// value at the final node over any recorded wildcard.
    pub fn get(&self, name: &str) -> Option<&T> {
        let mut node = &self.root;
        let mut best = node.wildcard.as_ref();

        for ch in name.chars() {
            match node.children.get(&ch) {
                Some(next) => {
                    node = next;
                    if node.wildcard.is_some() {
                        best = node.wildcard.as_ref();
                    }
                }
                None => return best,
            }
        }
        node.value.as_ref().or(best)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of rules added (duplicates counted).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
