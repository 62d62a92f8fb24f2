// Module: Context
// Run-scoped cache of extracted values and `${key}` substitution.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^{}]+)\}").expect("valid placeholder regex"));

/// Holds the values extracted during one scenario run.
///
/// Owned by the scenario runner and handed to handlers by `&mut`; dropped
/// together with the run, never persisted.
#[derive(Debug, Default, Clone)]
pub struct ValueCache {
    values: HashMap<String, String>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores (or overwrites) a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the cached value, or the literal `${key}` when absent.
    pub fn get(&self, key: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| format!("${{{}}}", key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replaces every `${key}` in `text` with its cached value.
    ///
    /// Single pass: replaced values are not scanned again, and placeholders
    /// without a cached value stay verbatim.
    pub fn substitute(&self, text: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures| self.get(&caps[1]))
            .into_owned()
    }

    /// True if `text` carries at least one `${...}` placeholder.
    pub fn has_placeholder(text: &str) -> bool {
        PLACEHOLDER_RE.is_match(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_returns_placeholder() {
        let cache = ValueCache::new();
        assert_eq!(cache.get("order_id"), "${order_id}");
    }

    #[test]
    fn test_substitute_known_and_unknown() {
        let mut cache = ValueCache::new();
        cache.set("x", "42");
        assert_eq!(cache.substitute("${x}"), "42");
        assert_eq!(cache.substitute("${y}"), "${y}");
        assert_eq!(cache.substitute("id=${x}, other=${y}"), "id=42, other=${y}");
    }

    #[test]
    fn test_substitute_is_not_recursive() {
        let mut cache = ValueCache::new();
        cache.set("a", "${b}");
        cache.set("b", "boom");
        assert_eq!(cache.substitute("${a}"), "${b}");
    }

    #[test]
    fn test_set_overwrites() {
        let mut cache = ValueCache::new();
        cache.set("total", "10");
        cache.set("total", "11");
        assert_eq!(cache.get("total"), "11");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keys_with_spaces_and_dots() {
        let mut cache = ValueCache::new();
        cache.set("step_4_Get_Total", "99.50");
        cache.set("po.number", "PO-1");
        assert_eq!(cache.substitute("${step_4_Get_Total} / ${po.number}"), "99.50 / PO-1");
    }

    #[test]
    fn test_has_placeholder() {
        assert!(ValueCache::has_placeholder("type ${name}"));
        assert!(!ValueCache::has_placeholder("type $name"));
        assert!(!ValueCache::has_placeholder("${}"));
    }
}
