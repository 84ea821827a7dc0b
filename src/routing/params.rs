//! Captured route parameters.

use std::fmt;

/// Ordered set of route parameters captured while matching a request path.
///
/// Named segments (`:id`) are stored under their name; wildcards and other
/// unnamed captures use positional keys `"0"`, `"1"`, ... A key may be
/// present without a value when an optional segment did not match.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, Option<String>)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `name`, if the key is present and defined.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Returns true if `name` is present, defined or not.
    pub fn contains_key(&self, name: &str) -> bool {
        self.0.iter().any(|(key, _)| key == name)
    }

    /// Inserts or replaces `name`, keeping the position of an existing key.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    /// Number of consecutive positional keys starting at `"0"`.
    fn positional_run(&self) -> usize {
        let mut n = 0;
        while self.contains_key(&n.to_string()) {
            n += 1;
        }
        n
    }

    /// Merges the params captured by a nested layer with the params of the
    /// router that led to it.
    ///
    /// A value already defined by the parent is never replaced; the child only
    /// fills in keys the parent lacks or left undefined. When both sides carry
    /// positional captures, the child's positional keys are shifted past the
    /// parent's so both survive.
    pub fn merge_with_parent(self, parent: &Params) -> Params {
        if parent.is_empty() {
            return self;
        }

        let mut child = self;
        if child.contains_key("0") && parent.contains_key("0") {
            let offset = parent.positional_run();
            let run = child.positional_run();
            for (key, _) in child.0.iter_mut() {
                if let Ok(index) = key.parse::<usize>()
                    && index < run
                {
                    *key = (index + offset).to_string();
                }
            }
        }

        let mut merged = parent.clone();
        for (key, value) in child.0 {
            if merged.get(&key).is_none() {
                merged.insert(key, value);
            }
        }
        merged
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, Some(value.into()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_position() {
        let mut params = Params::new();
        params.insert("a", Some("1".into()));
        params.insert("b", None);
        params.insert("a", Some("2".into()));
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.get("a"), Some("2"));
        assert_eq!(params.get("b"), None);
        assert!(params.contains_key("b"));
    }

    #[test]
    fn merge_does_not_overwrite_defined_parent_values() {
        let parent: Params = [("user", "42")].into_iter().collect();
        let child: Params = [("user", "7"), ("post", "9")].into_iter().collect();

        let merged = child.merge_with_parent(&parent);
        assert_eq!(merged.get("user"), Some("42"));
        assert_eq!(merged.get("post"), Some("9"));
    }

    #[test]
    fn merge_fills_undefined_parent_values() {
        let mut parent = Params::new();
        parent.insert("format", None);
        let child: Params = [("format", "json")].into_iter().collect();

        let merged = child.merge_with_parent(&parent);
        assert_eq!(merged.get("format"), Some("json"));
    }

    #[test]
    fn merge_shifts_positional_keys() {
        let parent: Params = [("0", "a/b")].into_iter().collect();
        let child: Params = [("0", "c"), ("1", "d")].into_iter().collect();

        let merged = child.merge_with_parent(&parent);
        assert_eq!(merged.get("0"), Some("a/b"));
        assert_eq!(merged.get("1"), Some("c"));
        assert_eq!(merged.get("2"), Some("d"));
    }

    #[test]
    fn merge_with_empty_parent_is_identity() {
        let child: Params = [("id", "1")].into_iter().collect();
        assert_eq!(child.clone().merge_with_parent(&Params::new()), child);
    }
}
