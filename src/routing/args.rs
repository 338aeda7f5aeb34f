//! Per-request argument map.

use std::collections::hash_map::{self, HashMap};

use crate::http::error::{HttpError, HttpResult};

/// String arguments collected for one request by the pre-hook, route
/// predicates and body parsers.
///
/// A fresh map is created for every dispatch. `insert` refuses to overwrite;
/// use `set` when replacing a value is intended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgMap {
    inner: HashMap<String, String>,
}

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new key. Fails with `DuplicateKey` if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> HttpResult<()> {
        match self.inner.entry(key.into()) {
            hash_map::Entry::Occupied(entry) => Err(HttpError::DuplicateKey(entry.key().clone())),
            hash_map::Entry::Vacant(entry) => {
                entry.insert(value.into());
                Ok(())
            }
        }
    }

    /// Add or replace a key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.inner.remove(key)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a ArgMap {
    type Item = (&'a String, &'a String);
    type IntoIter = hash_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut args = ArgMap::new();
        args.insert("id", "1").unwrap();
        let err = args.insert("id", "2").unwrap_err();
        assert!(matches!(err, HttpError::DuplicateKey(ref k) if k == "id"));
        assert_eq!(args.get("id"), Some("1"));
    }

    #[test]
    fn test_set_overwrites() {
        let mut args = ArgMap::new();
        args.set("file", "a.txt");
        args.set("file", "b.txt");
        assert_eq!(args.get("file"), Some("b.txt"));
        assert_eq!(args.len(), 1);
    }
}
