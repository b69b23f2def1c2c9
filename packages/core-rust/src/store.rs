//! Request-local key/value store.
//!
//! A string-keyed, type-erased map carried in the request's extensions so
//! that handlers can fetch values (the request logger, propagated claims)
//! synchronously without threading the context through. Lookup is by key and
//! type: a value stored under `k` as `T` is only returned by `get::<T>(k)`.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct RequestStore {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl RequestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn set<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Returns the value under `key` if it exists and has type `T`.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for RequestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("RequestStore").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn get_requires_matching_type() {
        let mut store = RequestStore::new();
        store.set("user", json!("ana"));

        assert_eq!(store.get::<serde_json::Value>("user"), Some(&json!("ana")));
        assert!(store.get::<String>("user").is_none());
        assert!(store.get::<serde_json::Value>("missing").is_none());
    }

    #[test]
    fn set_replaces_previous_value() {
        let mut store = RequestStore::new();
        store.set("n", 1_u32);
        store.set("n", "two".to_string());

        assert_eq!(store.len(), 1);
        assert!(store.get::<u32>("n").is_none());
        assert_eq!(store.get::<String>("n").map(String::as_str), Some("two"));
    }

    #[test]
    fn clones_share_values_but_not_keys() {
        let mut store = RequestStore::new();
        store.set("a", 1_i64);
        let mut copy = store.clone();
        copy.set("b", 2_i64);

        assert!(!store.contains_key("b"));
        assert_eq!(copy.get::<i64>("a"), Some(&1));
    }

    #[test]
    fn remove_reports_presence() {
        let mut store = RequestStore::new();
        store.set("k", ());
        assert!(store.remove("k"));
        assert!(!store.remove("k"));
        assert!(store.is_empty());
    }

    #[test]
    fn debug_lists_sorted_keys() {
        let mut store = RequestStore::new();
        store.set("zeta", 0_u8);
        store.set("alpha", 0_u8);
        assert_eq!(format!("{store:?}"), r#"RequestStore { keys: ["alpha", "zeta"] }"#);
    }
}
