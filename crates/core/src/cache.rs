//! Revalidation cache for remote fetches.
//!
//! One entry per `(operation, normalized parameters)` key, holding the last full
//! response body (already parsed) and its revalidation token (ETag). Shared
//! across calls; concurrent writers for the same key resolve last-writer-wins.
//! Entries are never evicted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub operation: String,
    /// Parameters rendered as `k=v` pairs in key order.
    pub params: String,
}

impl CacheKey {
    pub fn new<K, V>(operation: &str, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let sorted: BTreeMap<String, String> =
            params.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let params = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        CacheKey { operation: operation.to_string(), params }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub revalidation_token: Option<String>,
    pub body: Value,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RevalidationCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl RevalidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Token to send as `If-None-Match`, if this key has been fetched before.
    pub fn revalidation_token(&self, key: &CacheKey) -> Option<String> {
        self.entries.get(key).and_then(|e| e.revalidation_token.clone())
    }

    /// Record a full (non-304) response, replacing any previous entry.
    pub fn store(&self, key: CacheKey, revalidation_token: Option<String>, body: Value) {
        debug!(
            operation = key.operation.as_str(),
            params = key.params.as_str(),
            has_token = revalidation_token.is_some(),
            "Cache store"
        );
        self.entries.insert(key, CacheEntry { revalidation_token, body, cached_at: Utc::now() });
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
    use serde_json::json;

    #[test]
    fn key_is_order_independent() {
        let a = CacheKey::new("pr.list", [("state", "open"), ("repo", "o/n")]);
        let b = CacheKey::new("pr.list", [("repo", "o/n"), ("state", "open")]);
        assert_eq!(a, b);
        assert_eq!(a.params, "repo=o/n&state=open");
        assert_ne!(a, CacheKey::new("issue.list", [("repo", "o/n"), ("state", "open")]));
    }

    #[test]
    fn store_overwrites_previous_entry() {
        let cache = RevalidationCache::new();
        let key = CacheKey::new("pr.files", [("number", "1")]);
        assert!(cache.get(&key).is_none());
        assert!(cache.revalidation_token(&key).is_none());

        cache.store(key.clone(), Some("\"e1\"".into()), json!([1]));
        assert_eq!(cache.revalidation_token(&key).as_deref(), Some("\"e1\""));

        cache.store(key.clone(), None, json!([2]));
        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.body, json!([2]));
        assert!(entry.revalidation_token.is_none());
        assert_eq!(cache.len(), 1);
    }
}
