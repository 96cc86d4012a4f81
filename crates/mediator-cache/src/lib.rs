//! Short-TTL lookup cache fronting the relational store. Advisory only —
//! the store is the only ground truth; every write here must be paired
//! with an invalidation of both the primary and inverse-index keys.

use moka::future::Cache;
use std::time::Duration;

/// Composite-key namespaces, mirroring the source's memcached key prefixes.
pub mod namespace {
    pub const AGENT_BY_DID: &str = "agents";
    pub const AGENT_BY_VERKEY: &str = "agents_verkeys";
    pub const ENDPOINT_BY_UID: &str = "endpoints";
    pub const ENDPOINT_BY_VERKEY: &str = "endpoints_verkeys";
    pub const ROUTING_KEY: &str = "routing_keys";
    pub const GLOBAL_SETTING: &str = "settings";
    pub const KV_ENTRY: &str = "kv";
}

pub fn key(ns: &str, id: &str) -> String {
    format!("{ns}:{id}")
}

#[derive(Clone)]
pub struct KvCache {
    inner: Cache<String, serde_json::Value>,
}

impl KvCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.get(key).await
    }

    pub async fn set(&self, key: &str, value: serde_json::Value) {
        self.inner.insert(key.to_owned(), value).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Invalidates both a primary key and its inverse-index key, as every
    /// Endpoint/Agent write must, to keep the forward and reverse lookups
    /// coherent.
    pub async fn invalidate_pair(&self, primary: &str, inverse: &str) {
        self.inner.invalidate(primary).await;
        self.inner.invalidate(inverse).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = KvCache::new(Duration::from_secs(30));
        let k = key(namespace::ENDPOINT_BY_UID, "uid-1");
        cache.set(&k, serde_json::json!({"uid": "uid-1"})).await;
        assert_eq!(
            cache.get(&k).await,
            Some(serde_json::json!({"uid": "uid-1"}))
        );
    }

    #[tokio::test]
    async fn invalidate_pair_clears_both_forward_and_inverse_keys() {
        let cache = KvCache::new(Duration::from_secs(30));
        let forward = key(namespace::ENDPOINT_BY_UID, "uid-1");
        let inverse = key(namespace::ENDPOINT_BY_VERKEY, "vk-1");
        cache.set(&forward, serde_json::json!({"uid": "uid-1"})).await;
        cache.set(&inverse, serde_json::json!({"uid": "uid-1"})).await;

        cache.invalidate_pair(&forward, &inverse).await;

        assert_eq!(cache.get(&forward).await, None);
        assert_eq!(cache.get(&inverse).await, None);
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = KvCache::new(Duration::from_secs(30));
        assert_eq!(cache.get("missing").await, None);
    }
}
