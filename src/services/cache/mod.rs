use crate::config::CacheTtlConfig;
use crate::error::Result;
use crate::models::{Algorithm, TrendingPeriod};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Byte-level cache contract. Implementations store opaque values under
/// string keys with a per-entry TTL; serialization stays with the caller.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Removes every key matching a `*`-wildcard pattern, returning how many
    /// were dropped.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64>;
}

pub struct RedisCacheStore {
    client: Arc<redis::Client>,
}

impl RedisCacheStore {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.client.get_async_connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.client.get_async_connection().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }
}

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process store for tests and single-node deployments. Expired entries
/// are dropped lazily on read.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let entry = MemoryEntry {
            value,
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|e| pattern_matches(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0;
        for key in matching {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// `*`-wildcard matcher covering the same pattern shapes the Redis KEYS
/// calls use. No `?` or character classes.
fn pattern_matches(pattern: &str, key: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == key;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !key.starts_with(first) {
        return false;
    }
    let mut rest = &key[first.len()..];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Cache-aside layer over a pluggable byte store. Failures here are
/// advisory: a broken cache degrades reads to a miss and writes to a no-op,
/// never to a failed request.
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    ttl: CacheTtlConfig,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn CacheStore>, ttl: CacheTtlConfig) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> &CacheTtlConfig {
        &self.ttl
    }

    pub fn user_rec_key(user_id: Uuid, algorithm: Algorithm) -> String {
        format!("user_rec:{}:{}", user_id, algorithm.as_str())
    }

    pub fn product_sim_key(product_id: Uuid) -> String {
        format!("product_sim:{}", product_id)
    }

    pub fn trending_key(category: Option<&str>, period: TrendingPeriod, limit: usize) -> String {
        format!(
            "trending:{}:{}:{}",
            category.unwrap_or("all"),
            period.as_str(),
            limit
        )
    }

    pub fn popular_key(category: Option<&str>, limit: usize) -> String {
        format!("popular:{}:{}", category.unwrap_or("all"), limit)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("cache read for {} failed: {}", key, e);
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let bytes = match serde_json::to_vec(value) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("cache encode for {} failed: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(key, bytes, ttl_secs).await {
            tracing::warn!("cache write for {} failed: {}", key, e);
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::warn!("cache delete for {} failed: {}", key, e);
        }
    }

    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        match self.store.delete_by_pattern(pattern).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("cache pattern delete for {} failed: {}", pattern, e);
                0
            }
        }
    }

    /// Drops all cached recommendation lists for one user, any algorithm.
    pub async fn invalidate_user(&self, user_id: Uuid) {
        self.invalidate_pattern(&format!("user_rec:{}:*", user_id))
            .await;
    }

    pub async fn invalidate_product_similarity(&self, product_id: Uuid) {
        self.invalidate(&Self::product_sim_key(product_id)).await;
    }

    /// Round-trips a probe key so health checks can report cache state.
    pub async fn health_probe(&self) -> bool {
        let key = "health:probe";
        if self.store.set(key, b"ok".to_vec(), 10).await.is_err() {
            return false;
        }
        let ok = matches!(self.store.get(key).await, Ok(Some(_)));
        if let Err(e) = self.store.delete(key).await {
            tracing::warn!("health probe cleanup failed: {}", e);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_patterns() {
        assert!(pattern_matches("user_rec:abc:*", "user_rec:abc:hybrid"));
        assert!(pattern_matches("user_rec:*", "user_rec:abc:hybrid"));
        assert!(!pattern_matches("user_rec:abc:*", "user_rec:xyz:hybrid"));
        assert!(pattern_matches("*:hybrid", "user_rec:abc:hybrid"));
        assert!(!pattern_matches("*:hybrid", "user_rec:abc:popularity"));
        assert!(pattern_matches("a*b*c", "a_b_c"));
        assert!(pattern_matches("a*bc", "axbcbc"));
        assert!(!pattern_matches("ab*ba", "aba"));
    }

    #[test]
    fn exact_patterns() {
        assert!(pattern_matches("product_sim:1", "product_sim:1"));
        assert!(!pattern_matches("product_sim:1", "product_sim:12"));
    }

    #[test]
    fn key_builders() {
        let user = Uuid::nil();
        assert_eq!(
            CacheLayer::user_rec_key(user, Algorithm::Hybrid),
            format!("user_rec:{}:hybrid", user)
        );
        assert_eq!(
            CacheLayer::trending_key(Some("books"), TrendingPeriod::Week, 10),
            "trending:books:week:10"
        );
        assert_eq!(CacheLayer::popular_key(None, 5), "popular:all:5");
    }
}
