//! TTL-based cache of raw SIS API responses.
//!
//! Entries are keyed by a canonical fingerprint of the request (URL plus
//! sorted parameter set) so logically identical requests hit the same entry
//! regardless of parameter insertion order.  An entry older than its TTL is
//! treated as absent, never returned stale.  Only well-formed successful
//! bodies with a non-empty `data` payload are ever written, which keeps
//! error responses from poisoning the cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

/// Default TTL for the short-lived cache (volatile listings).
pub const SHORT_TTL: Duration = Duration::from_secs(20 * 60);

/// Default TTL for the long-lived cache (terms, subjects, courses).
pub const LONG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Compute the canonical fingerprint for a request.
///
/// Parameters are sorted by key, then value, before hashing; two logically
/// identical parameter sets therefore always map to the same entry.
pub fn fingerprint(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    for (key, value) in sorted {
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

struct CacheEntry {
    body: String,
    written_at: Instant,
}

/// Keyed, TTL-based store of raw response bodies.
pub struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a cached body, treating anything older than the TTL as
    /// absent.  Stale entries found during lookup are purged.
    pub async fn get(&self, fingerprint: &str) -> Option<String> {
        self.get_at(fingerprint, Instant::now()).await
    }

    async fn get_at(&self, fingerprint: &str, now: Instant) -> Option<String> {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| now.saturating_duration_since(entry.written_at) < ttl);
        entries.get(fingerprint).map(|entry| entry.body.clone())
    }

    /// Store a response body if, and only if, it is a well-formed successful
    /// response carrying non-empty data.  Error bodies, empty bodies, and
    /// unparseable payloads are silently dropped.
    pub async fn set(&self, fingerprint: &str, body: &str) {
        if !is_cacheable(body) {
            debug!("refusing to cache response without a data payload");
            return;
        }
        let mut entries = self.entries.write().await;
        entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                body: body.to_string(),
                written_at: Instant::now(),
            },
        );
    }

    /// Drop every entry.  Invoked whenever the access token changes, since
    /// cached responses are scoped to the token that fetched them.
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    /// Number of live entries (stale entries still count until purged).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache currently holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// A body is cacheable when it parses as JSON and carries a non-empty
/// `data` payload.
fn is_cacheable(body: &str) -> bool {
    if body.is_empty() {
        return false;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    match value.get("data") {
        Some(serde_json::Value::Null) | None => false,
        Some(serde_json::Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = fingerprint("/terms", &params(&[("limit", "100"), ("offset", "0")]));
        let b = fingerprint("/terms", &params(&[("offset", "0"), ("limit", "100")]));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_values_and_urls() {
        let base = fingerprint("/terms", &params(&[("offset", "0")]));
        assert_ne!(
            base,
            fingerprint("/terms", &params(&[("offset", "100")]))
        );
        assert_ne!(base, fingerprint("/courses", &params(&[("offset", "0")])));
    }

    #[tokio::test]
    async fn entry_retrievable_before_ttl_absent_after() {
        let cache = ResponseCache::new(Duration::from_millis(120));
        let key = fingerprint("/terms", &[]);
        cache.set(&key, r#"{"data":[{"id":"T1"}]}"#).await;

        assert!(cache.get(&key).await.is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.get(&key).await.is_none());
        // The stale entry was purged during lookup, not merely hidden.
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn error_and_empty_payloads_are_never_cached() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let key = fingerprint("/terms", &[]);

        cache.set(&key, r#"{"error":"no such resource"}"#).await;
        assert!(cache.get(&key).await.is_none());

        cache.set(&key, r#"{"data":[]}"#).await;
        assert!(cache.get(&key).await.is_none());

        cache.set(&key, "").await;
        assert!(cache.get(&key).await.is_none());

        cache.set(&key, "<html>gateway timeout</html>").await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_entry() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set("a", r#"{"data":[1]}"#).await;
        cache.set("b", r#"{"data":[2]}"#).await;
        assert_eq!(cache.len().await, 2);

        cache.invalidate_all().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn single_object_data_is_cacheable() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set("course", r#"{"data":{"id":"C1"}}"#).await;
        assert!(cache.get("course").await.is_some());
    }
}
