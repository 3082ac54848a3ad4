//! Per-pool response cache
//!
//! Keys fold in the request line and the identity headers that change
//! what a server returns (Accept, Accept-Language, User-Agent), hashed to
//! a 128-bit digest. Only plainly cacheable GET 200s are stored; TTL
//! comes from Cache-Control, then Expires, then content-type defaults.
//! Eviction is LRU under a byte cap shared by the whole pool.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Content types that are never cached (live or session-coupled data).
const UNCACHEABLE_TYPES: &[&str] = &[
    "text/event-stream",
    "application/json",
    "application/x-ndjson",
];

/// Identity headers folded into every cache key for one context.
#[derive(Debug, Clone)]
pub struct CacheKeySource {
    pub accept: String,
    pub accept_language: String,
    pub user_agent: String,
}

impl CacheKeySource {
    /// 128-bit key over method, origin, path, query and the identity
    /// headers.
    pub fn key(&self, method: &str, url: &str) -> String {
        let (origin, path, query) = match Url::parse(url) {
            Ok(parsed) => (
                format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or_default()),
                parsed.path().to_string(),
                parsed.query().unwrap_or_default().to_string(),
            ),
            Err(_) => (url.to_string(), String::new(), String::new()),
        };
        let material = format!(
            "{method}|{origin}|{path}|{query}|{}|{}|{}",
            self.accept, self.accept_language, self.user_agent
        );
        let digest = blake3::hash(material.as_bytes());
        hex::encode(&digest.as_bytes()[..16])
    }
}

/// One stored response
pub struct CacheEntry {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    stored_at: Instant,
    ttl: Duration,
    last_access: AtomicU64,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }

    pub fn size(&self) -> u64 {
        self.body.len() as u64
            + self
                .headers
                .iter()
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum::<u64>()
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// LRU response cache with a pool-wide byte cap
pub struct ResponseCache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    capacity_bytes: u64,
    size_bytes: AtomicU64,
    access_clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    pub fn new(capacity_mb: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity_bytes: capacity_mb * 1024 * 1024,
            size_bytes: AtomicU64::new(0),
            access_clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Unexpired entry for a key; expired entries read as misses and are
    /// dropped lazily.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let entry = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.get(key).cloned()
        };
        match entry {
            Some(entry) if !entry.is_expired() => {
                entry.last_access.store(
                    self.access_clock.fetch_add(1, Ordering::Relaxed),
                    Ordering::Relaxed,
                );
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            Some(_) => {
                self.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a response if it is cacheable. Returns whether it was
    /// stored.
    pub fn store(
        &self,
        key: &str,
        method: &str,
        status: u16,
        headers: &HashMap<String, String>,
        body: Vec<u8>,
    ) -> bool {
        if !Self::cacheable(method, status, headers) {
            return false;
        }
        let ttl = Self::ttl_for(headers);
        let entry = Arc::new(CacheEntry {
            status,
            headers: headers.clone(),
            body,
            stored_at: Instant::now(),
            ttl,
            last_access: AtomicU64::new(self.access_clock.fetch_add(1, Ordering::Relaxed)),
        });
        let size = entry.size();
        if size > self.capacity_bytes {
            return false;
        }

        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            if let Some(old) = entries.insert(key.to_string(), entry) {
                self.size_bytes.fetch_sub(old.size(), Ordering::Relaxed);
            }
            self.size_bytes.fetch_add(size, Ordering::Relaxed);

            // Evict least-recently-used entries until back under cap.
            while self.size_bytes.load(Ordering::Relaxed) > self.capacity_bytes {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                    .map(|(k, _)| k.clone());
                match victim {
                    Some(victim_key) => {
                        if let Some(removed) = entries.remove(&victim_key) {
                            self.size_bytes.fetch_sub(removed.size(), Ordering::Relaxed);
                            self.evictions.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    None => break,
                }
            }
        }
        debug!(key, size, ttl_s = ttl.as_secs(), "Response cached");
        true
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(removed) = entries.remove(key) {
            self.size_bytes.fetch_sub(removed.size(), Ordering::Relaxed);
        }
    }

    /// GET 200s only; no-store/private/no-cache and live content types
    /// are never cached.
    pub fn cacheable(method: &str, status: u16, headers: &HashMap<String, String>) -> bool {
        if !method.eq_ignore_ascii_case("GET") || status != 200 {
            return false;
        }
        if let Some(cache_control) = headers.get("cache-control") {
            let lowered = cache_control.to_lowercase();
            if ["no-store", "private", "no-cache"]
                .iter()
                .any(|d| lowered.contains(d))
            {
                return false;
            }
        }
        if let Some(content_type) = headers.get("content-type") {
            let lowered = content_type.to_lowercase();
            if UNCACHEABLE_TYPES.iter().any(|t| lowered.starts_with(t)) {
                return false;
            }
        }
        true
    }

    /// TTL ladder: Cache-Control max-age, then Expires, then content-type
    /// defaults (HTML 60 s, CSS/JS/fonts 1 h, images 24 h, else 5 min).
    pub fn ttl_for(headers: &HashMap<String, String>) -> Duration {
        if let Some(cache_control) = headers.get("cache-control") {
            if let Some(max_age) = cache_control
                .to_lowercase()
                .split(',')
                .filter_map(|d| d.trim().strip_prefix("max-age=").map(|v| v.to_string()))
                .next()
            {
                if let Ok(secs) = max_age.parse::<u64>() {
                    return Duration::from_secs(secs);
                }
            }
        }
        if let Some(expires) = headers.get("expires") {
            if let Ok(when) = DateTime::parse_from_rfc2822(expires) {
                let delta = when.with_timezone(&Utc) - Utc::now();
                if let Ok(ttl) = delta.to_std() {
                    return ttl;
                }
            }
        }
        let content_type = headers
            .get("content-type")
            .map(|v| v.to_lowercase())
            .unwrap_or_default();
        if content_type.starts_with("text/html") {
            Duration::from_secs(60)
        } else if content_type.starts_with("text/css")
            || content_type.contains("javascript")
            || content_type.starts_with("font/")
            || content_type.contains("font-woff")
        {
            Duration::from_secs(3_600)
        } else if content_type.starts_with("image/") {
            Duration::from_secs(86_400)
        } else {
            Duration::from_secs(300)
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            entries: entries.len(),
            size_bytes: self.size_bytes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> CacheKeySource {
        CacheKeySource {
            accept: "text/html".into(),
            accept_language: "en-US,en;q=0.9".into(),
            user_agent: "Mozilla/5.0 test".into(),
        }
    }

    fn html_headers() -> HashMap<String, String> {
        HashMap::from([("content-type".to_string(), "text/html".to_string())])
    }

    #[test]
    fn hit_returns_the_recorded_body() {
        let cache = ResponseCache::new(10);
        let key = source().key("GET", "https://a.test/page");
        assert!(cache.store(&key, "GET", 200, &html_headers(), b"hello world".to_vec()));

        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.body, b"hello world");
        assert_eq!(entry.status, 200);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn key_varies_with_identity_headers() {
        let a = source().key("GET", "https://a.test/page");
        let mut other = source();
        other.user_agent = "Mozilla/5.0 different".into();
        let b = other.key("GET", "https://a.test/page");
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn no_store_private_and_no_cache_are_never_cached() {
        let cache = ResponseCache::new(10);
        for directive in ["no-store", "private", "no-cache"] {
            let mut headers = html_headers();
            headers.insert("cache-control".into(), directive.into());
            let key = source().key("GET", &format!("https://a.test/{directive}"));
            assert!(!cache.store(&key, "GET", 200, &headers, b"x".to_vec()), "{directive}");
        }
    }

    #[test]
    fn live_content_types_are_never_cached() {
        let cache = ResponseCache::new(10);
        for content_type in UNCACHEABLE_TYPES {
            let headers =
                HashMap::from([("content-type".to_string(), content_type.to_string())]);
            let key = source().key("GET", &format!("https://a.test/{content_type}"));
            assert!(!cache.store(&key, "GET", 200, &headers, b"x".to_vec()));
        }
    }

    #[test]
    fn non_get_and_non_200_are_never_cached() {
        let cache = ResponseCache::new(10);
        let key = source().key("POST", "https://a.test/");
        assert!(!cache.store(&key, "POST", 200, &html_headers(), b"x".to_vec()));
        assert!(!cache.store(&key, "GET", 404, &html_headers(), b"x".to_vec()));
    }

    #[test]
    fn expired_entries_are_never_served() {
        let cache = ResponseCache::new(10);
        let mut headers = html_headers();
        headers.insert("cache-control".into(), "max-age=0".into());
        let key = source().key("GET", "https://a.test/stale");
        assert!(cache.store(&key, "GET", 200, &headers, b"x".to_vec()));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn ttl_ladder_uses_content_type_defaults() {
        assert_eq!(ResponseCache::ttl_for(&html_headers()), Duration::from_secs(60));
        let css = HashMap::from([("content-type".to_string(), "text/css".to_string())]);
        assert_eq!(ResponseCache::ttl_for(&css), Duration::from_secs(3_600));
        let img = HashMap::from([("content-type".to_string(), "image/png".to_string())]);
        assert_eq!(ResponseCache::ttl_for(&img), Duration::from_secs(86_400));
        let other = HashMap::from([("content-type".to_string(), "application/pdf".to_string())]);
        assert_eq!(ResponseCache::ttl_for(&other), Duration::from_secs(300));

        let mut explicit = html_headers();
        explicit.insert("cache-control".into(), "public, max-age=120".into());
        assert_eq!(ResponseCache::ttl_for(&explicit), Duration::from_secs(120));
    }

    #[test]
    fn lru_eviction_keeps_size_under_cap() {
        // 1 MB cap; three ~400 KB bodies force an eviction.
        let cache = ResponseCache::new(1);
        let body = vec![0u8; 400 * 1024];
        let keys: Vec<String> = (0..3)
            .map(|i| source().key("GET", &format!("https://a.test/{i}")))
            .collect();

        cache.store(&keys[0], "GET", 200, &html_headers(), body.clone());
        cache.store(&keys[1], "GET", 200, &html_headers(), body.clone());
        // Touch key 0 so key 1 becomes the LRU victim.
        cache.get(&keys[0]);
        cache.store(&keys[2], "GET", 200, &html_headers(), body.clone());

        assert!(cache.stats().size_bytes <= 1024 * 1024);
        assert!(cache.get(&keys[1]).is_none());
        assert!(cache.get(&keys[0]).is_some());
    }
}
