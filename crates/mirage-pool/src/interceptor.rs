//! Per-context request interception
//!
//! Every context installs one route handler that classifies outbound
//! requests: known tracker hosts are always refused, heavy resource
//! classes are staged off as the context burns through its byte
//! allowance, and cacheable GETs are answered from the pool's response
//! cache when an unexpired entry exists.

use crate::cache::{CacheKeySource, ResponseCache};
use mirage_driver::{ResourceType, RouteDecision, RouteHandler, RouteRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use url::Url;

/// Closed list of ad/tracker host suffixes that are always refused.
pub const TRACKER_HOSTS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "googlesyndication.com",
    "adservice.google.com",
    "connect.facebook.net",
    "facebook.net",
    "hotjar.com",
    "mixpanel.com",
    "segment.io",
    "amplitude.com",
    "scorecardresearch.com",
    "quantserve.com",
    "criteo.com",
    "taboola.com",
    "outbrain.com",
    "newrelic.com",
    "fullstory.com",
];

/// Blocked-byte estimates per refused resource class. The handler never
/// sees response sizes for requests it refuses, so savings are estimated
/// from typical payloads.
fn estimated_size(resource_type: ResourceType) -> u64 {
    match resource_type {
        ResourceType::Image => 60 * 1024,
        ResourceType::Media => 800 * 1024,
        ResourceType::Font => 40 * 1024,
        ResourceType::Stylesheet => 25 * 1024,
        ResourceType::Script => 80 * 1024,
        _ => 10 * 1024,
    }
}

/// Byte ledger for one context, shared with the route handler and the
/// event accounting task.
#[derive(Default)]
pub struct ContextAccounting {
    tx_bytes: AtomicU64,
    rx_bytes: AtomicU64,
    blocked_bytes: AtomicU64,
    cached_bytes: AtomicU64,
    requests: AtomicU64,
    blocked_requests: AtomicU64,
    by_domain: Mutex<HashMap<String, (u64, u64)>>,
}

impl ContextAccounting {
    pub fn add_tx(&self, domain: &str, bytes: u64) {
        self.tx_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut by_domain = self.by_domain.lock().unwrap_or_else(|e| e.into_inner());
        by_domain.entry(domain.to_string()).or_default().0 += bytes;
    }

    pub fn add_rx(&self, domain: &str, bytes: u64) {
        self.rx_bytes.fetch_add(bytes, Ordering::Relaxed);
        let mut by_domain = self.by_domain.lock().unwrap_or_else(|e| e.into_inner());
        by_domain.entry(domain.to_string()).or_default().1 += bytes;
    }

    pub fn add_blocked(&self, bytes: u64) {
        self.blocked_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.blocked_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_cached(&self, bytes: u64) {
        self.cached_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes actually moved over the network.
    pub fn total_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed) + self.rx_bytes.load(Ordering::Relaxed)
    }

    pub fn blocked_bytes(&self) -> u64 {
        self.blocked_bytes.load(Ordering::Relaxed)
    }

    pub fn cached_bytes(&self) -> u64 {
        self.cached_bytes.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn per_domain(&self) -> HashMap<String, (u64, u64)> {
        self.by_domain
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Staged blocking thresholds
#[derive(Debug, Clone, Copy)]
pub struct BlockingStages {
    /// Above this many bytes: images, media and fonts are refused
    pub stage1_bytes: u64,
    /// Above this many bytes: stylesheets are additionally refused
    pub stage2_bytes: u64,
}

impl Default for BlockingStages {
    fn default() -> Self {
        Self {
            stage1_bytes: 25 * 1024 * 1024,
            stage2_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Route handler state for one context
pub struct Interceptor {
    accounting: Arc<ContextAccounting>,
    cache: Arc<ResponseCache>,
    key_source: CacheKeySource,
    stages: BlockingStages,
}

impl Interceptor {
    pub fn new(
        accounting: Arc<ContextAccounting>,
        cache: Arc<ResponseCache>,
        key_source: CacheKeySource,
        stages: BlockingStages,
    ) -> Arc<Self> {
        Arc::new(Self {
            accounting,
            cache,
            key_source,
            stages,
        })
    }

    /// The decision for one outbound request.
    pub fn decide(&self, request: &RouteRequest) -> RouteDecision {
        if let Some(host) = host_of(&request.url) {
            if TRACKER_HOSTS
                .iter()
                .any(|tracker| host == *tracker || host.ends_with(&format!(".{tracker}")))
            {
                self.accounting.add_blocked(estimated_size(request.resource_type));
                debug!(url = %request.url, "Tracker host refused");
                return RouteDecision::Abort;
            }
        }

        let used = self.accounting.total_bytes();
        let heavy = matches!(
            request.resource_type,
            ResourceType::Image | ResourceType::Media | ResourceType::Font
        );
        if used > self.stages.stage1_bytes && heavy {
            self.accounting.add_blocked(estimated_size(request.resource_type));
            return RouteDecision::Abort;
        }
        if used > self.stages.stage2_bytes && request.resource_type == ResourceType::Stylesheet {
            self.accounting.add_blocked(estimated_size(request.resource_type));
            return RouteDecision::Abort;
        }

        if request.method.eq_ignore_ascii_case("GET") {
            let key = self.key_source.key(&request.method, &request.url);
            if let Some(entry) = self.cache.get(&key) {
                self.accounting.add_cached(entry.body.len() as u64);
                debug!(url = %request.url, "Served from response cache");
                return RouteDecision::Fulfill {
                    status: entry.status,
                    headers: entry.headers.clone(),
                    body: entry.body.clone(),
                };
            }
        }

        RouteDecision::Continue
    }

    /// Build the driver route handler backed by this interceptor.
    pub fn handler(self: &Arc<Self>) -> RouteHandler {
        let interceptor = self.clone();
        Arc::new(move |request: RouteRequest| {
            let interceptor = interceptor.clone();
            Box::pin(async move { interceptor.decide(&request) })
        })
    }
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interceptor(stages: BlockingStages) -> (Arc<Interceptor>, Arc<ContextAccounting>) {
        let accounting = Arc::new(ContextAccounting::default());
        let cache = Arc::new(ResponseCache::new(10));
        let key_source = CacheKeySource {
            accept: "text/html".into(),
            accept_language: "en-US".into(),
            user_agent: "ua".into(),
        };
        (
            Interceptor::new(accounting.clone(), cache, key_source, stages),
            accounting,
        )
    }

    fn request(url: &str, resource_type: ResourceType) -> RouteRequest {
        RouteRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            resource_type,
            headers: HashMap::new(),
        }
    }

    #[test]
    fn tracker_hosts_are_always_refused() {
        let (interceptor, accounting) = interceptor(BlockingStages::default());
        let decision = interceptor.decide(&request(
            "https://www.google-analytics.com/collect",
            ResourceType::Script,
        ));
        assert!(matches!(decision, RouteDecision::Abort));
        assert!(accounting.blocked_bytes() > 0);

        // Subdomains of tracker hosts are covered; lookalike hosts are
        // not.
        let sub = interceptor.decide(&request(
            "https://cdn.doubleclick.net/ad.js",
            ResourceType::Script,
        ));
        assert!(matches!(sub, RouteDecision::Abort));
        let lookalike = interceptor.decide(&request(
            "https://notdoubleclick.net/x.js",
            ResourceType::Script,
        ));
        assert!(matches!(lookalike, RouteDecision::Continue));
    }

    #[test]
    fn heavy_resources_blocked_past_stage_one() {
        let (interceptor, accounting) = interceptor(BlockingStages {
            stage1_bytes: 1_000,
            stage2_bytes: 1_000_000,
        });
        accounting.add_rx("shop.test", 2_000);

        let image = interceptor.decide(&request("https://shop.test/hero.png", ResourceType::Image));
        assert!(matches!(image, RouteDecision::Abort));
        let css = interceptor.decide(&request("https://shop.test/site.css", ResourceType::Stylesheet));
        assert!(matches!(css, RouteDecision::Continue));
        let doc = interceptor.decide(&request("https://shop.test/page", ResourceType::Document));
        assert!(matches!(doc, RouteDecision::Continue));
    }

    #[test]
    fn stylesheets_blocked_past_stage_two() {
        let (interceptor, accounting) = interceptor(BlockingStages {
            stage1_bytes: 1_000,
            stage2_bytes: 5_000,
        });
        accounting.add_rx("shop.test", 6_000);

        let css = interceptor.decide(&request("https://shop.test/site.css", ResourceType::Stylesheet));
        assert!(matches!(css, RouteDecision::Abort));
    }

    #[test]
    fn cache_hits_are_fulfilled_locally() {
        let (interceptor, accounting) = interceptor(BlockingStages::default());
        let key = interceptor
            .key_source
            .key("GET", "https://shop.test/page");
        let headers = HashMap::from([("content-type".to_string(), "text/html".to_string())]);
        interceptor
            .cache
            .store(&key, "GET", 200, &headers, b"cached page".to_vec());

        let decision = interceptor.decide(&request("https://shop.test/page", ResourceType::Document));
        match decision {
            RouteDecision::Fulfill { status, body, .. } => {
                assert_eq!(status, 200);
                assert_eq!(body, b"cached page");
            }
            other => panic!("expected fulfill, got {other:?}"),
        }
        assert_eq!(accounting.cached_bytes(), 11);
    }
}
