//! Pool lifecycle: quarantine round-trips, staged blocking and cache
//! fulfillment against the mock driver

use mirage_driver::{MockDriver, MockResponse, ResourceType, RouteDecision};
use mirage_pool::{AcquireOptions, ContextPool, PoolConfig, ReleaseOutcome};
use mirage_types::{ContextHealth, DetectionKind};
use std::sync::Arc;
use std::time::Duration;

fn detection_release() -> ReleaseOutcome {
    ReleaseOutcome {
        success: false,
        detected: Some(DetectionKind::Fingerprint),
        response_time_ms: None,
    }
}

#[tokio::test]
async fn quarantined_context_recovers_with_mutated_profile() {
    let driver = MockDriver::new();
    let pool = ContextPool::new(
        Arc::new(driver.clone()),
        PoolConfig {
            quarantine_period: Duration::from_millis(200),
            maintenance_interval: Duration::from_millis(100),
            ..PoolConfig::default()
        },
    );

    let lease = pool.acquire("ticketer", AcquireOptions::default()).await.unwrap();
    let context_id = lease.context_id.clone();
    let profile_id = lease.profile_id.clone();
    let fingerprint_before = {
        let profile = pool.profiles().get(&profile_id).unwrap();
        let p = profile.lock().await;
        p.fingerprint.canonical_json()
    };

    // Two detections walk health down to DETECTED; release quarantines.
    pool.release(&context_id, detection_release()).await;
    pool.release(&context_id, detection_release()).await;
    assert_eq!(pool.status().await.quarantined, 1);

    // The maintenance loop promotes it after the quarantine period.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pool.status().await.quarantined, 0);

    let profile = pool.profiles().get(&profile_id).unwrap();
    {
        let p = profile.lock().await;
        assert!((p.reputation - 0.5).abs() < 1e-9, "reputation not halved");
        let mutated = p.mutation_history.back().expect("mutation recorded");
        if !mutated.changes.is_empty() {
            assert_ne!(p.fingerprint.canonical_json(), fingerprint_before);
        }
    }

    // The recovered context is offered for warm reuse.
    let again = pool.acquire("ticketer", AcquireOptions::default()).await.unwrap();
    assert_eq!(again.context_id, context_id);
    pool.shutdown().await;
}

#[tokio::test]
async fn tracker_requests_are_refused_and_tallied() {
    let driver = MockDriver::new();
    let pool = ContextPool::new(Arc::new(driver.clone()), PoolConfig::default());
    let lease = pool.acquire("t", AcquireOptions::default()).await.unwrap();

    let decision = driver
        .simulate_request(
            lease.context.id(),
            "https://www.googletagmanager.com/gtm.js",
            ResourceType::Script,
            0,
        )
        .await;
    assert!(matches!(decision, RouteDecision::Abort));

    let allowed = driver
        .simulate_request(
            lease.context.id(),
            "https://shop.test/app.js",
            ResourceType::Script,
            0,
        )
        .await;
    assert!(matches!(allowed, RouteDecision::Continue));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(pool.status().await.blocked_bytes > 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn repeat_navigation_is_served_from_cache() {
    let driver = MockDriver::new();
    driver.script_response(
        "shop.test",
        MockResponse::default()
            .with_header("content-type", "text/html")
            .with_header("cache-control", "public, max-age=300")
            .with_body("<html>seat map</html>"),
    );
    let pool = ContextPool::new(Arc::new(driver.clone()), PoolConfig::default());
    let lease = pool.acquire("t", AcquireOptions::default()).await.unwrap();

    let first = lease.page.goto("https://shop.test/map").await.unwrap();
    assert_eq!(first.status, 200);
    // Give the accounting task time to store the body.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = lease.page.goto("https://shop.test/map").await.unwrap();
    assert_eq!(second.status, 200);

    let stats = pool.cache().stats();
    assert!(stats.hits >= 1, "expected a cache hit, stats: {stats:?}");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(pool.status().await.cached_bytes > 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn browser_health_degrades_with_detections() {
    let driver = MockDriver::new();
    let pool = ContextPool::new(Arc::new(driver.clone()), PoolConfig::default());

    let lease = pool.acquire("t", AcquireOptions::default()).await.unwrap();
    pool.release(&lease.context_id, detection_release()).await;

    // A detection leaves the context suspicious, not reusable; the next
    // acquire creates a fresh context.
    let next = pool.acquire("t", AcquireOptions::default()).await.unwrap();
    assert_ne!(next.context_id, lease.context_id);

    let status = pool.status().await;
    assert_eq!(status.contexts, 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn health_constants_match_scoring_table() {
    assert_eq!(ContextHealth::Pristine.score_multiplier(), 1.1);
    assert_eq!(ContextHealth::Healthy.score_multiplier(), 1.0);
    assert_eq!(ContextHealth::Warming.score_multiplier(), 0.9);
    assert_eq!(ContextHealth::Suspicious.score_multiplier(), 0.7);
    assert_eq!(ContextHealth::Recovering.score_multiplier(), 0.5);
    assert_eq!(ContextHealth::Detected.score_multiplier(), 0.3);
    assert_eq!(ContextHealth::Quarantine.score_multiplier(), 0.1);
}
