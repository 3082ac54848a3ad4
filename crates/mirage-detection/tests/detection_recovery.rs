//! End-to-end: monitor classification feeding the recovery scheduler

use mirage_detection::{EventEmitter, NoHooks, PageMonitor, RecoveryScheduler, RecoveryTarget};
use mirage_driver::{
    ContextOptions, Driver, LaunchOptions, MockDriver, MockResponse, ResourceType, ResponseEvent,
};
use mirage_stealth::BehaviorSimulator;
use mirage_types::{
    BehavioralModel, DetectionEvent, DetectionKind, MonitorLevel, RecoveryAction,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn cloudflare_challenge_dedups_and_recovers_with_wait() {
    let driver = MockDriver::new();
    let browser = driver.launch(LaunchOptions::default()).await.unwrap();
    let context = browser.new_context(ContextOptions::default()).await.unwrap();
    let page = context.new_page().await.unwrap();

    let emitter = EventEmitter::new();
    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    emitter.on(
        DetectionKind::Cloudflare,
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let _monitor = PageMonitor::attach(page.clone(), MonitorLevel::High, emitter.clone());

    // Synthetic challenge response: cf-ray header plus challenge body.
    let challenge = ResponseEvent {
        url: "https://shop.test/event/123".into(),
        status: 503,
        headers: HashMap::from([("cf-ray".to_string(), "8e01ab-VIE".to_string())]),
        body_bytes: 64,
        resource_type: ResourceType::Document,
        elapsed_ms: 30.0,
        body: Some(b"<html>Checking your browser before accessing</html>".to_vec()),
    };
    driver.emit_response(page.id(), challenge.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // One CLOUDFLARE event, delivered promptly.
    assert_eq!(received.load(Ordering::SeqCst), 1);
    let events: Vec<_> = emitter
        .recent(20)
        .into_iter()
        .filter(|e| e.kind == DetectionKind::Cloudflare)
        .collect();
    assert_eq!(events.len(), 1);

    // A follow-up probe inside the dedup window adds nothing.
    driver.emit_response(page.id(), challenge);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(received.load(Ordering::SeqCst), 1);

    // The scheduler answers CLOUDFLARE with WAIT first.
    let scheduler = RecoveryScheduler::new(Arc::new(NoHooks));
    let target = RecoveryTarget {
        page: page.clone(),
        context: context.clone(),
        behavior: BehaviorSimulator::new(BehavioralModel::default()),
        viewport: (1280, 720),
    };
    let outcome = scheduler.handle(&events[0], &target).await;
    assert!(outcome.recovered);
    assert_eq!(outcome.action, Some(RecoveryAction::Wait));
    assert_eq!(outcome.attempted.first(), Some(&RecoveryAction::Wait));
}

#[tokio::test]
async fn dedup_window_reopens_after_five_seconds() {
    tokio::time::pause();
    let emitter = EventEmitter::new();

    let event = DetectionEvent::new(DetectionKind::RateLimit, 0.95, "https://a.test/").with_page("p");
    assert!(emitter.emit(event.clone()));
    assert!(!emitter.emit(event.clone()));

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(emitter.emit(event));
    assert_eq!(emitter.stats()[&DetectionKind::RateLimit], 2);
}

#[tokio::test]
async fn captcha_page_detected_through_navigation() {
    let driver = MockDriver::new();
    driver.script_response(
        "tickets.test",
        MockResponse::default()
            .with_body("<html><script src=\"https://hcaptcha.com/1/api.js\"></script></html>"),
    );
    let browser = driver.launch(LaunchOptions::default()).await.unwrap();
    let context = browser.new_context(ContextOptions::default()).await.unwrap();
    let page = context.new_page().await.unwrap();

    let emitter = EventEmitter::new();
    let _monitor = PageMonitor::attach(page.clone(), MonitorLevel::Medium, emitter.clone());

    page.goto("https://tickets.test/queue").await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let captcha: Vec<_> = emitter
        .recent(20)
        .into_iter()
        .filter(|e| e.kind == DetectionKind::Captcha)
        .collect();
    assert_eq!(captcha.len(), 1);
    assert_eq!(captcha[0].confidence, 0.95);
}
