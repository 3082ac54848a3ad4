//! Per-page detection monitor
//!
//! Watches one page through four escalating levels. Response observation
//! is always on; content scanning joins at MEDIUM, JS probes and console
//! analysis at HIGH, network-cadence analysis at PARANOID. Classified
//! signals are handed to the shared [`EventEmitter`], which owns
//! deduplication and fan-out.

use crate::emitter::EventEmitter;
use crate::patterns::{scan, CONSOLE_PATTERNS, CONTENT_PATTERNS};
use mirage_driver::{ConsoleEvent, PageHandle, ResponseEvent};
use mirage_types::{DetectionEvent, DetectionKind, MonitorLevel};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Requests considered by the PARANOID cadence analysis.
const NETWORK_WINDOW: usize = 20;
/// Content scans never run more often than this, regardless of level.
const CONTENT_SCAN_FLOOR: Duration = Duration::from_secs(2);

/// The single JS probe evaluated at HIGH and above.
///
/// Reports automation leaks a site-side detector would find: the
/// webdriver flag, a hollow chrome.runtime, impossible permission/focus
/// combinations, canvas uniformity and callable CDP domain stubs.
pub const PROBE_SCRIPT: &str = r#"
(() => { /* __mirage_probe__ */
  const report = {};
  report.webdriver = navigator.webdriver === true || 'webdriver' in navigator;
  report.chrome_runtime_missing = !!window.chrome && !window.chrome.runtime;
  report.webdriver_attr = document.documentElement.getAttribute('webdriver') !== null;
  report.cdp_stubs = ['Runtime.enable', 'Page.enable', 'Network.enable']
    .some((d) => typeof window[d] === 'function');
  report.permission_inconsistent = false;
  try {
    if (Notification && Notification.permission === 'denied' && document.hasFocus()) {
      report.permission_inconsistent = true;
    }
  } catch (e) {}
  report.canvas_uniform = (() => {
    try {
      const canvas = document.createElement('canvas');
      canvas.width = 32; canvas.height = 32;
      const ctx = canvas.getContext('2d');
      ctx.fillText('mirage probe', 2, 16);
      const data = ctx.getImageData(0, 0, 32, 32).data;
      const unique = new Set(data);
      return unique.size <= 10;
    } catch (e) { return false; }
  })();
  return report;
})()
"#;

/// Monitor over one page
pub struct PageMonitor {
    page: Arc<dyn PageHandle>,
    page_id: String,
    level: MonitorLevel,
    emitter: Arc<EventEmitter>,
    shutdown: watch::Sender<bool>,
    last_content_scan: Mutex<Option<Instant>>,
    request_times: Mutex<VecDeque<Instant>>,
}

impl PageMonitor {
    /// Attach a monitor and start its background tasks.
    pub fn attach(
        page: Arc<dyn PageHandle>,
        level: MonitorLevel,
        emitter: Arc<EventEmitter>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let monitor = Arc::new(Self {
            page_id: page.id().to_string(),
            page,
            level,
            emitter,
            shutdown,
            last_content_scan: Mutex::new(None),
            request_times: Mutex::new(VecDeque::with_capacity(NETWORK_WINDOW)),
        });

        monitor.clone().spawn_response_listener();
        if level.runs_probes() {
            monitor.clone().spawn_console_listener();
            monitor.clone().spawn_page_error_listener();
        }
        if level.analyzes_network() {
            monitor.clone().spawn_request_listener();
        }
        monitor.clone().spawn_periodic_loop();

        debug!(page_id = %monitor.page_id, level = ?level, "Detection monitor attached");
        monitor
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    pub fn level(&self) -> MonitorLevel {
        self.level
    }

    /// Stop all monitor tasks.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run every probe the level allows right now.
    pub async fn force_check(&self) {
        self.scan_page_content(true).await;
        if self.level.runs_probes() {
            self.run_js_probe().await;
        }
        if self.level.analyzes_network() {
            self.analyze_network_cadence();
        }
    }

    fn spawn_response_listener(self: Arc<Self>) {
        let mut responses = self.page.subscribe_responses();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = responses.recv() => match result {
                        Ok(event) => self.observe_response(&event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(page_id = %self.page_id, lagged = n, "Response stream lagged");
                        }
                        Err(_) => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    fn spawn_console_listener(self: Arc<Self>) {
        let mut console = self.page.subscribe_console();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = console.recv() => match result {
                        Ok(event) => self.observe_console(&event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(_) => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    fn spawn_page_error_listener(self: Arc<Self>) {
        let mut errors = self.page.subscribe_page_errors();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = errors.recv() => match result {
                        Ok(event) => {
                            // Detector scripts often surface through
                            // thrown errors; same phrase set as console.
                            for (kind, confidence, label) in scan(&event.message, &CONSOLE_PATTERNS) {
                                self.emit(
                                    DetectionEvent::new(kind, confidence, "pageerror://")
                                        .with_indicator(format!("pageerror:{label}")),
                                );
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(_) => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    fn spawn_request_listener(self: Arc<Self>) {
        let mut requests = self.page.subscribe_requests();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = requests.recv() => match result {
                        Ok(_event) => {
                            let mut times = self.request_times.lock().unwrap_or_else(|e| e.into_inner());
                            times.push_back(Instant::now());
                            while times.len() > NETWORK_WINDOW {
                                times.pop_front();
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(_) => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    fn spawn_periodic_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let interval = self.level.check_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if self.level.scans_content() {
                            self.scan_page_content(false).await;
                        }
                        if self.level.runs_probes() {
                            self.run_js_probe().await;
                        }
                        if self.level.analyzes_network() {
                            self.analyze_network_cadence();
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    /// Classify one observed response: status, headers, URL, and body
    /// text when the driver captured it.
    fn observe_response(&self, response: &ResponseEvent) {
        if response.status == 429 {
            self.emit(
                DetectionEvent::new(DetectionKind::RateLimit, 0.95, &response.url)
                    .with_indicator("status:429"),
            );
        }

        let body_text = response
            .body
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();

        if response.status == 403 {
            let lowered = body_text.to_lowercase();
            if ["blocked", "access denied", "forbidden", "banned"]
                .iter()
                .any(|kw| lowered.contains(kw))
            {
                self.emit(
                    DetectionEvent::new(DetectionKind::IpBlock, 0.85, &response.url)
                        .with_indicator("status:403"),
                );
            }
        }

        let protection_header = ["cf-ray", "cf-cache-status", "x-datadome", "x-perimeterx"]
            .iter()
            .find(|h| response.header(h).is_some())
            .copied()
            .or_else(|| {
                response.header("server").and_then(|server| {
                    let server = server.to_lowercase();
                    ["cloudflare", "ddos-guard", "incapsula"]
                        .iter()
                        .any(|s| server.contains(s))
                        .then_some("server")
                })
            });
        // Protection headers on a challenge-ish status mean an active
        // challenge; on a 200 they are just the CDN waving.
        if let Some(header) = protection_header {
            if response.status >= 400 {
                self.emit(
                    DetectionEvent::new(DetectionKind::Cloudflare, 0.85, &response.url)
                        .with_indicator(format!("header:{header}"))
                        .with_detail("status", response.status.to_string()),
                );
            }
        }

        let url_lower = response.url.to_lowercase();
        if url_lower.contains("captcha") {
            self.emit(
                DetectionEvent::new(DetectionKind::Captcha, 0.85, &response.url)
                    .with_indicator("url:captcha"),
            );
        } else if url_lower.contains("challenge") {
            self.emit(
                DetectionEvent::new(DetectionKind::Cloudflare, 0.75, &response.url)
                    .with_indicator("url:challenge"),
            );
        }

        if !body_text.is_empty() {
            for (kind, confidence, label) in scan(&body_text, &CONTENT_PATTERNS) {
                self.emit(
                    DetectionEvent::new(kind, confidence, &response.url)
                        .with_indicator(format!("body:{label}")),
                );
            }
        }
    }

    fn observe_console(&self, message: &ConsoleEvent) {
        for (kind, confidence, label) in scan(&message.text, &CONSOLE_PATTERNS) {
            self.emit(
                DetectionEvent::new(kind, confidence, "console://")
                    .with_indicator(format!("console:{label}"))
                    .with_detail("message", message.text.clone()),
            );
        }
    }

    /// Scan full page text against the pattern catalog. Frequency is
    /// floor-capped; `force` bypasses the cap.
    async fn scan_page_content(&self, force: bool) {
        if !force {
            let mut last = self.last_content_scan.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = *last {
                if previous.elapsed() < CONTENT_SCAN_FLOOR {
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        let (url, content) = match (self.page.url().await, self.page.content().await) {
            (Ok(url), Ok(content)) => (url, content),
            // A transient driver error here is recoverable-local.
            _ => return,
        };
        for (kind, confidence, label) in scan(&content, &CONTENT_PATTERNS) {
            self.emit(
                DetectionEvent::new(kind, confidence, &url)
                    .with_indicator(format!("content:{label}")),
            );
        }
    }

    async fn run_js_probe(&self) {
        let value = match self.page.evaluate(PROBE_SCRIPT).await {
            Ok(value) => value,
            Err(e) => {
                debug!(page_id = %self.page_id, error = %e, "JS probe failed");
                return;
            }
        };
        let url = self.page.url().await.unwrap_or_default();
        let get = |key: &str| value.get(key).and_then(|v| v.as_bool()).unwrap_or(false);

        if get("webdriver") {
            self.emit(
                DetectionEvent::new(DetectionKind::Fingerprint, 0.95, &url)
                    .with_indicator("probe:webdriver"),
            );
        }
        if get("chrome_runtime_missing") {
            self.emit(
                DetectionEvent::new(DetectionKind::Fingerprint, 0.7, &url)
                    .with_indicator("probe:chrome_runtime_missing"),
            );
        }
        if get("permission_inconsistent") {
            self.emit(
                DetectionEvent::new(DetectionKind::Fingerprint, 0.6, &url)
                    .with_indicator("probe:permission_inconsistent"),
            );
        }
        if get("canvas_uniform") {
            self.emit(
                DetectionEvent::new(DetectionKind::Fingerprint, 0.65, &url)
                    .with_indicator("probe:canvas_uniform"),
            );
        }
        if get("cdp_stubs") {
            self.emit(
                DetectionEvent::new(DetectionKind::CdpDetection, 0.95, &url)
                    .with_indicator("probe:cdp_stubs"),
            );
        }
        if get("webdriver_attr") {
            self.emit(
                DetectionEvent::new(DetectionKind::CdpDetection, 0.9, &url)
                    .with_indicator("probe:webdriver_attr"),
            );
        }
    }

    /// PARANOID: a machine-regular request cadence (interval variance
    /// below 0.1 s² at a sub-2 s mean) reads as non-human.
    fn analyze_network_cadence(&self) {
        let times = self.request_times.lock().unwrap_or_else(|e| e.into_inner());
        if times.len() < NETWORK_WINDOW {
            return;
        }
        let intervals: Vec<f64> = times
            .iter()
            .zip(times.iter().skip(1))
            .map(|(a, b)| b.duration_since(*a).as_secs_f64())
            .collect();
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let variance = intervals
            .iter()
            .map(|i| (i - mean).powi(2))
            .sum::<f64>()
            / intervals.len() as f64;

        if variance < 0.1 && mean < 2.0 {
            self.emit(
                DetectionEvent::new(DetectionKind::Behavioral, 0.75, "network://")
                    .with_indicator("cadence:regular")
                    .with_detail("mean_s", format!("{mean:.3}"))
                    .with_detail("variance", format!("{variance:.4}")),
            );
        }
    }

    fn emit(&self, event: DetectionEvent) {
        self.emitter.emit(event.with_page(&self.page_id));
    }
}

impl Drop for PageMonitor {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_driver::{
        ContextOptions, Driver, LaunchOptions, MockDriver, MockResponse, ResourceType,
    };
    use serde_json::json;

    async fn setup(level: MonitorLevel) -> (MockDriver, Arc<dyn PageHandle>, Arc<EventEmitter>, Arc<PageMonitor>) {
        let driver = MockDriver::new();
        let browser = driver.launch(LaunchOptions::default()).await.unwrap();
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        let page = context.new_page().await.unwrap();
        let emitter = EventEmitter::new();
        let monitor = PageMonitor::attach(page.clone(), level, emitter.clone());
        (driver, page, emitter, monitor)
    }

    #[tokio::test]
    async fn status_429_classifies_as_rate_limit() {
        let (driver, page, emitter, _monitor) = setup(MonitorLevel::Low).await;
        driver.script_response("slow.test", MockResponse::default().with_status(429));
        page.goto("https://slow.test/tickets").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = emitter.recent(10);
        assert!(events
            .iter()
            .any(|e| e.kind == DetectionKind::RateLimit && e.confidence == 0.95));
    }

    #[tokio::test]
    async fn cloudflare_challenge_body_produces_one_event() {
        let (driver, page, emitter, _monitor) = setup(MonitorLevel::Low).await;
        driver.script_response(
            "cf.test",
            MockResponse::default()
                .with_status(503)
                .with_header("cf-ray", "8912ab3cd-VIE")
                .with_body("<html>Checking your browser before accessing cf.test</html>"),
        );
        page.goto("https://cf.test/").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let cloudflare: Vec<_> = emitter
            .recent(20)
            .into_iter()
            .filter(|e| e.kind == DetectionKind::Cloudflare)
            .collect();
        // Header and body signals agree; dedup folds them into one.
        assert_eq!(cloudflare.len(), 1);
    }

    #[tokio::test]
    async fn js_probe_flags_webdriver_leak() {
        let (driver, _page, emitter, monitor) = setup(MonitorLevel::High).await;
        driver.script_eval(
            "__mirage_probe__",
            json!({
                "webdriver": true,
                "chrome_runtime_missing": false,
                "webdriver_attr": false,
                "cdp_stubs": true,
                "permission_inconsistent": false,
                "canvas_uniform": false,
            }),
        );
        monitor.force_check().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = emitter.recent(10);
        assert!(events.iter().any(|e| e.kind == DetectionKind::Fingerprint));
        assert!(events.iter().any(|e| e.kind == DetectionKind::CdpDetection));
    }

    #[tokio::test]
    async fn console_cdp_phrases_are_flagged() {
        let (driver, page, emitter, _monitor) = setup(MonitorLevel::High).await;
        driver.emit_console(
            page.id(),
            ConsoleEvent {
                level: mirage_driver::ConsoleLevel::Warning,
                text: "Runtime.enable was called by inspector".into(),
            },
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(emitter
            .recent(10)
            .iter()
            .any(|e| e.kind == DetectionKind::CdpDetection));
    }

    #[tokio::test]
    async fn regular_request_cadence_reads_as_behavioral() {
        let (_driver, _page, emitter, monitor) = setup(MonitorLevel::Paranoid).await;
        {
            let mut times = monitor.request_times.lock().unwrap();
            let base = Instant::now() - Duration::from_secs(20);
            for i in 0..NETWORK_WINDOW {
                times.push_back(base + Duration::from_secs(i as u64));
            }
        }
        monitor.force_check().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(emitter
            .recent(10)
            .iter()
            .any(|e| e.kind == DetectionKind::Behavioral && e.confidence == 0.75));
    }

    #[tokio::test]
    async fn content_scan_respects_frequency_floor() {
        let (driver, page, emitter, monitor) = setup(MonitorLevel::Medium).await;
        driver.script_response(
            "shop.test",
            MockResponse::default().with_body("please solve this captcha <form>"),
        );
        page.goto("https://shop.test/").await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        // Dedup also bounds this, but the floor keeps us from hammering
        // page.content() in tight loops.
        let captcha_events: Vec<_> = emitter
            .recent(50)
            .into_iter()
            .filter(|e| e.kind == DetectionKind::Captcha)
            .collect();
        assert!(captcha_events.len() <= 1);
        monitor.stop();
    }
}
