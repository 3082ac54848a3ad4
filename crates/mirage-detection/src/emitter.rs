//! Detection event emission
//!
//! Subscribers register per kind or on the wildcard channel; each
//! subscriber receives its own copy. A dedicated dispatch task decouples
//! delivery from the monitor loop while preserving per-page timestamp
//! order. Repeats of the same (page, kind) within the dedup window are
//! dropped at the source. Emitted events are retained in a bounded ring
//! for statistics, pruned past the retention window.

use dashmap::DashMap;
use mirage_types::{DetectionEvent, DetectionKind};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Subscriber callback; must be fast and must not block.
pub type EventCallback = Arc<dyn Fn(&DetectionEvent) + Send + Sync>;

/// Same-kind events for one page inside this window are duplicates.
const DEDUP_WINDOW: Duration = Duration::from_secs(5);
/// Ring retention for statistics.
const RETENTION: Duration = Duration::from_secs(24 * 3600);
/// Hard cap on retained events.
const RING_CAP: usize = 2_048;

#[derive(Default)]
struct Registry {
    typed: HashMap<DetectionKind, Vec<EventCallback>>,
    wildcard: Vec<EventCallback>,
}

/// Fan-out hub for detection events
pub struct EventEmitter {
    registry: Arc<RwLock<Registry>>,
    last_emitted: DashMap<(String, DetectionKind), Instant>,
    ring: Mutex<VecDeque<(Instant, DetectionEvent)>>,
    queue: mpsc::UnboundedSender<DetectionEvent>,
}

impl EventEmitter {
    pub fn new() -> Arc<Self> {
        let registry: Arc<RwLock<Registry>> = Arc::new(RwLock::new(Registry::default()));
        let (queue, mut rx) = mpsc::unbounded_channel::<DetectionEvent>();

        let dispatch_registry = registry.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let callbacks: Vec<EventCallback> = {
                    let registry = match dispatch_registry.read() {
                        Ok(r) => r,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    registry
                        .typed
                        .get(&event.kind)
                        .into_iter()
                        .flatten()
                        .chain(registry.wildcard.iter())
                        .cloned()
                        .collect()
                };
                for callback in callbacks {
                    // A misbehaving subscriber must not take the
                    // dispatcher down with it.
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        callback(&event)
                    }));
                    if result.is_err() {
                        warn!(kind = %event.kind, "Detection callback panicked");
                    }
                }
            }
        });

        Arc::new(Self {
            registry,
            last_emitted: DashMap::new(),
            ring: Mutex::new(VecDeque::new()),
            queue,
        })
    }

    /// Subscribe to one event kind.
    pub fn on(&self, kind: DetectionKind, callback: EventCallback) {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.typed.entry(kind).or_default().push(callback);
    }

    /// Subscribe to every event kind.
    pub fn on_any(&self, callback: EventCallback) {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.wildcard.push(callback);
    }

    /// Emit an event; returns false when it was deduplicated away.
    pub fn emit(&self, event: DetectionEvent) -> bool {
        let key = (event.page_id.clone(), event.kind);
        let now = Instant::now();
        if let Some(last) = self.last_emitted.get(&key) {
            if now.duration_since(*last) < DEDUP_WINDOW {
                debug!(kind = %event.kind, page_id = %event.page_id, "Detection deduplicated");
                return false;
            }
        }
        self.last_emitted.insert(key, now);

        {
            let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
            ring.push_back((now, event.clone()));
            while ring.len() > RING_CAP {
                ring.pop_front();
            }
            while ring
                .front()
                .map(|(t, _)| now.duration_since(*t) > RETENTION)
                .unwrap_or(false)
            {
                ring.pop_front();
            }
        }

        debug!(
            kind = %event.kind,
            confidence = event.confidence,
            url = %event.url,
            "Detection emitted"
        );
        let _ = self.queue.send(event);
        true
    }

    /// Events retained in the ring, newest last.
    pub fn recent(&self, limit: usize) -> Vec<DetectionEvent> {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.iter()
            .rev()
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Emission counts per kind over the retention window.
    pub fn stats(&self) -> HashMap<DetectionKind, usize> {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        let mut counts: HashMap<DetectionKind, usize> = HashMap::new();
        for (_, event) in ring.iter() {
            *counts.entry(event.kind).or_default() += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(kind: DetectionKind, page: &str) -> DetectionEvent {
        DetectionEvent::new(kind, 0.9, "https://x.test/").with_page(page)
    }

    #[tokio::test]
    async fn duplicate_events_within_window_are_dropped() {
        let emitter = EventEmitter::new();
        assert!(emitter.emit(event(DetectionKind::Cloudflare, "p1")));
        assert!(!emitter.emit(event(DetectionKind::Cloudflare, "p1")));
        // Different page or kind is not a duplicate.
        assert!(emitter.emit(event(DetectionKind::Cloudflare, "p2")));
        assert!(emitter.emit(event(DetectionKind::Captcha, "p1")));
    }

    #[tokio::test]
    async fn typed_and_wildcard_subscribers_both_receive() {
        let emitter = EventEmitter::new();
        let typed_count = Arc::new(AtomicUsize::new(0));
        let wildcard_count = Arc::new(AtomicUsize::new(0));

        let typed = typed_count.clone();
        emitter.on(
            DetectionKind::Captcha,
            Arc::new(move |_| {
                typed.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let wildcard = wildcard_count.clone();
        emitter.on_any(Arc::new(move |_| {
            wildcard.fetch_add(1, Ordering::SeqCst);
        }));

        emitter.emit(event(DetectionKind::Captcha, "p1"));
        emitter.emit(event(DetectionKind::RateLimit, "p1"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(typed_count.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_callback_does_not_stop_dispatch() {
        let emitter = EventEmitter::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        emitter.on_any(Arc::new(|_| panic!("bad subscriber")));
        let counter = delivered.clone();
        emitter.on_any(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        emitter.emit(event(DetectionKind::IpBlock, "p1"));
        emitter.emit(event(DetectionKind::Captcha, "p1"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ring_keeps_stats_per_kind() {
        let emitter = EventEmitter::new();
        emitter.emit(event(DetectionKind::Captcha, "a"));
        emitter.emit(event(DetectionKind::Captcha, "b"));
        emitter.emit(event(DetectionKind::IpBlock, "c"));

        let stats = emitter.stats();
        assert_eq!(stats[&DetectionKind::Captcha], 2);
        assert_eq!(stats[&DetectionKind::IpBlock], 1);
        assert_eq!(emitter.recent(10).len(), 3);
    }
}
