//! The context pool
//!
//! Owns every live browser and context. `acquire` hands out a stealth-
//! configured context with a monitored page; `release` feeds the outcome
//! back into health scoring and decides between warm reuse, quarantine
//! and closure. One global mutex guards bookkeeping only; driver calls
//! happen with the lock released. The maintenance loop promotes
//! quarantined contexts, retires old browsers and prunes disconnected
//! ones.

use crate::cache::{CacheKeySource, ResponseCache};
use crate::config::PoolConfig;
use crate::context::ContextRecord;
use crate::interceptor::{host_of, ContextAccounting, Interceptor};
use mirage_detection::{EventEmitter, PageMonitor};
use mirage_driver::{
    BrowserHandle, ContextHandle, ContextOptions, Driver, LaunchOptions, PageHandle,
};
use mirage_fingerprint::{
    ForceLevel, MutationEngine, Profile, ProfileManager, SeedConstraints,
};
use mirage_stealth::{HeaderPlan, StealthInjector, TlsRotator};
use mirage_types::{
    AcquireError, ContextHealth, DetectionKind, DriverError, Fingerprint, MonitorLevel,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Options for one acquisition
#[derive(Default)]
pub struct AcquireOptions {
    /// Prefer a browser with no contexts in use
    pub prefer_fresh: bool,
    /// Use this fingerprint instead of synthesizing one
    pub fingerprint: Option<Fingerprint>,
    /// Monitor level override (defaults to the pool's configured level)
    pub monitor_level: Option<MonitorLevel>,
}

/// Outcome reported on release
#[derive(Debug, Clone, Default)]
pub struct ReleaseOutcome {
    pub success: bool,
    pub detected: Option<DetectionKind>,
    /// Response time of the caller's main interaction, for the context's
    /// moving average
    pub response_time_ms: Option<f64>,
}

/// A leased context
pub struct Acquisition {
    pub context_id: String,
    pub profile_id: String,
    pub context: Arc<dyn ContextHandle>,
    pub page: Arc<dyn PageHandle>,
    pub monitor: Arc<PageMonitor>,
}

/// Pool-level status snapshot
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub browsers: usize,
    pub contexts: usize,
    pub contexts_in_use: usize,
    pub quarantined: usize,
    pub global_bytes_used: u64,
    pub blocked_bytes: u64,
    pub cached_bytes: u64,
}

struct BrowserSlot {
    handle: Arc<dyn BrowserHandle>,
    created_at: Instant,
    contexts_in_use: usize,
    requests: u64,
    successes: u64,
    detections: u64,
    consecutive_failures: u32,
    reputation: f64,
    health: ContextHealth,
    /// Bytes retired with closed contexts of this browser
    retired_bytes: u64,
}

impl BrowserSlot {
    fn new(handle: Arc<dyn BrowserHandle>) -> Self {
        Self {
            handle,
            created_at: Instant::now(),
            contexts_in_use: 0,
            requests: 0,
            successes: 0,
            detections: 0,
            consecutive_failures: 0,
            reputation: 1.0,
            health: ContextHealth::Pristine,
            retired_bytes: 0,
        }
    }

    /// Composite health score in [0.1, 1.0].
    fn health_score(&self) -> f64 {
        let detection_rate = if self.requests == 0 {
            0.0
        } else {
            (self.detections as f64 / self.requests as f64).min(1.0)
        };
        let success_rate = if self.requests == 0 {
            1.0
        } else {
            self.successes as f64 / self.requests as f64
        };
        let age = self.created_at.elapsed().as_secs_f64() / 3_600.0;
        let age_decay = if age > 2.0 {
            0.8
        } else if age > 1.0 {
            0.9
        } else {
            1.0
        };
        let score = 1.0
            * (1.0 - detection_rate)
            * success_rate
            * self.reputation
            * age_decay
            * self.health.score_multiplier();
        score.clamp(0.1, 1.0)
    }
}

struct ContextEntry {
    record: ContextRecord,
    context: Arc<dyn ContextHandle>,
    page: Arc<dyn PageHandle>,
    accounting: Arc<ContextAccounting>,
    monitor: Arc<PageMonitor>,
    /// Released and available for reuse
    warm: bool,
}

#[derive(Default)]
struct PoolState {
    browsers: BTreeMap<String, BrowserSlot>,
    contexts: HashMap<String, ContextEntry>,
    quarantine: VecDeque<(String, Instant)>,
    /// Bytes spent by contexts that no longer exist
    retired_bytes: u64,
    accepting: bool,
}

impl PoolState {
    fn live_bytes(&self) -> u64 {
        self.contexts
            .values()
            .map(|e| e.accounting.total_bytes())
            .sum()
    }

    fn global_bytes(&self) -> u64 {
        self.retired_bytes + self.live_bytes()
    }

    fn browser_bytes(&self, browser_id: &str) -> u64 {
        let live: u64 = self
            .contexts
            .values()
            .filter(|e| e.record.browser_id == browser_id)
            .map(|e| e.accounting.total_bytes())
            .sum();
        live + self
            .browsers
            .get(browser_id)
            .map(|b| b.retired_bytes)
            .unwrap_or(0)
    }
}

/// The pool
pub struct ContextPool {
    driver: Arc<dyn Driver>,
    config: PoolConfig,
    profiles: Arc<ProfileManager>,
    injector: StealthInjector,
    tls: TlsRotator,
    cache: Arc<ResponseCache>,
    emitter: Arc<EventEmitter>,
    mutation: MutationEngine,
    state: Mutex<PoolState>,
    shutdown: watch::Sender<bool>,
}

impl ContextPool {
    /// Build a pool and start its maintenance loop. Must be called from
    /// within a Tokio runtime.
    pub fn new(driver: Arc<dyn Driver>, config: PoolConfig) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let pool = Arc::new(Self {
            cache: Arc::new(ResponseCache::new(config.cache_capacity_mb)),
            emitter: EventEmitter::new(),
            profiles: Arc::new(ProfileManager::new()),
            injector: StealthInjector::new(),
            tls: TlsRotator::new(),
            mutation: MutationEngine::new(),
            driver,
            config,
            state: Mutex::new(PoolState {
                accepting: true,
                ..PoolState::default()
            }),
            shutdown,
        });

        let maintenance = pool.clone();
        let mut stop = maintenance.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(maintenance.config.maintenance_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => maintenance.maintenance_tick().await,
                    _ = stop.changed() => break,
                }
            }
            debug!("Pool maintenance loop stopped");
        });

        pool
    }

    pub fn emitter(&self) -> Arc<EventEmitter> {
        self.emitter.clone()
    }

    pub fn profiles(&self) -> Arc<ProfileManager> {
        self.profiles.clone()
    }

    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    /// Lease a stealth-configured context with a monitored page.
    pub async fn acquire(
        &self,
        platform: &str,
        options: AcquireOptions,
    ) -> Result<Acquisition, AcquireError> {
        // Budget and warm-reuse check under the bookkeeping lock.
        let browser_id = {
            let mut state = self.state.lock().await;
            if !state.accepting {
                return Err(AcquireError::DriverUnavailable(DriverError::Disconnected));
            }
            let used = state.global_bytes();
            if used >= self.config.global_limit_bytes() {
                return Err(AcquireError::BudgetExceeded {
                    used_bytes: used,
                    limit_bytes: self.config.global_limit_bytes(),
                });
            }

            if let Some(entry) = state
                .contexts
                .values_mut()
                .find(|e| e.warm && e.record.reusable())
            {
                entry.warm = false;
                let acquisition = Acquisition {
                    context_id: entry.record.context_id.clone(),
                    profile_id: entry.record.profile_id.clone(),
                    context: entry.context.clone(),
                    page: entry.page.clone(),
                    monitor: entry.monitor.clone(),
                };
                let browser_id = entry.record.browser_id.clone();
                if let Some(slot) = state.browsers.get_mut(&browser_id) {
                    slot.contexts_in_use += 1;
                }
                debug!(context_id = %acquisition.context_id, platform, "Context reused from warm pool");
                return Ok(acquisition);
            }
            self.select_browser(&mut state, options.prefer_fresh)
        };

        // Driver work happens with the lock released.
        let browser_id = match browser_id {
            Some(id) => id,
            None => self.create_browser().await?,
        };
        self.create_context(&browser_id, platform, options).await
    }

    /// Report the outcome of a lease. Never fails; errors degrade to
    /// logging.
    pub async fn release(&self, context_id: &str, outcome: ReleaseOutcome) {
        enum Disposition {
            KeepWarm,
            Quarantine,
            Close,
        }

        let (profile_id, handles) = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.contexts.get_mut(context_id) else {
                warn!(context_id, "Release for unknown context");
                return;
            };

            let response_time = outcome.response_time_ms.unwrap_or(0.0);
            entry.record.metrics.record_request(outcome.success, response_time);
            for (domain, (tx, rx)) in entry.accounting.per_domain() {
                entry.record.metrics.tx_bytes_by_domain.insert(domain.clone(), tx);
                entry.record.metrics.rx_bytes_by_domain.insert(domain, rx);
            }
            entry.record.metrics.blocked_bytes = entry.accounting.blocked_bytes();
            entry.record.metrics.cached_bytes = entry.accounting.cached_bytes();

            // The pool is the sole owner of detection counters; the
            // monitor only emits.
            if outcome.detected.is_some() {
                entry.record.metrics.detections += 1;
                entry.record.degrade();
            }

            let profile_id = entry.record.profile_id.clone();
            let context_bytes = entry.accounting.total_bytes();
            let health = entry.record.health;
            let detections = entry.record.metrics.detections;
            let browser_id = entry.record.browser_id.clone();

            let browser_failures = {
                let slot = state.browsers.get_mut(&browser_id);
                if let Some(slot) = slot {
                    slot.requests += 1;
                    if outcome.success {
                        slot.successes += 1;
                        slot.consecutive_failures = 0;
                        slot.reputation = (slot.reputation + 0.05).min(1.0);
                        if slot.health == ContextHealth::Pristine {
                            slot.health = ContextHealth::Healthy;
                        }
                    } else {
                        slot.consecutive_failures += 1;
                    }
                    if outcome.detected.is_some() {
                        slot.detections += 1;
                        if slot.health == ContextHealth::Healthy
                            || slot.health == ContextHealth::Pristine
                        {
                            slot.health = ContextHealth::Suspicious;
                        }
                    }
                    slot.consecutive_failures
                } else {
                    0
                }
            };

            let disposition = if health == ContextHealth::Detected {
                Disposition::Quarantine
            } else if detections > 3
                || browser_failures > 2
                || context_bytes > self.config.context_limit_bytes()
            {
                Disposition::Close
            } else {
                Disposition::KeepWarm
            };

            let handles = match disposition {
                Disposition::Quarantine => {
                    if let Some(entry) = state.contexts.get_mut(context_id) {
                        entry.record.health = ContextHealth::Quarantine;
                        entry.warm = false;
                    }
                    state.quarantine.push_back((context_id.to_string(), Instant::now()));
                    if let Some(slot) = state.browsers.get_mut(&browser_id) {
                        slot.contexts_in_use = slot.contexts_in_use.saturating_sub(1);
                    }
                    info!(context_id, "Context quarantined");
                    None
                }
                Disposition::Close => match state.contexts.remove(context_id) {
                    Some(entry) => {
                        state.retired_bytes += entry.accounting.total_bytes();
                        if let Some(slot) = state.browsers.get_mut(&browser_id) {
                            slot.contexts_in_use = slot.contexts_in_use.saturating_sub(1);
                            slot.retired_bytes += entry.accounting.total_bytes();
                        }
                        info!(context_id, bytes = entry.accounting.total_bytes(), "Context closed");
                        Some((entry.context, entry.monitor))
                    }
                    None => None,
                },
                Disposition::KeepWarm => {
                    if let Some(entry) = state.contexts.get_mut(context_id) {
                        entry.warm = true;
                        if entry.record.health == ContextHealth::Pristine {
                            entry.record.health = ContextHealth::Healthy;
                        }
                    }
                    if let Some(slot) = state.browsers.get_mut(&browser_id) {
                        slot.contexts_in_use = slot.contexts_in_use.saturating_sub(1);
                    }
                    None
                }
            };

            (profile_id, handles)
        };

        // Profile bookkeeping outside the pool lock.
        if let Some(profile) = self.profiles.get(&profile_id) {
            let mut profile = profile.lock().await;
            if let Some(kind) = outcome.detected {
                profile.record_detection(kind);
            } else if outcome.success {
                profile.record_success();
                profile.reputation = (profile.reputation + 0.05).min(1.0);
            }
        }

        if let Some((context, monitor)) = handles {
            monitor.stop();
            self.injector.forget(context.id());
            self.tls.forget_session(context.id());
            if let Err(e) = context.close().await {
                debug!(error = %e, "Context close failed (non-critical)");
            }
        }
    }

    /// Orderly shutdown: stop accepting, cancel loops, close everything.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let (contexts, browsers) = {
            let mut state = self.state.lock().await;
            state.accepting = false;
            let contexts: Vec<_> = state
                .contexts
                .drain()
                .map(|(_, e)| (e.context, e.monitor))
                .collect();
            let browsers: Vec<_> = state
                .browsers
                .iter()
                .map(|(_, slot)| slot.handle.clone())
                .collect();
            state.quarantine.clear();
            (contexts, browsers)
        };
        for (context, monitor) in contexts {
            monitor.stop();
            let _ = context.close().await;
        }
        for browser in browsers {
            let _ = browser.close().await;
        }
        info!("Pool shut down");
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        PoolStatus {
            browsers: state.browsers.len(),
            contexts: state.contexts.len(),
            contexts_in_use: state.browsers.values().map(|b| b.contexts_in_use).sum(),
            quarantined: state.quarantine.len(),
            global_bytes_used: state.global_bytes(),
            blocked_bytes: state
                .contexts
                .values()
                .map(|e| e.accounting.blocked_bytes())
                .sum(),
            cached_bytes: state
                .contexts
                .values()
                .map(|e| e.accounting.cached_bytes())
                .sum(),
        }
    }

    /// Softened top-3 roulette over eligible browsers; `None` when a new
    /// browser must be created.
    fn select_browser(&self, state: &mut PoolState, prefer_fresh: bool) -> Option<String> {
        let mut candidates: Vec<(String, f64)> = state
            .browsers
            .iter()
            .filter(|(id, slot)| {
                slot.handle.is_connected()
                    && slot.health != ContextHealth::Detected
                    && slot.health != ContextHealth::Quarantine
                    && slot.contexts_in_use < self.config.max_contexts_per_browser
                    && state.browser_bytes(id) < self.config.per_browser_limit_bytes()
            })
            .map(|(id, slot)| {
                let score = slot.health_score();
                let load = 2.0
                    - slot.contexts_in_use as f64 / self.config.max_contexts_per_browser as f64;
                let fresh = if prefer_fresh && slot.contexts_in_use == 0 {
                    1.5
                } else {
                    1.0
                };
                let bytes_ratio = state.browser_bytes(id) as f64
                    / self.config.per_browser_limit_bytes() as f64;
                (id.clone(), score * load * fresh * (1.0 - 0.5 * bytes_ratio.min(1.0)))
            })
            .collect();

        if candidates.is_empty() {
            return None;
        }
        // Deterministic tie-break: weight desc, then lexicographic id.
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates.truncate(3);

        let total: f64 = candidates.iter().map(|(_, w)| w).sum();
        let mut rng = SmallRng::from_entropy();
        let mut target = rng.gen_range(0.0..total.max(f64::MIN_POSITIVE));
        for (id, weight) in &candidates {
            target -= weight;
            if target <= 0.0 {
                return Some(id.clone());
            }
        }
        Some(candidates[0].0.clone())
    }

    /// Launch a browser, evicting the worst one first when at capacity.
    async fn create_browser(&self) -> Result<String, AcquireError> {
        if !self.driver.is_connected() {
            return Err(AcquireError::DriverUnavailable(DriverError::Disconnected));
        }

        let evict = {
            let state = self.state.lock().await;
            if state.browsers.len() >= self.config.max_browsers {
                state
                    .browsers
                    .iter()
                    .filter(|(_, slot)| slot.contexts_in_use == 0)
                    .min_by(|a, b| {
                        a.1.health_score()
                            .partial_cmp(&b.1.health_score())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|(id, _)| id.clone())
            } else {
                None
            }
        };
        if let Some(worst) = evict {
            self.remove_browser(&worst).await;
        } else {
            let state = self.state.lock().await;
            if state.browsers.len() >= self.config.max_browsers {
                // Every browser is busy; refuse rather than overshoot.
                return Err(AcquireError::NoHealthyBrowser);
            }
        }

        // Launch outside the lock; reacquire to insert.
        let handle = self
            .driver
            .launch(LaunchOptions {
                headless: true,
                args: vec![
                    "--disable-blink-features=AutomationControlled".to_string(),
                    "--no-first-run".to_string(),
                    "--no-default-browser-check".to_string(),
                ],
                proxy: None,
            })
            .await
            .map_err(AcquireError::DriverUnavailable)?;

        let id = handle.id().to_string();
        let mut state = self.state.lock().await;
        state.browsers.insert(id.clone(), BrowserSlot::new(handle));
        info!(browser_id = %id, total = state.browsers.len(), "Browser launched");
        Ok(id)
    }

    async fn remove_browser(&self, browser_id: &str) {
        let (slot, contexts) = {
            let mut state = self.state.lock().await;
            let slot = state.browsers.remove(browser_id);
            let ids: Vec<String> = state
                .contexts
                .values()
                .filter(|e| e.record.browser_id == browser_id)
                .map(|e| e.record.context_id.clone())
                .collect();
            let mut removed = Vec::new();
            for id in ids {
                if let Some(entry) = state.contexts.remove(&id) {
                    state.retired_bytes += entry.accounting.total_bytes();
                    removed.push((entry.context, entry.monitor));
                }
            }
            let live: std::collections::HashSet<String> =
                state.contexts.keys().cloned().collect();
            state.quarantine.retain(|(id, _)| live.contains(id));
            (slot, removed)
        };
        for (context, monitor) in contexts {
            monitor.stop();
            let _ = context.close().await;
        }
        if let Some(slot) = slot {
            let _ = slot.handle.close().await;
            info!(browser_id, "Browser evicted");
        }
    }

    /// Create a fresh stealth context on a browser.
    async fn create_context(
        &self,
        browser_id: &str,
        platform: &str,
        options: AcquireOptions,
    ) -> Result<Acquisition, AcquireError> {
        let browser = {
            let state = self.state.lock().await;
            state
                .browsers
                .get(browser_id)
                .map(|slot| slot.handle.clone())
                .ok_or(AcquireError::NoHealthyBrowser)?
        };

        let mut rng = SmallRng::from_entropy();
        let profile_handle = match options.fingerprint {
            Some(fingerprint) => self
                .profiles
                .adopt(Profile::from_fingerprint(fingerprint, &mut rng)),
            None => self.profiles.create(&SeedConstraints::default(), &mut rng),
        };
        let (profile_id, fingerprint) = {
            let profile = profile_handle.lock().await;
            (profile.id.clone(), profile.fingerprint.clone())
        };

        let viewport = fingerprint.viewport_dimensions().unwrap_or((1280, 720));
        let header_plan = HeaderPlan::for_fingerprint(&fingerprint, &mut rng);
        let context = browser
            .new_context(ContextOptions {
                user_agent: fingerprint.user_agent().map(|s| s.to_string()),
                viewport: Some(viewport),
                locale: fingerprint.locale().map(|s| s.to_string()),
                timezone: fingerprint
                    .str_value(mirage_types::ComponentName::Timezone)
                    .map(|s| s.to_string()),
                extra_headers: HashMap::new(),
                proxy: None,
                ..Default::default()
            })
            .await
            .map_err(AcquireError::DriverUnavailable)?;

        // TLS identity bound to the context id, stable for its lifetime.
        let tls_session_id = context.id().to_string();
        let _tls_profile = self.tls.get_profile(
            &tls_session_id,
            fingerprint.browser_name().unwrap_or("Chrome"),
            fingerprint.browser_major().unwrap_or("126"),
            fingerprint.os_name().unwrap_or("Windows"),
            &mut rng,
        );

        self.injector
            .install(&context, &fingerprint)
            .await
            .map_err(AcquireError::DriverUnavailable)?;
        context
            .set_extra_headers(header_plan.ordered.clone())
            .await
            .map_err(AcquireError::DriverUnavailable)?;

        let accounting = Arc::new(ContextAccounting::default());
        let key_source = CacheKeySource {
            accept: header_plan.get("accept").unwrap_or_default().to_string(),
            accept_language: header_plan
                .get("accept-language")
                .unwrap_or_default()
                .to_string(),
            user_agent: fingerprint.user_agent().unwrap_or_default().to_string(),
        };
        let interceptor = Interceptor::new(
            accounting.clone(),
            self.cache.clone(),
            key_source.clone(),
            self.config.blocking,
        );
        context
            .intercept_routes(interceptor.handler())
            .await
            .map_err(AcquireError::DriverUnavailable)?;

        let page = context
            .new_page()
            .await
            .map_err(AcquireError::DriverUnavailable)?;
        let monitor = PageMonitor::attach(
            page.clone(),
            options.monitor_level.unwrap_or(self.config.monitor_level),
            self.emitter.clone(),
        );

        self.spawn_accounting(&page, accounting.clone(), key_source);

        let mut record = ContextRecord::new(context.id(), browser_id, &profile_id);
        record.pages.push(page.id().to_string());
        record.tls_session_id = Some(tls_session_id);
        let context_id = record.context_id.clone();

        {
            let mut state = self.state.lock().await;
            if let Some(slot) = state.browsers.get_mut(browser_id) {
                slot.contexts_in_use += 1;
            }
            state.contexts.insert(
                context_id.clone(),
                ContextEntry {
                    record,
                    context: context.clone(),
                    page: page.clone(),
                    accounting,
                    monitor: monitor.clone(),
                    warm: false,
                },
            );
        }

        info!(
            context_id = %context_id,
            browser_id = %browser_id,
            profile_id = %profile_id,
            platform,
            "Context acquired"
        );
        Ok(Acquisition {
            context_id,
            profile_id,
            context,
            page,
            monitor,
        })
    }

    /// Byte accounting and cache population from the page's network
    /// events.
    fn spawn_accounting(
        &self,
        page: &Arc<dyn PageHandle>,
        accounting: Arc<ContextAccounting>,
        key_source: CacheKeySource,
    ) {
        let mut requests = page.subscribe_requests();
        let mut responses = page.subscribe_responses();
        let cache = self.cache.clone();
        let mut stop = self.shutdown.subscribe();

        tokio::spawn(async move {
            // Rough request/response envelope overhead beyond the body.
            const HEADER_OVERHEAD: u64 = 400;
            loop {
                tokio::select! {
                    result = requests.recv() => match result {
                        Ok(event) => {
                            let domain = host_of(&event.url).unwrap_or_default();
                            accounting.add_tx(&domain, event.body_bytes + HEADER_OVERHEAD);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(_) => break,
                    },
                    result = responses.recv() => match result {
                        Ok(event) => {
                            let domain = host_of(&event.url).unwrap_or_default();
                            accounting.add_rx(&domain, event.body_bytes + HEADER_OVERHEAD);
                            if let Some(body) = event.body {
                                let key = key_source.key("GET", &event.url);
                                cache.store(&key, "GET", event.status, &event.headers, body);
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(_) => break,
                    },
                    _ = stop.changed() => break,
                }
            }
        });
    }

    /// One maintenance pass: quarantine promotion, browser retirement,
    /// disconnect pruning.
    async fn maintenance_tick(&self) {
        let now = Instant::now();

        // Quarantined contexts that served their time come back as
        // RECOVERING with a mutated fingerprint and halved reputation.
        let promoted: Vec<String> = {
            let mut state = self.state.lock().await;
            let mut promoted = Vec::new();
            while let Some((context_id, since)) = state.quarantine.front().cloned() {
                if now.duration_since(since) < self.config.quarantine_period {
                    break;
                }
                state.quarantine.pop_front();
                if let Some(entry) = state.contexts.get_mut(&context_id) {
                    entry.record.health = ContextHealth::Recovering;
                    entry.warm = true;
                    promoted.push(entry.record.profile_id.clone());
                    info!(context_id = %context_id, "Context left quarantine");
                }
            }
            promoted
        };
        for profile_id in promoted {
            if let Some(profile) = self.profiles.get(&profile_id) {
                let mut profile = profile.lock().await;
                profile.reputation *= 0.5;
                let mut rng = SmallRng::from_entropy();
                let now = chrono::Utc::now();
                self.mutation
                    .mutate(&mut profile, Some(ForceLevel::Moderate), now, &mut rng);
            }
        }

        // Old idle browsers retire; disconnected ones are pruned.
        let to_remove: Vec<String> = {
            let state = self.state.lock().await;
            state
                .browsers
                .iter()
                .filter(|(_, slot)| {
                    !slot.handle.is_connected()
                        || (slot.contexts_in_use == 0
                            && slot.created_at.elapsed() > self.config.browser_max_age)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };
        for browser_id in to_remove {
            self.remove_browser(&browser_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_driver::{MockDriver, MockResponse, ResourceType, ResponseEvent};
    use std::time::Duration;

    fn pool_with(driver: &MockDriver, config: PoolConfig) -> Arc<ContextPool> {
        ContextPool::new(Arc::new(driver.clone()), config)
    }

    #[tokio::test]
    async fn acquire_installs_stealth_and_attaches_monitor() {
        let driver = MockDriver::new();
        let pool = pool_with(&driver, PoolConfig::default());

        let lease = pool.acquire("ticketer", AcquireOptions::default()).await.unwrap();

        let scripts = driver.init_scripts_for(lease.context.id());
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("__fingerprint_profile__"));
        assert!(!driver.extra_headers_for(lease.context.id()).is_empty());
        assert_eq!(lease.monitor.level(), MonitorLevel::High);

        let status = pool.status().await;
        assert_eq!(status.browsers, 1);
        assert_eq!(status.contexts_in_use, 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn global_budget_rejects_further_acquisitions() {
        let driver = MockDriver::new();
        let pool = pool_with(
            &driver,
            PoolConfig {
                global_limit_mb: 10,
                ..PoolConfig::default()
            },
        );

        let first = pool.acquire("t", AcquireOptions::default()).await.unwrap();
        let second = pool
            .acquire("t", AcquireOptions { prefer_fresh: true, ..Default::default() })
            .await
            .unwrap();

        // 6 MB of instrumented traffic on each context.
        for lease in [&first, &second] {
            driver.emit_response(
                lease.page.id(),
                ResponseEvent {
                    url: "https://heavy.test/blob".into(),
                    status: 200,
                    headers: HashMap::new(),
                    body_bytes: 6 * 1024 * 1024,
                    resource_type: ResourceType::Other,
                    elapsed_ms: 50.0,
                    body: None,
                },
            );
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let third = pool.acquire("t", AcquireOptions::default()).await;
        assert!(matches!(third, Err(AcquireError::BudgetExceeded { .. })));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn released_context_is_reused_warm() {
        let driver = MockDriver::new();
        let pool = pool_with(&driver, PoolConfig::default());

        let first = pool.acquire("t", AcquireOptions::default()).await.unwrap();
        let first_id = first.context_id.clone();
        pool.release(&first_id, ReleaseOutcome { success: true, ..Default::default() })
            .await;

        let second = pool.acquire("t", AcquireOptions::default()).await.unwrap();
        assert_eq!(second.context_id, first_id);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn detected_context_goes_to_quarantine() {
        let driver = MockDriver::new();
        let pool = pool_with(&driver, PoolConfig::default());

        let lease = pool.acquire("t", AcquireOptions::default()).await.unwrap();
        let id = lease.context_id.clone();
        // Two detections walk health to DETECTED; the release decision
        // quarantines.
        pool.release(&id, ReleaseOutcome {
            success: false,
            detected: Some(DetectionKind::Cloudflare),
            ..Default::default()
        })
        .await;
        let again = pool.acquire("t", AcquireOptions::default()).await.unwrap();
        assert_ne!(again.context_id, id, "suspicious context must not be warm-reused before detection");
        pool.release(&id, ReleaseOutcome {
            success: false,
            detected: Some(DetectionKind::Cloudflare),
            ..Default::default()
        })
        .await;

        let status = pool.status().await;
        assert_eq!(status.quarantined, 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn byte_overflow_closes_the_context() {
        let driver = MockDriver::new();
        let pool = pool_with(
            &driver,
            PoolConfig {
                context_limit_mb: 1,
                ..PoolConfig::default()
            },
        );

        let lease = pool.acquire("t", AcquireOptions::default()).await.unwrap();
        driver.emit_response(
            lease.page.id(),
            ResponseEvent {
                url: "https://big.test/file".into(),
                status: 200,
                headers: HashMap::new(),
                body_bytes: 2 * 1024 * 1024,
                resource_type: ResourceType::Other,
                elapsed_ms: 10.0,
                body: None,
            },
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let id = lease.context_id.clone();
        pool.release(&id, ReleaseOutcome { success: true, ..Default::default() })
            .await;

        assert!(driver.closed_contexts().contains(&id));
        let status = pool.status().await;
        assert_eq!(status.contexts, 0);
        // Spent bytes stay on the global meter after closure.
        assert!(status.global_bytes_used > 2 * 1024 * 1024);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_refuses_new_acquisitions() {
        let driver = MockDriver::new();
        let pool = pool_with(&driver, PoolConfig::default());
        pool.shutdown().await;

        let result = pool.acquire("t", AcquireOptions::default()).await;
        assert!(matches!(result, Err(AcquireError::DriverUnavailable(_))));
    }

    #[tokio::test]
    async fn disconnected_driver_surfaces_as_unavailable() {
        let driver = MockDriver::new();
        let pool = pool_with(&driver, PoolConfig::default());
        driver.disconnect();

        let result = pool.acquire("t", AcquireOptions::default()).await;
        assert!(matches!(result, Err(AcquireError::DriverUnavailable(_))));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn success_boosts_profile_reputation() {
        let driver = MockDriver::new();
        let pool = pool_with(&driver, PoolConfig::default());

        let lease = pool.acquire("t", AcquireOptions::default()).await.unwrap();
        let profile = pool.profiles().get(&lease.profile_id).unwrap();
        {
            let mut p = profile.lock().await;
            p.reputation = 0.5;
        }
        pool.release(
            &lease.context_id,
            ReleaseOutcome { success: true, ..Default::default() },
        )
        .await;

        assert!((profile.lock().await.reputation - 0.55).abs() < 1e-9);
        pool.shutdown().await;
    }
}
