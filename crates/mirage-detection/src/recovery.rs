//! Recovery scheduling
//!
//! Each detection kind maps to an ordered recipe of recovery actions;
//! the first action that succeeds wins, an exhausted recipe reports
//! failure. A successful recovery puts the (url, kind) pair on cooldown
//! so repeated detections of the same challenge do not re-trigger the
//! recipe. Pool-level actions (proxy/profile rotation, context switch,
//! CAPTCHA solving) are hooks the embedding layer provides.

use async_trait::async_trait;
use dashmap::DashMap;
use mirage_driver::{ContextHandle, PageHandle};
use mirage_stealth::{BehaviorSimulator, InitScript};
use mirage_types::{DetectionEvent, DetectionKind, RecoveryAction, RecoveryOutcome};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Pool-level recovery operations provided by the embedding layer.
///
/// Defaults report failure: an absent capability is a skipped recipe
/// step, never a fatal error.
#[async_trait]
pub trait RecoveryHooks: Send + Sync {
    async fn rotate_proxy(&self, _context_id: &str) -> bool {
        false
    }

    async fn rotate_profile(&self, _context_id: &str) -> bool {
        false
    }

    async fn switch_context(&self, _context_id: &str) -> bool {
        false
    }

    /// CAPTCHA solving back-ends are out of scope; installing one is the
    /// caller's business.
    async fn solve_captcha(&self, _page_id: &str, _event: &DetectionEvent) -> bool {
        false
    }
}

/// Hook set with every capability absent.
pub struct NoHooks;

#[async_trait]
impl RecoveryHooks for NoHooks {}

/// One recipe step
#[derive(Debug, Clone, Copy)]
struct Step {
    action: RecoveryAction,
    /// Budget for timed actions (waits, simulations, solver timeout)
    budget: Duration,
}

fn recipe(kind: DetectionKind) -> &'static [Step] {
    use RecoveryAction::*;
    const fn step(action: RecoveryAction, secs: u64) -> Step {
        Step {
            action,
            budget: Duration::from_secs(secs),
        }
    }
    match kind {
        DetectionKind::Captcha => &const { [step(CaptchaSolve, 300), step(HumanSimulation, 30)] },
        DetectionKind::Cloudflare => {
            &const { [step(Wait, 5), step(StealthUpgrade, 0), step(RotateProxy, 0)] }
        }
        DetectionKind::RateLimit => {
            &const { [step(Wait, 60), step(RotateProxy, 0), step(RotateProfile, 0)] }
        }
        DetectionKind::Fingerprint => &const {
            [
                step(RotateProfile, 0),
                step(StealthUpgrade, 0),
                step(SwitchContext, 0),
            ]
        },
        DetectionKind::Behavioral => &const { [step(HumanSimulation, 60), step(Wait, 30)] },
        DetectionKind::CdpDetection => {
            &const { [step(StealthUpgrade, 0), step(SwitchContext, 0)] }
        }
        DetectionKind::IpBlock => &const { [step(RotateProxy, 0), step(Wait, 300)] },
        DetectionKind::SessionInvalid => {
            &const { [step(ClearCookies, 0), step(RotateProfile, 0)] }
        }
        DetectionKind::Unknown => &const { [step(Refresh, 0), step(Wait, 30)] },
    }
}

/// Cooldown after a successful recovery for the same (url, kind).
fn cooldown_for(kind: DetectionKind) -> Duration {
    let secs = match kind {
        DetectionKind::Captcha => 60,
        DetectionKind::Cloudflare => 120,
        DetectionKind::RateLimit => 300,
        DetectionKind::IpBlock => 600,
        _ => 180,
    };
    Duration::from_secs(secs)
}

/// Per-attempt statistics
#[derive(Debug, Clone, Default)]
pub struct RecoveryStats {
    pub attempts: u64,
    pub recoveries: u64,
    pub skipped_on_cooldown: u64,
}

/// Everything an attempt operates on
pub struct RecoveryTarget {
    pub page: Arc<dyn PageHandle>,
    pub context: Arc<dyn ContextHandle>,
    pub behavior: BehaviorSimulator,
    /// Viewport used for human simulation
    pub viewport: (u32, u32),
}

/// Executes recovery recipes against detection events
pub struct RecoveryScheduler {
    hooks: Arc<dyn RecoveryHooks>,
    cooldowns: DashMap<(String, DetectionKind), Instant>,
    stats: std::sync::Mutex<RecoveryStats>,
}

impl RecoveryScheduler {
    pub fn new(hooks: Arc<dyn RecoveryHooks>) -> Self {
        Self {
            hooks,
            cooldowns: DashMap::new(),
            stats: std::sync::Mutex::new(RecoveryStats::default()),
        }
    }

    pub fn stats(&self) -> RecoveryStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Attempt recovery for one detection event. Runs the kind's recipe
    /// in order; the first successful action short-circuits. Returns a
    /// skipped outcome while the (url, kind) pair is cooling down.
    pub async fn handle(&self, event: &DetectionEvent, target: &RecoveryTarget) -> RecoveryOutcome {
        let key = (normalize_url(&event.url), event.kind);
        if let Some(since) = self.cooldowns.get(&key) {
            if since.elapsed() < cooldown_for(event.kind) {
                debug!(kind = %event.kind, url = %event.url, "Recovery on cooldown, skipping");
                let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                stats.skipped_on_cooldown += 1;
                return RecoveryOutcome::skipped();
            }
        }

        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.attempts += 1;
        }
        let started = Instant::now();
        let mut attempted = Vec::new();

        for step in recipe(event.kind) {
            attempted.push(step.action);
            if step.action == RecoveryAction::Abort {
                break;
            }
            let ok = self.execute(step, event, target).await;
            info!(
                kind = %event.kind,
                action = %step.action,
                ok,
                "Recovery action finished"
            );
            if ok {
                self.cooldowns.insert(key, Instant::now());
                let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                stats.recoveries += 1;
                return RecoveryOutcome::success(
                    step.action,
                    attempted,
                    started.elapsed().as_millis() as u64,
                );
            }
        }

        warn!(kind = %event.kind, url = %event.url, "Recovery recipe exhausted");
        RecoveryOutcome::failure(attempted, started.elapsed().as_millis() as u64)
    }

    async fn execute(&self, step: &Step, event: &DetectionEvent, target: &RecoveryTarget) -> bool {
        use RecoveryAction::*;
        match step.action {
            Wait => {
                tokio::time::sleep(jittered(step.budget)).await;
                true
            }
            Refresh => target.page.reload().await.is_ok(),
            ClearCookies => {
                let origin = origin_of(&event.url);
                target
                    .context
                    .clear_cookies(origin.as_deref())
                    .await
                    .is_ok()
            }
            HumanSimulation => target
                .behavior
                .run(&target.page, target.viewport, jittered(step.budget))
                .await
                .is_ok(),
            StealthUpgrade => {
                let script = InitScript::upgrade();
                // Future documents get the init script; the current one
                // gets the live evaluation.
                if target.context.add_init_script(&script).await.is_err() {
                    return false;
                }
                target.page.evaluate(&script).await.is_ok()
            }
            RotateProxy => self.hooks.rotate_proxy(target.context.id()).await,
            RotateProfile => self.hooks.rotate_profile(target.context.id()).await,
            SwitchContext => self.hooks.switch_context(target.context.id()).await,
            CaptchaSolve => {
                match tokio::time::timeout(
                    jittered(step.budget),
                    self.hooks.solve_captcha(&event.page_id, event),
                )
                .await
                {
                    Ok(solved) => solved,
                    Err(_) => {
                        warn!(url = %event.url, "CAPTCHA solve timed out");
                        false
                    }
                }
            }
            Abort => false,
        }
    }
}

/// Apply the ±20% jitter every recipe duration carries.
fn jittered(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    base.mul_f64(factor)
}

/// Cooldown keys ignore query strings: the same challenge page with a
/// different cache-buster is the same challenge.
fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => format!(
            "{}://{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            parsed.path()
        ),
        Err(_) => url.to_string(),
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Some(format!(
        "{}://{}",
        parsed.scheme(),
        parsed.host_str()?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_driver::{ContextOptions, Driver, LaunchOptions, MockDriver};
    use mirage_types::BehavioralModel;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHooks {
        proxy_rotations: AtomicU32,
        succeed: bool,
    }

    #[async_trait]
    impl RecoveryHooks for CountingHooks {
        async fn rotate_proxy(&self, _context_id: &str) -> bool {
            self.proxy_rotations.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    async fn target() -> (MockDriver, RecoveryTarget) {
        let driver = MockDriver::new();
        let browser = driver.launch(LaunchOptions::default()).await.unwrap();
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        let page = context.new_page().await.unwrap();
        page.goto("https://shop.test/").await.unwrap();
        (
            driver,
            RecoveryTarget {
                page,
                context,
                behavior: BehaviorSimulator::new(BehavioralModel::default()),
                viewport: (1280, 720),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn cloudflare_recipe_starts_with_wait() {
        let (_driver, target) = target().await;
        let scheduler = RecoveryScheduler::new(Arc::new(NoHooks));
        let event = DetectionEvent::new(DetectionKind::Cloudflare, 0.9, "https://shop.test/gate");

        let outcome = scheduler.handle(&event, &target).await;
        assert!(outcome.recovered);
        assert_eq!(outcome.action, Some(RecoveryAction::Wait));
        assert_eq!(outcome.attempted, vec![RecoveryAction::Wait]);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_recovery_enters_cooldown() {
        let (_driver, target) = target().await;
        let scheduler = RecoveryScheduler::new(Arc::new(NoHooks));
        let event = DetectionEvent::new(DetectionKind::RateLimit, 0.95, "https://shop.test/api");

        let first = scheduler.handle(&event, &target).await;
        assert!(first.recovered);

        // A detection for the same (url, kind) inside the 300 s cooldown
        // attempts nothing.
        let second = scheduler.handle(&event, &target).await;
        assert!(!second.recovered);
        assert!(second.attempted.is_empty());
        assert_eq!(scheduler.stats().skipped_on_cooldown, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_expires_after_window() {
        let (_driver, target) = target().await;
        let scheduler = RecoveryScheduler::new(Arc::new(NoHooks));
        let event = DetectionEvent::new(DetectionKind::RateLimit, 0.95, "https://shop.test/api");

        scheduler.handle(&event, &target).await;
        tokio::time::advance(Duration::from_secs(301)).await;
        let retry = scheduler.handle(&event, &target).await;
        assert!(retry.recovered);
        assert_eq!(scheduler.stats().recoveries, 2);
    }

    #[tokio::test]
    async fn fingerprint_recipe_falls_through_to_stealth_upgrade() {
        let (driver, target) = target().await;
        // No hooks: RotateProfile fails, StealthUpgrade succeeds.
        let scheduler = RecoveryScheduler::new(Arc::new(NoHooks));
        let event = DetectionEvent::new(DetectionKind::Fingerprint, 0.95, "https://shop.test/");

        let outcome = scheduler.handle(&event, &target).await;
        assert!(outcome.recovered);
        assert_eq!(outcome.action, Some(RecoveryAction::StealthUpgrade));
        assert_eq!(
            outcome.attempted,
            vec![RecoveryAction::RotateProfile, RecoveryAction::StealthUpgrade]
        );
        // The upgrade script reached both the context and the live page.
        assert_eq!(driver.init_scripts_for(target.context.id()).len(), 1);
        assert!(driver
            .evaluated_scripts()
            .iter()
            .any(|s| s.contains("Runtime.enable")));
    }

    #[tokio::test]
    async fn hooks_receive_pool_level_actions() {
        let (_driver, target) = target().await;
        let hooks = Arc::new(CountingHooks {
            proxy_rotations: AtomicU32::new(0),
            succeed: true,
        });
        let scheduler = RecoveryScheduler::new(hooks.clone());
        let event = DetectionEvent::new(DetectionKind::IpBlock, 0.95, "https://shop.test/");

        let outcome = scheduler.handle(&event, &target).await;
        assert!(outcome.recovered);
        assert_eq!(outcome.action, Some(RecoveryAction::RotateProxy));
        assert_eq!(hooks.proxy_rotations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_recipe_reports_failure() {
        let (_driver, target) = target().await;
        let scheduler = RecoveryScheduler::new(Arc::new(NoHooks));
        // CdpDetection recipe: StealthUpgrade, SwitchContext. Kill the
        // driver so the upgrade fails too.
        let event = DetectionEvent::new(DetectionKind::CdpDetection, 0.95, "https://shop.test/");
        target.page.close().await.unwrap();

        let outcome = scheduler.handle(&event, &target).await;
        assert!(!outcome.recovered);
        assert_eq!(outcome.attempted.len(), 2);
    }
}
