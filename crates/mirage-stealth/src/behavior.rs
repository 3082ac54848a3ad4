//! Human-behavior simulation primitives
//!
//! Generates mouse paths, scroll actions and pacing from a profile's
//! behavioral model, and drives a page through a timed human-simulation
//! round: wander the pointer, scroll a little, occasionally hover-click
//! something harmless.

use mirage_driver::PageHandle;
use mirage_types::{BehavioralModel, DriverError};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A point in page coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A generated mouse movement path
#[derive(Debug, Clone)]
pub struct MousePath {
    pub points: Vec<Point>,
    /// Delay between consecutive points
    pub step_delay: Duration,
}

/// A generated scroll step
#[derive(Debug, Clone, Copy)]
pub struct ScrollAction {
    pub delta_y: f64,
    pub pause_after: Duration,
}

/// Behavior generator parameterized by one profile's model
pub struct BehaviorSimulator {
    model: BehavioralModel,
}

impl BehaviorSimulator {
    pub fn new(model: BehavioralModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &BehavioralModel {
        &self.model
    }

    /// Generate a jittered path from `from` to `to` with waypoints on a
    /// curve. Point count scales with distance and the model's
    /// acceleration.
    pub fn mouse_path<R: Rng + ?Sized>(&self, from: Point, to: Point, rng: &mut R) -> MousePath {
        let distance = ((to.x - from.x).powi(2) + (to.y - from.y).powi(2)).sqrt();
        let steps = ((distance / 40.0 / self.model.mouse_acceleration).ceil() as usize).clamp(3, 40);
        let jitter = self.model.jitter_factor * 30.0;

        let mut points = Vec::with_capacity(steps + 1);
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            // Ease-in-out with per-point jitter.
            let eased = t * t * (3.0 - 2.0 * t);
            points.push(Point {
                x: from.x + (to.x - from.x) * eased + rng.gen_range(-jitter..=jitter),
                y: from.y + (to.y - from.y) * eased + rng.gen_range(-jitter..=jitter),
            });
        }
        // The pointer lands exactly on the target.
        points.push(to);

        MousePath {
            points,
            step_delay: Duration::from_millis(rng.gen_range(8..24)),
        }
    }

    /// Generate one scroll step within the model's preferred velocity.
    pub fn scroll_action<R: Rng + ?Sized>(&self, rng: &mut R) -> ScrollAction {
        let magnitude = self.model.scroll_velocity * rng.gen_range(0.4..=1.0);
        let delta_y = if rng.gen_bool(0.8) { magnitude } else { -magnitude * 0.5 };
        ScrollAction {
            delta_y,
            pause_after: Duration::from_millis(rng.gen_range(300..1_200)),
        }
    }

    /// Pause between actions, scaled by confidence.
    pub fn inter_action_pause<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let base = self.model.inter_action_pause_s;
        Duration::from_millis((base * rng.gen_range(0.7..=1.4) * 1_000.0) as u64)
    }

    /// Drive a page like a person for roughly `duration`: mouse wander
    /// every step, a scroll 30% of the time, a hover-click on a safe
    /// element 10% of the time, U(0.5, 3) s between steps and a 10%
    /// chance of a 1-3 s micro-pause.
    pub async fn run(
        &self,
        page: &Arc<dyn PageHandle>,
        viewport: (u32, u32),
        duration: Duration,
    ) -> Result<(), DriverError> {
        let deadline = tokio::time::Instant::now() + duration;
        let (width, height) = viewport;
        let mut current = Point {
            x: width as f64 / 2.0,
            y: height as f64 / 2.0,
        };
        let mut steps = 0u32;

        while tokio::time::Instant::now() < deadline {
            let (target, path, do_scroll, do_click, scroll, step_delay, micro_pause) = {
                let mut rng = rand::thread_rng();
                let target = Point {
                    x: rng.gen_range(0.0..width as f64),
                    y: rng.gen_range(0.0..height as f64),
                };
                let path = self.mouse_path(current, target, &mut rng);
                let do_scroll = rng.gen_bool(0.3);
                let do_click = rng.gen_bool(0.1);
                let scroll_delta: f64 = rng.gen_range(-200.0..=200.0);
                let step_delay = Duration::from_secs_f64(rng.gen_range(0.5..3.0));
                let micro_pause = if rng.gen_bool(0.1) {
                    Some(Duration::from_secs_f64(rng.gen_range(1.0..3.0)))
                } else {
                    None
                };
                (target, path, do_scroll, do_click, scroll_delta, step_delay, micro_pause)
            };

            for point in &path.points {
                page.mouse_move(point.x, point.y).await?;
                tokio::time::sleep(path.step_delay).await;
            }
            current = target;

            if do_scroll {
                page.scroll_by(0.0, scroll).await?;
            }
            if do_click {
                if let Some(selector) = self.pick_safe_element(page).await {
                    page.mouse_move(current.x, current.y).await?;
                    page.click(&selector).await?;
                }
            }

            steps += 1;
            tokio::time::sleep(step_delay.min(deadline - tokio::time::Instant::now().min(deadline))).await;
            if let Some(pause) = micro_pause {
                tokio::time::sleep(pause).await;
            }
        }

        debug!(steps, "Human simulation round finished");
        Ok(())
    }

    /// One of the first five links or buttons on the page, if any.
    async fn pick_safe_element(&self, page: &Arc<dyn PageHandle>) -> Option<String> {
        let value = page
            .evaluate(
                "(() => Array.from(document.querySelectorAll('a, button')).slice(0, 5)\
                 .map((el, i) => el.tagName.toLowerCase() + ':nth-of-type(' + (i + 1) + ')'))()",
            )
            .await
            .ok()?;
        let candidates: Vec<String> = serde_json::from_value(value).ok()?;
        if candidates.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..candidates.len());
        Some(candidates[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn mouse_path_ends_on_target() {
        let sim = BehaviorSimulator::new(BehavioralModel::default());
        let mut rng = StdRng::seed_from_u64(1);
        let to = Point { x: 640.0, y: 360.0 };
        let path = sim.mouse_path(Point { x: 0.0, y: 0.0 }, to, &mut rng);
        assert!(path.points.len() >= 4);
        assert_eq!(*path.points.last().unwrap(), to);
    }

    #[test]
    fn scroll_actions_respect_velocity_preference() {
        let model = BehavioralModel {
            scroll_velocity: 400.0,
            ..BehavioralModel::default()
        };
        let sim = BehaviorSimulator::new(model);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            let action = sim.scroll_action(&mut rng);
            assert!(action.delta_y.abs() <= 400.0);
        }
    }

    #[tokio::test]
    async fn run_interacts_with_the_page() {
        use mirage_driver::{ContextOptions, Driver, LaunchOptions, MockDriver};

        let driver = MockDriver::new();
        let browser = driver.launch(LaunchOptions::default()).await.unwrap();
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        let page = context.new_page().await.unwrap();

        let sim = BehaviorSimulator::new(BehavioralModel::default());
        sim.run(&page, (1280, 720), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(driver.interaction_count() > 0);
    }
}
