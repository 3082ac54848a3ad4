//! Behavioral model carried by a profile
//!
//! The model parameterizes human-simulation primitives (mouse paths,
//! scroll cadence, dwell times). It adapts over the profile's lifetime:
//! success builds confidence and speeds interactions up, detection erodes
//! confidence and adds hesitation.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Interaction-style parameters for one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralModel {
    /// Typing speed in words per minute
    pub typing_wpm: f64,

    /// Mouse acceleration factor
    pub mouse_acceleration: f64,

    /// Preferred scroll distance per action, pixels
    pub scroll_velocity: f64,

    /// Time a click is held, milliseconds
    pub click_dwell_ms: f64,

    /// Movement jitter factor
    pub jitter_factor: f64,

    /// Pause between actions, seconds
    pub inter_action_pause_s: f64,

    /// Reading speed in words per minute
    pub reading_wpm: f64,

    /// Attention span before focus drifts, seconds
    pub attention_span_s: f64,

    /// Probability of switching activities mid-task
    pub multitasking_tendency: f64,

    /// Confidence in [0, 1]; drives speed and hesitation
    pub confidence_level: f64,
}

impl Default for BehavioralModel {
    fn default() -> Self {
        Self {
            typing_wpm: 60.0,
            mouse_acceleration: 1.4,
            scroll_velocity: 500.0,
            click_dwell_ms: 105.0,
            jitter_factor: 0.08,
            inter_action_pause_s: 0.95,
            reading_wpm: 260.0,
            attention_span_s: 27.0,
            multitasking_tendency: 0.35,
            confidence_level: 0.75,
        }
    }
}

impl BehavioralModel {
    /// Sample a fresh model with population-plausible parameters.
    pub fn sampled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            typing_wpm: rng.gen_range(45.0..75.0),
            mouse_acceleration: rng.gen_range(1.0..1.8),
            scroll_velocity: rng.gen_range(300.0..700.0),
            click_dwell_ms: rng.gen_range(70.0..140.0),
            jitter_factor: rng.gen_range(0.04..0.12),
            inter_action_pause_s: rng.gen_range(0.4..1.5),
            reading_wpm: rng.gen_range(200.0..320.0),
            attention_span_s: rng.gen_range(15.0..40.0),
            multitasking_tendency: rng.gen_range(0.15..0.55),
            confidence_level: rng.gen_range(0.6..0.9),
        }
    }

    /// Adapt the model after an interaction round.
    ///
    /// Success compounds confidence (capped), speeds typing up toward 90
    /// WPM and shortens pauses toward 0.2 s. Failure erodes confidence,
    /// slows interactions and adds jitter, capped at 0.2.
    pub fn adapt(&mut self, success: bool) {
        if success {
            self.confidence_level = (self.confidence_level * 1.05 + 0.02).min(1.0);
            self.typing_wpm =
                (self.typing_wpm * (1.0 + (self.confidence_level - 0.5) * 0.05)).min(90.0);
            self.inter_action_pause_s =
                (self.inter_action_pause_s * (1.0 - (self.confidence_level - 0.5) * 0.1)).max(0.2);
        } else {
            self.confidence_level = (self.confidence_level * 0.90 - 0.05).max(0.1);
            self.typing_wpm *= 0.9 + self.confidence_level * 0.1;
            self.inter_action_pause_s *= 1.1 - self.confidence_level * 0.1;
            self.jitter_factor = (self.jitter_factor * 1.1).min(0.2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn success_raises_confidence_failure_lowers_it() {
        let mut model = BehavioralModel::default();
        let before = model.confidence_level;
        model.adapt(true);
        assert!(model.confidence_level > before);

        let before = model.confidence_level;
        model.adapt(false);
        assert!(model.confidence_level < before);
    }

    #[test]
    fn confidence_stays_bounded() {
        let mut model = BehavioralModel::default();
        for _ in 0..100 {
            model.adapt(true);
        }
        assert!(model.confidence_level <= 1.0);
        assert!(model.typing_wpm <= 90.0);

        for _ in 0..100 {
            model.adapt(false);
        }
        assert!(model.confidence_level >= 0.1);
        assert!(model.jitter_factor <= 0.2);
    }

    #[test]
    fn sampled_models_stay_in_population_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let m = BehavioralModel::sampled(&mut rng);
            assert!((45.0..75.0).contains(&m.typing_wpm));
            assert!((0.6..0.9).contains(&m.confidence_level));
        }
    }
}
