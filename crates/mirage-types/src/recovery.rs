//! Recovery action taxonomy

use serde::{Deserialize, Serialize};

/// An action the recovery scheduler can take in response to a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Wait,
    Refresh,
    ClearCookies,
    RotateProxy,
    RotateProfile,
    SwitchContext,
    HumanSimulation,
    StealthUpgrade,
    CaptchaSolve,
    Abort,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::Wait => "wait",
            RecoveryAction::Refresh => "refresh",
            RecoveryAction::ClearCookies => "clear_cookies",
            RecoveryAction::RotateProxy => "rotate_proxy",
            RecoveryAction::RotateProfile => "rotate_profile",
            RecoveryAction::SwitchContext => "switch_context",
            RecoveryAction::HumanSimulation => "human_simulation",
            RecoveryAction::StealthUpgrade => "stealth_upgrade",
            RecoveryAction::CaptchaSolve => "captcha_solve",
            RecoveryAction::Abort => "abort",
        }
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one recovery attempt over a recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    /// Whether any action in the recipe succeeded
    pub recovered: bool,

    /// The action that succeeded, when one did
    pub action: Option<RecoveryAction>,

    /// Actions attempted, in order
    pub attempted: Vec<RecoveryAction>,

    /// Total wall-clock spent on the attempt, milliseconds
    pub elapsed_ms: u64,
}

impl RecoveryOutcome {
    pub fn failure(attempted: Vec<RecoveryAction>, elapsed_ms: u64) -> Self {
        Self {
            recovered: false,
            action: None,
            attempted,
            elapsed_ms,
        }
    }

    pub fn success(
        action: RecoveryAction,
        attempted: Vec<RecoveryAction>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            recovered: true,
            action: Some(action),
            attempted,
            elapsed_ms,
        }
    }

    /// Cooldown skip: nothing attempted, nothing recovered.
    pub fn skipped() -> Self {
        Self {
            recovered: false,
            action: None,
            attempted: Vec::new(),
            elapsed_ms: 0,
        }
    }
}
