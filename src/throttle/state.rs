use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DamperConfig;

/// The three health levels of the throttling state machine.
///
/// Escalation and de-escalation move one level at a time:
/// NORMAL ⇄ CAUTION ⇄ THROTTLED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Normal,
    Caution,
    Throttled,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => write!(f, "NORMAL"),
            Mode::Caution => write!(f, "CAUTION"),
            Mode::Throttled => write!(f, "THROTTLED"),
        }
    }
}

impl Mode {
    /// The next level up, or `None` at the ceiling.
    pub fn escalated(self) -> Option<Mode> {
        match self {
            Mode::Normal => Some(Mode::Caution),
            Mode::Caution => Some(Mode::Throttled),
            Mode::Throttled => None,
        }
    }

    /// The next level down, or `None` at the floor.
    pub fn relaxed(self) -> Option<Mode> {
        match self {
            Mode::Normal => None,
            Mode::Caution => Some(Mode::Normal),
            Mode::Throttled => Some(Mode::Caution),
        }
    }
}

/// The result of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No mode change this tick.
    Hold,
    /// Escalated one level.
    Escalate { from: Mode, to: Mode },
    /// De-escalated one level.
    Relax { from: Mode, to: Mode },
}

/// Effective admission limit and scheduler sleep, keyed purely by mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub budget: u32,
    pub sleep_sec: f64,
}

impl Limits {
    /// Derive the limits for a mode from the configured baselines and factors.
    ///
    /// Budgets are rounded down but floored at 1 so no mode ever starves
    /// admission completely; sleep is capped at `max_sleep_sec`.
    pub fn for_mode(mode: Mode, config: &DamperConfig) -> Self {
        let (budget_factor, sleep_factor) = match mode {
            Mode::Normal => (1.0, 1.0),
            Mode::Caution => (config.caution_budget_factor, config.caution_sleep_factor),
            Mode::Throttled => (config.throttle_budget_factor, config.throttle_sleep_factor),
        };
        let budget = ((config.base_budget as f64 * budget_factor).floor() as u32).max(1);
        let sleep_sec = (config.base_sleep_sec * sleep_factor).min(config.max_sleep_sec);
        Self { budget, sleep_sec }
    }
}

/// The single process-wide throttling state.
///
/// Owned by the controller behind a mutex; callers only ever see clones via
/// `snapshot()`. Serializes directly as the documented status structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleState {
    pub mode: Mode,
    /// Smoothed error pressure in `[0, 1]`.
    pub score: f64,
    pub effective_budget: u32,
    #[serde(rename = "effective_sched_sleep_sec")]
    pub effective_sleep_sec: f64,
    /// Timestamp of the most recent mode transition.
    pub last_change: DateTime<Utc>,
    /// Short strings explaining the latest decision. Observability only —
    /// never an input to the logic.
    pub reasons: Vec<String>,
}

impl ThrottleState {
    /// Baseline state at process start: NORMAL, score 0, configured limits.
    pub fn baseline(config: &DamperConfig, now: DateTime<Utc>) -> Self {
        let limits = Limits::for_mode(Mode::Normal, config);
        Self {
            mode: Mode::Normal,
            score: 0.0,
            effective_budget: limits.budget,
            effective_sleep_sec: limits.sleep_sec,
            last_change: now,
            reasons: Vec::new(),
        }
    }
}
