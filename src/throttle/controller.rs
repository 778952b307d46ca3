use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::{BurstPolicy, DamperConfig};
use crate::error::DamperError;
use crate::event_log::{Event, EventKind, EventLog, Payload};
use crate::stats::WindowCounts;

use super::state::{Limits, Mode, ThrottleState, Transition};

/// The result of one `evaluate` call: what moved, and the state after.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub transition: Transition,
    pub state: ThrottleState,
}

struct ControllerInner {
    state: ThrottleState,
    // (now, log sequence after our own appends) of the last evaluation.
    // A repeat call with the same pair is a no-op.
    last_eval: Option<(DateTime<Utc>, u64)>,
}

/// The throttling state machine.
///
/// Consumes windowed statistics from the event log, maintains the smoothed
/// error-pressure score, decides hysteresis transitions, and derives the
/// effective admission budget and scheduler sleep. `evaluate` is the only
/// mutator; everything callers see is a cloned snapshot, never a reference
/// into the live state.
pub struct ThrottleController {
    config: DamperConfig,
    log: Arc<EventLog>,
    inner: Mutex<ControllerInner>,
}

impl ThrottleController {
    /// Construct the controller, validating the configuration.
    ///
    /// Invalid thresholds (a broken hysteresis band, a zero budget) are fatal
    /// here rather than surfacing mid-flight.
    pub fn new(config: DamperConfig, log: Arc<EventLog>) -> Result<Self, DamperError> {
        Self::new_at(config, log, Utc::now())
    }

    /// Like [`ThrottleController::new`] with an explicit start instant.
    pub fn new_at(
        config: DamperConfig,
        log: Arc<EventLog>,
        now: DateTime<Utc>,
    ) -> Result<Self, DamperError> {
        config.validate()?;
        let state = ThrottleState::baseline(&config, now);
        Ok(Self {
            config,
            log,
            inner: Mutex::new(ControllerInner {
                state,
                last_eval: None,
            }),
        })
    }

    /// Ingestion boundary: append an event stamped with the current time.
    /// Called by task-execution code on success/failure; never fails.
    pub fn log_event(&self, kind: EventKind, payload: Payload) {
        self.log.append(Event::new(kind, payload));
    }

    /// Admission limit currently in force. Polled by the dispatcher each cycle.
    pub fn current_budget(&self) -> u32 {
        self.lock().state.effective_budget
    }

    /// Scheduler sleep currently in force, in seconds.
    pub fn current_sleep(&self) -> f64 {
        self.lock().state.effective_sleep_sec
    }

    /// Read-only copy of the current state, safe to serialize as the status
    /// structure. Readers see either the pre- or post-transition state, never
    /// a mix.
    pub fn snapshot(&self) -> ThrottleState {
        self.lock().state.clone()
    }

    /// Recompute score, burst flag, and mode for the instant `now`.
    ///
    /// Serialized against itself through the state lock, so two concurrent
    /// calls cannot double-apply a transition or double-emit a `THROTTLE_*`
    /// event. Repeated calls at the same `now` with an unchanged log return
    /// the current state untouched.
    pub fn evaluate(&self, now: DateTime<Utc>) -> Evaluation {
        let mut inner = self.lock();

        if inner.last_eval == Some((now, self.log.seq())) {
            return Evaluation {
                transition: Transition::Hold,
                state: inner.state.clone(),
            };
        }

        let counts = WindowCounts::sample(&self.log, self.config.window(), now);
        let score = match counts.error_rate() {
            // Quiet window: the score heals by the decay factor per tick.
            None => inner.state.score * self.config.decay,
            Some(raw) => {
                self.config.alpha * raw + (1.0 - self.config.alpha) * inner.state.score
            }
        }
        .clamp(0.0, 1.0);
        let burst = counts.errors >= self.config.burst_threshold;

        let transition = self.decide(inner.state.mode, score, burst);
        inner.state.score = score;

        match transition {
            Transition::Hold => {
                inner.state.reasons = vec![format!(
                    "steady: score {score:.3} ({} errors / {} outcomes in {}s)",
                    counts.errors, counts.total, self.config.window_sec
                )];
            }
            Transition::Escalate { from, to } => {
                self.apply_change(&mut inner.state, to, now, score);
                inner.state.reasons = self.escalation_reasons(from, to, score, burst, &counts);
                self.emit_transition(EventKind::ThrottleUp, from, to, score, now);
            }
            Transition::Relax { from, to } => {
                self.apply_change(&mut inner.state, to, now, score);
                inner.state.reasons = self.relaxation_reasons(from, to, score);
                self.emit_transition(EventKind::ThrottleDown, from, to, score, now);
            }
        }

        inner.last_eval = Some((now, self.log.seq()));
        Evaluation {
            transition,
            state: inner.state.clone(),
        }
    }

    /// The hysteresis table. One level per call; NORMAL and THROTTLED never
    /// trade places directly. Escalation takes priority when both conditions
    /// hold (a burst during an otherwise quiet CAUTION window).
    fn decide(&self, mode: Mode, score: f64, burst: bool) -> Transition {
        let (escalate, relax) = match mode {
            Mode::Normal => (burst || score >= self.config.caution_high, false),
            Mode::Caution => {
                let burst_escalates =
                    burst && self.config.burst_policy == BurstPolicy::EscalateOneLevel;
                (
                    score >= self.config.throttle_high || burst_escalates,
                    score <= self.config.caution_low,
                )
            }
            Mode::Throttled => (false, score <= self.config.throttle_low),
        };
        if escalate && let Some(to) = mode.escalated() {
            Transition::Escalate { from: mode, to }
        } else if relax && let Some(to) = mode.relaxed() {
            Transition::Relax { from: mode, to }
        } else {
            Transition::Hold
        }
    }

    fn apply_change(&self, state: &mut ThrottleState, to: Mode, now: DateTime<Utc>, score: f64) {
        let limits = Limits::for_mode(to, &self.config);
        state.mode = to;
        state.score = score;
        state.effective_budget = limits.budget;
        state.effective_sleep_sec = limits.sleep_sec;
        state.last_change = now;
    }

    fn escalation_reasons(
        &self,
        from: Mode,
        to: Mode,
        score: f64,
        burst: bool,
        counts: &WindowCounts,
    ) -> Vec<String> {
        let mut reasons = Vec::new();
        if burst {
            reasons.push(format!(
                "burst: {} errors in {}s (threshold {})",
                counts.errors, self.config.window_sec, self.config.burst_threshold
            ));
        }
        let threshold = match from {
            Mode::Normal => self.config.caution_high,
            _ => self.config.throttle_high,
        };
        if score >= threshold {
            let name = match from {
                Mode::Normal => "caution_high",
                _ => "throttle_high",
            };
            reasons.push(format!("score {score:.3} >= {name} {threshold}"));
        }
        reasons.push(format!("escalate {from} -> {to}"));
        reasons
    }

    fn relaxation_reasons(&self, from: Mode, to: Mode, score: f64) -> Vec<String> {
        let (name, threshold) = match from {
            Mode::Throttled => ("throttle_low", self.config.throttle_low),
            _ => ("caution_low", self.config.caution_low),
        };
        vec![
            format!("score {score:.3} <= {name} {threshold}"),
            format!("de-escalate {from} -> {to}"),
        ]
    }

    fn emit_transition(
        &self,
        kind: EventKind,
        from: Mode,
        to: Mode,
        score: f64,
        now: DateTime<Utc>,
    ) {
        let mut payload = Payload::new();
        payload.insert("from".to_string(), json!(from.to_string()));
        payload.insert("to".to_string(), json!(to.to_string()));
        payload.insert("score".to_string(), json!((score * 1000.0).round() / 1000.0));
        self.log.append(Event::at(now, kind, payload));
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().expect("throttle state lock poisoned")
    }
}
