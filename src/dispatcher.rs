//! Dispatcher adapter: the task-execution side of the controller boundary.
//!
//! Each cycle the dispatcher admits up to the controller's current budget,
//! reports every task outcome back into the event log, triggers one
//! evaluation, then paces itself by the effective sleep. Task execution is
//! pluggable through [`TaskSource`] so the demo can script failures.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::sleep;
use uuid::Uuid;

use crate::event_log::{EventKind, Payload};
use crate::throttle::{Evaluation, ThrottleController};

/// Outcome of a single task execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure(String),
}

/// Supplies task outcomes for one admission cycle.
pub trait TaskSource {
    /// Execute up to `budget` tasks and return their outcomes.
    fn run_batch(&mut self, budget: u32) -> Vec<TaskOutcome>;
}

/// A task source driven by a pre-written script of batches. Once the script
/// is exhausted every batch succeeds.
pub struct ScriptedSource {
    batches: VecDeque<Vec<TaskOutcome>>,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Vec<TaskOutcome>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }
}

impl TaskSource for ScriptedSource {
    fn run_batch(&mut self, budget: u32) -> Vec<TaskOutcome> {
        match self.batches.pop_front() {
            Some(mut batch) => {
                batch.truncate(budget as usize);
                batch
            }
            None => vec![TaskOutcome::Success; budget as usize],
        }
    }
}

/// A task source that fails a fixed fraction of tasks, using a deterministic
/// xorshift sequence so runs are reproducible.
pub struct SimulatedSource {
    fail_rate: f64,
    rng_state: u64,
}

impl SimulatedSource {
    pub fn new(fail_rate: f64, seed: u64) -> Self {
        Self {
            fail_rate: fail_rate.clamp(0.0, 1.0),
            rng_state: seed.max(1),
        }
    }

    fn next_unit(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl TaskSource for SimulatedSource {
    fn run_batch(&mut self, budget: u32) -> Vec<TaskOutcome> {
        (0..budget)
            .map(|i| {
                if self.next_unit() < self.fail_rate {
                    TaskOutcome::Failure(format!("simulated task failure (slot {i})"))
                } else {
                    TaskOutcome::Success
                }
            })
            .collect()
    }
}

/// Drives task admission against the controller's effective limits.
pub struct Dispatcher {
    controller: Arc<ThrottleController>,
    worker_id: String,
}

impl Dispatcher {
    pub fn new(controller: Arc<ThrottleController>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            controller,
            worker_id: format!("worker-{}", &id[..8]),
        }
    }

    /// One admission cycle: pull up to the current budget, log every outcome,
    /// then evaluate at the current instant.
    pub fn cycle(&self, source: &mut impl TaskSource) -> Evaluation {
        let budget = self.controller.current_budget();
        for outcome in source.run_batch(budget) {
            let mut payload = Payload::new();
            payload.insert("worker".to_string(), json!(self.worker_id));
            payload.insert("task".to_string(), json!(Uuid::new_v4().to_string()));
            match outcome {
                TaskOutcome::Success => {
                    self.controller.log_event(EventKind::WorkerSuccess, payload);
                }
                TaskOutcome::Failure(error) => {
                    payload.insert("error".to_string(), json!(error));
                    self.controller.log_event(EventKind::WorkerError, payload);
                }
            }
        }
        self.controller.evaluate(Utc::now())
    }

    /// Sleep for the effective scheduler interval currently in force.
    pub async fn pace(&self) {
        sleep(Duration::from_secs_f64(self.controller.current_sleep())).await;
    }

    /// Run `ticks` cycles, pacing between them. `on_eval` observes each
    /// evaluation, e.g. to print transitions as they happen.
    pub async fn run(
        &self,
        source: &mut impl TaskSource,
        ticks: u32,
        mut on_eval: impl FnMut(u32, &Evaluation),
    ) {
        for tick in 0..ticks {
            let eval = self.cycle(source);
            on_eval(tick, &eval);
            if tick + 1 < ticks {
                self.pace().await;
            }
        }
    }
}
