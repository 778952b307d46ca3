//! Windowed statistics derived on demand from the event log.
//!
//! No hidden state: given the log contents, a window length, and `now`, the
//! counts are deterministic. Only worker-outcome events participate; the
//! controller's own `THROTTLE_*` events and any unknown operational kinds are
//! excluded so they cannot dilute the error rate.

use chrono::{DateTime, Duration, Utc};

use crate::event_log::{EventKind, EventLog};

/// Counts of worker-outcome events within a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCounts {
    pub errors: u64,
    pub successes: u64,
    /// `errors + successes` — the denominator of the raw error rate.
    pub total: u64,
}

impl WindowCounts {
    /// Count outcome events with `timestamp in [now - window, now]`.
    pub fn sample(log: &EventLog, window: Duration, now: DateTime<Utc>) -> Self {
        let since = now - window;
        let mut counts = Self::default();
        for event in log.events_since(since, None) {
            if event.timestamp > now {
                continue;
            }
            match event.kind {
                EventKind::WorkerError => counts.errors += 1,
                EventKind::WorkerSuccess => counts.successes += 1,
                _ => {}
            }
        }
        counts.total = counts.errors + counts.successes;
        counts
    }

    /// Raw error rate over the window, `None` when there were no outcomes.
    pub fn error_rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.errors as f64 / self.total as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{Event, Payload};
    use chrono::TimeZone;

    fn ts(sec: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + sec, 0).unwrap()
    }

    fn log_with(events: &[(i64, EventKind)]) -> EventLog {
        let log = EventLog::new(Duration::seconds(120), 4096);
        for (sec, kind) in events {
            log.append(Event::at(ts(*sec), kind.clone(), Payload::new()));
        }
        log
    }

    #[test]
    fn counts_outcomes_within_window() {
        let log = log_with(&[
            (0, EventKind::WorkerError),
            (10, EventKind::WorkerSuccess),
            (20, EventKind::WorkerError),
        ]);
        let counts = WindowCounts::sample(&log, Duration::seconds(30), ts(25));
        assert_eq!(counts.errors, 2);
        assert_eq!(counts.successes, 1);
        assert_eq!(counts.total, 3);
    }

    #[test]
    fn events_outside_window_are_excluded() {
        let log = log_with(&[
            (0, EventKind::WorkerError),
            (50, EventKind::WorkerError),
        ]);
        let counts = WindowCounts::sample(&log, Duration::seconds(30), ts(60));
        assert_eq!(counts.errors, 1);
    }

    #[test]
    fn non_outcome_kinds_do_not_count() {
        let log = log_with(&[
            (0, EventKind::WorkerError),
            (1, EventKind::ThrottleUp),
            (2, EventKind::Other("PLUGIN_RELOADED".to_string())),
        ]);
        let counts = WindowCounts::sample(&log, Duration::seconds(30), ts(10));
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.total, 1);
    }

    #[test]
    fn sample_is_deterministic_for_fixed_now() {
        let log = log_with(&[(0, EventKind::WorkerError), (5, EventKind::WorkerSuccess)]);
        let a = WindowCounts::sample(&log, Duration::seconds(30), ts(10));
        let b = WindowCounts::sample(&log, Duration::seconds(30), ts(10));
        assert_eq!(a, b);
    }

    #[test]
    fn error_rate_is_none_on_quiet_window() {
        let counts = WindowCounts::default();
        assert_eq!(counts.error_rate(), None);

        let log = log_with(&[(0, EventKind::WorkerError), (1, EventKind::WorkerError)]);
        let counts = WindowCounts::sample(&log, Duration::seconds(30), ts(5));
        assert_eq!(counts.error_rate(), Some(1.0));
    }
}
