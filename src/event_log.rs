//! Append-only, time-ordered event log with bounded retention.
//!
//! The log is the source of truth for event ordering: timestamps are clamped
//! to be non-decreasing in insertion order, so consumers never observe
//! wall-clock skew as reordering. Appends are safe under concurrent callers.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured payload attached to an event, e.g. `{"error": "...", "plugin": "..."}`.
pub type Payload = BTreeMap<String, Value>;

/// Kind vocabulary for log events.
///
/// The vocabulary is open for forward compatibility: kinds this crate does not
/// know are carried through as [`EventKind::Other`] and recorded verbatim, but
/// only `WorkerError`/`WorkerSuccess` feed the throttling score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    WorkerError,
    WorkerSuccess,
    ThrottleUp,
    ThrottleDown,
    Other(String),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::WorkerError => write!(f, "WORKER_ERROR"),
            EventKind::WorkerSuccess => write!(f, "WORKER_SUCCESS"),
            EventKind::ThrottleUp => write!(f, "THROTTLE_UP"),
            EventKind::ThrottleDown => write!(f, "THROTTLE_DOWN"),
            EventKind::Other(kind) => write!(f, "{kind}"),
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "WORKER_ERROR" => EventKind::WorkerError,
            "WORKER_SUCCESS" => EventKind::WorkerSuccess,
            "THROTTLE_UP" => EventKind::ThrottleUp,
            "THROTTLE_DOWN" => EventKind::ThrottleDown,
            _ => EventKind::Other(s),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.to_string()
    }
}

/// A single immutable log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: Payload,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(kind: EventKind, payload: Payload) -> Self {
        Self::at(Utc::now(), kind, payload)
    }

    /// Create an event with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, kind: EventKind, payload: Payload) -> Self {
        Self {
            timestamp,
            kind,
            payload,
        }
    }
}

struct Inner {
    events: VecDeque<Event>,
    seq: u64,
}

/// Bounded, append-only event log shared between workers and the controller.
///
/// Retention is time-based (at least the largest window any consumer queries)
/// with a count cap to bound memory. Eviction happens on append.
pub struct EventLog {
    inner: Mutex<Inner>,
    retention: Duration,
    max_events: usize,
}

impl EventLog {
    pub fn new(retention: Duration, max_events: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::new(),
                seq: 0,
            }),
            retention,
            max_events: max_events.max(1),
        }
    }

    /// Append an event, clamping its timestamp so the log stays non-decreasing,
    /// then evict entries past the retention horizon.
    pub fn append(&self, mut event: Event) {
        let mut inner = self.lock();

        if let Some(last) = inner.events.back()
            && event.timestamp < last.timestamp
        {
            event.timestamp = last.timestamp;
        }

        let horizon = event.timestamp - self.retention;
        inner.events.push_back(event);
        inner.seq += 1;

        while let Some(front) = inner.events.front()
            && front.timestamp < horizon
        {
            inner.events.pop_front();
        }
        while inner.events.len() > self.max_events {
            inner.events.pop_front();
        }
    }

    /// Monotonic append counter. Bumps on every append, including evicted
    /// entries; used by the controller to detect an unchanged log.
    pub fn seq(&self) -> u64 {
        self.lock().seq
    }

    /// Events with `timestamp >= since`, oldest to newest, optionally filtered
    /// by kind.
    pub fn events_since(&self, since: DateTime<Utc>, kind: Option<&EventKind>) -> Vec<Event> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.timestamp >= since)
            .filter(|e| kind.is_none_or(|k| &e.kind == k))
            .cloned()
            .collect()
    }

    /// The most recent `n` events, oldest to newest.
    pub fn tail(&self, n: usize) -> Vec<Event> {
        let inner = self.lock();
        let skip = inner.events.len().saturating_sub(n);
        inner.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("event log lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(sec: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + sec, 0).unwrap()
    }

    fn log() -> EventLog {
        EventLog::new(Duration::seconds(120), 4096)
    }

    #[test]
    fn append_preserves_insertion_order() {
        let log = log();
        log.append(Event::at(ts(0), EventKind::WorkerSuccess, Payload::new()));
        log.append(Event::at(ts(1), EventKind::WorkerError, Payload::new()));
        log.append(Event::at(ts(2), EventKind::WorkerSuccess, Payload::new()));

        let events = log.events_since(ts(0), None);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::WorkerSuccess);
        assert_eq!(events[1].kind, EventKind::WorkerError);
    }

    #[test]
    fn out_of_order_timestamp_is_clamped() {
        let log = log();
        log.append(Event::at(ts(10), EventKind::WorkerSuccess, Payload::new()));
        log.append(Event::at(ts(5), EventKind::WorkerError, Payload::new()));

        let events = log.events_since(ts(0), None);
        assert_eq!(events[1].timestamp, ts(10));
    }

    #[test]
    fn kind_filter_selects_matching_events() {
        let log = log();
        log.append(Event::at(ts(0), EventKind::WorkerError, Payload::new()));
        log.append(Event::at(ts(1), EventKind::WorkerSuccess, Payload::new()));
        log.append(Event::at(ts(2), EventKind::WorkerError, Payload::new()));

        let errors = log.events_since(ts(0), Some(&EventKind::WorkerError));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn since_filter_excludes_older_events() {
        let log = log();
        log.append(Event::at(ts(0), EventKind::WorkerError, Payload::new()));
        log.append(Event::at(ts(50), EventKind::WorkerError, Payload::new()));

        let recent = log.events_since(ts(30), None);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].timestamp, ts(50));
    }

    #[test]
    fn time_based_eviction_drops_expired_events() {
        let log = EventLog::new(Duration::seconds(60), 4096);
        log.append(Event::at(ts(0), EventKind::WorkerError, Payload::new()));
        log.append(Event::at(ts(30), EventKind::WorkerError, Payload::new()));
        // 61s past the first event: it falls outside retention.
        log.append(Event::at(ts(61), EventKind::WorkerSuccess, Payload::new()));

        assert_eq!(log.len(), 2);
        let events = log.events_since(ts(0), None);
        assert_eq!(events[0].timestamp, ts(30));
    }

    #[test]
    fn count_cap_bounds_the_log() {
        let log = EventLog::new(Duration::seconds(3600), 3);
        for i in 0..10 {
            log.append(Event::at(ts(i), EventKind::WorkerSuccess, Payload::new()));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.events_since(ts(0), None)[0].timestamp, ts(7));
    }

    #[test]
    fn seq_counts_every_append() {
        let log = log();
        assert_eq!(log.seq(), 0);
        log.append(Event::at(ts(0), EventKind::WorkerError, Payload::new()));
        log.append(Event::at(ts(1), EventKind::WorkerError, Payload::new()));
        assert_eq!(log.seq(), 2);
    }

    #[test]
    fn tail_returns_most_recent_events() {
        let log = log();
        for i in 0..5 {
            log.append(Event::at(ts(i), EventKind::WorkerSuccess, Payload::new()));
        }
        let tail = log.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].timestamp, ts(3));
        assert_eq!(tail[1].timestamp, ts(4));
    }

    #[test]
    fn unknown_kind_round_trips_through_string() {
        let kind: EventKind = "PLUGIN_RELOADED".to_string().into();
        assert_eq!(kind, EventKind::Other("PLUGIN_RELOADED".to_string()));
        assert_eq!(kind.to_string(), "PLUGIN_RELOADED");
    }

    #[test]
    fn event_serialization_uses_wire_names() {
        let mut payload = Payload::new();
        payload.insert("error".to_string(), json!("boom"));
        let event = Event::at(ts(0), EventKind::WorkerError, payload);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "WORKER_ERROR");
        assert_eq!(json["payload"]["error"], "boom");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, EventKind::WorkerError);
    }

    #[test]
    fn concurrent_appends_are_all_recorded() {
        use std::sync::Arc;

        let log = Arc::new(EventLog::new(Duration::seconds(3600), 10_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        log.append(Event::new(EventKind::WorkerSuccess, Payload::new()));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 800);
        assert_eq!(log.seq(), 800);
    }
}
