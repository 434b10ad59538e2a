//! Session timeline aggregation
//!
//! Collects gaze-away time and the violation timeline for one session. Only
//! the two listener loops write here; the away total is a single-writer
//! atomic, so monotonicity holds regardless of message arrival order.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use lps_common::{AwaySample, SessionReport, ViolationEvent};

pub struct Aggregator {
    /// Total away time in milliseconds; only ever increases
    away_ms: AtomicU64,
    /// Last whole minute already notified
    reported_minutes: AtomicU64,
    /// Detection-ordered timeline
    violations: Mutex<Vec<ViolationEvent>>,
    /// Process names present when the session started; violations carrying
    /// one of these names are dropped from the timeline
    initial_names: HashSet<String>,
}

impl Aggregator {
    pub fn new(initial_names: HashSet<String>) -> Self {
        Self {
            away_ms: AtomicU64::new(0),
            reported_minutes: AtomicU64::new(0),
            violations: Mutex::new(Vec::new()),
            initial_names,
        }
    }

    /// Add one completed away interval.
    ///
    /// Returns the whole minutes newly crossed by this sample, each exactly
    /// once over the lifetime of the session.
    pub fn record_away(&self, sample: AwaySample) -> Vec<u64> {
        let add_ms = (sample.seconds.max(0.0) * 1000.0).round() as u64;
        let prev_ms = self.away_ms.fetch_add(add_ms, Ordering::Relaxed);
        let total_minutes = (prev_ms + add_ms) / 60_000;

        let mut crossed = Vec::new();
        let mut reported = self.reported_minutes.load(Ordering::Relaxed);
        while reported < total_minutes {
            reported += 1;
            crossed.push(reported);
        }
        if !crossed.is_empty() {
            self.reported_minutes.store(reported, Ordering::Relaxed);
        }
        crossed
    }

    /// Append a violation unless its name predates the session.
    ///
    /// Returns whether the event entered the timeline.
    pub fn record_violation(&self, event: ViolationEvent) -> bool {
        if self.initial_names.contains(&event.process_name) {
            tracing::debug!(
                name = %event.process_name,
                "process name present at session start, not reported"
            );
            return false;
        }
        self.violations.lock().push(event);
        true
    }

    pub fn total_away_seconds(&self) -> f64 {
        self.away_ms.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn violation_count(&self) -> usize {
        self.violations.lock().len()
    }

    /// Build the immutable report from the frozen state
    pub fn freeze(&self, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> SessionReport {
        SessionReport {
            id: Uuid::new_v4(),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            start_time,
            end_time,
            total_gaze_away_seconds: self.total_away_seconds(),
            violations: self.violations.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> Aggregator {
        Aggregator::new(HashSet::new())
    }

    #[test]
    fn samples_summing_to_125s_notify_exactly_twice() {
        let agg = aggregator();
        let mut notified = Vec::new();

        for seconds in [20.0, 30.0, 25.0, 40.0, 10.0] {
            notified.extend(agg.record_away(AwaySample::new(seconds)));
        }

        assert_eq!(notified, vec![1, 2]);
        assert!((agg.total_away_seconds() - 125.0).abs() < 1e-9);
    }

    #[test]
    fn one_large_sample_crossing_two_minutes_notifies_for_each() {
        let agg = aggregator();
        let crossed = agg.record_away(AwaySample::new(125.0));
        assert_eq!(crossed, vec![1, 2]);

        // The same minutes never fire again.
        assert!(agg.record_away(AwaySample::new(1.0)).is_empty());
    }

    #[test]
    fn total_is_monotonic() {
        let agg = aggregator();
        let mut last = 0.0;
        for seconds in [0.3, 1.0, 0.0, 12.0, 0.5] {
            agg.record_away(AwaySample::new(seconds));
            let total = agg.total_away_seconds();
            assert!(total >= last);
            last = total;
        }
    }

    #[test]
    fn violations_keep_detection_order() {
        let agg = aggregator();
        assert!(agg.record_violation(ViolationEvent::new(500, "cheat-tool")));
        assert!(agg.record_violation(ViolationEvent::new(501, "screen-grab")));

        let report = agg.freeze(Utc::now(), Utc::now());
        let pids: Vec<u32> = report.violations.iter().map(|v| v.pid).collect();
        assert_eq!(pids, vec![500, 501]);
    }

    #[test]
    fn names_from_the_initial_snapshot_are_filtered() {
        let agg = Aggregator::new(HashSet::from(["notepad".to_string()]));

        assert!(!agg.record_violation(ViolationEvent::new(700, "notepad")));
        assert!(agg.record_violation(ViolationEvent::new(500, "cheat-tool")));
        assert_eq!(agg.violation_count(), 1);
    }

    #[test]
    fn freeze_captures_the_frozen_totals() {
        let agg = aggregator();
        agg.record_away(AwaySample::new(42.0));
        agg.record_violation(ViolationEvent::new(500, "cheat-tool"));

        let start = Utc::now();
        let end = Utc::now();
        let report = agg.freeze(start, end);

        assert_eq!(report.start_time, start);
        assert_eq!(report.end_time, end);
        assert!((report.total_gaze_away_seconds - 42.0).abs() < 1e-9);
        assert_eq!(report.violations.len(), 1);
    }
}
