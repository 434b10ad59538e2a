//! Unauthorized-process watchdog
//!
//! Polls the process table on a fixed interval, diffs against the previous
//! snapshot, terminates newly started processes that fail authorization, and
//! reports each one as a violation exactly once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use lps_common::{ProcessSnapshot, ViolationEvent};

use super::{terminate_tree, AuthorizationEngine, ProcessProvider};

pub struct ProcessWatchdog {
    provider: Arc<dyn ProcessProvider>,
    engine: AuthorizationEngine,
    poll_interval: Duration,
    violation_tx: mpsc::UnboundedSender<ViolationEvent>,
    safe_pid_rx: mpsc::UnboundedReceiver<u32>,
    previous: ProcessSnapshot,
    /// PIDs already enforced this session; never re-processed
    handled: HashSet<u32>,
}

impl ProcessWatchdog {
    pub fn new(
        provider: Arc<dyn ProcessProvider>,
        engine: AuthorizationEngine,
        poll_interval: Duration,
        violation_tx: mpsc::UnboundedSender<ViolationEvent>,
        safe_pid_rx: mpsc::UnboundedReceiver<u32>,
    ) -> Self {
        let previous = provider.snapshot();
        Self {
            provider,
            engine,
            poll_interval,
            violation_tx,
            safe_pid_rx,
            previous,
            handled: HashSet::new(),
        }
    }

    /// One poll cycle: snapshot, diff, drain self-reported safe PIDs, then
    /// enforce the policy on everything that started since the last cycle.
    /// Returns the number of violations emitted.
    pub fn sweep(&mut self) -> usize {
        let current = self.provider.snapshot();
        let diff = ProcessSnapshot::diff(&self.previous, &current);

        // Safe PIDs reported since the last cycle take effect before enforcement.
        while let Ok(pid) = self.safe_pid_rx.try_recv() {
            self.engine.safe_pids().insert(pid);
        }

        let mut emitted = 0;
        for (name, entries) in &diff.started {
            for entry in entries {
                if self.handled.contains(&entry.pid) {
                    continue;
                }
                if self.engine.authorize(name, entry.pid) {
                    continue;
                }
                tracing::warn!(pid = entry.pid, name = %name, "unauthorized process detected");
                terminate_tree(self.provider.as_ref(), entry.pid);
                self.handled.insert(entry.pid);
                if self
                    .violation_tx
                    .send(ViolationEvent::new(entry.pid, name.clone()))
                    .is_err()
                {
                    tracing::debug!("violation channel closed, event dropped");
                }
                emitted += 1;
            }
        }

        self.previous = current;
        emitted
    }

    /// Poll until the stop flag flips or its sender goes away
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        tracing::info!("process watchdog started");
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    self.sweep();
                }
            }
        }
        tracing::info!("process watchdog stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testutil::FakeProvider;
    use crate::process::SafePidSet;
    use lps_common::Whitelist;
    use proptest::prelude::*;

    fn watchdog(
        provider: Arc<FakeProvider>,
        whitelist: Whitelist,
    ) -> (
        ProcessWatchdog,
        mpsc::UnboundedReceiver<ViolationEvent>,
        mpsc::UnboundedSender<u32>,
    ) {
        let (violation_tx, violation_rx) = mpsc::unbounded_channel();
        let (safe_pid_tx, safe_pid_rx) = mpsc::unbounded_channel();
        let engine = AuthorizationEngine::new(whitelist, SafePidSet::new());
        let dog = ProcessWatchdog::new(
            provider,
            engine,
            Duration::from_secs(1),
            violation_tx,
            safe_pid_rx,
        );
        (dog, violation_rx, safe_pid_tx)
    }

    #[test]
    fn unauthorized_start_is_killed_and_reported_once() {
        let provider = Arc::new(FakeProvider::new());
        provider.add(100, "notepad", None);
        let (mut dog, mut violations, _safe_tx) =
            watchdog(provider.clone(), Whitelist::new(["dllhost"]));

        provider.add(500, "cheat-tool", None);
        assert_eq!(dog.sweep(), 1);

        let event = violations.try_recv().unwrap();
        assert_eq!(event.pid, 500);
        assert_eq!(event.process_name, "cheat-tool");
        assert_eq!(provider.kill_calls(), vec![500]);

        // The kill removed it from the table; record the stop.
        dog.sweep();
        // The same PID starting again is never re-processed.
        provider.add(500, "cheat-tool", None);
        dog.sweep();
        assert!(violations.try_recv().is_err());
        assert_eq!(provider.kill_calls(), vec![500]);
    }

    #[test]
    fn whitelisted_start_is_left_alone() {
        let provider = Arc::new(FakeProvider::new());
        let (mut dog, mut violations, _safe_tx) =
            watchdog(provider.clone(), Whitelist::new(["dllhost"]));

        provider.add(600, "dllhost-helper", None);
        assert_eq!(dog.sweep(), 0);
        assert!(violations.try_recv().is_err());
        assert!(provider.kill_calls().is_empty());
    }

    #[test]
    fn self_reported_pids_are_exempt() {
        let provider = Arc::new(FakeProvider::new());
        let (mut dog, mut violations, safe_tx) =
            watchdog(provider.clone(), Whitelist::default());

        safe_tx.send(8080).unwrap();
        provider.add(8080, "mitmdump", None);
        assert_eq!(dog.sweep(), 0);
        assert!(violations.try_recv().is_err());
        assert!(provider.kill_calls().is_empty());
    }

    #[test]
    fn processes_in_the_baseline_are_never_swept() {
        let provider = Arc::new(FakeProvider::new());
        provider.add(100, "notepad", None);
        let (mut dog, mut violations, _safe_tx) =
            watchdog(provider.clone(), Whitelist::default());

        assert_eq!(dog.sweep(), 0);
        assert!(violations.try_recv().is_err());
    }

    proptest! {
        /// Kill calls and the safe-PID set never overlap, for any mix of
        /// authorized and unauthorized starts.
        #[test]
        fn kill_calls_never_touch_safe_pids(
            procs in proptest::collection::hash_map(
                1u32..10_000,
                ("[a-z]{3,10}", any::<bool>()),
                0..40,
            )
        ) {
            let provider = Arc::new(FakeProvider::new());
            let (mut dog, _violations, safe_tx) =
                watchdog(provider.clone(), Whitelist::default());

            let mut safe: HashSet<u32> = HashSet::new();
            for (pid, (name, is_safe)) in &procs {
                provider.add(*pid, name, None);
                if *is_safe {
                    safe_tx.send(*pid).unwrap();
                    safe.insert(*pid);
                }
            }

            dog.sweep();

            for killed in provider.kill_calls() {
                prop_assert!(!safe.contains(&killed));
            }
        }
    }
}
