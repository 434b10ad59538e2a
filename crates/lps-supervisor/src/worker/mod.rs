//! Worker lifecycle plumbing
//!
//! Each monitor runs as an isolated task behind a start / stop / bounded-join
//! contract: cooperative stop via a watch flag, and abort escalation for
//! workers that do not exit within the join timeout. Abort at teardown is
//! normal operation, not an error.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Worker exited on its own within the timeout
    Clean,
    /// Worker ignored the stop signal and was aborted
    Aborted,
}

pub struct WorkerHandle {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn a named worker task. The closure receives the stop-flag
    /// receiver; the worker is expected to exit once the flag flips.
    pub fn spawn<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(f(stop_rx));
        Self {
            name,
            stop_tx,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the worker to stop without waiting for it
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait up to `timeout` for the worker to exit, aborting it on expiry
    pub async fn join(mut self, timeout: Duration) -> JoinOutcome {
        let Some(mut handle) = self.handle.take() else {
            return JoinOutcome::Clean;
        };
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => JoinOutcome::Clean,
            Ok(Err(err)) => {
                // A panicked worker is contained; the supervisor carries on.
                if err.is_panic() {
                    tracing::warn!(worker = self.name, "worker panicked: {err}");
                }
                JoinOutcome::Clean
            }
            Err(_) => {
                handle.abort();
                tracing::debug!(worker = self.name, "worker did not exit in time, aborted");
                JoinOutcome::Aborted
            }
        }
    }

    /// Stop, then join with the given timeout
    pub async fn stop_and_join(self, timeout: Duration) -> JoinOutcome {
        self.stop();
        self.join(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cooperative_worker_joins_cleanly() {
        let worker = WorkerHandle::spawn("cooperative", |mut stop| async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
        });

        let outcome = worker.stop_and_join(Duration::from_secs(1)).await;
        assert_eq!(outcome, JoinOutcome::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_worker_is_aborted() {
        let worker = WorkerHandle::spawn("stubborn", |_stop| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let outcome = worker.stop_and_join(Duration::from_secs(1)).await;
        assert_eq!(outcome, JoinOutcome::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_worker_is_contained() {
        let worker = WorkerHandle::spawn("crasher", |_stop| async move {
            panic!("monitor blew up");
        });

        let outcome = worker.stop_and_join(Duration::from_secs(1)).await;
        assert_eq!(outcome, JoinOutcome::Clean);
    }
}
