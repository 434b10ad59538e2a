//! Session state machine and worker supervision
//!
//! Owns the lifecycle of the three monitor workers (browser, gaze, process
//! watchdog) and the two listener loops draining their event channels. All
//! cross-worker data moves through channels; the aggregator is written only
//! by the listeners, which run in the supervisor's own context.

mod aggregator;
#[cfg(test)]
mod tests;

pub use aggregator::Aggregator;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use lps_common::{
    blocked_names, AwaySample, BrowserCommand, BrowserSignal, GazeDeviation, SessionReport,
    SupervisorError, SupervisorResult, ViolationEvent,
};

use crate::browser::BrowserLauncher;
use crate::config::SupervisorConfig;
use crate::gaze::{GazeDetector, GazeWorker};
use crate::notification::{Notifier, Severity};
use crate::process::{AuthorizationEngine, ProcessProvider, ProcessWatchdog, SafePidSet};
use crate::report::ReportRenderer;
use crate::worker::WorkerHandle;

/// Session lifecycle states.
///
/// Transitions only along `Idle -> Starting -> Running -> Ending -> Idle`;
/// a failed start returns from `Starting` to `Idle` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Ending,
}

/// Everything owned by one running session
struct ActiveSession {
    started_at: DateTime<Utc>,
    aggregator: Arc<Aggregator>,
    /// Feed for raw gaze deviation samples from the upstream collaborator
    deviation_tx: mpsc::UnboundedSender<GazeDeviation>,
    browser_command_tx: mpsc::UnboundedSender<BrowserCommand>,
    browser: WorkerHandle,
    gaze: WorkerHandle,
    watchdog: WorkerHandle,
    gaze_listener: WorkerHandle,
    violation_listener: WorkerHandle,
}

/// The exam session supervisor
pub struct ExamSession {
    config: SupervisorConfig,
    provider: Arc<dyn ProcessProvider>,
    launcher: Box<dyn BrowserLauncher>,
    renderer: Box<dyn ReportRenderer>,
    notifier: Arc<Notifier>,
    state: SessionState,
    active: Option<ActiveSession>,
}

impl ExamSession {
    pub fn new(
        config: SupervisorConfig,
        provider: Arc<dyn ProcessProvider>,
        launcher: Box<dyn BrowserLauncher>,
        renderer: Box<dyn ReportRenderer>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            config,
            provider,
            launcher,
            renderer,
            notifier,
            state: SessionState::Idle,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Pre-flight gate: scan running processes for blocklisted names.
    ///
    /// Read-only and independent of the state machine; returns whether the
    /// environment is clear plus the names that must be closed first.
    pub fn valid_startup(&self) -> (bool, Vec<String>) {
        let snapshot = self.provider.snapshot();
        let blocked = blocked_names(snapshot.names(), &self.config.process.blocklist);
        (blocked.is_empty(), blocked)
    }

    /// Sender for raw gaze deviation samples while a session is active
    pub fn gaze_input(&self) -> Option<mpsc::UnboundedSender<GazeDeviation>> {
        self.active.as_ref().map(|a| a.deviation_tx.clone())
    }

    /// Begin an exam session. No-op unless `Idle`.
    ///
    /// The browser worker comes up first; the remaining monitors are only
    /// spawned once it reports readiness. A handshake timeout aborts the
    /// start and leaves the session `Idle`.
    pub async fn start_exam(&mut self) -> SupervisorResult<()> {
        if self.state != SessionState::Idle {
            tracing::debug!(state = ?self.state, "start_exam ignored");
            return Ok(());
        }

        let whitelist = self.config.process.effective_whitelist()?;

        self.state = SessionState::Starting;
        tracing::info!("starting exam session");
        let started_at = Utc::now();

        // The name snapshot taken here is the session's deduplication
        // baseline; it is never updated while the session runs.
        let initial = self.provider.snapshot();
        let initial_names: HashSet<String> = initial.names().map(str::to_string).collect();

        let (safe_pid_tx, safe_pid_rx) = mpsc::unbounded_channel();

        let (browser, mut channels) = self.launcher.launch(safe_pid_tx);

        let attempts = self.config.browser.readiness_attempts;
        if !await_readiness(
            &mut channels.signal_rx,
            attempts,
            self.config.browser.readiness_poll(),
        )
        .await
        {
            tracing::error!("browser readiness handshake timed out, aborting start");
            browser
                .stop_and_join(self.config.session.join_timeout())
                .await;
            self.state = SessionState::Idle;
            return Err(SupervisorError::BrowserHandshakeTimeout { attempts });
        }

        let aggregator = Arc::new(Aggregator::new(initial_names));
        let engine = AuthorizationEngine::new(whitelist, SafePidSet::new());

        let (violation_tx, violation_rx) = mpsc::unbounded_channel();
        let (away_tx, away_rx) = mpsc::unbounded_channel();
        let (deviation_tx, deviation_rx) = mpsc::unbounded_channel();

        let watchdog_core = ProcessWatchdog::new(
            self.provider.clone(),
            engine,
            self.config.session.poll_interval(),
            violation_tx,
            safe_pid_rx,
        );
        let watchdog = WorkerHandle::spawn("watchdog", move |stop| watchdog_core.run(stop));

        let gaze_core = GazeWorker::new(
            GazeDetector::from_config(&self.config.gaze),
            deviation_rx,
            away_tx,
        );
        let gaze = WorkerHandle::spawn("gaze", move |stop| gaze_core.run(stop));

        let idle = self.config.session.listener_idle();
        let gaze_listener =
            spawn_gaze_listener(away_rx, aggregator.clone(), self.notifier.clone(), idle);
        let violation_listener = spawn_violation_listener(
            violation_rx,
            aggregator.clone(),
            self.notifier.clone(),
            idle,
        );

        self.active = Some(ActiveSession {
            started_at,
            aggregator,
            deviation_tx,
            browser_command_tx: channels.command_tx,
            browser,
            gaze,
            watchdog,
            gaze_listener,
            violation_listener,
        });
        self.state = SessionState::Running;
        tracing::info!("exam session running");
        Ok(())
    }

    /// End the session and build the report. No-op unless `Running`, or
    /// unconditionally when `force` is set.
    pub async fn end_exam(&mut self, force: bool) -> SupervisorResult<Option<SessionReport>> {
        if self.state != SessionState::Running && !force {
            tracing::debug!(state = ?self.state, "end_exam ignored");
            return Ok(None);
        }
        let Some(active) = self.active.take() else {
            self.state = SessionState::Idle;
            return Ok(None);
        };

        self.state = SessionState::Ending;
        tracing::info!("ending exam session");

        // Give the browser a settle period to flush final state (child PIDs,
        // cleanup) before anything is torn down.
        if active.browser_command_tx.send(BrowserCommand::Stop).is_err() {
            tracing::debug!("browser command channel already closed");
        }
        tokio::time::sleep(self.config.session.settle()).await;

        let join_timeout = self.config.session.join_timeout();

        // Producers first, listeners after: once the producer tasks are gone
        // their channel ends disconnect, and the listeners drain whatever is
        // still queued before exiting.
        active.browser.stop_and_join(join_timeout).await;
        active.gaze.stop_and_join(join_timeout).await;
        active.watchdog.stop_and_join(join_timeout).await;
        active.gaze_listener.stop_and_join(join_timeout).await;
        active.violation_listener.stop_and_join(join_timeout).await;

        let report = active.aggregator.freeze(active.started_at, Utc::now());
        if let Err(err) = self.renderer.render(&report) {
            tracing::error!("report rendering failed: {err}");
        }

        self.state = SessionState::Idle;
        tracing::info!(
            violations = report.violations.len(),
            away_seconds = report.total_gaze_away_seconds,
            "exam session ended"
        );
        Ok(Some(report))
    }
}

/// Poll the from-browser channel once per interval, up to `attempts` times,
/// for the readiness signal
async fn await_readiness(
    signal_rx: &mut mpsc::UnboundedReceiver<BrowserSignal>,
    attempts: u32,
    interval: Duration,
) -> bool {
    for attempt in 1..=attempts {
        match signal_rx.try_recv() {
            Ok(BrowserSignal::Navigated) => {
                tracing::info!(attempt, "browser reported ready");
                return true;
            }
            Err(TryRecvError::Disconnected) => {
                tracing::error!("browser worker went away before readiness");
                return false;
            }
            Err(TryRecvError::Empty) => {}
        }
        tokio::time::sleep(interval).await;
    }
    false
}

fn spawn_gaze_listener(
    mut away_rx: mpsc::UnboundedReceiver<AwaySample>,
    aggregator: Arc<Aggregator>,
    notifier: Arc<Notifier>,
    idle: Duration,
) -> WorkerHandle {
    WorkerHandle::spawn("gaze-listener", move |stop| async move {
        loop {
            match away_rx.try_recv() {
                Ok(sample) => {
                    for minute in aggregator.record_away(sample) {
                        notifier
                            .notify(
                                Severity::Warning,
                                "Gaze warning",
                                &format!("Time spent looking away has reached {minute} minute(s)"),
                            )
                            .await;
                    }
                }
                Err(TryRecvError::Empty) => {
                    if *stop.borrow() {
                        break;
                    }
                    tokio::time::sleep(idle).await;
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }
    })
}

fn spawn_violation_listener(
    mut violation_rx: mpsc::UnboundedReceiver<ViolationEvent>,
    aggregator: Arc<Aggregator>,
    notifier: Arc<Notifier>,
    idle: Duration,
) -> WorkerHandle {
    WorkerHandle::spawn("violation-listener", move |stop| async move {
        loop {
            match violation_rx.try_recv() {
                Ok(event) => {
                    if aggregator.record_violation(event.clone()) {
                        notifier
                            .notify(
                                Severity::Alert,
                                "Unauthorized process terminated",
                                &format!("{} (PID {})", event.process_name, event.pid),
                            )
                            .await;
                    }
                }
                Err(TryRecvError::Empty) => {
                    if *stop.borrow() {
                        break;
                    }
                    tokio::time::sleep(idle).await;
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }
    })
}
