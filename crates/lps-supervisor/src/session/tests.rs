//! Session state machine tests
//!
//! Exercise the supervisor end-to-end over a deterministic process table and
//! a scripted browser, with tokio's paused clock driving the poll loops.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use lps_common::{BrowserCommand, BrowserSignal, SessionReport, SupervisorError, SupervisorResult};

use crate::browser::{BrowserChannels, BrowserLauncher};
use crate::config::SupervisorConfig;
use crate::notification::{Notifier, NotifierConfig};
use crate::process::testutil::FakeProvider;
use crate::report::ReportRenderer;
use crate::session::{ExamSession, SessionState};
use crate::worker::WorkerHandle;

/// Browser stand-in: optionally reports readiness and child PIDs, then waits
/// for the stop command like the real subsystem.
struct ScriptedBrowser {
    ready: bool,
    report_pids: Vec<u32>,
    launches: Arc<AtomicU32>,
}

impl ScriptedBrowser {
    fn new(ready: bool) -> (Self, Arc<AtomicU32>) {
        let launches = Arc::new(AtomicU32::new(0));
        (
            Self {
                ready,
                report_pids: Vec::new(),
                launches: launches.clone(),
            },
            launches,
        )
    }

    fn with_pids(mut self, pids: Vec<u32>) -> Self {
        self.report_pids = pids;
        self
    }
}

impl BrowserLauncher for ScriptedBrowser {
    fn launch(&self, safe_pid_tx: mpsc::UnboundedSender<u32>) -> (WorkerHandle, BrowserChannels) {
        self.launches.fetch_add(1, Ordering::SeqCst);

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let ready = self.ready;
        let pids = self.report_pids.clone();

        let worker = WorkerHandle::spawn("browser", move |mut stop| async move {
            for pid in pids {
                let _ = safe_pid_tx.send(pid);
            }
            if ready {
                let _ = signal_tx.send(BrowserSignal::Navigated);
            }
            let mut command_rx = command_rx;
            loop {
                tokio::select! {
                    command = command_rx.recv() => {
                        match command {
                            Some(BrowserCommand::Stop) | None => break,
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        (
            worker,
            BrowserChannels {
                signal_rx,
                command_tx,
            },
        )
    }
}

/// Renderer that stores rendered reports instead of touching the filesystem
struct CollectingRenderer {
    reports: Arc<Mutex<Vec<SessionReport>>>,
}

impl ReportRenderer for CollectingRenderer {
    fn render(&self, report: &SessionReport) -> SupervisorResult<PathBuf> {
        self.reports.lock().push(report.clone());
        Ok(PathBuf::from("collected"))
    }
}

fn silent_notifier() -> Arc<Notifier> {
    Arc::new(Notifier::new(NotifierConfig {
        enabled: false,
        ..Default::default()
    }))
}

fn test_config() -> SupervisorConfig {
    let mut config = SupervisorConfig::default();
    config.process.whitelist = vec!["dllhost".into(), "systemd".into()];
    config
}

fn session_with(
    provider: Arc<FakeProvider>,
    browser: ScriptedBrowser,
) -> (ExamSession, Arc<Mutex<Vec<SessionReport>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let renderer = CollectingRenderer {
        reports: reports.clone(),
    };
    let session = ExamSession::new(
        test_config(),
        provider,
        Box::new(browser),
        Box::new(renderer),
        silent_notifier(),
    );
    (session, reports)
}

#[tokio::test(start_paused = true)]
async fn start_exam_twice_spawns_one_worker_set() {
    let provider = Arc::new(FakeProvider::new());
    let (browser, launches) = ScriptedBrowser::new(true);
    let (mut session, _reports) = session_with(provider, browser);

    session.start_exam().await.unwrap();
    assert_eq!(session.state(), SessionState::Running);

    // Second call is a silent no-op; no second browser comes up.
    session.start_exam().await.unwrap();
    assert_eq!(launches.load(Ordering::SeqCst), 1);

    session.end_exam(false).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_aborts_the_start() {
    let provider = Arc::new(FakeProvider::new());
    let (browser, launches) = ScriptedBrowser::new(false);
    let (mut session, reports) = session_with(provider, browser);

    let err = session.start_exam().await.unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::BrowserHandshakeTimeout { attempts: 20 }
    ));

    // Back to Idle; the browser was launched but nothing else was.
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(launches.load(Ordering::SeqCst), 1);
    assert!(session.gaze_input().is_none());
    assert!(reports.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn end_exam_while_idle_is_a_no_op() {
    let provider = Arc::new(FakeProvider::new());
    let (browser, launches) = ScriptedBrowser::new(true);
    let (mut session, reports) = session_with(provider, browser);

    let outcome = session.end_exam(false).await.unwrap();
    assert!(outcome.is_none());
    assert!(reports.lock().is_empty());
    assert_eq!(launches.load(Ordering::SeqCst), 0);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn detects_terminates_and_reports_unauthorized_processes() {
    let provider = Arc::new(FakeProvider::new());
    provider.add(100, "notepad", None);

    let (browser, _launches) = ScriptedBrowser::new(true);
    let (mut session, reports) = session_with(provider.clone(), browser);

    session.start_exam().await.unwrap();
    assert!(session.gaze_input().is_some());

    // An unauthorized tool starts mid-session.
    provider.add(500, "cheat-tool", None);
    tokio::time::sleep(Duration::from_secs(3)).await;

    // A whitelisted helper starts too; substring match authorizes it.
    provider.add(600, "dllhost-helper", None);
    tokio::time::sleep(Duration::from_secs(3)).await;

    let report = session.end_exam(false).await.unwrap().unwrap();

    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].pid, 500);
    assert_eq!(report.violations[0].process_name, "cheat-tool");

    let kills = provider.kill_calls();
    assert!(kills.contains(&500));
    assert!(!kills.contains(&600));

    assert_eq!(reports.lock().len(), 1);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn browser_reported_pids_are_exempt_from_the_policy() {
    let provider = Arc::new(FakeProvider::new());
    let (browser, _launches) = ScriptedBrowser::new(true);
    let browser = browser.with_pids(vec![8080]);
    let (mut session, _reports) = session_with(provider.clone(), browser);

    session.start_exam().await.unwrap();

    // The proxy the browser spawned shows up in the next poll.
    provider.add(8080, "mitmdump", None);
    tokio::time::sleep(Duration::from_secs(3)).await;

    let report = session.end_exam(false).await.unwrap().unwrap();
    assert!(report.violations.is_empty());
    assert!(provider.kill_calls().is_empty());
}

// A second unauthorized process that shares a name with a pre-session one is
// terminated but never reported: deduplication is by name against the
// session-start snapshot. Documented behavior, even though it leaves a gap.
#[tokio::test(start_paused = true)]
async fn second_process_reusing_preexisting_name_is_not_flagged() {
    let provider = Arc::new(FakeProvider::new());
    provider.add(100, "notepad", None);

    let (browser, _launches) = ScriptedBrowser::new(true);
    let (mut session, _reports) = session_with(provider.clone(), browser);

    session.start_exam().await.unwrap();

    provider.add(700, "notepad", None);
    tokio::time::sleep(Duration::from_secs(3)).await;

    let report = session.end_exam(false).await.unwrap().unwrap();

    // Killed by the policy loop, filtered from the timeline.
    assert!(provider.kill_calls().contains(&700));
    assert!(report.violations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn session_is_restartable_after_ending() {
    let provider = Arc::new(FakeProvider::new());
    let (browser, launches) = ScriptedBrowser::new(true);
    let (mut session, reports) = session_with(provider, browser);

    session.start_exam().await.unwrap();
    session.end_exam(false).await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    session.start_exam().await.unwrap();
    assert_eq!(session.state(), SessionState::Running);
    session.end_exam(false).await.unwrap();

    assert_eq!(launches.load(Ordering::SeqCst), 2);
    assert_eq!(reports.lock().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn valid_startup_reports_blocklisted_names() {
    let provider = Arc::new(FakeProvider::new());
    provider.add(100, "Google Chrome", None);
    provider.add(101, "bash", None);

    let (browser, _launches) = ScriptedBrowser::new(true);
    let (session, _reports) = session_with(provider.clone(), browser);

    let (ok, blocking) = session.valid_startup();
    assert!(!ok);
    assert_eq!(blocking, vec!["Google Chrome".to_string()]);

    // Gate is read-only; nothing was touched.
    assert_eq!(session.state(), SessionState::Idle);
    assert!(provider.kill_calls().is_empty());

    provider.remove(100);
    let (ok, blocking) = session.valid_startup();
    assert!(ok);
    assert!(blocking.is_empty());
}
