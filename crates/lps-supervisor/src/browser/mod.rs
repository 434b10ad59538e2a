//! Locked-down browser subsystem control
//!
//! The supervisor never drives the browser itself. It launches the kiosk
//! subsystem, waits for its readiness signal, and later sends it a stop
//! command; the subsystem self-reports its spawned PIDs so the watchdog
//! exempts them. The launcher seam lets tests substitute a scripted browser.

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

use lps_common::{BrowserCommand, BrowserSignal};

use crate::config::BrowserConfig;
use crate::worker::WorkerHandle;

/// Channel pair connecting the supervisor to a launched browser worker
pub struct BrowserChannels {
    /// Readiness signals from the browser
    pub signal_rx: mpsc::UnboundedReceiver<BrowserSignal>,
    /// Control messages towards the browser
    pub command_tx: mpsc::UnboundedSender<BrowserCommand>,
}

pub trait BrowserLauncher: Send + Sync {
    /// Launch the browser worker.
    ///
    /// The worker reports every PID it spawns into `safe_pid_tx`, sends
    /// `Navigated` exactly once after the initial page load, and exits when
    /// it receives `Stop`. Launch failures are not surfaced here: a worker
    /// that never becomes ready is caught by the readiness handshake.
    fn launch(&self, safe_pid_tx: mpsc::UnboundedSender<u32>) -> (WorkerHandle, BrowserChannels);
}

/// Launches the configured kiosk-browser command as a child process
pub struct KioskBrowserLauncher {
    config: BrowserConfig,
}

impl KioskBrowserLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

impl BrowserLauncher for KioskBrowserLauncher {
    fn launch(&self, safe_pid_tx: mpsc::UnboundedSender<u32>) -> (WorkerHandle, BrowserChannels) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let config = self.config.clone();

        let worker = WorkerHandle::spawn("browser", move |stop| {
            run_kiosk(config, safe_pid_tx, signal_tx, command_rx, stop)
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

async fn run_kiosk(
    config: BrowserConfig,
    safe_pid_tx: mpsc::UnboundedSender<u32>,
    signal_tx: mpsc::UnboundedSender<BrowserSignal>,
    mut command_rx: mpsc::UnboundedReceiver<BrowserCommand>,
    mut stop: watch::Receiver<bool>,
) {
    tracing::info!(command = %config.command, "launching kiosk browser");

    let mut child = match Command::new(&config.command)
        .args(&config.args)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            tracing::error!("kiosk browser failed to launch: {err}");
            return;
        }
    };

    if let Some(pid) = child.id() {
        if safe_pid_tx.send(pid).is_err() {
            tracing::debug!("safe-pid channel closed");
        }
    }

    // The command must survive its warmup window before it counts as loaded.
    tokio::time::sleep(config.warmup()).await;
    if let Ok(Some(status)) = child.try_wait() {
        tracing::error!(%status, "kiosk browser exited during warmup");
        return;
    }

    if signal_tx.send(BrowserSignal::Navigated).is_err() {
        tracing::debug!("browser signal channel closed before readiness");
    }
    tracing::info!("kiosk browser ready");

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
            status = child.wait() => {
                match status {
                    Ok(status) => tracing::warn!(%status, "kiosk browser exited unexpectedly"),
                    Err(err) => tracing::warn!("kiosk browser wait failed: {err}"),
                }
                return;
            }
        }
    }

    shutdown(child).await;
    tracing::info!("kiosk browser stopped");
}

async fn shutdown(mut child: Child) {
    if let Err(err) = child.start_kill() {
        tracing::debug!("kiosk browser already gone: {err}");
    }
    if let Err(err) = child.wait().await {
        tracing::debug!("kiosk browser wait after kill failed: {err}");
    }
}
