//! lpsd - LPS exam session supervisor daemon
//!
//! Wires the supervisor together and drives it from a small interactive
//! shell: `start` begins an exam session, `stop` ends it, `exit` quits.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lps_supervisor::{
    ExamSession, JsonReportRenderer, KioskBrowserLauncher, Notifier, SupervisorConfig,
    SysinfoProvider,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SupervisorConfig::load().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lps_supervisor={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting lpsd");
    tracing::info!("platform: {}", std::env::consts::OS);
    tracing::info!("report directory: {}", config.report.dir.display());

    let provider = Arc::new(SysinfoProvider::new());
    let launcher = Box::new(KioskBrowserLauncher::new(config.browser.clone()));
    let renderer = Box::new(JsonReportRenderer::new(&config.report));
    let notifier = Arc::new(Notifier::new(config.notifications.clone()));

    let mut session = ExamSession::new(config, provider, launcher, renderer, notifier);

    println!("Welcome to the LPS supervisor.");
    println!("start: begin an exam session");
    println!("stop: end the running exam session");
    println!("exit: quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "start" => {
                if session.is_running() {
                    println!("An exam is already running.");
                    continue;
                }
                let (ok, blocking) = session.valid_startup();
                if !ok {
                    println!(
                        "Please close the following programs before starting an exam: {}",
                        blocking.join(", ")
                    );
                    continue;
                }
                match session.start_exam().await {
                    Ok(()) => println!("Exam session running."),
                    Err(err) => println!("Could not start the exam: {err}"),
                }
            }
            "stop" => {
                if !session.is_running() {
                    println!("There is no exam running at the moment.");
                    continue;
                }
                match session.end_exam(false).await {
                    Ok(Some(report)) => println!(
                        "Exam ended: {} violation(s), {:.1}s spent looking away.",
                        report.violations.len(),
                        report.total_gaze_away_seconds
                    ),
                    Ok(None) => {}
                    Err(err) => println!("Could not end the exam: {err}"),
                }
            }
            "exit" => {
                if session.is_running() {
                    println!("Can't exit with an active exam session.");
                } else {
                    break;
                }
            }
            "" => {}
            other => println!("Unknown command: {other}"),
        }
    }

    tracing::info!("lpsd exiting");
    Ok(())
}
