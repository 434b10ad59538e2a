//! lps-supervisor library
//!
//! Core components of the LPS exam session supervisor: the process
//! authorization engine, the gaze-away detector, worker supervision, the
//! session state machine, and the report/notification plumbing.

pub mod browser;
pub mod config;
pub mod gaze;
pub mod notification;
pub mod process;
pub mod report;
pub mod session;
pub mod worker;

pub use browser::{BrowserChannels, BrowserLauncher, KioskBrowserLauncher};
pub use config::SupervisorConfig;
pub use gaze::GazeDetector;
pub use notification::{Notification, Notifier, Severity};
pub use process::{AuthorizationEngine, ProcessProvider, SafePidSet, SysinfoProvider};
pub use report::{JsonReportRenderer, ReportRenderer};
pub use session::{ExamSession, SessionState};
pub use worker::WorkerHandle;
