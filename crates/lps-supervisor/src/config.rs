//! Supervisor configuration
//!
//! Loaded from a TOML file (default location under the platform config
//! directory) with `LPS_*` environment-variable overrides on top. Every
//! tunable has a default matching the original deployment constants.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use lps_common::{SupervisorError, SupervisorResult, Whitelist};

use crate::notification::NotifierConfig;

/// Top-level configuration for the supervisor daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub process: ProcessConfig,

    #[serde(default)]
    pub gaze: GazeConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub notifications: NotifierConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            session: SessionConfig::default(),
            process: ProcessConfig::default(),
            gaze: GazeConfig::default(),
            browser: BrowserConfig::default(),
            report: ReportConfig::default(),
            notifications: NotifierConfig::default(),
        }
    }
}

/// Timing knobs for session orchestration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Watchdog poll interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay after sending the browser stop signal, letting it flush state
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Bounded join per worker at teardown; stragglers are aborted
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Idle period for listener loops when their channel is empty
    #[serde(default = "default_listener_idle_ms")]
    pub listener_idle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            settle_ms: default_settle_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            listener_idle_ms: default_listener_idle_ms(),
        }
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn listener_idle(&self) -> Duration {
        Duration::from_millis(self.listener_idle_ms)
    }
}

/// Process authorization policy inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Whitelist entries given inline
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Optional newline-separated whitelist file, merged with the inline list
    #[serde(default)]
    pub whitelist_file: Option<PathBuf>,

    /// Names that must not be running before a session starts
    #[serde(default = "default_blocklist")]
    pub blocklist: Vec<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            whitelist_file: None,
            blocklist: default_blocklist(),
        }
    }
}

impl ProcessConfig {
    /// Build the effective whitelist from the inline entries plus the
    /// optional whitelist file
    pub fn effective_whitelist(&self) -> SupervisorResult<Whitelist> {
        let mut whitelist = Whitelist::new(self.whitelist.iter().cloned());
        if let Some(ref path) = self.whitelist_file {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                SupervisorError::Config(format!(
                    "whitelist file {} unreadable: {e}",
                    path.display()
                ))
            })?;
            let lines: Vec<&str> = contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            if lines.is_empty() {
                tracing::warn!("whitelist file {} contains no entries", path.display());
            }
            whitelist.extend(lines);
        }
        Ok(whitelist)
    }
}

/// Gaze-away detector thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeConfig {
    /// Horizontal deviation threshold (unitless, upstream normal-vector scale)
    #[serde(default = "default_x_threshold")]
    pub x_threshold: f64,

    /// Vertical deviation threshold
    #[serde(default = "default_y_threshold")]
    pub y_threshold: f64,

    /// Away intervals shorter than this are discarded as noise
    #[serde(default = "default_min_away_secs")]
    pub min_away_secs: f64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            x_threshold: default_x_threshold(),
            y_threshold: default_y_threshold(),
            min_away_secs: default_min_away_secs(),
        }
    }
}

impl GazeConfig {
    pub fn min_away(&self) -> Duration {
        Duration::from_secs_f64(self.min_away_secs)
    }
}

/// Kiosk browser subsystem launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Command used to launch the locked-down browser subsystem
    #[serde(default = "default_browser_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Readiness handshake retry budget
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,

    /// Interval between readiness polls
    #[serde(default = "default_readiness_poll_ms")]
    pub readiness_poll_ms: u64,

    /// How long the launched command must survive before it counts as loaded
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            command: default_browser_command(),
            args: Vec::new(),
            readiness_attempts: default_readiness_attempts(),
            readiness_poll_ms: default_readiness_poll_ms(),
            warmup_ms: default_warmup_ms(),
        }
    }
}

impl BrowserConfig {
    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}

/// Report artifact destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory the report artifact is written into
    #[serde(default = "default_report_dir")]
    pub dir: PathBuf,

    /// Filename stem; timestamp and duplicate counter are appended
    #[serde(default = "default_report_stem")]
    pub stem: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: default_report_dir(),
            stem: default_report_stem(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_join_timeout_ms() -> u64 {
    1000
}

fn default_listener_idle_ms() -> u64 {
    100
}

fn default_blocklist() -> Vec<String> {
    ["chrome", "chromium", "firefox", "msedge"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_x_threshold() -> f64 {
    0.15
}

fn default_y_threshold() -> f64 {
    0.10
}

fn default_min_away_secs() -> f64 {
    0.25
}

fn default_browser_command() -> String {
    "chromium".to_string()
}

fn default_readiness_attempts() -> u32 {
    20
}

fn default_readiness_poll_ms() -> u64 {
    1000
}

fn default_warmup_ms() -> u64 {
    500
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("./exams")
}

fn default_report_stem() -> String {
    "exam_report".to_string()
}

impl SupervisorConfig {
    /// Default config file location under the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("se", "lps", "lpsd").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from a TOML file
    pub fn from_file(path: &Path) -> SupervisorResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse from a TOML string
    pub fn from_str(contents: &str) -> SupervisorResult<Self> {
        toml::from_str(contents).map_err(|e| SupervisorError::Config(e.to_string()))
    }

    /// Load the default config file if present, then apply `LPS_*`
    /// environment overrides
    pub fn load() -> SupervisorResult<Self> {
        let path = std::env::var("LPS_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::default_path);

        let mut config = match path {
            Some(ref p) if p.exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment-variable overrides
    pub fn apply_env(&mut self) {
        if let Ok(level) = std::env::var("LPS_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(dir) = std::env::var("LPS_REPORT_DIR") {
            self.report.dir = PathBuf::from(dir);
        }
        if let Ok(command) = std::env::var("LPS_BROWSER_COMMAND") {
            self.browser.command = command;
        }
        if let Ok(path) = std::env::var("LPS_WHITELIST_FILE") {
            self.process.whitelist_file = Some(PathBuf::from(path));
        }
    }
}
