//! Event types exchanged between the supervisor and its monitor workers

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One process as observed in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    /// Operating system process ID
    pub pid: u32,
    /// User owning the process
    pub owner: String,
}

impl ProcessEntry {
    pub fn new(pid: u32, owner: impl Into<String>) -> Self {
        Self {
            pid,
            owner: owner.into(),
        }
    }
}

/// Snapshot of the current user's processes, grouped by executable name.
///
/// Rebuilt from scratch on every poll; insertion order carries no meaning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    entries: HashMap<String, Vec<ProcessEntry>>,
}

impl ProcessSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry under the given process name
    pub fn insert(&mut self, name: impl Into<String>, entry: ProcessEntry) {
        self.entries.entry(name.into()).or_default().push(entry);
    }

    /// Entries recorded under `name`, empty if the name is absent
    pub fn get(&self, name: &str) -> &[ProcessEntry] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All process names present in the snapshot
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ProcessEntry])> {
        self.entries
            .iter()
            .map(|(name, list)| (name.as_str(), list.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compute the per-name start/stop difference between two snapshots.
    ///
    /// For each name in `new`, `started` holds the entries whose PID is absent
    /// from `old` under the same name; `stopped` is symmetric. A PID that
    /// reappears under a different name counts as a genuine stop/start pair —
    /// there is no identity tracking across names.
    pub fn diff(old: &Self, new: &Self) -> ProcessDiff {
        let mut started: HashMap<String, Vec<ProcessEntry>> = HashMap::new();
        let mut stopped: HashMap<String, Vec<ProcessEntry>> = HashMap::new();

        for (name, new_list) in &new.entries {
            let old_pids: std::collections::HashSet<u32> =
                old.get(name).iter().map(|e| e.pid).collect();
            let added: Vec<ProcessEntry> = new_list
                .iter()
                .filter(|e| !old_pids.contains(&e.pid))
                .cloned()
                .collect();
            if !added.is_empty() {
                started.insert(name.clone(), added);
            }
        }

        for (name, old_list) in &old.entries {
            let new_pids: std::collections::HashSet<u32> =
                new.get(name).iter().map(|e| e.pid).collect();
            let removed: Vec<ProcessEntry> = old_list
                .iter()
                .filter(|e| !new_pids.contains(&e.pid))
                .cloned()
                .collect();
            if !removed.is_empty() {
                stopped.insert(name.clone(), removed);
            }
        }

        ProcessDiff { started, stopped }
    }
}

/// Result of comparing two snapshots
#[derive(Debug, Clone, Default)]
pub struct ProcessDiff {
    /// Entries present in the new snapshot but not the old, per name
    pub started: HashMap<String, Vec<ProcessEntry>>,
    /// Entries present in the old snapshot but not the new, per name
    pub stopped: HashMap<String, Vec<ProcessEntry>>,
}

/// An unauthorized process detected during a session.
///
/// Immutable once created; the aggregator's insertion order is the canonical
/// timeline order, not the embedded timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    pub process_name: String,
}

impl ViolationEvent {
    pub fn new(pid: u32, process_name: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            pid,
            process_name: process_name.into(),
        }
    }
}

/// Raw 3-axis gaze deviation sample, delivered at the camera's frame rate.
///
/// Dimensionless units matching the upstream normal-vector scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeDeviation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GazeDeviation {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// One completed, debounced "looked away" interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AwaySample {
    pub seconds: f64,
}

impl AwaySample {
    pub fn new(seconds: f64) -> Self {
        Self { seconds }
    }
}

/// Signal emitted by the browser subsystem towards the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserSignal {
    /// Initial page load completed; the environment is ready
    Navigated,
}

/// Control message accepted by the browser subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserCommand {
    Stop,
}

/// Final record of a completed exam session.
///
/// Built exactly once, from the frozen aggregator state, when the session
/// ends; immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Unique report identifier
    pub id: Uuid,
    /// Host the session ran on
    pub hostname: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Accumulated away time over the whole session
    pub total_gaze_away_seconds: f64,
    /// Detection-ordered violation timeline
    pub violations: Vec<ViolationEvent>,
}

impl SessionReport {
    /// Total away time in whole minutes, rounded down
    pub fn away_minutes(&self) -> u64 {
        (self.total_gaze_away_seconds / 60.0) as u64
    }
}
