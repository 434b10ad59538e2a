//! Process snapshot and kill-authorization engine
//!
//! Provides the provider seam over OS process enumeration, the whitelist /
//! safe-PID authorization policy, and best-effort recursive termination.

mod sysinfo_provider;
pub mod watchdog;

pub use sysinfo_provider::SysinfoProvider;
pub use watchdog::ProcessWatchdog;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use lps_common::{ProcessSnapshot, Whitelist};

/// Seam over OS process inspection so the policy logic runs against a
/// deterministic fake in tests.
pub trait ProcessProvider: Send + Sync {
    /// Snapshot of the current user's processes. Individual processes that
    /// cannot be read (vanished, permission denied, zombie) are skipped;
    /// the scan itself never fails.
    fn snapshot(&self) -> ProcessSnapshot;

    /// Direct children of `pid`
    fn children(&self, pid: u32) -> Vec<u32>;

    /// Deliver a kill signal to `pid`; returns false when the process is
    /// already gone or access is denied
    fn kill(&self, pid: u32) -> bool;
}

/// PIDs belonging to the supervisor's own workers and their children.
///
/// Written by workers as they spawn sub-processes, read by the watchdog each
/// poll cycle. Readers take a point-in-time copy so concurrent appends never
/// invalidate an iteration.
#[derive(Debug, Clone, Default)]
pub struct SafePidSet {
    inner: Arc<RwLock<HashSet<u32>>>,
}

impl SafePidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pid: u32) {
        self.inner.write().insert(pid);
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.inner.read().contains(&pid)
    }

    /// Point-in-time copy of the set
    pub fn to_set(&self) -> HashSet<u32> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Decides whether a newly started process may keep running
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    whitelist: Whitelist,
    safe_pids: SafePidSet,
}

impl AuthorizationEngine {
    pub fn new(whitelist: Whitelist, safe_pids: SafePidSet) -> Self {
        Self {
            whitelist,
            safe_pids,
        }
    }

    /// True when the process may remain: its name matches the whitelist or
    /// its PID belongs to the supervisor's own infrastructure
    pub fn authorize(&self, name: &str, pid: u32) -> bool {
        self.whitelist.matches(name) || self.safe_pids.contains(pid)
    }

    pub fn safe_pids(&self) -> &SafePidSet {
        &self.safe_pids
    }
}

/// Terminate `pid` and all of its descendants, children before parents.
///
/// Termination is best-effort: a process that is already gone or cannot be
/// signalled is logged and skipped, never an error.
pub fn terminate_tree(provider: &dyn ProcessProvider, pid: u32) {
    let mut visited = HashSet::new();
    terminate_tree_inner(provider, pid, &mut visited);
}

fn terminate_tree_inner(provider: &dyn ProcessProvider, pid: u32, visited: &mut HashSet<u32>) {
    if !visited.insert(pid) {
        return;
    }
    for child in provider.children(pid) {
        terminate_tree_inner(provider, child, visited);
    }
    if provider.kill(pid) {
        tracing::debug!(pid, "terminated process");
    } else {
        tracing::warn!(pid, "could not terminate process, continuing");
    }
}
