//! Sysinfo-backed process provider
//!
//! Polls the OS process table through the sysinfo crate. Processes that
//! vanish or cannot be inspected mid-scan are simply absent from the result;
//! a scan never fails as a whole.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, Uid, UpdateKind};

use lps_common::{ProcessEntry, ProcessSnapshot};

use super::ProcessProvider;

/// Process provider using the sysinfo crate
pub struct SysinfoProvider {
    system: Mutex<System>,
    /// UID of the supervisor's own user; snapshots are scoped to it
    current_uid: Option<Uid>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        refresh(&mut system);

        let current_uid = sysinfo::get_current_pid()
            .ok()
            .and_then(|pid| system.process(pid))
            .and_then(|proc| proc.user_id().cloned());
        if current_uid.is_none() {
            tracing::warn!("could not resolve current user id; snapshots will not be user-scoped");
        }

        Self {
            system: Mutex::new(system),
            current_uid,
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn refresh(system: &mut System) {
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_user(UpdateKind::Always),
    );
}

impl ProcessProvider for SysinfoProvider {
    fn snapshot(&self) -> ProcessSnapshot {
        let mut system = self.system.lock();
        refresh(&mut system);

        let mut snap = ProcessSnapshot::new();
        for (pid, proc) in system.processes() {
            let uid = proc.user_id();
            if let Some(ref current) = self.current_uid {
                if uid != Some(current) {
                    continue;
                }
            }
            let name = proc.name().to_string_lossy().to_string();
            // Uid doesn't implement Display, use Debug format
            let owner = uid.map(|u| format!("{u:?}")).unwrap_or_default();
            snap.insert(name, ProcessEntry::new(pid.as_u32(), owner));
        }
        snap
    }

    fn children(&self, pid: u32) -> Vec<u32> {
        let mut system = self.system.lock();
        refresh(&mut system);

        let parent = Pid::from_u32(pid);
        system
            .processes()
            .iter()
            .filter(|(_, proc)| proc.parent() == Some(parent))
            .map(|(child, _)| child.as_u32())
            .collect()
    }

    fn kill(&self, pid: u32) -> bool {
        let system = self.system.lock();
        system
            .process(Pid::from_u32(pid))
            .map(|proc| proc.kill())
            .unwrap_or(false)
    }
}
