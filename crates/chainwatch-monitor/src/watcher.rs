//! `Watcher`: the seam between the poll loop and however the host process
//! tree is actually enumerated. Spec §4.10: `Children(pid) -> [{PID, PPID,
//! Command}]`, `Kill(pid)`. [`SysinfoWatcher`] is the real implementation;
//! tests drive [`crate::monitor::ProcessMonitor`] against a stub instead.

use std::sync::Mutex;

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::error::MonitorError;

/// One process observed under a watched target: its identity and the command
/// line it was launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub command: String,
}

/// Enumerate a process's children and terminate a process by PID.
pub trait Watcher: Send + Sync {
    fn children(&self, pid: u32) -> Vec<ProcessInfo>;
    fn kill(&self, pid: u32) -> Result<(), MonitorError>;
}

/// [`Watcher`] backed by `sysinfo`'s cross-platform process table. Refreshes
/// on every call rather than caching, since the poll loop already rate-limits
/// how often this runs.
pub struct SysinfoWatcher {
    system: Mutex<System>,
}

impl SysinfoWatcher {
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new_all()) }
    }
}

impl Default for SysinfoWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Watcher for SysinfoWatcher {
    fn children(&self, pid: u32) -> Vec<ProcessInfo> {
        let mut system = self.system.lock().expect("sysinfo watcher mutex poisoned");
        system.refresh_processes(ProcessesToUpdate::All, true);
        let parent = Pid::from_u32(pid);
        system
            .processes()
            .values()
            .filter(|process| process.parent() == Some(parent))
            .map(|process| ProcessInfo {
                pid: process.pid().as_u32(),
                ppid: process.parent().map_or(0, |p| p.as_u32()),
                command: process.cmd().iter().map(|part| part.to_string_lossy().into_owned()).collect::<Vec<_>>().join(" "),
            })
            .collect()
    }

    fn kill(&self, pid: u32) -> Result<(), MonitorError> {
        let mut system = self.system.lock().expect("sysinfo watcher mutex poisoned");
        let target = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        match system.process(target) {
            Some(process) if process.kill() => Ok(()),
            Some(_) => Err(MonitorError::KillFailed(pid)),
            None => Err(MonitorError::ProcessNotFound(pid)),
        }
    }
}
