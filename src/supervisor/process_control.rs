//! Process-table inspection and signalling

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::debug;

/// Operations on processes this scheduler did not necessarily start
#[cfg_attr(test, mockall::automock)]
pub trait ProcessControl: Send + Sync {
    /// Start time of a live, non-zombie process; `None` when there is no such process
    fn start_time(&self, pid: u32) -> Option<u64>;

    /// Polite termination request; true when the signal was delivered
    fn terminate(&self, pid: u32) -> bool;

    /// Forced kill; true when the signal was delivered
    fn kill(&self, pid: u32) -> bool;

    /// Force-kill every process with this exact name; returns how many were signalled
    fn kill_by_name(&self, name: &str) -> usize;
}

/// A process as recorded on disk: the PID alone is not enough once the kernel
/// recycles it, so the start time is kept alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub pid: u32,
    /// `None` for records that predate identity tracking; those are never trusted
    pub start_time: Option<u64>,
}

impl ProcessIdentity {
    /// Identity of `pid` as the process table sees it right now
    pub fn observe(pid: u32, control: &dyn ProcessControl) -> Self {
        Self {
            pid,
            start_time: control.start_time(pid),
        }
    }

    /// Parse a record: JSON identity, or a bare PID from an older record
    pub fn parse(contents: &str) -> Option<Self> {
        let contents = contents.trim();
        serde_json::from_str(contents).ok().or_else(|| {
            contents.parse::<u32>().ok().map(|pid| Self {
                pid,
                start_time: None,
            })
        })
    }

    /// The recorded process is still running, as opposed to gone or replaced by
    /// another process that inherited the PID
    pub fn is_current(&self, control: &dyn ProcessControl) -> bool {
        self.start_time.is_some() && control.start_time(self.pid) == self.start_time
    }
}

/// [`ProcessControl`] backed by the live process table
pub struct SysinfoProcessControl {
    system: Mutex<System>,
}

impl SysinfoProcessControl {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_process<T>(&self, pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        let pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(f)
    }
}

impl Default for SysinfoProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SysinfoProcessControl {
    fn start_time(&self, pid: u32) -> Option<u64> {
        self.with_process(pid, |p| {
            (!matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead)).then(|| p.start_time())
        })
        .flatten()
    }

    fn terminate(&self, pid: u32) -> bool {
        self.with_process(pid, |p| p.kill_with(Signal::Term).unwrap_or_else(|| p.kill()))
            .unwrap_or(false)
    }

    fn kill(&self, pid: u32) -> bool {
        self.with_process(pid, |p| p.kill()).unwrap_or(false)
    }

    fn kill_by_name(&self, name: &str) -> usize {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_processes(ProcessesToUpdate::All, true);
        let own_pid = std::process::id();
        let killed = system
            .processes_by_exact_name(OsStr::new(name))
            .filter(|p| p.pid().as_u32() != own_pid)
            .filter(|p| p.kill())
            .count();
        if killed > 0 {
            debug!("Killed {} '{}' processes", killed, name);
        }
        killed
    }
}
