//! Best-effort single-instance guard for the dispatcher

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::process_control::{ProcessControl, ProcessIdentity};
use crate::errors::{SupervisorError, SupervisorResult};

/// Lock file holding the owner's process identity, removed on drop
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock, replacing it when the recorded owner is gone.
    ///
    /// Only a holder whose PID and start time both still match the process table
    /// keeps the lock; a PID that has since been handed to another process does not.
    pub fn acquire(path: &Path, control: &dyn ProcessControl) -> SupervisorResult<Self> {
        let lock_err = |source| SupervisorError::Lock {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(lock_err)?;
        }

        let own_pid = std::process::id();
        let own = serde_json::to_string(&ProcessIdentity::observe(own_pid, control))
            .map_err(|e| lock_err(std::io::Error::other(e)))?;

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    file.write_all(own.as_bytes()).map_err(lock_err)?;
                    info!("Acquired instance lock {}", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = std::fs::read_to_string(path)
                        .ok()
                        .and_then(|s| ProcessIdentity::parse(&s));
                    match holder {
                        Some(holder) if holder.pid != own_pid && holder.is_current(control) => {
                            return Err(SupervisorError::InstanceLocked {
                                pid: holder.pid,
                                path: path.to_path_buf(),
                            });
                        }
                        _ => {
                            warn!(
                                "Removing stale instance lock {} (holder {:?})",
                                path.display(),
                                holder.map(|h| h.pid)
                            );
                            match std::fs::remove_file(path) {
                                Ok(()) => {}
                                Err(e) if e.kind() == ErrorKind::NotFound => {}
                                Err(e) => return Err(lock_err(e)),
                            }
                        }
                    }
                }
                Err(e) => return Err(lock_err(e)),
            }
        }

        Err(lock_err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "lock file reappeared while replacing a stale lock",
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove instance lock {}: {}", self.path.display(), e);
        }
    }
}
