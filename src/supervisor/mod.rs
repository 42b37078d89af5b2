//! Worker process supervision
//!
//! The supervisor guarantees at most one live worker per [`Role`]. Every launch is
//! preceded by a reclaim: the recorded holder is terminated (then killed if it
//! ignores the request), stray encoders are reaped by name and the capture device
//! is given time to settle.
//!
//! Two launch modes exist:
//!
//! - **blocking**: run the worker to completion, optionally under a hard deadline.
//!   No liveness record is kept.
//! - **detached**: start the worker and record its PID and start time so a later
//!   call, or a later scheduler process, can see it is still running.
//!
//! A record is only acted on while its PID still belongs to the process that wrote
//! it. A PID recycled by the kernel (after a reboot, say) is never signalled.

use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

pub mod instance_lock;
pub mod liveness;
pub mod process_control;

pub use instance_lock::InstanceLock;
pub use liveness::{FileLivenessStore, LivenessStore, MemoryLivenessStore};
pub use process_control::{ProcessControl, ProcessIdentity, SysinfoProcessControl};

use crate::config::SupervisorConfig;
use crate::errors::{SupervisorError, SupervisorResult};
use crate::models::Role;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Program, arguments and extra environment for one worker run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
}

impl WorkerInvocation {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a blocking worker run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Exited { code: Option<i32>, success: bool },
    /// The deadline passed; the worker was terminated
    DeadlineExceeded,
}

/// Result of a detached launch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachedLaunch {
    Launched { pid: u32 },
    /// The recorded instance is still alive; nothing was started
    AlreadyRunning { pid: u32 },
}

pub struct ProcessSupervisor {
    liveness: Arc<dyn LivenessStore>,
    control: Arc<dyn ProcessControl>,
    terminate_grace: Duration,
    settle_delay: Duration,
    encoder_process_names: Vec<String>,
}

impl ProcessSupervisor {
    pub fn new(
        liveness: Arc<dyn LivenessStore>,
        control: Arc<dyn ProcessControl>,
        config: &SupervisorConfig,
    ) -> Self {
        Self {
            liveness,
            control,
            terminate_grace: config.terminate_grace,
            settle_delay: config.settle_delay,
            encoder_process_names: config.encoder_process_names.clone(),
        }
    }

    /// Free a role from any previous holder.
    ///
    /// Never fails: liveness and signalling problems are logged and the role is
    /// treated as free. The encoder sweep and settle delay always run.
    pub async fn reclaim(&self, role: Role) {
        match self.liveness.read(role).await {
            Ok(Some(holder)) => self.stop_holder(role, holder).await,
            Ok(None) => debug!("No recorded {} worker to reclaim", role),
            Err(e) => warn!("Could not read {} liveness record, assuming free: {}", role, e),
        }

        if let Err(e) = self.liveness.clear(role).await {
            warn!("Could not clear {} liveness record: {}", role, e);
        }

        for name in &self.encoder_process_names {
            let killed = self.control.kill_by_name(name);
            if killed > 0 {
                info!("Killed {} stray '{}' processes before starting {}", killed, name, role);
            }
        }

        if !self.settle_delay.is_zero() {
            info!(
                "Waiting {} for {} resources to settle",
                humantime::format_duration(self.settle_delay),
                role
            );
            tokio::time::sleep(self.settle_delay).await;
        }
    }

    /// Reclaim the role, run the worker and wait for it to exit.
    ///
    /// With a deadline the wait is cancelled once it elapses and the worker is
    /// terminated, then killed after the grace period.
    pub async fn launch_blocking(
        &self,
        role: Role,
        invocation: &WorkerInvocation,
        deadline: Option<Duration>,
    ) -> SupervisorResult<WorkerOutcome> {
        self.reclaim(role).await;

        let mut child = spawn(role, invocation)?;
        info!(
            "Started {} worker (pid {}): {}",
            role,
            child.id().map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
            invocation.command_line()
        );

        let status = match deadline {
            None => child
                .wait()
                .await
                .map_err(|source| SupervisorError::Wait { role, source })?,
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status.map_err(|source| SupervisorError::Wait { role, source })?,
                Err(_) => {
                    warn!(
                        "{} worker exceeded its {} deadline, stopping it",
                        role,
                        humantime::format_duration(limit)
                    );
                    self.stop_child(role, &mut child).await;
                    return Ok(WorkerOutcome::DeadlineExceeded);
                }
            },
        };

        info!("{} worker finished with {}", role, status);
        Ok(WorkerOutcome::Exited {
            code: status.code(),
            success: status.success(),
        })
    }

    /// Start the worker in the background unless a live recorded instance exists
    pub async fn launch_detached(
        &self,
        role: Role,
        invocation: &WorkerInvocation,
    ) -> SupervisorResult<DetachedLaunch> {
        match self.liveness.read(role).await {
            Ok(Some(holder)) if holder.is_current(self.control.as_ref()) => {
                debug!("{} worker already running (pid {})", role, holder.pid);
                return Ok(DetachedLaunch::AlreadyRunning { pid: holder.pid });
            }
            Ok(Some(holder)) => {
                info!(
                    "Clearing stale {} liveness record (pid {} is gone or reused)",
                    role, holder.pid
                );
                if let Err(e) = self.liveness.clear(role).await {
                    warn!("Could not clear {} liveness record: {}", role, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not read {} liveness record, assuming free: {}", role, e),
        }

        self.reclaim(role).await;

        let child = spawn(role, invocation)?;
        let pid = child.id().ok_or_else(|| {
            SupervisorError::liveness(role, "worker exited before its pid was known")
        })?;
        self.liveness
            .write(role, ProcessIdentity::observe(pid, self.control.as_ref()))
            .await?;
        info!(
            "Launched {} worker in background (pid {}): {}",
            role,
            pid,
            invocation.command_line()
        );
        // Dropping the handle leaves the worker running; the runtime reaps it on exit
        drop(child);
        Ok(DetachedLaunch::Launched { pid })
    }

    async fn stop_holder(&self, role: Role, holder: ProcessIdentity) {
        let pid = holder.pid;
        let control = self.control.as_ref();
        if !holder.is_current(control) {
            if control.start_time(pid).is_some() {
                warn!(
                    "Recorded {} worker pid {} now belongs to another process, leaving it alone",
                    role, pid
                );
            } else {
                debug!("Recorded {} worker (pid {}) is no longer running", role, pid);
            }
            return;
        }

        warn!("Found previous {} worker still running (pid {}), terminating", role, pid);
        control.terminate(pid);

        let waited = tokio::time::timeout(self.terminate_grace, async {
            while holder.is_current(control) {
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;
            }
        })
        .await;

        match waited {
            Ok(()) => info!("Previous {} worker (pid {}) terminated", role, pid),
            Err(_) if !holder.is_current(control) => {
                info!("Previous {} worker (pid {}) terminated", role, pid)
            }
            Err(_) => {
                warn!("Previous {} worker (pid {}) ignored termination, killing", role, pid);
                if !control.kill(pid) {
                    warn!("Kill signal for pid {} was not delivered", pid);
                }
            }
        }
    }

    async fn stop_child(&self, role: Role, child: &mut Child) {
        if let Some(pid) = child.id() {
            self.control.terminate(pid);
        }
        match tokio::time::timeout(self.terminate_grace, child.wait()).await {
            Ok(_) => info!("{} worker stopped after deadline", role),
            Err(_) => {
                warn!("{} worker ignored termination, killing", role);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {} worker: {}", role, e);
                }
            }
        }
    }
}

fn spawn(role: Role, invocation: &WorkerInvocation) -> SupervisorResult<Child> {
    Command::new(&invocation.program)
        .args(&invocation.args)
        .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            role,
            program: invocation.program.clone(),
            source,
        })
}
