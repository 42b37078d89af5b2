//! Task dispatch: worker invocation building and routing to the supervisor

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::types::{DispatchMode, PendingTask, PollAction, TaskOutcome};
use crate::config::defaults::{ENV_CUSTOMER, ENV_EQUIPMENT, UNKNOWN_BINDING};
use crate::config::{Config, WorkersConfig};
use crate::models::{BroadcastParams, Role, ScheduleEntry, TaskSpec};
use crate::services::MediaInventory;
use crate::supervisor::{ProcessSupervisor, WorkerInvocation, WorkerOutcome};

const DEFAULT_FPS: &str = "30";
const DEFAULT_CROP: &str = "0";

/// Runs one pending task at a time through the process supervisor
pub struct Dispatcher {
    supervisor: Arc<ProcessSupervisor>,
    workers: WorkersConfig,
    media: MediaInventory,
    capture_deadline_margin: Duration,
    free2up_poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(supervisor: Arc<ProcessSupervisor>, config: &Config) -> Self {
        Self {
            supervisor,
            workers: config.workers.clone(),
            media: MediaInventory::new(&config.media),
            capture_deadline_margin: config.supervisor.capture_deadline_margin,
            free2up_poll_interval: config.scheduler.free2up_poll_interval,
        }
    }

    pub async fn dispatch(&self, task: PendingTask) -> TaskOutcome {
        let entry = &task.entry;
        info!(
            "Dispatching {} for {} ({} min)",
            task.slot,
            entry.customer.as_deref().unwrap_or(UNKNOWN_BINDING),
            entry.effective_duration_minutes()
        );

        let outcome = match DispatchMode::from(task.task_type()) {
            DispatchMode::Polling => self.run_free2up(entry).await,
            DispatchMode::Blocking(role) => self.run_blocking(role, entry).await,
        };

        match &outcome {
            TaskOutcome::Completed { role, exit_code } => {
                info!("{} task {} completed (exit code {:?})", role, task.slot, exit_code)
            }
            TaskOutcome::WindowClosed { polls } => {
                info!("FREE2UP window {} closed after {} polls", task.slot, polls)
            }
            TaskOutcome::DeadlineExceeded { role } => {
                error!("{} task {} exceeded its deadline and was stopped", role, task.slot)
            }
            TaskOutcome::Failed { role, reason } => {
                error!("{} task {} failed: {}", role, task.slot, reason)
            }
        }
        outcome
    }

    async fn run_blocking(&self, role: Role, entry: &ScheduleEntry) -> TaskOutcome {
        let invocation = self.invocation(role, entry);
        let deadline = match entry.task {
            TaskSpec::Recording { .. } => Some(self.capture_deadline(entry)),
            _ => None,
        };

        match self
            .supervisor
            .launch_blocking(role, &invocation, deadline)
            .await
        {
            Ok(WorkerOutcome::Exited { success: true, code }) => TaskOutcome::Completed {
                role,
                exit_code: code,
            },
            Ok(WorkerOutcome::Exited { success: false, code }) => TaskOutcome::Failed {
                role,
                reason: match code {
                    Some(code) => format!("worker exited with code {code}"),
                    None => "worker killed by signal".to_string(),
                },
            },
            Ok(WorkerOutcome::DeadlineExceeded) => TaskOutcome::DeadlineExceeded { role },
            Err(e) => TaskOutcome::Failed {
                role,
                reason: e.to_string(),
            },
        }
    }

    /// Entry duration plus the configured margin
    pub fn capture_deadline(&self, entry: &ScheduleEntry) -> Duration {
        Duration::from_secs(u64::from(entry.effective_duration_minutes()) * 60)
            + self.capture_deadline_margin
    }

    /// Configured worker command followed by the task's arguments and bindings
    pub fn invocation(&self, role: Role, entry: &ScheduleEntry) -> WorkerInvocation {
        let command = self.workers.for_role(role);
        let mut args = command.args.clone();
        args.extend(task_arguments(entry));
        WorkerInvocation {
            program: command.program.clone(),
            args,
            env: worker_env(entry),
        }
    }

    async fn run_free2up(&self, entry: &ScheduleEntry) -> TaskOutcome {
        let window = Duration::from_secs(u64::from(entry.effective_duration_minutes()) * 60);
        let started = Instant::now();
        let mut polls = 0;

        info!(
            "FREE2UP window open for {}, polling every {}",
            humantime::format_duration(window),
            humantime::format_duration(self.free2up_poll_interval)
        );
        while started.elapsed() < window {
            let action = self.free2up_poll_once(entry).await;
            debug!("FREE2UP poll {}: {:?}", polls, action);
            polls += 1;
            tokio::time::sleep(self.free2up_poll_interval).await;
        }
        TaskOutcome::WindowClosed { polls }
    }

    /// One FREE2UP decision: upload pending recordings first, otherwise broadcast
    /// uploaded media. Never waits on the workers it starts.
    pub async fn free2up_poll_once(&self, entry: &ScheduleEntry) -> PollAction {
        let role = if self.media.has_pending_recordings().await {
            Role::Upload
        } else if !self.media.unbroadcast_uploads().await.is_empty() {
            Role::Broadcast
        } else {
            return PollAction::Idle;
        };

        let command = self.workers.for_role(role);
        let mut args = command.args.clone();
        if let (Role::Broadcast, TaskSpec::Free2Up(params)) = (role, &entry.task) {
            args.extend(broadcast_arguments(params));
        }
        let invocation = WorkerInvocation {
            program: command.program.clone(),
            args,
            env: worker_env(entry),
        };
        match self.supervisor.launch_detached(role, &invocation).await {
            Ok(launch) if role == Role::Upload => PollAction::Upload(launch),
            Ok(launch) => PollAction::Broadcast(launch),
            Err(e) => {
                warn!("Could not start {} worker, retrying next poll: {}", role, e);
                PollAction::Failed(role)
            }
        }
    }
}

/// `CUSTOMER` and `EQUIPMENT` bindings for the worker
pub fn worker_env(entry: &ScheduleEntry) -> Vec<(String, String)> {
    vec![
        (
            ENV_CUSTOMER.to_string(),
            entry
                .customer
                .clone()
                .unwrap_or_else(|| UNKNOWN_BINDING.to_string()),
        ),
        (ENV_EQUIPMENT.to_string(), entry.node_id.clone()),
    ]
}

/// Ordered `--name value` arguments for the entry's task type
pub fn task_arguments(entry: &ScheduleEntry) -> Vec<String> {
    let duration = entry.effective_duration_minutes().to_string();
    let mut args = Vec::new();
    let mut push = |name: &str, value: &str| {
        args.push(format!("--{name}"));
        args.push(value.to_string());
    };

    match &entry.task {
        TaskSpec::Recording { fps, crop } => {
            push("duration", &duration);
            push("fps", fps.as_deref().unwrap_or(DEFAULT_FPS));
            for (name, value) in [
                ("left_crop_left", &crop.left_crop_left),
                ("left_crop_right", &crop.left_crop_right),
                ("right_crop_left", &crop.right_crop_left),
                ("right_crop_right", &crop.right_crop_right),
                ("crop_top", &crop.crop_top),
                ("crop_bottom", &crop.crop_bottom),
            ] {
                push(name, value.as_deref().unwrap_or(DEFAULT_CROP));
            }
        }
        TaskSpec::Continuous { fps } => {
            push("duration", &duration);
            push("fps", fps.as_deref().unwrap_or(DEFAULT_FPS));
        }
        TaskSpec::Stream { fps, stream_key } => {
            push("duration", &duration);
            push("fps", fps.as_deref().unwrap_or(DEFAULT_FPS));
            if let Some(key) = stream_key {
                push("stream_key", key);
            }
        }
        TaskSpec::Free2Up(_) | TaskSpec::Upload => {}
    }
    args
}

/// Stream target and publication settings of a FREE2UP window, for the broadcast worker
pub fn broadcast_arguments(params: &BroadcastParams) -> Vec<String> {
    [
        ("rtmp_key", &params.stream_key),
        ("visibility", &params.visibility),
        ("youtube_channel_id", &params.channel_id),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.as_ref().map(|v| [format!("--{name}"), v.clone()]))
    .flatten()
    .collect()
}
