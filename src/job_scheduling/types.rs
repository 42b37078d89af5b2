//! Job scheduling type definitions

use chrono::NaiveDateTime;

use crate::models::{Role, ScheduleEntry, SlotIdentity, TaskType};
use crate::supervisor::DetachedLaunch;

/// A due schedule entry waiting in the task queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub entry: ScheduleEntry,
    pub slot: SlotIdentity,
    /// Local time the entry was found due
    pub due_at: NaiveDateTime,
}

impl PendingTask {
    pub fn new(entry: ScheduleEntry, due_at: NaiveDateTime) -> Self {
        Self {
            slot: entry.slot_identity(),
            entry,
            due_at,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.entry.task_type()
    }
}

/// How the dispatcher runs a task type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Run the role's worker to completion
    Blocking(Role),
    /// Poll media state and keep upload/broadcast workers alive for the window
    Polling,
}

impl From<TaskType> for DispatchMode {
    fn from(task_type: TaskType) -> Self {
        match task_type {
            TaskType::Recording => DispatchMode::Blocking(Role::Record),
            TaskType::Free2Up => DispatchMode::Polling,
            TaskType::Continuous => DispatchMode::Blocking(Role::Continuous),
            TaskType::Stream => DispatchMode::Blocking(Role::Stream),
            TaskType::Upload => DispatchMode::Blocking(Role::Upload),
        }
    }
}

/// One FREE2UP poll decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    Upload(DetachedLaunch),
    Broadcast(DetachedLaunch),
    /// Nothing recorded or waiting for broadcast
    Idle,
    /// Launch attempt failed; logged, retried on the next poll
    Failed(Role),
}

/// How a dispatched task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { role: Role, exit_code: Option<i32> },
    Failed { role: Role, reason: String },
    DeadlineExceeded { role: Role },
    WindowClosed { polls: usize },
}
