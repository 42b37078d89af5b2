//! Task queue with slot deduplication and bounded execution memory

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, info};

use super::types::PendingTask;
use crate::models::{ScheduleEntry, SlotIdentity};

/// FIFO of due tasks. A slot is enqueued at most once while it is remembered.
#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: VecDeque<PendingTask>,
    /// Slot -> local time it was enqueued
    executed: HashMap<SlotIdentity, NaiveDateTime>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the entry unless its slot already fired.
    /// Returns true if the task was enqueued.
    pub fn enqueue_if_new(&mut self, entry: ScheduleEntry, now: NaiveDateTime) -> bool {
        let task = PendingTask::new(entry, now);
        if self.executed.contains_key(&task.slot) {
            debug!("Skipping already executed slot {}", task.slot);
            return false;
        }

        info!(
            "Enqueued task {} (type: {}, customer: {}, start: {:02}:{:02})",
            task.slot,
            task.task_type(),
            task.entry.customer.as_deref().unwrap_or("-"),
            task.entry.start_hour,
            task.entry.start_minute
        );
        self.executed.insert(task.slot.clone(), now);
        self.pending.push_back(task);
        true
    }

    pub fn dequeue(&mut self) -> Option<PendingTask> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn remembered_slots(&self) -> usize {
        self.executed.len()
    }

    /// Forget slots that fired more than `retention` before `now`.
    /// Returns how many were dropped.
    pub fn evict_older_than(&mut self, now: NaiveDateTime, retention: Duration) -> usize {
        let retention = ChronoDuration::from_std(retention).unwrap_or(ChronoDuration::MAX);
        let before = self.executed.len();
        self.executed
            .retain(|_, fired_at| now.signed_duration_since(*fired_at) <= retention);
        let evicted = before - self.executed.len();
        if evicted > 0 {
            debug!("Evicted {} executed slots", evicted);
        }
        evicted
    }
}
