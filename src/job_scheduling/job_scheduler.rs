//! Due-entry detection feeding the task queue

use chrono::NaiveDateTime;
use std::time::Duration;
use tracing::debug;

use super::job_queue::TaskQueue;
use crate::models::ScheduleEntry;
use crate::window::is_due_now;

/// Matches schedule entries against the wall clock
#[derive(Debug, Clone)]
pub struct JobScheduler {
    due_tolerance: Duration,
}

impl JobScheduler {
    pub fn new(due_tolerance: Duration) -> Self {
        Self { due_tolerance }
    }

    /// Enqueue every entry due at `now`. Returns the number of new tasks.
    pub fn schedule_due(
        &self,
        entries: &[ScheduleEntry],
        now: NaiveDateTime,
        queue: &mut TaskQueue,
    ) -> usize {
        let enqueued = entries
            .iter()
            .filter(|entry| is_due_now(entry, now, self.due_tolerance))
            .filter(|entry| queue.enqueue_if_new((*entry).clone(), now))
            .count();
        if enqueued > 0 {
            debug!("Scheduled {} due tasks at {}", enqueued, now.format("%H:%M:%S"));
        }
        enqueued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleRow;
    use chrono::NaiveDate;

    fn entry(day: &str, hour: &str, minute: &str) -> ScheduleEntry {
        let row: ScheduleRow = [
            ("equipment", "cam"),
            ("day", day),
            ("hour", hour),
            ("minute", minute),
        ]
        .into_iter()
        .collect();
        ScheduleEntry::from_row(&row).unwrap()
    }

    #[test]
    fn test_only_due_entries_are_enqueued_once() {
        let now = NaiveDate::from_ymd_opt(2025, 6, 2)
            .unwrap()
            .and_hms_opt(9, 0, 30)
            .unwrap();
        let entries = vec![
            entry("monday", "9", "0"),
            entry("monday", "9", "1"),
            entry("monday", "9", "5"),
            entry("tuesday", "9", "0"),
        ];

        let scheduler = JobScheduler::new(Duration::from_secs(90));
        let mut queue = TaskQueue::new();
        assert_eq!(scheduler.schedule_due(&entries, now, &mut queue), 2);
        assert_eq!(scheduler.schedule_due(&entries, now, &mut queue), 0);
        assert_eq!(queue.len(), 2);
    }
}
