//! Human-readable agenda overview logged after each refresh

use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::info;

use crate::models::{ScheduleDay, ScheduleEntry, TaskType};

const UPCOMING_LIMIT: usize = 3;

#[derive(Debug, Clone)]
pub struct AgendaSummary {
    pub total: usize,
    pub by_type: Vec<(TaskType, Vec<ScheduleEntry>)>,
    /// Next entries later today, earliest first
    pub upcoming_today: Vec<ScheduleEntry>,
}

impl AgendaSummary {
    pub fn build(entries: &[ScheduleEntry], now: NaiveDateTime) -> Self {
        let by_type = TaskType::ALLOWED
            .into_iter()
            .map(|task_type| {
                let items = entries
                    .iter()
                    .filter(|e| e.task_type() == task_type)
                    .cloned()
                    .collect();
                (task_type, items)
            })
            .collect();

        let now_secs = now.time().num_seconds_from_midnight();
        let mut upcoming: Vec<ScheduleEntry> = entries
            .iter()
            .filter(|e| e.day == ScheduleDay::On(now.weekday()) && e.start_seconds() >= now_secs)
            .cloned()
            .collect();
        upcoming.sort_by_key(ScheduleEntry::start_seconds);
        upcoming.truncate(UPCOMING_LIMIT);

        Self {
            total: entries.len(),
            by_type,
            upcoming_today: upcoming,
        }
    }

    pub fn log(&self, node_id: &str) {
        info!("Agenda for {}: {} entries", node_id, self.total);
        for (task_type, items) in &self.by_type {
            if items.is_empty() {
                continue;
            }
            info!("  {} ({} entries)", task_type, items.len());
            for entry in items {
                info!(
                    "    {} {:02}:{:02} {} min - {}",
                    entry.day,
                    entry.start_hour,
                    entry.start_minute,
                    entry
                        .duration_minutes
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "default".to_string()),
                    entry.customer.as_deref().unwrap_or("-")
                );
            }
        }

        if self.upcoming_today.is_empty() {
            info!("No more entries today for {}", node_id);
        } else {
            for entry in &self.upcoming_today {
                info!(
                    "Next today: {} at {:02}:{:02} for {}",
                    entry.task_type(),
                    entry.start_hour,
                    entry.start_minute,
                    entry.customer.as_deref().unwrap_or("-")
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleRow;
    use chrono::NaiveDate;

    fn entry(day: &str, hour: u32, kind: &str) -> ScheduleEntry {
        let hour = hour.to_string();
        let row: ScheduleRow = [
            ("equipment", "cam"),
            ("day", day),
            ("hour", hour.as_str()),
            ("minute", "0"),
            ("type", kind),
        ]
        .into_iter()
        .collect();
        ScheduleEntry::from_row(&row).unwrap()
    }

    #[test]
    fn test_upcoming_is_today_sorted_and_capped() {
        // 2025-06-02 is a Monday
        let now = NaiveDate::from_ymd_opt(2025, 6, 2)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let entries = vec![
            entry("monday", 18, "RECORDING"),
            entry("monday", 9, "RECORDING"),
            entry("monday", 12, "UPLOAD"),
            entry("tuesday", 11, "RECORDING"),
            entry("monday", 14, "STREAM"),
            entry("monday", 16, "FREE2UP"),
        ];

        let summary = AgendaSummary::build(&entries, now);
        assert_eq!(summary.total, 6);
        let hours: Vec<u32> = summary.upcoming_today.iter().map(|e| e.start_hour).collect();
        assert_eq!(hours, vec![12, 14, 16]);

        let recordings = &summary.by_type[0];
        assert_eq!(recordings.0, TaskType::Recording);
        assert_eq!(recordings.1.len(), 3);
    }
}
