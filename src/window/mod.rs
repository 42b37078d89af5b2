//! Time-window predicates
//!
//! Pure functions over schedule entries and a local wall-clock instant. The due
//! check drives the scheduler; the FREE2UP window and grace checks gate the upload
//! and broadcast workers.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDateTime, Timelike};
use std::time::Duration;

use crate::models::{ScheduleEntry, TaskType};

/// Whether `entry` starts within `tolerance` of `now`, on `now`'s weekday.
///
/// Compares seconds since local midnight, so windows never wrap across days and
/// the everyday wildcard does not match.
pub fn is_due_now(entry: &ScheduleEntry, now: NaiveDateTime, tolerance: Duration) -> bool {
    if !entry.day.covers(now.weekday(), false) {
        return false;
    }
    let now_secs = i64::from(now.time().num_seconds_from_midnight());
    let start_secs = i64::from(entry.start_seconds());
    let tolerance = i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX);
    (now_secs - start_secs).abs() <= tolerance
}

/// A FREE2UP window placed on today's date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub entry: ScheduleEntry,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        self.start <= now && now <= self.end
    }
}

/// Today's FREE2UP windows (weekday match or everyday)
pub fn todays_windows(entries: &[ScheduleEntry], now: NaiveDateTime) -> Vec<Window> {
    let today = now.date();
    entries
        .iter()
        .filter(|e| e.task_type() == TaskType::Free2Up && e.day.covers(now.weekday(), true))
        .filter_map(|e| {
            let start = today.and_hms_opt(e.start_hour, e.start_minute, 0)?;
            let end = start + ChronoDuration::minutes(i64::from(e.effective_duration_minutes()));
            Some(Window {
                entry: e.clone(),
                start,
                end,
            })
        })
        .collect()
}

/// The FREE2UP window containing `now`; the earliest start wins when several do
pub fn resolve_window(entries: &[ScheduleEntry], now: NaiveDateTime) -> Option<Window> {
    todays_windows(entries, now)
        .into_iter()
        .filter(|w| w.contains(now))
        .min_by_key(|w| w.start)
}

/// Outcome of the upload/broadcast gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraceDecision {
    /// Inside a window
    Active { end: NaiveDateTime },
    /// A window opens soon enough; the caller waits `opens_in` then proceeds
    Pending { opens_in: Duration },
    /// A window closed recently enough to still proceed
    RecentlyEnded { ended_ago: Duration },
    NotPermitted,
}

impl GraceDecision {
    pub fn is_permitted(&self) -> bool {
        !matches!(self, GraceDecision::NotPermitted)
    }
}

/// Gate check with tolerance on both sides of today's FREE2UP windows
pub fn is_within_grace(
    entries: &[ScheduleEntry],
    now: NaiveDateTime,
    grace_before: Duration,
    grace_after: Duration,
) -> GraceDecision {
    let windows = todays_windows(entries, now);

    if let Some(active) = windows
        .iter()
        .filter(|w| w.contains(now))
        .min_by_key(|w| w.start)
    {
        return GraceDecision::Active { end: active.end };
    }

    if let Some(next) = windows
        .iter()
        .filter(|w| w.start > now)
        .min_by_key(|w| w.start)
    {
        let opens_in = to_std(next.start - now);
        if opens_in <= grace_before {
            return GraceDecision::Pending { opens_in };
        }
    }

    if let Some(last) = windows
        .iter()
        .filter(|w| w.end < now)
        .max_by_key(|w| w.end)
    {
        let ended_ago = to_std(now - last.end);
        if ended_ago <= grace_after {
            return GraceDecision::RecentlyEnded { ended_ago };
        }
    }

    GraceDecision::NotPermitted
}

fn to_std(delta: ChronoDuration) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}
