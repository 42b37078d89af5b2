pub mod agenda_summary;
pub mod schedule_cache;

pub use agenda_summary::AgendaSummary;
pub use schedule_cache::{
    load_snapshot, parse_entries, write_snapshot, RefreshKind, RefreshOutcome, ScheduleCache,
};
