//! Node-filtered schedule cache backed by a durable local snapshot

use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{ScheduleError, ScheduleResult};
use crate::models::{ScheduleEntry, ScheduleRow};
use crate::sources::{table::cell_text, ScheduleSource};

/// Result of a successful refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Row set changed; cache and snapshot replaced
    Updated(usize),
    /// Row set identical to the cached one
    Unchanged(usize),
}

impl RefreshOutcome {
    pub fn row_count(&self) -> usize {
        match self {
            RefreshOutcome::Updated(n) | RefreshOutcome::Unchanged(n) => *n,
        }
    }
}

/// Which refresh timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    Opportunistic,
    Forced,
}

/// In-memory schedule rows for this node plus the refresh timers.
///
/// Owned by the main loop. Rows are kept raw; [`ScheduleCache::entries`] validates
/// them on every scan so one malformed row never hides the rest.
pub struct ScheduleCache {
    source: Arc<dyn ScheduleSource>,
    node_id: String,
    snapshot_path: PathBuf,
    refresh_interval: Duration,
    force_interval: Duration,
    rows: Vec<ScheduleRow>,
    created_at: Instant,
    last_attempt: Option<Instant>,
    last_forced: Option<Instant>,
}

impl ScheduleCache {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        node_id: impl Into<String>,
        snapshot_path: impl Into<PathBuf>,
        refresh_interval: Duration,
        force_interval: Duration,
    ) -> Self {
        Self {
            source,
            node_id: node_id.into(),
            snapshot_path: snapshot_path.into(),
            refresh_interval,
            force_interval,
            rows: Vec::new(),
            created_at: Instant::now(),
            last_attempt: None,
            last_forced: None,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn rows(&self) -> &[ScheduleRow] {
        &self.rows
    }

    /// Valid entries for this node; malformed rows are skipped
    pub fn entries(&self) -> Vec<ScheduleEntry> {
        parse_entries(&self.rows)
    }

    /// Replace the in-memory rows with the snapshot's. Never fails.
    pub fn load_local(&mut self) -> usize {
        self.rows = load_snapshot(&self.snapshot_path, &self.node_id);
        info!(
            "Loaded {} schedule rows for {} from snapshot {}",
            self.rows.len(),
            self.node_id,
            self.snapshot_path.display()
        );
        self.rows.len()
    }

    /// Fetch the remote table and replace the cached rows.
    ///
    /// The snapshot is rewritten when the rows changed or when `force` is set. On
    /// error the previous rows stay authoritative.
    pub async fn refresh(&mut self, force: bool) -> ScheduleResult<RefreshOutcome> {
        let fetched = self.source.fetch_rows().await?;
        let rows = filter_rows(fetched, &self.node_id);

        let malformed = rows
            .iter()
            .filter(|row| ScheduleEntry::from_row(row).is_err())
            .count();
        if malformed > 0 {
            warn!(
                "{} of {} schedule rows for {} are malformed and will be skipped",
                malformed,
                rows.len(),
                self.node_id
            );
        }

        let changed = rows != self.rows;
        if changed || force {
            write_snapshot(&self.snapshot_path, &rows)?;
        }

        let count = rows.len();
        self.rows = rows;
        Ok(if changed {
            RefreshOutcome::Updated(count)
        } else {
            RefreshOutcome::Unchanged(count)
        })
    }

    pub fn opportunistic_due(&self, now: Instant) -> bool {
        self.last_attempt
            .is_none_or(|last| now.saturating_duration_since(last) >= self.refresh_interval)
    }

    pub fn forced_due(&self, now: Instant) -> bool {
        let since = self.last_forced.unwrap_or(self.created_at);
        now.saturating_duration_since(since) >= self.force_interval
    }

    /// Run whichever refresh timers have elapsed. Both may fire in the same call.
    ///
    /// Attempt times advance even on failure so a dead source is retried on the
    /// normal cadence. Returns the outcome of each successful refresh.
    pub async fn refresh_if_due(&mut self, now: Instant) -> Vec<(RefreshKind, RefreshOutcome)> {
        let mut outcomes = Vec::new();

        if self.opportunistic_due(now) {
            self.last_attempt = Some(now);
            match self.refresh(false).await {
                Ok(outcome) => {
                    debug!("Schedule refresh: {:?}", outcome);
                    outcomes.push((RefreshKind::Opportunistic, outcome));
                }
                Err(e) => warn!(
                    "Schedule refresh from {} failed, keeping {} cached rows: {}",
                    self.source.name(),
                    self.rows.len(),
                    e
                ),
            }
        }

        if self.forced_due(now) {
            self.last_forced = Some(now);
            self.last_attempt = Some(now);
            match self.refresh(true).await {
                Ok(outcome) => {
                    info!(
                        "Forced schedule refresh stored {} rows",
                        outcome.row_count()
                    );
                    outcomes.push((RefreshKind::Forced, outcome));
                }
                Err(e) => warn!(
                    "Forced schedule refresh from {} failed, keeping {} cached rows: {}",
                    self.source.name(),
                    self.rows.len(),
                    e
                ),
            }
        }

        outcomes
    }
}

/// Validate rows, logging and skipping those that do not parse
pub fn parse_entries(rows: &[ScheduleRow]) -> Vec<ScheduleEntry> {
    rows.iter()
        .filter_map(|row| match ScheduleEntry::from_row(row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping malformed schedule row {:?}: {}", row, e);
                None
            }
        })
        .collect()
}

fn filter_rows(rows: Vec<ScheduleRow>, node_id: &str) -> Vec<ScheduleRow> {
    rows.into_iter()
        .filter(|row| !row.is_blank() && row.belongs_to(node_id))
        .collect()
}

/// Read the snapshot and keep this node's rows. Empty on absence or parse failure.
///
/// Accepts a bare array of row objects or an object with a `rows` array. Non-string
/// cell values are coerced to text.
pub fn load_snapshot(path: &Path, node_id: &str) -> Vec<ScheduleRow> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("No schedule snapshot at {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let document: Value = match serde_json::from_str(&contents) {
        Ok(document) => document,
        Err(e) => {
            warn!("Ignoring unreadable schedule snapshot {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("rows") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("Schedule snapshot {} has no rows array", path.display());
                return Vec::new();
            }
        },
        _ => {
            warn!("Schedule snapshot {} is not a row list", path.display());
            return Vec::new();
        }
    };

    let rows = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(
                map.iter()
                    .map(|(column, value)| (column.clone(), cell_text(value)))
                    .collect::<ScheduleRow>(),
            ),
            _ => None,
        })
        .collect();

    filter_rows(rows, node_id)
}

/// Write the snapshot through a temporary file in the same directory, then rename
pub fn write_snapshot(path: &Path, rows: &[ScheduleRow]) -> ScheduleResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let snapshot_err = |e: &dyn std::fmt::Display| ScheduleError::snapshot(path, e.to_string());

    std::fs::create_dir_all(&dir).map_err(|e| snapshot_err(&e))?;
    let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(|e| snapshot_err(&e))?;
    serde_json::to_writer_pretty(&mut file, rows).map_err(|e| snapshot_err(&e))?;
    file.flush().map_err(|e| snapshot_err(&e))?;
    file.persist(path).map_err(|e| snapshot_err(&e.error))?;
    debug!("Wrote {} rows to schedule snapshot {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tracing_test::traced_test;

    struct StaticSource {
        rows: Mutex<ScheduleResult<Vec<ScheduleRow>>>,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn ok(rows: Vec<ScheduleRow>) -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(Ok(rows)),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, result: ScheduleResult<Vec<ScheduleRow>>) {
            *self.rows.lock().unwrap() = result;
        }
    }

    #[async_trait]
    impl ScheduleSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_rows(&self) -> ScheduleResult<Vec<ScheduleRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.rows.lock().unwrap() {
                Ok(rows) => Ok(rows.clone()),
                Err(_) => Err(ScheduleError::Http {
                    status: 503,
                    message: "unavailable".into(),
                }),
            }
        }
    }

    fn row(equipment: &str, hour: &str) -> ScheduleRow {
        [
            ("equipment", equipment),
            ("day", "monday"),
            ("hour", hour),
            ("minute", "0"),
        ]
        .into_iter()
        .collect()
    }

    fn cache(source: Arc<StaticSource>, snapshot: &Path) -> ScheduleCache {
        ScheduleCache::new(
            source,
            "cam-01",
            snapshot,
            Duration::from_secs(30),
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn test_refresh_filters_node_and_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("agenda.json");
        let source = StaticSource::ok(vec![row("CAM-01 ", "9"), row("cam-02", "10")]);
        let mut cache = cache(source, &snapshot);

        assert_eq!(cache.refresh(false).await.unwrap(), RefreshOutcome::Updated(1));
        assert_eq!(cache.entries().len(), 1);
        assert_eq!(load_snapshot(&snapshot, "cam-01").len(), 1);

        assert_eq!(cache.refresh(false).await.unwrap(), RefreshOutcome::Unchanged(1));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::ok(vec![row("cam-01", "9")]);
        let mut cache = cache(source.clone(), &dir.path().join("agenda.json"));
        cache.refresh(false).await.unwrap();

        source.set(Err(ScheduleError::decode("static", "boom")));
        assert!(cache.refresh(false).await.is_err());
        assert_eq!(cache.rows().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_refresh_fires_alongside_unchanged_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("agenda.json");
        let source = StaticSource::ok(vec![row("cam-01", "9")]);
        let mut cache = cache(source.clone(), &snapshot);

        let first = cache.refresh_if_due(Instant::now()).await;
        assert_eq!(first, vec![(RefreshKind::Opportunistic, RefreshOutcome::Updated(1))]);

        std::fs::remove_file(&snapshot).unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;

        let outcomes = cache.refresh_if_due(Instant::now()).await;
        assert_eq!(
            outcomes,
            vec![
                (RefreshKind::Opportunistic, RefreshOutcome::Unchanged(1)),
                (RefreshKind::Forced, RefreshOutcome::Unchanged(1)),
            ]
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(snapshot.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_waits_for_interval_even_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::ok(Vec::new());
        source.set(Err(ScheduleError::decode("static", "down")));
        let mut cache = cache(source.clone(), &dir.path().join("agenda.json"));

        assert!(cache.refresh_if_due(Instant::now()).await.is_empty());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.refresh_if_due(Instant::now()).await.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_snapshot_accepts_envelope_and_coerces_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agenda.json");
        std::fs::write(
            &path,
            r#"{"rows": [
                {"equipment": "cam-01", "day": "monday", "hour": 9, "minute": 0},
                {"equipment": "cam-09", "day": "monday", "hour": 9, "minute": 0},
                {"equipment": "", "day": ""}
            ], "fetched_at": "2025-01-01T00:00:00"}"#,
        )
        .unwrap();

        let rows = load_snapshot(&path, "cam-01");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("hour"), Some("9"));
    }

    #[test]
    fn test_load_snapshot_tolerates_absence_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(&dir.path().join("missing.json"), "cam-01").is_empty());

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(load_snapshot(&garbage, "cam-01").is_empty());
    }

    #[traced_test]
    #[test]
    fn test_non_numeric_hour_is_skipped_and_logged() {
        let entries = parse_entries(&[row("cam-01", "nine"), row("cam-01", "10")]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_hour, 10);
        assert!(logs_contain("Skipping malformed schedule row"));
    }
}
