//! Main loop: refresh, detect due tasks, dispatch, forget old slots

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::job_executor::Dispatcher;
use super::job_queue::TaskQueue;
use super::job_scheduler::JobScheduler;
use super::types::TaskOutcome;
use crate::config::SchedulerConfig;
use crate::ingestor::{AgendaSummary, RefreshKind, RefreshOutcome, ScheduleCache};
use crate::models::ScheduleEntry;

/// What one iteration did
#[derive(Debug, Default)]
pub struct TickReport {
    pub refreshed: Vec<(RefreshKind, RefreshOutcome)>,
    pub enqueued: usize,
    pub dispatched: Option<TaskOutcome>,
    pub evicted: usize,
}

/// Owns the schedule cache and task queue; the composition root of the scheduler
pub struct AgendaRunner {
    cache: ScheduleCache,
    queue: TaskQueue,
    scheduler: JobScheduler,
    dispatcher: Dispatcher,
    tick_interval: Duration,
    slot_retention: Duration,
}

impl AgendaRunner {
    pub fn new(cache: ScheduleCache, dispatcher: Dispatcher, config: &SchedulerConfig) -> Self {
        Self {
            cache,
            queue: TaskQueue::new(),
            scheduler: JobScheduler::new(config.due_tolerance),
            dispatcher,
            tick_interval: config.tick_interval,
            slot_retention: config.slot_retention,
        }
    }

    pub fn cache(&self) -> &ScheduleCache {
        &self.cache
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Run until cancelled. Cancellation is observed between iterations; a worker
    /// that is already running is left to finish.
    pub async fn run(mut self, cancellation_token: CancellationToken) -> Result<()> {
        info!(
            "Starting agenda runner for {} (tick every {})",
            self.cache.node_id(),
            humantime::format_duration(self.tick_interval)
        );
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = cancellation_token.cancelled() => {
                    info!("Agenda runner received cancellation signal");
                    break;
                }
            }
        }

        info!(
            "Agenda runner stopped with {} tasks still queued",
            self.queue.len()
        );
        Ok(())
    }

    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Local::now().naive_local(), Instant::now()).await
    }

    /// One iteration at the given local wall-clock time and monotonic instant
    pub async fn tick_at(&mut self, wall: NaiveDateTime, mono: Instant) -> TickReport {
        let mut report = TickReport {
            refreshed: self.cache.refresh_if_due(mono).await,
            ..TickReport::default()
        };
        let entries = self.cache.entries();
        if !report.refreshed.is_empty() {
            self.log_agenda(&report.refreshed, &entries, wall);
        }

        report.enqueued = self.scheduler.schedule_due(&entries, wall, &mut self.queue);

        if let Some(task) = self.queue.dequeue() {
            report.dispatched = Some(self.dispatcher.dispatch(task).await);
        }

        report.evicted = self.queue.evict_older_than(wall, self.slot_retention);
        if report.evicted > 0 {
            debug!(
                "Forgot {} fired slots, {} still remembered",
                report.evicted,
                self.queue.remembered_slots()
            );
        }
        report
    }

    fn log_agenda(
        &self,
        refreshed: &[(RefreshKind, RefreshOutcome)],
        entries: &[ScheduleEntry],
        wall: NaiveDateTime,
    ) {
        let changed = refreshed.iter().any(|(kind, outcome)| {
            *kind == RefreshKind::Forced || matches!(outcome, RefreshOutcome::Updated(_))
        });
        if changed {
            info!("Checkpoint {}: agenda refreshed", wall.format("%H:%M:%S"));
            AgendaSummary::build(entries, wall).log(self.cache.node_id());
        } else {
            debug!(
                "Checkpoint {}: agenda unchanged ({} entries)",
                wall.format("%H:%M:%S"),
                entries.len()
            );
        }
    }
}
