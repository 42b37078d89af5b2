//! Agenda-driven job scheduling
//!
//! The [`AgendaRunner`] owns the schedule cache and the task queue and ticks once a
//! second: refresh the schedule when a timer elapsed, enqueue entries that are due,
//! dispatch the oldest queued task and forget slots past their retention.

pub mod job_executor;
pub mod job_queue;
pub mod job_queue_runner;
pub mod job_scheduler;
pub mod types;

pub use job_executor::Dispatcher;
pub use job_queue::TaskQueue;
pub use job_queue_runner::{AgendaRunner, TickReport};
pub use job_scheduler::JobScheduler;
pub use types::*;
