//! Error type definitions for slotkeeper
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that keeps the recoverable cases
//! (stale schedule, malformed row, stale process) distinguishable from
//! configuration mistakes.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Role;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Schedule fetching or caching errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Process supervision errors
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Errors raised while fetching, decoding or persisting the schedule
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Transport-level failures talking to the remote schedule
    #[error("Fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// Remote schedule answered with a non-success status
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// The remote or local table could not be decoded
    #[error("Table decode error: {source_name} - {message}")]
    Decode { source_name: String, message: String },

    /// Reading or writing the durable snapshot failed
    #[error("Snapshot error at {path:?}: {message}")]
    Snapshot { path: PathBuf, message: String },

    /// Credentials for the remote schedule could not be read
    #[error("Credentials error: {message}")]
    Credentials { message: String },
}

/// Reasons a schedule row is not a usable entry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    /// Required column is absent or blank
    #[error("missing field '{field}'")]
    MissingField { field: &'static str },

    /// Column holds something that is not a non-negative integer
    #[error("field '{field}' is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    /// Numeric column outside its permitted range
    #[error("field '{field}' out of range: {value}")]
    OutOfRange { field: &'static str, value: u32 },

    /// Day column is neither a weekday name nor the everyday wildcard
    #[error("unknown day '{value}'")]
    UnknownDay { value: String },

    /// Task type outside the allow-list
    #[error("unknown task type '{value}'")]
    UnknownTaskType { value: String },
}

/// Process supervision errors
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The worker program could not be started
    #[error("Failed to spawn {role} worker '{program}': {source}")]
    Spawn {
        role: Role,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on a started worker failed
    #[error("Failed to wait for {role} worker: {source}")]
    Wait {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    /// The liveness record could not be read or written
    #[error("Liveness record for {role} unavailable: {message}")]
    Liveness { role: Role, message: String },

    /// Another scheduler instance holds the instance lock
    #[error("Another instance is running (pid {pid}, lock {path:?})")]
    InstanceLocked { pid: u32, path: PathBuf },

    /// Lock file could not be created or inspected
    #[error("Instance lock error at {path:?}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl ScheduleError {
    /// Create a decode error for the named source
    pub fn decode<S: Into<String>, M: Into<String>>(source_name: S, message: M) -> Self {
        Self::Decode {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a snapshot error for the given path
    pub fn snapshot<M: Into<String>>(path: impl Into<PathBuf>, message: M) -> Self {
        Self::Snapshot {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl SupervisorError {
    /// Create a liveness error for the given role
    pub fn liveness<M: Into<String>>(role: Role, message: M) -> Self {
        Self::Liveness {
            role,
            message: message.into(),
        }
    }
}
