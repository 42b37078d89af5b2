//! Centralized error handling for slotkeeper
//!
//! Errors are grouped by the layer that raises them so callers can decide how far a
//! failure is allowed to travel. The main loop never propagates any of them past a
//! single iteration; they are logged where they are caught.
//!
//! # Error Categories
//!
//! - **Schedule Errors**: remote fetch, table decoding, local snapshot I/O
//! - **Entry Errors**: malformed schedule rows (skipped, never fatal)
//! - **Supervisor Errors**: worker spawn, liveness records, process signalling
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! # Usage
//!
//! ```rust
//! use slotkeeper::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for schedule source and cache results
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Convenience type alias for supervisor results
pub type SupervisorResult<T> = Result<T, SupervisorError>;
