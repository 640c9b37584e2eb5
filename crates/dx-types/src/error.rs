//! Typed error taxonomy shared across the extractor crates.
//!
//! Task repository failures and manager-session failures are closed enums
//! so callers can branch on them; orchestration seams still use
//! `anyhow::Result`, which these integrate with via `thiserror`.

use chrono::NaiveTime;
use thiserror::Error;

/// Task repository errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The requested window is inverted or empty. Task not created.
    #[error("invalid time range: start {start} must be before end {end}")]
    InvalidRange { start: NaiveTime, end: NaiveTime },

    /// A task with the identical (date, start, end) triple already exists.
    /// Detected by the storage-layer unique constraint, not check-then-insert.
    #[error("a task for this date and time window already exists")]
    DuplicatePeriod,

    /// Any other storage failure.
    #[error("database error: {0}")]
    Db(#[source] anyhow::Error),
}

/// Manager-session errors (external trading-platform API).
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Could not reach the manager endpoint. Fatal for the whole run.
    #[error("manager connect failed: {0}")]
    Connect(String),

    /// The endpoint rejected the credentials. Fatal for the whole run.
    #[error("manager authentication failed: {0}")]
    Auth(String),

    /// A fetch call failed (the vendor reported an error for a request).
    #[error("manager fetch failed: {0}")]
    Fetch(String),

    /// A fetch or connect call exceeded its deadline. Retryable.
    #[error("manager call timed out after {0} ms")]
    Timeout(u64),

    /// An operation was attempted without an established session.
    #[error("no active manager session")]
    Session,
}

impl ManagerError {
    /// Timeouts are worth another attempt; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ManagerError::Timeout(_))
    }
}
