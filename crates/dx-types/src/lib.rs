//! Shared domain types for the deal extractor.
//!
//! - `status`: the task lifecycle enum and its transition table.
//! - `task`: ingestion tasks (operator-defined date/time windows).
//! - `deal`: the persisted copy of a vendor trade-execution record.
//! - `error`: typed error taxonomy shared across crates.
//! - `retry`: reusable bounded retry with jittered backoff.
//! - `outcome`: per-id success/failure partitions returned by bulk ops.

pub mod deal;
pub mod error;
pub mod outcome;
pub mod retry;
pub mod status;
pub mod task;

pub use deal::DealRecord;
pub use error::{ManagerError, TaskError};
pub use outcome::Outcome;
pub use retry::RetryPolicy;
pub use status::TaskStatus;
pub use task::{NewTask, Task};
