use async_trait::async_trait;
use chrono::NaiveDateTime;

use dx_types::{DealRecord, ManagerError};

/// One authenticated session against the trading-platform manager API.
///
/// Lifecycle (`connect`/`disconnect`) belongs to a single orchestration run;
/// the fetch operations take `&self` and may be called concurrently from
/// that run's task passes. A disconnected session is not reusable — a new
/// run connects a fresh client.
#[async_trait]
pub trait ManagerClient: Send + Sync {
    /// Establish the session. `ManagerError::Auth` (bad credentials) and
    /// `ManagerError::Connect` (unreachable endpoint) are distinct, and
    /// both are fatal for the whole run.
    async fn connect(&self) -> Result<(), ManagerError>;

    /// Release the session. Best effort and idempotent; called exactly once
    /// per successful `connect`, on every exit path.
    async fn disconnect(&self);

    /// Resolve the login ids of all accounts matching a group pattern.
    /// Called once per run; the result is shared across that run's passes.
    async fn resolve_group_logins(&self, pattern: &str) -> Result<Vec<i64>, ManagerError>;

    /// Fetch deal records for the given logins inside [start, end].
    ///
    /// An empty `Ok` vec means the window genuinely had no trades: the
    /// bridge reports vendor-side failures through its error descriptor,
    /// which arrives here as `ManagerError::Fetch`, never as an empty list.
    async fn fetch_deals(
        &self,
        logins: &[i64],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<DealRecord>, ManagerError>;
}
