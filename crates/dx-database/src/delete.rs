//! Batched cascade deletion of tasks and their deal rows.
//!
//! Child rows are removed in bounded batches before the task row itself so
//! a task owning a large deal set never holds one long-running delete. The
//! schema keeps `ON DELETE CASCADE` on `deals.task_id` as a backstop, but
//! the coordinator does not lean on it.

use anyhow::Result;
use tracing::{debug, warn};

use dx_types::Outcome;

use crate::init::Connection;

pub const DEFAULT_DELETE_BATCH: u64 = 5_000;

/// Remove a task's deal rows in batches of at most `batch` rows. Loops
/// until a batch deletes nothing. Returns the total rows removed.
pub async fn delete_task_deals_batched(
    pool: &Connection,
    task_id: i64,
    batch: u64,
) -> Result<u64> {
    let batch = batch.max(1);
    let mut total: u64 = 0;
    loop {
        let res = sqlx::query(
            "DELETE FROM deals WHERE ctid IN \
             (SELECT ctid FROM deals WHERE task_id = $1 LIMIT $2)",
        )
        .bind(task_id)
        .bind(batch as i64)
        .execute(pool)
        .await?;
        if res.rows_affected() == 0 {
            break;
        }
        total += res.rows_affected();
        debug!(task_id, removed = res.rows_affected(), total, "deal delete batch");
    }
    Ok(total)
}

/// Delete each listed task and its deal rows. Tasks are handled
/// independently; one failure never aborts the rest. A missing task id
/// lands in the failed partition.
pub async fn delete_tasks(pool: &Connection, ids: &[i64], batch: u64) -> Outcome {
    let mut outcome = Outcome::default();
    for &id in ids {
        match delete_one(pool, id, batch).await {
            Ok(true) => outcome.record(id, true),
            Ok(false) => {
                warn!(task_id = id, "delete requested for unknown task");
                outcome.record(id, false);
            }
            Err(e) => {
                warn!(task_id = id, error = %e, "task delete failed");
                outcome.record(id, false);
            }
        }
    }
    outcome
}

async fn delete_one(pool: &Connection, task_id: i64, batch: u64) -> Result<bool> {
    delete_task_deals_batched(pool, task_id, batch).await?;
    let res = sqlx::query("DELETE FROM deal_tasks WHERE id = $1")
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}
