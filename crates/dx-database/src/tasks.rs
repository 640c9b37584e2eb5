//! Task repository: creation, listing and bulk status updates.

use anyhow::{Result, anyhow};
use sqlx::Row;
use sqlx::postgres::PgRow;

use dx_types::{NewTask, Task, TaskError, TaskStatus};

use crate::init::Connection;

pub(crate) fn row_to_task(row: &PgRow) -> Result<Task> {
    let status: String = row.get("status");
    let status = status
        .parse::<TaskStatus>()
        .map_err(|e| anyhow!("corrupt status column: {e}"))?;
    Ok(Task {
        id: row.get("id"),
        date: row.get("date"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        status,
        created_at: row.get("created_at"),
    })
}

/// Insert a new PENDING task.
///
/// `InvalidRange` is rejected before touching the database; a duplicate
/// (date, start, end) triple surfaces as `DuplicatePeriod` via the
/// `uq_task_period` unique constraint.
pub async fn create_task(pool: &Connection, new: NewTask) -> Result<Task, TaskError> {
    new.validate()?;

    let row = sqlx::query(
        r#"INSERT INTO deal_tasks (date, start_time, end_time, status)
           VALUES ($1, $2, $3, $4)
           RETURNING id, date, start_time, end_time, status, created_at"#,
    )
    .bind(new.date)
    .bind(new.start_time)
    .bind(new.end_time)
    .bind(TaskStatus::Pending.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => TaskError::DuplicatePeriod,
        _ => TaskError::Db(e.into()),
    })?;

    row_to_task(&row).map_err(TaskError::Db)
}

/// All tasks, most recent window first.
pub async fn list_tasks(pool: &Connection) -> Result<Vec<Task>> {
    let rows = sqlx::query(
        r#"SELECT id, date, start_time, end_time, status, created_at
           FROM deal_tasks
           ORDER BY date DESC, start_time DESC"#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_task).collect()
}

/// Load the selected tasks. Ids with no row are simply absent from the
/// result; callers compare against their input when that matters.
pub async fn tasks_by_ids(pool: &Connection, ids: &[i64]) -> Result<Vec<Task>> {
    let rows = sqlx::query(
        r#"SELECT id, date, start_time, end_time, status, created_at
           FROM deal_tasks
           WHERE id = ANY($1)
           ORDER BY id"#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_task).collect()
}

/// Set every listed task to `status` in one statement, so readers never
/// observe a partially updated batch. Returns the number of rows updated.
pub async fn set_status(pool: &Connection, ids: &[i64], status: TaskStatus) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let res = sqlx::query("UPDATE deal_tasks SET status = $1 WHERE id = ANY($2)")
        .bind(status.as_str())
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn count_tasks(pool: &Connection) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM deal_tasks")
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("n"))
}

/// Number of deal rows currently owned by a task.
pub async fn count_deals_for_task(pool: &Connection, task_id: i64) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM deals WHERE task_id = $1")
        .bind(task_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("n"))
}
