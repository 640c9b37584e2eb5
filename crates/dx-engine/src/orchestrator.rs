//! Processing runs over selected tasks.
//!
//! A run opens one manager session, resolves the account group once, then
//! drives one ingestion pass per task with bounded concurrency. Passes are
//! isolated: a task that fails is marked `FAILED` without touching its
//! siblings. The session is torn down exactly once after the passes, no
//! matter how they ended. Connect failure is the exception: nothing was
//! opened, so every selected task is failed without a disconnect.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use dx_database::deals::{WriterConfig, discard_task_deals, write_deals};
use dx_database::init::Connection;
use dx_database::tasks::{set_status, tasks_by_ids};
use dx_manager::ManagerClient;
use dx_types::{ManagerError, Outcome, RetryPolicy, Task, TaskStatus};

use crate::config::ProcessConfig;

/// Process the listed tasks and partition their ids by result. Unknown ids
/// land in the failed partition without affecting the rest of the run.
pub async fn process_tasks(
    pool: &Connection,
    manager: Arc<dyn ManagerClient>,
    ids: &[i64],
    cfg: &ProcessConfig,
) -> Result<Outcome> {
    let mut outcome = Outcome::default();
    if ids.is_empty() {
        return Ok(outcome);
    }

    let tasks = tasks_by_ids(pool, ids).await?;
    let found: Vec<i64> = tasks.iter().map(|t| t.id).collect();
    for &id in ids {
        if !found.contains(&id) {
            warn!(task_id = id, "unknown task id");
            outcome.record(id, false);
        }
    }
    if tasks.is_empty() {
        return Ok(outcome);
    }

    set_status(pool, &found, TaskStatus::Processing).await?;
    info!(tasks = found.len(), "processing run started");

    if let Err(e) = manager.connect().await {
        error!(error = %e, "manager connect failed");
        set_status(pool, &found, TaskStatus::Failed).await?;
        for id in found {
            outcome.record(id, false);
        }
        return Ok(outcome);
    }

    let passes = run_passes(pool, Arc::clone(&manager), tasks, cfg).await;
    // Exactly one teardown per opened session, whatever the passes did.
    manager.disconnect().await;

    match passes {
        Ok(results) => {
            let succeeded: Vec<i64> =
                results.iter().filter(|(_, ok)| *ok).map(|(id, _)| *id).collect();
            let failed: Vec<i64> =
                results.iter().filter(|(_, ok)| !*ok).map(|(id, _)| *id).collect();
            if !succeeded.is_empty() {
                set_status(pool, &succeeded, TaskStatus::Success).await?;
            }
            if !failed.is_empty() {
                set_status(pool, &failed, TaskStatus::Failed).await?;
            }
            info!(succeeded = succeeded.len(), failed = failed.len(), "processing run finished");
            for id in succeeded {
                outcome.record(id, true);
            }
            for id in failed {
                outcome.record(id, false);
            }
        }
        Err(e) => {
            error!(error = %e, "processing run failed before the passes started");
            set_status(pool, &found, TaskStatus::Failed).await?;
            for id in found {
                outcome.record(id, false);
            }
        }
    }
    Ok(outcome)
}

/// Resolve the account group once, then fan passes out under the worker
/// limit. Returns one `(task_id, succeeded)` pair per task.
async fn run_passes(
    pool: &Connection,
    manager: Arc<dyn ManagerClient>,
    tasks: Vec<Task>,
    cfg: &ProcessConfig,
) -> Result<Vec<(i64, bool)>> {
    let logins = Arc::new(manager.resolve_group_logins(&cfg.group_pattern).await?);
    info!(logins = logins.len(), pattern = %cfg.group_pattern, "group logins resolved");

    let sem = Arc::new(Semaphore::new(cfg.worker_limit));
    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        let permit = Arc::clone(&sem).acquire_owned().await?;
        let pool = pool.clone();
        let manager = Arc::clone(&manager);
        let logins = Arc::clone(&logins);
        let retry = cfg.fetch_retry();
        let writer = cfg.writer();
        let id = task.id;
        let handle = tokio::spawn(async move {
            let _permit = permit;
            run_pass(&pool, manager.as_ref(), &logins, &task, &retry, &writer).await
        });
        handles.push((id, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (id, handle) in handles {
        let ok = match handle.await {
            Ok(Ok(rows)) => {
                info!(task_id = id, rows, "task pass complete");
                true
            }
            Ok(Err(e)) => {
                error!(task_id = id, error = %e, "task pass failed");
                false
            }
            Err(e) => {
                error!(task_id = id, error = %e, "task pass aborted");
                false
            }
        };
        results.push((id, ok));
    }
    Ok(results)
}

/// One pass over one task: discard prior rows, fetch the window, write.
/// A window with no deals and no reported error is a legitimate empty
/// result and the pass succeeds with zero rows.
async fn run_pass(
    pool: &Connection,
    manager: &dyn ManagerClient,
    logins: &[i64],
    task: &Task,
    retry: &RetryPolicy,
    writer: &WriterConfig,
) -> Result<u64> {
    discard_task_deals(pool, task.id).await?;

    if logins.is_empty() {
        debug!(task_id = task.id, "no logins matched the group pattern");
        return Ok(0);
    }

    let (start, end) = (task.window_start(), task.window_end());
    // Only timeouts earn another fetch attempt; auth and vendor errors
    // surface immediately.
    let deals = retry
        .run_where(
            |attempt| async move {
                if attempt > 0 {
                    debug!(task_id = task.id, attempt, "retrying deal fetch");
                }
                manager.fetch_deals(logins, start, end).await
            },
            ManagerError::is_retryable,
        )
        .await?;

    if deals.is_empty() {
        debug!(task_id = task.id, "window returned no deals");
        return Ok(0);
    }
    write_deals(pool, task.id, &deals, writer).await
}
