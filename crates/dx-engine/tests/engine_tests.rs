use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use dx_database::init::{Connection, pool_from_env};
use dx_database::delete::delete_tasks;
use dx_database::schema::ensure_schema;
use dx_database::tasks::{count_deals_for_task, create_task, list_tasks, tasks_by_ids};
use dx_engine::{ProcessConfig, process_tasks};
use dx_manager::ManagerClient;
use dx_types::{DealRecord, ManagerError, NewTask, Task, TaskStatus};

// Helper: return early if DATABASE_URL is not set, to avoid hard dependency in CI without DB.
fn require_db() -> Option<()> {
    std::env::var("DATABASE_URL").ok()?;
    Some(())
}

async fn setup() -> Result<Connection> {
    let pool = pool_from_env()?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Scripted manager: synthesizes a fixed number of deals per fetched
/// window and counts session calls so tests can assert on teardown.
struct MockManager {
    logins: Vec<i64>,
    deals_per_window: usize,
    fail_connect: bool,
    /// Window starts whose fetch reports a vendor error.
    fail_windows: Vec<NaiveDateTime>,
    /// Window starts whose first fetch times out; later fetches succeed.
    timeout_once: Mutex<Vec<NaiveDateTime>>,
    /// Every fetched window start, in call order.
    fetch_log: Mutex<Vec<NaiveDateTime>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    next_deal_id: AtomicI64,
}

impl MockManager {
    /// `base_deal_id` must be distinct per test: deal ids are a primary
    /// key and the tests run concurrently against one database.
    fn new(deals_per_window: usize, base_deal_id: i64) -> Self {
        Self {
            logins: vec![50_001, 50_002],
            deals_per_window,
            fail_connect: false,
            fail_windows: Vec::new(),
            timeout_once: Mutex::new(Vec::new()),
            fetch_log: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            next_deal_id: AtomicI64::new(base_deal_id),
        }
    }

    fn fetches_of(&self, start: NaiveDateTime) -> usize {
        self.fetch_log.lock().unwrap().iter().filter(|w| **w == start).count()
    }

    fn synth_deal(&self, login: i64, time: NaiveDateTime) -> DealRecord {
        let deal_id = self.next_deal_id.fetch_add(1, Ordering::Relaxed);
        DealRecord {
            deal_id,
            action: 0,
            comment: String::new(),
            commission: 0.0,
            contract_size: 100_000.0,
            dealer: 1,
            digits: 5,
            digits_currency: 2,
            entry: 0,
            expert_id: 0,
            external_id: String::new(),
            fee: 0.0,
            flags: 0,
            gateway: "GW1".to_string(),
            login,
            market_ask: 1.1001,
            market_bid: 1.1000,
            market_last: 1.1000,
            modification_flags: 0,
            obsolete_value: 0.0,
            order_id: Some(deal_id + 1),
            position_id: deal_id,
            price: 1.1000,
            price_gateway: 1.1000,
            price_position: 1.1000,
            price_sl: 0.0,
            price_tp: 0.0,
            profit: 1.0,
            profit_raw: 1.0,
            rate_margin: 1.0,
            rate_profit: 1.0,
            reason: 0,
            storage: 0.0,
            symbol: "EURUSD".to_string(),
            tick_size: 0.00001,
            tick_value: 1.0,
            time,
            time_msc: time.and_utc().timestamp_millis(),
            value: 0.0,
            volume: 100,
            volume_closed: 0,
            volume_closed_ext: 0,
            volume_ext: 100_000_000,
        }
    }
}

#[async_trait]
impl ManagerClient for MockManager {
    async fn connect(&self) -> Result<(), ManagerError> {
        if self.fail_connect {
            return Err(ManagerError::Connect("endpoint unreachable".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn resolve_group_logins(&self, _pattern: &str) -> Result<Vec<i64>, ManagerError> {
        Ok(self.logins.clone())
    }

    async fn fetch_deals(
        &self,
        logins: &[i64],
        start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> Result<Vec<DealRecord>, ManagerError> {
        self.fetch_log.lock().unwrap().push(start);
        if self.fail_windows.contains(&start) {
            return Err(ManagerError::Fetch("history request rejected".to_string()));
        }
        {
            let mut flaky = self.timeout_once.lock().unwrap();
            if let Some(pos) = flaky.iter().position(|w| *w == start) {
                flaky.remove(pos);
                return Err(ManagerError::Timeout(60_000));
            }
        }
        let mut out = Vec::with_capacity(self.deals_per_window);
        for i in 0..self.deals_per_window {
            out.push(self.synth_deal(logins[i % logins.len()], start));
        }
        Ok(out)
    }
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

async fn reset_date(pool: &Connection, date: NaiveDate) -> Result<()> {
    let ids: Vec<i64> = list_tasks(pool)
        .await?
        .into_iter()
        .filter(|task| task.date == date)
        .map(|task| task.id)
        .collect();
    delete_tasks(pool, &ids, 1_000).await;
    Ok(())
}

async fn make_tasks(pool: &Connection, date: NaiveDate, windows: &[(u32, u32)]) -> Result<Vec<Task>> {
    reset_date(pool, date).await?;
    let mut tasks = Vec::with_capacity(windows.len());
    for &(start_h, end_h) in windows {
        tasks.push(create_task(pool, NewTask::new(date, t(start_h, 0), t(end_h, 0))).await?);
    }
    Ok(tasks)
}

fn test_config() -> ProcessConfig {
    ProcessConfig { worker_limit: 2, ..ProcessConfig::default() }
}

#[tokio::test]
async fn test_run_ingests_all_tasks() -> Result<()> {
    if require_db().is_none() {
        return Ok(());
    }
    let pool = setup().await?;
    let date = NaiveDate::from_ymd_opt(1997, 2, 3).unwrap();
    let tasks = make_tasks(&pool, date, &[(0, 8), (8, 16), (16, 23)]).await?;
    let ids: Vec<i64> = tasks.iter().map(|x| x.id).collect();

    // 450 deals per window spans multiple chunks and sub-chunks.
    let manager = Arc::new(MockManager::new(450, 21_000_000));
    let outcome = process_tasks(&pool, manager.clone(), &ids, &test_config()).await?;

    assert_eq!(outcome.succeeded.len(), 3);
    assert!(outcome.failed.is_empty());
    assert_eq!(manager.connects.load(Ordering::SeqCst), 1);
    assert_eq!(manager.disconnects.load(Ordering::SeqCst), 1);

    for task in tasks_by_ids(&pool, &ids).await? {
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(count_deals_for_task(&pool, task.id).await?, 450);
    }

    reset_date(&pool, date).await?;
    Ok(())
}

#[tokio::test]
async fn test_connect_failure_fails_all_without_disconnect() -> Result<()> {
    if require_db().is_none() {
        return Ok(());
    }
    let pool = setup().await?;
    let date = NaiveDate::from_ymd_opt(1997, 2, 4).unwrap();
    let tasks = make_tasks(&pool, date, &[(0, 8), (8, 16)]).await?;
    let ids: Vec<i64> = tasks.iter().map(|x| x.id).collect();

    let mut mock = MockManager::new(10, 22_000_000);
    mock.fail_connect = true;
    let manager = Arc::new(mock);
    let outcome = process_tasks(&pool, manager.clone(), &ids, &test_config()).await?;

    assert!(outcome.succeeded.is_empty());
    assert_eq!(outcome.failed.len(), 2);
    // No session was opened, so nothing gets torn down.
    assert_eq!(manager.disconnects.load(Ordering::SeqCst), 0);

    for task in tasks_by_ids(&pool, &ids).await? {
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(count_deals_for_task(&pool, task.id).await?, 0);
    }

    reset_date(&pool, date).await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_window_does_not_touch_siblings() -> Result<()> {
    if require_db().is_none() {
        return Ok(());
    }
    let pool = setup().await?;
    let date = NaiveDate::from_ymd_opt(1997, 2, 5).unwrap();
    let tasks = make_tasks(&pool, date, &[(0, 8), (8, 16)]).await?;

    let mut mock = MockManager::new(25, 23_000_000);
    mock.fail_windows = vec![tasks[0].window_start()];
    let manager = Arc::new(mock);
    let ids: Vec<i64> = tasks.iter().map(|x| x.id).collect();
    let outcome = process_tasks(&pool, manager.clone(), &ids, &test_config()).await?;

    assert_eq!(outcome.failed, vec![tasks[0].id]);
    assert_eq!(outcome.succeeded, vec![tasks[1].id]);
    // Teardown still happens once even with a failed pass in the run.
    assert_eq!(manager.disconnects.load(Ordering::SeqCst), 1);
    // A vendor-rejected fetch is not retryable; exactly one attempt.
    assert_eq!(manager.fetches_of(tasks[0].window_start()), 1);

    let rows = tasks_by_ids(&pool, &ids).await?;
    assert_eq!(rows[0].status, TaskStatus::Failed);
    assert_eq!(rows[1].status, TaskStatus::Success);
    assert_eq!(count_deals_for_task(&pool, tasks[0].id).await?, 0);
    assert_eq!(count_deals_for_task(&pool, tasks[1].id).await?, 25);

    reset_date(&pool, date).await?;
    Ok(())
}

#[tokio::test]
async fn test_fetch_timeout_is_retried_and_recovers() -> Result<()> {
    if require_db().is_none() {
        return Ok(());
    }
    let pool = setup().await?;
    let date = NaiveDate::from_ymd_opt(1997, 2, 12).unwrap();
    let tasks = make_tasks(&pool, date, &[(0, 8)]).await?;

    let mock = MockManager::new(15, 29_000_000);
    *mock.timeout_once.lock().unwrap() = vec![tasks[0].window_start()];
    let manager = Arc::new(mock);
    let outcome = process_tasks(&pool, manager.clone(), &[tasks[0].id], &test_config()).await?;

    assert_eq!(outcome.succeeded, vec![tasks[0].id]);
    // One timed-out attempt plus the retry that succeeded.
    assert_eq!(manager.fetches_of(tasks[0].window_start()), 2);
    assert_eq!(count_deals_for_task(&pool, tasks[0].id).await?, 15);

    reset_date(&pool, date).await?;
    Ok(())
}

#[tokio::test]
async fn test_all_fetches_failing_fails_all_with_one_disconnect() -> Result<()> {
    if require_db().is_none() {
        return Ok(());
    }
    let pool = setup().await?;
    let date = NaiveDate::from_ymd_opt(1997, 2, 11).unwrap();
    let tasks = make_tasks(&pool, date, &[(0, 8), (8, 16), (16, 23)]).await?;
    let ids: Vec<i64> = tasks.iter().map(|x| x.id).collect();

    let mut mock = MockManager::new(40, 28_000_000);
    mock.fail_windows = tasks.iter().map(|x| x.window_start()).collect();
    let manager = Arc::new(mock);
    let outcome = process_tasks(&pool, manager.clone(), &ids, &test_config()).await?;

    assert!(outcome.succeeded.is_empty());
    assert_eq!(outcome.failed.len(), 3);
    assert_eq!(manager.disconnects.load(Ordering::SeqCst), 1);
    for task in tasks_by_ids(&pool, &ids).await? {
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(count_deals_for_task(&pool, task.id).await?, 0);
    }

    reset_date(&pool, date).await?;
    Ok(())
}

#[tokio::test]
async fn test_empty_window_is_a_success() -> Result<()> {
    if require_db().is_none() {
        return Ok(());
    }
    let pool = setup().await?;
    let date = NaiveDate::from_ymd_opt(1997, 2, 6).unwrap();
    let tasks = make_tasks(&pool, date, &[(0, 8)]).await?;

    let manager = Arc::new(MockManager::new(0, 24_000_000));
    let outcome = process_tasks(&pool, manager, &[tasks[0].id], &test_config()).await?;

    assert_eq!(outcome.succeeded, vec![tasks[0].id]);
    let rows = tasks_by_ids(&pool, &[tasks[0].id]).await?;
    assert_eq!(rows[0].status, TaskStatus::Success);
    assert_eq!(count_deals_for_task(&pool, tasks[0].id).await?, 0);

    reset_date(&pool, date).await?;
    Ok(())
}

#[tokio::test]
async fn test_unknown_ids_land_in_failed_partition() -> Result<()> {
    if require_db().is_none() {
        return Ok(());
    }
    let pool = setup().await?;
    let date = NaiveDate::from_ymd_opt(1997, 2, 7).unwrap();
    let tasks = make_tasks(&pool, date, &[(0, 8)]).await?;
    let bogus = tasks[0].id + 5_000_000;

    let manager = Arc::new(MockManager::new(5, 25_000_000));
    let outcome =
        process_tasks(&pool, manager, &[tasks[0].id, bogus], &test_config()).await?;

    assert_eq!(outcome.succeeded, vec![tasks[0].id]);
    assert_eq!(outcome.failed, vec![bogus]);

    reset_date(&pool, date).await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_task_can_be_reprocessed() -> Result<()> {
    if require_db().is_none() {
        return Ok(());
    }
    let pool = setup().await?;
    let date = NaiveDate::from_ymd_opt(1997, 2, 10).unwrap();
    let tasks = make_tasks(&pool, date, &[(0, 8)]).await?;
    let id = tasks[0].id;

    let mut mock = MockManager::new(12, 26_000_000);
    mock.fail_windows = vec![tasks[0].window_start()];
    let outcome = process_tasks(&pool, Arc::new(mock), &[id], &test_config()).await?;
    assert_eq!(outcome.failed, vec![id]);
    assert_eq!(tasks_by_ids(&pool, &[id]).await?[0].status, TaskStatus::Failed);

    // A later run picks the task up again and replaces whatever was there.
    let outcome = process_tasks(&pool, Arc::new(MockManager::new(12, 27_000_000)), &[id], &test_config())
        .await?;
    assert_eq!(outcome.succeeded, vec![id]);
    assert_eq!(tasks_by_ids(&pool, &[id]).await?[0].status, TaskStatus::Success);
    assert_eq!(count_deals_for_task(&pool, id).await?, 12);

    reset_date(&pool, date).await?;
    Ok(())
}
