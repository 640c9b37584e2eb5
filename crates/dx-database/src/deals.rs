//! Chunked batch writer for ingestion passes.
//!
//! Fetched vendor records are partitioned into chunks, and each chunk into
//! smaller insert sub-chunks. Every sub-chunk is one transaction with an
//! explicit commit timeout and a bounded retry; sub-chunks within a pass
//! run strictly sequentially so a retry or rollback is always scoped to a
//! single sub-chunk. A pass that exhausts its retries fails as a whole and
//! the discard step of the next pass over that task rewrites its rows.

use std::time::Duration;

use anyhow::{Result, anyhow};
use sqlx::{Postgres, QueryBuilder, Row};
use sqlx::postgres::PgRow;
use tokio::time::timeout;
use tracing::{debug, info};

use dx_types::{DealRecord, RetryPolicy};

use crate::init::Connection;

/// Column order shared by the batch insert and the CSV export.
pub(crate) const DEAL_COLUMNS: &str = "deal_id, action, comment, commission, contract_size, \
    dealer, digits, digits_currency, entry, expert_id, external_id, fee, flags, gateway, \
    login, market_ask, market_bid, market_last, modification_flags, obsolete_value, order_id, \
    position_id, price, price_gateway, price_position, price_sl, price_tp, profit, profit_raw, \
    rate_margin, rate_profit, reason, storage, symbol, tick_size, tick_value, time, time_msc, \
    value, volume, volume_closed, volume_closed_ext, volume_ext, task_id";

/// Tunables for one writing pass.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Records grouped per chunk (logging/accounting granularity).
    pub chunk_size: usize,
    /// Records per insert transaction; bounds statement size and commit latency.
    pub insert_chunk_size: usize,
    /// Deadline for a single sub-chunk transaction (build + execute + commit).
    pub commit_timeout_ms: u64,
    /// Bounded retry applied per sub-chunk on timeout or transient failure.
    pub retry: RetryPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            insert_chunk_size: 100,
            commit_timeout_ms: 30_000,
            retry: RetryPolicy::commit_default(),
        }
    }
}

/// Drop all deal rows owned by a task. First step of every ingestion pass:
/// reprocessing replaces a task's rows, it never appends to them.
pub async fn discard_task_deals(pool: &Connection, task_id: i64) -> Result<u64> {
    let res = sqlx::query("DELETE FROM deals WHERE task_id = $1")
        .bind(task_id)
        .execute(pool)
        .await?;
    if res.rows_affected() > 0 {
        debug!(task_id, discarded = res.rows_affected(), "discarded prior deal rows");
    }
    Ok(res.rows_affected())
}

/// Persist fetched records for one task. Returns the number of rows
/// written, which equals `records.len()` on success — the pass fails if
/// any sub-chunk cannot be committed within the retry bound.
pub async fn write_deals(
    pool: &Connection,
    task_id: i64,
    records: &[DealRecord],
    cfg: &WriterConfig,
) -> Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let chunk_count = records.len().div_ceil(cfg.chunk_size);
    let mut written: u64 = 0;

    for (chunk_idx, chunk) in records.chunks(cfg.chunk_size).enumerate() {
        for sub in chunk.chunks(cfg.insert_chunk_size) {
            insert_sub_chunk(pool, task_id, sub, cfg).await?;
            written += sub.len() as u64;
        }
        debug!(
            task_id,
            chunk = chunk_idx + 1,
            chunks = chunk_count,
            rows = chunk.len(),
            "chunk persisted"
        );
    }

    info!(task_id, rows = written, "deal rows written");
    Ok(written)
}

/// One sub-chunk, one transaction. The commit deadline turns into a retry;
/// dropping the timed-out transaction rolls it back, so a retried attempt
/// never double-inserts.
async fn insert_sub_chunk(
    pool: &Connection,
    task_id: i64,
    rows: &[DealRecord],
    cfg: &WriterConfig,
) -> Result<()> {
    cfg.retry
        .run(|attempt| async move {
            if attempt > 0 {
                debug!(task_id, attempt, "retrying sub-chunk insert");
            }
            let mut tx = pool.begin().await?;
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO deals ({DEAL_COLUMNS}) "));
            qb.push_values(rows.iter(), |mut b, d| {
                b.push_bind(d.deal_id)
                    .push_bind(d.action)
                    .push_bind(d.comment.as_str())
                    .push_bind(d.commission)
                    .push_bind(d.contract_size)
                    .push_bind(d.dealer)
                    .push_bind(d.digits)
                    .push_bind(d.digits_currency)
                    .push_bind(d.entry)
                    .push_bind(d.expert_id)
                    .push_bind(d.external_id.as_str())
                    .push_bind(d.fee)
                    .push_bind(d.flags)
                    .push_bind(d.gateway.as_str())
                    .push_bind(d.login)
                    .push_bind(d.market_ask)
                    .push_bind(d.market_bid)
                    .push_bind(d.market_last)
                    .push_bind(d.modification_flags)
                    .push_bind(d.obsolete_value)
                    .push_bind(d.order_id)
                    .push_bind(d.position_id)
                    .push_bind(d.price)
                    .push_bind(d.price_gateway)
                    .push_bind(d.price_position)
                    .push_bind(d.price_sl)
                    .push_bind(d.price_tp)
                    .push_bind(d.profit)
                    .push_bind(d.profit_raw)
                    .push_bind(d.rate_margin)
                    .push_bind(d.rate_profit)
                    .push_bind(d.reason)
                    .push_bind(d.storage)
                    .push_bind(d.symbol.as_str())
                    .push_bind(d.tick_size)
                    .push_bind(d.tick_value)
                    .push_bind(d.time)
                    .push_bind(d.time_msc)
                    .push_bind(d.value)
                    .push_bind(d.volume)
                    .push_bind(d.volume_closed)
                    .push_bind(d.volume_closed_ext)
                    .push_bind(d.volume_ext)
                    .push_bind(task_id);
            });

            let commit = async {
                qb.build().execute(&mut *tx).await?;
                tx.commit().await?;
                Ok::<(), sqlx::Error>(())
            };
            match timeout(Duration::from_millis(cfg.commit_timeout_ms), commit).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow::Error::from(e).context("sub-chunk insert failed")),
                Err(_) => Err(anyhow!(
                    "sub-chunk commit timed out after {} ms",
                    cfg.commit_timeout_ms
                )),
            }
        })
        .await
}

pub(crate) fn row_to_deal(row: &PgRow) -> (DealRecord, i64) {
    let deal = DealRecord {
        deal_id: row.get("deal_id"),
        action: row.get("action"),
        comment: row.get("comment"),
        commission: row.get("commission"),
        contract_size: row.get("contract_size"),
        dealer: row.get("dealer"),
        digits: row.get("digits"),
        digits_currency: row.get("digits_currency"),
        entry: row.get("entry"),
        expert_id: row.get("expert_id"),
        external_id: row.get("external_id"),
        fee: row.get("fee"),
        flags: row.get("flags"),
        gateway: row.get("gateway"),
        login: row.get("login"),
        market_ask: row.get("market_ask"),
        market_bid: row.get("market_bid"),
        market_last: row.get("market_last"),
        modification_flags: row.get("modification_flags"),
        obsolete_value: row.get("obsolete_value"),
        order_id: row.get("order_id"),
        position_id: row.get("position_id"),
        price: row.get("price"),
        price_gateway: row.get("price_gateway"),
        price_position: row.get("price_position"),
        price_sl: row.get("price_sl"),
        price_tp: row.get("price_tp"),
        profit: row.get("profit"),
        profit_raw: row.get("profit_raw"),
        rate_margin: row.get("rate_margin"),
        rate_profit: row.get("rate_profit"),
        reason: row.get("reason"),
        storage: row.get("storage"),
        symbol: row.get("symbol"),
        tick_size: row.get("tick_size"),
        tick_value: row.get("tick_value"),
        time: row.get("time"),
        time_msc: row.get("time_msc"),
        value: row.get("value"),
        volume: row.get("volume"),
        volume_closed: row.get("volume_closed"),
        volume_closed_ext: row.get("volume_closed_ext"),
        volume_ext: row.get("volume_ext"),
    };
    (deal, row.get("task_id"))
}
