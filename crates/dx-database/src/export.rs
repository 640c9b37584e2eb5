//! Paged CSV export of the deal and task tables.
//!
//! Rows are streamed page by page with keyset pagination so an export never
//! materialises the full table. The header line is written once, before the
//! first page.

use std::io::Write;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use dx_types::{DealRecord, Task};

use crate::deals::{DEAL_COLUMNS, row_to_deal};
use crate::init::Connection;
use crate::tasks::row_to_task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTable {
    Deals,
    Tasks,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Restrict a deals export to rows owned by one task.
    pub task_id: Option<i64>,
    /// Restrict a tasks export to one task date.
    pub date: Option<NaiveDate>,
    pub page_size: i64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { task_id: None, date: None, page_size: 10_000 }
    }
}

/// Stream a table as CSV into `out`. Returns the number of data rows
/// written, excluding the header.
pub async fn export_csv<W: Write>(
    pool: &Connection,
    table: ExportTable,
    opts: &ExportOptions,
    out: &mut W,
) -> Result<u64> {
    let rows = match table {
        ExportTable::Deals => export_deals(pool, opts, out).await?,
        ExportTable::Tasks => export_tasks(pool, opts, out).await?,
    };
    info!(?table, rows, "export complete");
    Ok(rows)
}

async fn export_deals<W: Write>(
    pool: &Connection,
    opts: &ExportOptions,
    out: &mut W,
) -> Result<u64> {
    writeln!(out, "{}", DEAL_COLUMNS.replace(", ", ","))?;

    let filtered = format!(
        "SELECT {DEAL_COLUMNS} FROM deals \
         WHERE deal_id > $1 AND task_id = $2 ORDER BY deal_id LIMIT $3"
    );
    let unfiltered = format!(
        "SELECT {DEAL_COLUMNS} FROM deals WHERE deal_id > $1 ORDER BY deal_id LIMIT $2"
    );

    let mut last = i64::MIN;
    let mut total: u64 = 0;
    loop {
        let page = match opts.task_id {
            Some(task_id) => {
                sqlx::query(&filtered)
                    .bind(last)
                    .bind(task_id)
                    .bind(opts.page_size)
                    .fetch_all(pool)
                    .await?
            }
            None => {
                sqlx::query(&unfiltered)
                    .bind(last)
                    .bind(opts.page_size)
                    .fetch_all(pool)
                    .await?
            }
        };
        if page.is_empty() {
            break;
        }
        for row in &page {
            let (deal, task_id) = row_to_deal(row);
            writeln!(out, "{}", deal_csv_line(&deal, task_id))?;
            last = deal.deal_id;
            total += 1;
        }
    }
    Ok(total)
}

async fn export_tasks<W: Write>(
    pool: &Connection,
    opts: &ExportOptions,
    out: &mut W,
) -> Result<u64> {
    writeln!(out, "id,date,start_time,end_time,status,created_at")?;

    let mut last = i64::MIN;
    let mut total: u64 = 0;
    loop {
        let page = match opts.date {
            Some(date) => {
                sqlx::query(
                    "SELECT id, date, start_time, end_time, status, created_at \
                     FROM deal_tasks WHERE id > $1 AND date = $2 ORDER BY id LIMIT $3",
                )
                .bind(last)
                .bind(date)
                .bind(opts.page_size)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, date, start_time, end_time, status, created_at \
                     FROM deal_tasks WHERE id > $1 ORDER BY id LIMIT $2",
                )
                .bind(last)
                .bind(opts.page_size)
                .fetch_all(pool)
                .await?
            }
        };
        if page.is_empty() {
            break;
        }
        for row in &page {
            let task = row_to_task(row)?;
            writeln!(out, "{}", task_csv_line(&task))?;
            last = task.id;
            total += 1;
        }
    }
    Ok(total)
}

fn deal_csv_line(d: &DealRecord, task_id: i64) -> String {
    let order_id = d.order_id.map(|v| v.to_string()).unwrap_or_default();
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        d.deal_id,
        d.action,
        csv_field(&d.comment),
        d.commission,
        d.contract_size,
        d.dealer,
        d.digits,
        d.digits_currency,
        d.entry,
        d.expert_id,
        csv_field(&d.external_id),
        d.fee,
        d.flags,
        csv_field(&d.gateway),
        d.login,
        d.market_ask,
        d.market_bid,
        d.market_last,
        d.modification_flags,
        d.obsolete_value,
        order_id,
        d.position_id,
        d.price,
        d.price_gateway,
        d.price_position,
        d.price_sl,
        d.price_tp,
        d.profit,
        d.profit_raw,
        d.rate_margin,
        d.rate_profit,
        d.reason,
        d.storage,
        csv_field(&d.symbol),
        d.tick_size,
        d.tick_value,
        d.time.format("%Y-%m-%d %H:%M:%S"),
        d.time_msc,
        d.value,
        d.volume,
        d.volume_closed,
        d.volume_closed_ext,
        d.volume_ext,
        task_id,
    )
}

fn task_csv_line(t: &Task) -> String {
    format!(
        "{},{},{},{},{},{}",
        t.id,
        t.date,
        t.start_time.format("%H:%M:%S"),
        t.end_time.format("%H:%M:%S"),
        t.status.as_str(),
        t.created_at.to_rfc3339(),
    )
}

/// Quote a field only when it needs it.
fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') || raw.contains('\r') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
