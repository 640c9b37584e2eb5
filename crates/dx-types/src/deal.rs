use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One trade-execution record as returned by the vendor manager API.
///
/// Field set mirrors the vendor deal object. Identifiers that can exceed
/// 32-bit range (deal id, login, dealer, expert id, flags, position id,
/// millisecond time, volumes) are `i64` so nothing truncates on the way
/// into BIGINT columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealRecord {
    pub deal_id: i64,
    pub action: i32,
    pub comment: String,
    pub commission: f64,
    pub contract_size: f64,
    pub dealer: i64,
    pub digits: i32,
    pub digits_currency: i32,
    pub entry: i32,
    pub expert_id: i64,
    pub external_id: String,
    pub fee: f64,
    pub flags: i64,
    pub gateway: String,
    pub login: i64,
    pub market_ask: f64,
    pub market_bid: f64,
    pub market_last: f64,
    pub modification_flags: i32,
    pub obsolete_value: f64,
    pub order_id: Option<i64>,
    pub position_id: i64,
    pub price: f64,
    pub price_gateway: f64,
    pub price_position: f64,
    pub price_sl: f64,
    pub price_tp: f64,
    pub profit: f64,
    pub profit_raw: f64,
    pub rate_margin: f64,
    pub rate_profit: f64,
    pub reason: i32,
    pub storage: f64,
    pub symbol: String,
    pub tick_size: f64,
    pub tick_value: f64,
    /// Execution time at second precision (vendor server wall clock).
    pub time: NaiveDateTime,
    /// Execution time in milliseconds since the Unix epoch.
    pub time_msc: i64,
    pub value: f64,
    pub volume: i64,
    pub volume_closed: i64,
    pub volume_closed_ext: i64,
    pub volume_ext: i64,
}
