//! Postgres persistence for the deal extractor.
//!
//! - `init`: connection pool construction from the environment.
//! - `schema`: idempotent DDL bootstrap for `deal_tasks` and `deals`.
//! - `tasks`: the task repository (create, list, bulk status updates).
//! - `deals`: the chunked batch writer used by ingestion passes.
//! - `delete`: batched cascade deletion of tasks and their deal rows.
//! - `export`: keyset-paged CSV export of either table.
//!
//! Everything takes an explicit pool handle; there is no global connection.
//! Concurrent ingestion passes each draw their own connections and
//! transactions from the pool, so chunk writes of two tasks never share a
//! transaction.

pub mod deals;
pub mod delete;
pub mod export;
pub mod init;
pub mod schema;
pub mod tasks;
