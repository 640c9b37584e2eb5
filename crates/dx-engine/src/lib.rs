//! Ingestion engine: drives manager sessions and per-task deal passes.

pub mod config;
pub mod orchestrator;

pub use config::ProcessConfig;
pub use orchestrator::process_tasks;
