//! Client for the external trading-platform manager API.
//!
//! The vendor manager SDK is reached through an HTTP bridge service; this
//! crate defines the session interface the orchestrator works against
//! ([`ManagerClient`]) and the reqwest-based bridge implementation
//! ([`BridgeManagerClient`]). Fetch operations are read-only and safe for
//! concurrent callers; connect/disconnect is owned by whoever runs the
//! orchestration (one run holds the session at a time).

pub mod bridge;
pub mod traits;

pub use bridge::{BridgeConfig, BridgeManagerClient};
pub use traits::ManagerClient;
