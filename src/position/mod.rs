//! Position lifecycle
//!
//! Tracks open positions through the state machine
//! `Created -> Bought -> Active -> Closing -> {Closed | Failed}` and
//! supervises each one for profit-target / stop-loss exits. The manager is
//! the single owner of the position map and enforces at most one live
//! position per token address.

pub mod manager;
pub mod monitor;

pub use manager::{CloseReason, Position, PositionManager, PositionState};
pub use monitor::spawn_monitor;
