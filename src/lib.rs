//! Pair Sniper Bot Library
//!
//! Watches a Uniswap V2-style factory for new pairs, screens each listed
//! token for rug/honeypot risk, and executes protected buys with automated
//! profit-target / stop-loss supervision.

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod position;
pub mod resilience;
pub mod safety;
pub mod stats;
pub mod trade;
pub mod watcher;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
