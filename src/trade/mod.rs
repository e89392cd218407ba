//! Trade engine
//!
//! AMM quoting, slippage protection, fee strategy and swap execution
//! through the router. Buys and sells share symmetric logic; an emergency
//! sell path trades slippage protection for a guaranteed exit.

pub mod engine;
pub mod quote;

pub use engine::{Direction, TradeEngine, TradeOrder, TradeOutcome};
