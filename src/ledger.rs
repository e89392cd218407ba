//! Trade ledger seam
//!
//! Persistent trade history lives outside the core; this trait is the
//! collaborator interface. The shipped implementation emits structured log
//! events only.

use async_trait::async_trait;
use tracing::info;

use crate::trade::TradeOrder;

/// Persistence/analytics collaborator
#[async_trait]
pub trait TradeLedger: Send + Sync {
    /// Record a newly submitted trade
    async fn record_trade(&self, order: &TradeOrder, tx_hash: &str);

    /// Update a trade's lifecycle status (and realized P&L when closed)
    async fn update_trade_status(&self, order: &TradeOrder, status: &str, pnl_pct: Option<f64>);
}

/// Default ledger: structured logging only
pub struct LogLedger;

#[async_trait]
impl TradeLedger for LogLedger {
    async fn record_trade(&self, order: &TradeOrder, tx_hash: &str) {
        info!(
            token = %format!("{:#x}", order.token),
            direction = %order.direction,
            amount_in = %order.amount_in,
            min_amount_out = %order.min_amount_out,
            tx_hash,
            "trade recorded"
        );
    }

    async fn update_trade_status(&self, order: &TradeOrder, status: &str, pnl_pct: Option<f64>) {
        info!(
            token = %format!("{:#x}", order.token),
            direction = %order.direction,
            status,
            pnl_pct = pnl_pct.unwrap_or(0.0),
            "trade status updated"
        );
    }
}
