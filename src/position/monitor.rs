//! Position monitor
//!
//! One task per active position recomputes the spot price on a fixed
//! interval and drives the exit: profit target or stop loss triggers a
//! normal sell; repeated sell failures escalate to an emergency sell. The
//! monitor observes the shutdown token at every iteration and never
//! force-closes a position on shutdown.

use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chain::ChainConnector;
use crate::config::AutoSellConfig;
use crate::error::Result;
use crate::ledger::TradeLedger;
use crate::notify::Notifier;
use crate::position::{CloseReason, PositionManager, PositionState};
use crate::trade::TradeEngine;

/// Decide whether a price triggers an exit
pub fn exit_trigger(
    current_price: f64,
    profit_target_price: f64,
    stop_loss_price: f64,
) -> Option<CloseReason> {
    if current_price <= 0.0 {
        return None;
    }
    if current_price >= profit_target_price {
        Some(CloseReason::ProfitTarget)
    } else if current_price <= stop_loss_price {
        Some(CloseReason::StopLoss)
    } else {
        None
    }
}

/// Spawn the monitoring task for one position
#[allow(clippy::too_many_arguments)]
pub fn spawn_monitor(
    token: Address,
    connector: Arc<ChainConnector>,
    manager: Arc<PositionManager>,
    engine: Arc<TradeEngine>,
    notifier: Arc<Notifier>,
    ledger: Arc<dyn TradeLedger>,
    config: AutoSellConfig,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let interval = Duration::from_millis(config.price_poll_interval_ms);
        let base_asset: Address = connector
            .chain_config()
            .weth_address
            .parse()
            .expect("validated at config load");

        info!("monitoring position {:#x}", token);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("monitor for {:#x} stopping, position left open", token);
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let Some(position) = manager.get(&token).await else {
                // Closed elsewhere
                return;
            };
            if position.state != PositionState::Active {
                if matches!(position.state, PositionState::Closed | PositionState::Failed) {
                    return;
                }
                continue;
            }

            let current_price = match connector.pair_state(position.pair_address).await {
                Ok(state) => state.spot_price(base_asset),
                Err(e) => {
                    warn!("price poll failed for {:#x}: {}", token, e);
                    continue;
                }
            };

            let Some(reason) = exit_trigger(
                current_price,
                position.profit_target_price,
                position.stop_loss_price,
            ) else {
                continue;
            };

            info!(
                "{} triggered for {:#x}: price {:.3e} (entry {:.3e})",
                reason.as_str(),
                token,
                current_price,
                position.entry_price
            );

            if manager.begin_close(&token, reason).await.is_err() {
                // Another trigger won the race
                continue;
            }

            match close_position(
                &token,
                current_price,
                reason,
                &manager,
                &engine,
                &notifier,
                &ledger,
                config.max_sell_attempts,
            )
            .await
            {
                Ok(()) => return,
                Err(e) => {
                    error!("failed to close {:#x}: {}", token, e);
                    return;
                }
            }
        }
    });
}

/// Sell the position, retrying bounded and escalating to an emergency sell.
/// No retry ever relaxes the slippage limit; escalation switches to the
/// separate emergency path instead.
#[allow(clippy::too_many_arguments)]
async fn close_position(
    token: &Address,
    exit_price: f64,
    reason: CloseReason,
    manager: &Arc<PositionManager>,
    engine: &Arc<TradeEngine>,
    notifier: &Arc<Notifier>,
    ledger: &Arc<dyn TradeLedger>,
    max_sell_attempts: u32,
) -> Result<()> {
    let balance = engine.token_balance(*token).await?;

    let mut outcome = None;
    for attempt in 1..=max_sell_attempts {
        match engine.sell(*token, balance).await {
            Ok(result) => {
                outcome = Some(result);
                break;
            }
            Err(e) => {
                warn!(
                    "sell attempt {}/{} for {:#x} failed: {}",
                    attempt, max_sell_attempts, token, e
                );
            }
        }
    }

    // Escalate: exit at any price rather than hold a rugging token
    if outcome.is_none() {
        outcome = match engine.emergency_sell(*token, balance).await {
            Ok(result) => Some(result),
            Err(e) => {
                error!("emergency sell for {:#x} failed: {}", token, e);
                None
            }
        };
    }

    match outcome {
        Some(result) => {
            let archived = manager.mark_closed(token, result.tx_hash, exit_price).await?;
            ledger
                .update_trade_status(&result.order, "closed", archived.realized_pnl_pct())
                .await;
            notifier
                .notify(
                    &format!(
                        "Sold {:#x}: {} ({:.2}%)",
                        token,
                        reason.as_str(),
                        archived.realized_pnl_pct().unwrap_or(0.0)
                    ),
                    "info",
                    serde_json::json!({
                        "token": format!("{:#x}", token),
                        "reason": reason.as_str(),
                        "tx_hash": format!("{:?}", result.tx_hash),
                    }),
                )
                .await;
            Ok(())
        }
        None => {
            manager.mark_failed(token).await?;
            notifier
                .notify(
                    &format!("Sell failed for {:#x}, manual intervention required", token),
                    "error",
                    serde_json::json!({ "token": format!("{:#x}", token) }),
                )
                .await;
            Ok(())
        }
    }
}
