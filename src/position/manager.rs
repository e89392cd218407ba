//! Position management
//!
//! Owns the position map. Inserts and removals are strictly serialized so
//! that at most one live position exists per token address; a slot is
//! reserved in `Created` state before the buy is submitted and released if
//! the buy fails.

use chrono::{DateTime, Utc};
use ethers::types::{Address, TxHash, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Lifecycle states of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    /// Slot reserved, buy not yet submitted
    Created,
    /// Buy submitted, awaiting monitoring enablement
    Bought,
    /// Monitored for profit-target / stop-loss
    Active,
    /// Sell in flight
    Closing,
    /// Sold; archived
    Closed,
    /// Sell could not be completed; kept for manual intervention
    Failed,
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PositionState::Created => "created",
            PositionState::Bought => "bought",
            PositionState::Active => "active",
            PositionState::Closing => "closing",
            PositionState::Closed => "closed",
            PositionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ProfitTarget,
    StopLoss,
    Emergency,
    Manual,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ProfitTarget => "profit_target",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::Emergency => "emergency",
            CloseReason::Manual => "manual",
        }
    }
}

/// A single tracked position
#[derive(Debug, Clone)]
pub struct Position {
    pub token_address: Address,
    pub pair_address: Address,
    pub is_target_token0: bool,
    /// Spot price at entry, base-asset per token
    pub entry_price: f64,
    pub amount_spent: U256,
    pub buy_tx_hash: Option<TxHash>,
    pub state: PositionState,
    pub stop_loss_price: f64,
    pub profit_target_price: f64,
    pub sell_tx_hash: Option<TxHash>,
    pub close_reason: Option<CloseReason>,
    pub opened_at: DateTime<Utc>,
    /// Exit spot price, set on close
    pub exit_price: Option<f64>,
}

impl Position {
    /// Realized price change in percent, available once closed
    pub fn realized_pnl_pct(&self) -> Option<f64> {
        let exit = self.exit_price?;
        if self.entry_price == 0.0 {
            return None;
        }
        Some((exit - self.entry_price) / self.entry_price * 100.0)
    }
}

/// Position manager; the only owner of the position map
pub struct PositionManager {
    positions: RwLock<HashMap<Address, Position>>,
    max_positions: usize,
}

impl PositionManager {
    pub fn new(max_positions: usize) -> Arc<Self> {
        Arc::new(Self {
            positions: RwLock::new(HashMap::new()),
            max_positions,
        })
    }

    /// Reserve a slot for a token before submitting its buy.
    ///
    /// Fails if a live position for the token already exists or the global
    /// position limit is reached. This insert is the admission point that
    /// preserves the one-live-position-per-token invariant.
    pub async fn try_open(
        &self,
        token_address: Address,
        pair_address: Address,
        is_target_token0: bool,
    ) -> Result<()> {
        let mut positions = self.positions.write().await;

        if positions.contains_key(&token_address) {
            return Err(Error::DuplicatePosition(format!("{:#x}", token_address)));
        }

        let open = positions
            .values()
            .filter(|p| p.state != PositionState::Failed)
            .count();
        if open >= self.max_positions {
            return Err(Error::PositionLimitReached {
                open,
                limit: self.max_positions,
            });
        }

        positions.insert(
            token_address,
            Position {
                token_address,
                pair_address,
                is_target_token0,
                entry_price: 0.0,
                amount_spent: U256::zero(),
                buy_tx_hash: None,
                state: PositionState::Created,
                stop_loss_price: 0.0,
                profit_target_price: 0.0,
                sell_tx_hash: None,
                close_reason: None,
                opened_at: Utc::now(),
                exit_price: None,
            },
        );

        Ok(())
    }

    /// Release a reserved slot after a failed buy
    pub async fn abort(&self, token_address: &Address) {
        let mut positions = self.positions.write().await;
        if let Some(position) = positions.get(token_address) {
            if position.state == PositionState::Created {
                positions.remove(token_address);
                info!("released reserved slot for {:#x}", token_address);
            }
        }
    }

    /// Created -> Bought, recording entry terms
    pub async fn mark_bought(
        &self,
        token_address: &Address,
        entry_price: f64,
        amount_spent: U256,
        buy_tx_hash: TxHash,
        profit_target_pct: f64,
        stop_loss_pct: f64,
    ) -> Result<()> {
        self.transition(token_address, PositionState::Created, PositionState::Bought, |p| {
            p.entry_price = entry_price;
            p.amount_spent = amount_spent;
            p.buy_tx_hash = Some(buy_tx_hash);
            p.profit_target_price = entry_price * (1.0 + profit_target_pct / 100.0);
            p.stop_loss_price = entry_price * (1.0 - stop_loss_pct / 100.0);
        })
        .await
    }

    /// Bought -> Active, once auto-sell monitoring is attached. With
    /// auto-sell disabled the position stays Bought until closed manually.
    pub async fn activate(&self, token_address: &Address) -> Result<()> {
        self.transition(token_address, PositionState::Bought, PositionState::Active, |_| {})
            .await
    }

    /// Active -> Closing. Returns the position snapshot to sell against.
    /// A second trigger while a sell is in flight is rejected.
    pub async fn begin_close(
        &self,
        token_address: &Address,
        reason: CloseReason,
    ) -> Result<Position> {
        let mut positions = self.positions.write().await;
        let position = positions
            .get_mut(token_address)
            .ok_or_else(|| Error::PositionNotFound(format!("{:#x}", token_address)))?;

        if position.state != PositionState::Active {
            return Err(Error::InvalidTransition {
                from: position.state.to_string(),
                to: PositionState::Closing.to_string(),
            });
        }

        position.state = PositionState::Closing;
        position.close_reason = Some(reason);
        Ok(position.clone())
    }

    /// Closing -> Closed; archives the position (removed from the live map)
    pub async fn mark_closed(
        &self,
        token_address: &Address,
        sell_tx_hash: TxHash,
        exit_price: f64,
    ) -> Result<Position> {
        let mut positions = self.positions.write().await;
        let position = positions
            .get_mut(token_address)
            .ok_or_else(|| Error::PositionNotFound(format!("{:#x}", token_address)))?;

        if position.state != PositionState::Closing {
            return Err(Error::InvalidTransition {
                from: position.state.to_string(),
                to: PositionState::Closed.to_string(),
            });
        }

        position.state = PositionState::Closed;
        position.sell_tx_hash = Some(sell_tx_hash);
        position.exit_price = Some(exit_price);
        let archived = position.clone();
        positions.remove(token_address);

        info!(
            "position {:#x} closed ({}), pnl {:.2}%",
            token_address,
            archived
                .close_reason
                .map(|r| r.as_str())
                .unwrap_or("unknown"),
            archived.realized_pnl_pct().unwrap_or(0.0)
        );
        Ok(archived)
    }

    /// Closing -> Failed; the slot stays occupied for manual intervention
    pub async fn mark_failed(&self, token_address: &Address) -> Result<()> {
        let result = self
            .transition(token_address, PositionState::Closing, PositionState::Failed, |_| {})
            .await;
        if result.is_ok() {
            warn!(
                "position {:#x} marked failed, manual intervention required",
                token_address
            );
        }
        result
    }

    /// Re-arm a position whose sell attempt failed (Closing -> Active)
    pub async fn reopen(&self, token_address: &Address) -> Result<()> {
        self.transition(token_address, PositionState::Closing, PositionState::Active, |p| {
            p.close_reason = None;
        })
        .await
    }

    pub async fn get(&self, token_address: &Address) -> Option<Position> {
        self.positions.read().await.get(token_address).cloned()
    }

    pub async fn live_count(&self) -> usize {
        self.positions
            .read()
            .await
            .values()
            .filter(|p| p.state != PositionState::Failed)
            .count()
    }

    pub async fn all(&self) -> Vec<Position> {
        self.positions.read().await.values().cloned().collect()
    }

    async fn transition<F>(
        &self,
        token_address: &Address,
        from: PositionState,
        to: PositionState,
        apply: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Position),
    {
        let mut positions = self.positions.write().await;
        let position = positions
            .get_mut(token_address)
            .ok_or_else(|| Error::PositionNotFound(format!("{:#x}", token_address)))?;

        if position.state != from {
            return Err(Error::InvalidTransition {
                from: position.state.to_string(),
                to: to.to_string(),
            });
        }

        position.state = to;
        apply(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn tx_hash(byte: u8) -> TxHash {
        TxHash::from([byte; 32])
    }

    async fn opened_manager() -> Arc<PositionManager> {
        let manager = PositionManager::new(5);
        manager.try_open(addr(1), addr(2), true).await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_at_most_one_position_per_token() {
        let manager = opened_manager().await;

        let duplicate = manager.try_open(addr(1), addr(2), true).await;
        assert!(matches!(duplicate, Err(Error::DuplicatePosition(_))));
        assert_eq!(manager.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_position_limit_enforced() {
        let manager = PositionManager::new(2);
        manager.try_open(addr(1), addr(11), true).await.unwrap();
        manager.try_open(addr(2), addr(12), true).await.unwrap();

        let third = manager.try_open(addr(3), addr(13), true).await;
        assert!(matches!(third, Err(Error::PositionLimitReached { .. })));
    }

    #[tokio::test]
    async fn test_full_lifecycle_profit_target() {
        let manager = opened_manager().await;
        let token = addr(1);

        manager
            .mark_bought(&token, 100.0, U256::exp10(17), tx_hash(0xB), 50.0, 10.0)
            .await
            .unwrap();
        manager.activate(&token).await.unwrap();

        let position = manager.get(&token).await.unwrap();
        assert_eq!(position.state, PositionState::Active);
        assert!((position.profit_target_price - 150.0).abs() < 1e-9);
        assert!((position.stop_loss_price - 90.0).abs() < 1e-9);

        let closing = manager
            .begin_close(&token, CloseReason::ProfitTarget)
            .await
            .unwrap();
        assert_eq!(closing.state, PositionState::Closing);

        let archived = manager
            .mark_closed(&token, tx_hash(0xC), 155.0)
            .await
            .unwrap();
        assert_eq!(archived.close_reason.unwrap().as_str(), "profit_target");
        assert!((archived.realized_pnl_pct().unwrap() - 55.0).abs() < 1e-9);

        // Archived position frees the slot
        assert_eq!(manager.live_count().await, 0);
        assert!(manager.get(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_stop_loss_close_reason() {
        let manager = opened_manager().await;
        let token = addr(1);

        manager
            .mark_bought(&token, 100.0, U256::exp10(17), tx_hash(0xB), 50.0, 10.0)
            .await
            .unwrap();
        manager.activate(&token).await.unwrap();
        manager
            .begin_close(&token, CloseReason::StopLoss)
            .await
            .unwrap();

        let archived = manager.mark_closed(&token, tx_hash(0xC), 88.0).await.unwrap();
        assert_eq!(archived.close_reason.unwrap().as_str(), "stop_loss");
    }

    #[tokio::test]
    async fn test_double_trigger_rejected_while_closing() {
        let manager = opened_manager().await;
        let token = addr(1);

        manager
            .mark_bought(&token, 1.0, U256::one(), tx_hash(0xB), 50.0, 10.0)
            .await
            .unwrap();
        manager.activate(&token).await.unwrap();
        manager
            .begin_close(&token, CloseReason::ProfitTarget)
            .await
            .unwrap();

        let second = manager.begin_close(&token, CloseReason::StopLoss).await;
        assert!(matches!(second, Err(Error::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_failed_position_keeps_slot() {
        let manager = opened_manager().await;
        let token = addr(1);

        manager
            .mark_bought(&token, 1.0, U256::one(), tx_hash(0xB), 50.0, 10.0)
            .await
            .unwrap();
        manager.activate(&token).await.unwrap();
        manager
            .begin_close(&token, CloseReason::StopLoss)
            .await
            .unwrap();
        manager.mark_failed(&token).await.unwrap();

        // Slot remains occupied so no new position opens for the token
        let reopened = manager.try_open(token, addr(2), true).await;
        assert!(matches!(reopened, Err(Error::DuplicatePosition(_))));
        // Failed positions no longer count toward the live limit
        assert_eq!(manager.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_abort_releases_created_slot_only() {
        let manager = opened_manager().await;
        let token = addr(1);

        manager.abort(&token).await;
        assert!(manager.get(&token).await.is_none());

        // Abort on a bought position is a no-op
        manager.try_open(token, addr(2), true).await.unwrap();
        manager
            .mark_bought(&token, 1.0, U256::one(), tx_hash(0xB), 50.0, 10.0)
            .await
            .unwrap();
        manager.abort(&token).await;
        assert!(manager.get(&token).await.is_some());
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let manager = opened_manager().await;
        let token = addr(1);

        // Created -> Active skips Bought
        let result = manager.activate(&token).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
    }
}
