//! Swap execution
//!
//! Builds, simulates, and submits router swaps through the chain connector.
//! The computed minimum output rides in the transaction itself, so a price
//! moving past the slippage tolerance reverts on-chain instead of executing
//! at worse terms. Risk parameters are never loosened on retry.

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TxHash, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::chain::{ChainConnector, FeeStrategy};
use crate::config::TradingConfig;
use crate::error::{Error, Result};
use crate::trade::quote;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

/// Immutable description of a submitted swap
#[derive(Debug, Clone, Copy)]
pub struct TradeOrder {
    pub token: Address,
    pub direction: Direction,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub deadline: U256,
}

/// Result of a successful submission
#[derive(Debug, Clone, Copy)]
pub struct TradeOutcome {
    pub order: TradeOrder,
    pub tx_hash: TxHash,
}

pub struct TradeEngine {
    connector: Arc<ChainConnector>,
    config: TradingConfig,
    fees: FeeStrategy,
    base_asset: Address,
}

impl TradeEngine {
    pub fn new(connector: Arc<ChainConnector>, config: TradingConfig) -> Self {
        let base_asset = connector
            .chain_config()
            .weth_address
            .parse()
            .expect("validated at config load");
        let fees = FeeStrategy::new(config.gas.clone());
        Self {
            connector,
            config,
            fees,
            base_asset,
        }
    }

    /// Buy `token` with `amount_in` wei of the base asset.
    ///
    /// The swap is simulated read-only first; a revert there aborts before
    /// any gas is spent.
    pub async fn buy(&self, token: Address, amount_in: U256) -> Result<TradeOutcome> {
        let path = vec![self.base_asset, token];
        let expected = self.expected_out(amount_in, &path).await?;
        let min_out = quote::min_amount_out(expected, quote::pct_to_bps(self.config.slippage_pct));
        let deadline = self.deadline();

        let order = TradeOrder {
            token,
            direction: Direction::Buy,
            amount_in,
            min_amount_out: min_out,
            deadline,
        };

        let router = self.connector.router().await;
        let call = router
            .swap_exact_eth_for_tokens_supporting_fee_on_transfer_tokens(
                min_out,
                path,
                self.connector.address(),
                deadline,
            )
            .value(amount_in);

        let tx_hash = self.submit(call.tx, true).await?;
        info!(
            "buy submitted for {:#x}: {} wei in, min {} out, tx {:?}",
            token, amount_in, min_out, tx_hash
        );

        Ok(TradeOutcome { order, tx_hash })
    }

    /// Sell `token_amount` of `token` back to the base asset with normal
    /// slippage protection.
    pub async fn sell(&self, token: Address, token_amount: U256) -> Result<TradeOutcome> {
        let path = vec![token, self.base_asset];
        let expected = self.expected_out(token_amount, &path).await?;
        let min_out = quote::min_amount_out(expected, quote::pct_to_bps(self.config.slippage_pct));
        self.sell_inner(token, token_amount, min_out, true).await
    }

    /// Emergency exit: minimum output zero and no simulation gate, so the
    /// position is closed at whatever price the pool offers.
    pub async fn emergency_sell(&self, token: Address, token_amount: U256) -> Result<TradeOutcome> {
        warn!("EMERGENCY SELL for {:#x}: {} tokens", token, token_amount);
        self.sell_inner(token, token_amount, U256::zero(), false).await
    }

    /// Current token balance of the trading wallet
    pub async fn token_balance(&self, token: Address) -> Result<U256> {
        self.connector.rate_limiter().acquire().await;
        self.connector
            .token(token)
            .await
            .balance_of(self.connector.address())
            .call()
            .await
            .map_err(|e| Error::ContractCall(e.to_string()))
    }

    async fn sell_inner(
        &self,
        token: Address,
        token_amount: U256,
        min_out: U256,
        simulate: bool,
    ) -> Result<TradeOutcome> {
        if token_amount.is_zero() {
            return Err(Error::ContractCall("no tokens to sell".into()));
        }

        self.ensure_allowance(token, token_amount).await?;

        let deadline = self.deadline();
        let order = TradeOrder {
            token,
            direction: Direction::Sell,
            amount_in: token_amount,
            min_amount_out: min_out,
            deadline,
        };

        let router = self.connector.router().await;
        let call = router.swap_exact_tokens_for_eth_supporting_fee_on_transfer_tokens(
            token_amount,
            min_out,
            vec![token, self.base_asset],
            self.connector.address(),
            deadline,
        );

        let tx_hash = self.submit(call.tx, simulate).await?;
        info!(
            "sell submitted for {:#x}: {} tokens in, min {} wei out, tx {:?}",
            token, token_amount, min_out, tx_hash
        );

        Ok(TradeOutcome { order, tx_hash })
    }

    /// Router quote for an exact-input path
    async fn expected_out(&self, amount_in: U256, path: &[Address]) -> Result<U256> {
        self.connector.rate_limiter().acquire().await;
        let amounts = self
            .connector
            .router()
            .await
            .get_amounts_out(amount_in, path.to_vec())
            .call()
            .await
            .map_err(|e| Error::ContractCall(e.to_string()))?;

        amounts
            .last()
            .copied()
            .ok_or_else(|| Error::ContractCall("empty amounts from router".into()))
    }

    /// Approve the router once per token; waits for the approval to mine
    /// before the swap that depends on it.
    async fn ensure_allowance(&self, token: Address, amount: U256) -> Result<()> {
        let router_address: Address = self
            .connector
            .chain_config()
            .router_address
            .parse()
            .expect("validated at config load");

        self.connector.rate_limiter().acquire().await;
        let binding = self.connector.token(token).await;
        let allowance = binding
            .allowance(self.connector.address(), router_address)
            .call()
            .await
            .map_err(|e| Error::ContractCall(e.to_string()))?;

        if allowance >= amount {
            return Ok(());
        }

        info!("approving router for {:#x}", token);
        let call = binding.approve(router_address, U256::MAX);
        let mut tx = call.tx.clone();
        self.prepare_tx(&mut tx).await?;
        self.connector
            .send_transaction(
                tx,
                true,
                Duration::from_secs(self.config.confirmation_timeout_secs),
            )
            .await?;

        Ok(())
    }

    /// Simulate (optionally), apply the fee strategy, and submit
    async fn submit(&self, mut tx: TypedTransaction, simulate: bool) -> Result<TxHash> {
        tx.set_from(self.connector.address());

        if simulate {
            self.connector.call(&tx).await.map_err(|e| match e {
                Error::SimulationRevert(msg) if msg.contains("INSUFFICIENT_OUTPUT_AMOUNT") => {
                    Error::SlippageExceeded(msg)
                }
                other => other,
            })?;
        }

        self.prepare_tx(&mut tx).await?;

        self.connector
            .send_transaction(
                tx,
                self.config.wait_for_confirmation,
                Duration::from_secs(self.config.confirmation_timeout_secs),
            )
            .await
    }

    async fn prepare_tx(&self, tx: &mut TypedTransaction) -> Result<()> {
        tx.set_from(self.connector.address());

        let gas_limit = self.fees.gas_limit(&self.connector, tx).await;
        tx.set_gas(gas_limit);

        let fees = self.fees.fees(&self.connector).await?;
        if let TypedTransaction::Eip1559(inner) = tx {
            inner.max_fee_per_gas = Some(fees.max_fee_per_gas);
            inner.max_priority_fee_per_gas = Some(fees.max_priority_fee_per_gas);
        }

        Ok(())
    }

    /// Unix deadline `deadline_secs` ahead of now
    fn deadline(&self) -> U256 {
        U256::from(chrono::Utc::now().timestamp() as u64 + self.config.deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Buy.to_string(), "buy");
        assert_eq!(Direction::Sell.to_string(), "sell");
    }

    #[test]
    fn test_trade_order_is_copy() {
        // Orders are immutable snapshots; Copy keeps accidental mutation out
        let order = TradeOrder {
            token: Address::zero(),
            direction: Direction::Buy,
            amount_in: U256::from(1u64),
            min_amount_out: U256::zero(),
            deadline: U256::from(999u64),
        };
        let copied = order;
        assert_eq!(copied.amount_in, order.amount_in);
    }
}
