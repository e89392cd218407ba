//! EIP-1559 fee strategy
//!
//! The max fee carries double-base-fee headroom so a transaction survives
//! base-fee spikes across its confirmation delay:
//! `max_fee_per_gas = 2 * base_fee + priority_fee`. The priority fee comes
//! from configuration or from recent block reward percentiles.

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use tracing::{debug, warn};

use crate::chain::connector::ChainConnector;
use crate::config::GasConfig;
use crate::error::Result;

/// Computed fee settings for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Fee and gas-limit policy applied to every outbound transaction
#[derive(Debug, Clone)]
pub struct FeeStrategy {
    config: GasConfig,
}

impl FeeStrategy {
    pub fn new(config: GasConfig) -> Self {
        Self { config }
    }

    /// Compute EIP-1559 fees from the current chain state
    pub async fn fees(&self, connector: &ChainConnector) -> Result<GasFees> {
        let base_fee = connector.base_fee().await?;

        let priority_fee = match self.config.priority_fee_gwei {
            Some(gwei) => gwei_to_wei(gwei),
            None => {
                let rewards = connector
                    .fee_history_rewards(
                        self.config.fee_history_blocks,
                        self.config.fee_history_percentile,
                    )
                    .await
                    .unwrap_or_default();
                median(rewards).unwrap_or_else(|| gwei_to_wei(1.0))
            }
        };

        let fees = GasFees {
            max_fee_per_gas: base_fee * U256::from(2u64) + priority_fee,
            max_priority_fee_per_gas: priority_fee,
        };
        debug!(
            "fees: base={} max={} priority={}",
            base_fee, fees.max_fee_per_gas, fees.max_priority_fee_per_gas
        );
        Ok(fees)
    }

    /// Estimate gas with a safety buffer, falling back to the configured
    /// conservative limit instead of failing the trade
    pub async fn gas_limit(&self, connector: &ChainConnector, tx: &TypedTransaction) -> U256 {
        match connector.estimate_gas(tx).await {
            Ok(estimate) => {
                estimate * U256::from(100 + self.config.gas_buffer_pct) / U256::from(100u64)
            }
            Err(e) => {
                warn!(
                    "gas estimation failed, using fallback limit {}: {}",
                    self.config.fallback_gas_limit, e
                );
                U256::from(self.config.fallback_gas_limit)
            }
        }
    }
}

fn gwei_to_wei(gwei: f64) -> U256 {
    U256::from((gwei * 1e9) as u128)
}

fn median(mut values: Vec<U256>) -> Option<U256> {
    if values.is_empty() {
        return None;
    }
    values.sort();
    Some(values[values.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei(1.0), U256::from(1_000_000_000u64));
        assert_eq!(gwei_to_wei(2.5), U256::from(2_500_000_000u64));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![]), None);
        assert_eq!(
            median(vec![U256::from(3u64), U256::from(1u64), U256::from(2u64)]),
            Some(U256::from(2u64))
        );
        assert_eq!(
            median(vec![U256::from(4u64), U256::from(1u64)]),
            Some(U256::from(4u64))
        );
    }

    #[test]
    fn test_max_fee_headroom_formula() {
        // max_fee = 2 * base + priority
        let base = U256::from(100u64);
        let priority = U256::from(7u64);
        let max_fee = base * U256::from(2u64) + priority;
        assert_eq!(max_fee, U256::from(207u64));
    }
}
