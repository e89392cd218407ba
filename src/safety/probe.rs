//! Live function probing
//!
//! Calls the standard token introspection surface (name, symbol, decimals,
//! totalSupply) and judges plausibility, and probes for trading-restriction
//! functions. Read-only; nothing here submits a transaction.

use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::debug;

use crate::chain::ChainConnector;
use crate::safety::bytecode::has_blacklist_marker;
use crate::safety::{Probe, Restrictions};

/// Longest symbol a plausible token advertises
const MAX_SYMBOL_LEN: usize = 10;
/// Decimals outside 0..=18 are implausible for ERC-20-style tokens
const MAX_DECIMALS: u8 = 18;

/// Results of the introspection calls; `None` marks a reverted/absent call
#[derive(Debug, Clone, Default)]
pub struct TokenIntrospection {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: Option<U256>,
}

impl TokenIntrospection {
    fn succeeded(&self) -> usize {
        [
            self.name.is_some(),
            self.symbol.is_some(),
            self.decimals.is_some(),
            self.total_supply.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    /// Plausibility judgement.
    ///
    /// Every probe failing is indistinguishable from our own connectivity
    /// problem, so that case reports Unknown rather than Fail. Fewer than
    /// half succeeding, or any implausible value, is a fail signal.
    pub fn plausibility(&self) -> Probe {
        let succeeded = self.succeeded();
        if succeeded == 0 {
            return Probe::Unknown;
        }
        if succeeded < 2 {
            return Probe::Fail;
        }

        if let Some(symbol) = &self.symbol {
            if symbol.len() > MAX_SYMBOL_LEN {
                return Probe::Fail;
            }
        }
        if let Some(decimals) = self.decimals {
            if decimals > MAX_DECIMALS {
                return Probe::Fail;
            }
        }
        if let Some(supply) = self.total_supply {
            if supply.is_zero() {
                return Probe::Fail;
            }
        }

        Probe::Pass
    }
}

/// Run the four introspection calls, tolerating individual reverts
pub async fn introspect_token(
    connector: &Arc<ChainConnector>,
    token_address: Address,
) -> TokenIntrospection {
    connector.rate_limiter().acquire().await;
    let token = connector.token(token_address).await;

    let introspection = TokenIntrospection {
        name: token.name().call().await.ok(),
        symbol: token.symbol().call().await.ok(),
        decimals: token.decimals().call().await.ok(),
        total_supply: token.total_supply().call().await.ok(),
    };

    debug!(
        "introspection for {:#x}: {}/4 calls succeeded",
        token_address,
        introspection.succeeded()
    );
    introspection
}

/// Probe for max-transaction/max-wallet caps, a disabled-trading flag, and
/// blacklist capability. Absent functions simply revert and read as `None`.
pub async fn probe_restrictions(
    connector: &Arc<ChainConnector>,
    token_address: Address,
    code: &[u8],
) -> Restrictions {
    connector.rate_limiter().acquire().await;
    let token = connector.restricted_token(token_address).await;

    Restrictions {
        max_tx: token.max_transaction_amount().call().await.ok(),
        max_wallet: token.max_wallet_amount().call().await.ok(),
        trading_enabled: token.trading_enabled().call().await.ok(),
        blacklist_present: has_blacklist_marker(code),
    }
}

/// Judge detected restrictions against the configured floors (in wei)
pub fn restrictions_verdict(
    restrictions: &Restrictions,
    min_max_tx_wei: U256,
    min_max_wallet_wei: U256,
) -> Probe {
    if restrictions.trading_enabled == Some(false) {
        return Probe::Fail;
    }
    if let Some(max_tx) = restrictions.max_tx {
        if max_tx < min_max_tx_wei {
            return Probe::Fail;
        }
    }
    if let Some(max_wallet) = restrictions.max_wallet {
        if max_wallet < min_max_wallet_wei {
            return Probe::Fail;
        }
    }
    Probe::Pass
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_introspection() -> TokenIntrospection {
        TokenIntrospection {
            name: Some("Test Token".into()),
            symbol: Some("TEST".into()),
            decimals: Some(18),
            total_supply: Some(U256::exp10(24)),
        }
    }

    #[test]
    fn test_plausible_token_passes() {
        assert_eq!(full_introspection().plausibility(), Probe::Pass);
    }

    #[test]
    fn test_all_probes_failing_is_unknown() {
        let introspection = TokenIntrospection::default();
        assert_eq!(introspection.plausibility(), Probe::Unknown);
    }

    #[test]
    fn test_fewer_than_half_succeeding_fails() {
        let introspection = TokenIntrospection {
            name: Some("Only Name".into()),
            ..Default::default()
        };
        assert_eq!(introspection.plausibility(), Probe::Fail);
    }

    #[test]
    fn test_oversized_symbol_fails() {
        let introspection = TokenIntrospection {
            symbol: Some("WAYTOOLONGSYMBOL".into()),
            ..full_introspection()
        };
        assert_eq!(introspection.plausibility(), Probe::Fail);
    }

    #[test]
    fn test_implausible_decimals_fail() {
        let introspection = TokenIntrospection {
            decimals: Some(24),
            ..full_introspection()
        };
        assert_eq!(introspection.plausibility(), Probe::Fail);
    }

    #[test]
    fn test_zero_supply_fails() {
        let introspection = TokenIntrospection {
            total_supply: Some(U256::zero()),
            ..full_introspection()
        };
        assert_eq!(introspection.plausibility(), Probe::Fail);
    }

    #[test]
    fn test_restrictions_verdict_floors() {
        let floor_tx = U256::exp10(18); // 1 ETH
        let floor_wallet = U256::exp10(19); // 10 ETH

        let unrestricted = Restrictions::default();
        assert_eq!(
            restrictions_verdict(&unrestricted, floor_tx, floor_wallet),
            Probe::Pass
        );

        let tight_cap = Restrictions {
            max_tx: Some(U256::exp10(17)),
            ..Default::default()
        };
        assert_eq!(
            restrictions_verdict(&tight_cap, floor_tx, floor_wallet),
            Probe::Fail
        );

        let disabled = Restrictions {
            trading_enabled: Some(false),
            ..Default::default()
        };
        assert_eq!(
            restrictions_verdict(&disabled, floor_tx, floor_wallet),
            Probe::Fail
        );

        let generous = Restrictions {
            max_tx: Some(U256::exp10(20)),
            max_wallet: Some(U256::exp10(21)),
            trading_enabled: Some(true),
            blacklist_present: false,
        };
        assert_eq!(
            restrictions_verdict(&generous, floor_tx, floor_wallet),
            Probe::Pass
        );
    }
}
