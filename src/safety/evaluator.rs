//! Safety evaluation pipeline
//!
//! Sequential short-circuiting checks, cheapest and most decisive first:
//!
//! 1. code presence (absence is fatal)
//! 2. honeypot signals: bytecode scan, risk API, live probing (any fail
//!    flags the token)
//! 3. liquidity floor on the pair's base-asset reserve
//! 4. trading-restriction probe
//!
//! Best-effort signals degrade to Unknown and only lower confidence; the
//! required checks (code, liquidity) always block on failure.

use ethers::types::Address;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::connector::eth_to_wei;
use crate::chain::ChainConnector;
use crate::config::SafetyConfig;
use crate::error::Result;
use crate::safety::bytecode::{self, DEFAULT_RULES};
use crate::safety::probe;
use crate::safety::risk_api::RiskOracle;
use crate::safety::{Probe, ReasonCode, Restrictions, SafetyAssessment, Verdict};
use crate::watcher::CandidatePair;

/// Confidence when every check passed with no unknowns
const BASE_CONFIDENCE: f64 = 0.8;
/// Confidence penalty per signal that could not be evaluated
const UNKNOWN_PENALTY: f64 = 0.05;

pub struct SafetyEvaluator {
    connector: Arc<ChainConnector>,
    config: SafetyConfig,
    risk_oracle: Option<Arc<dyn RiskOracle>>,
    base_asset: Address,
}

impl SafetyEvaluator {
    pub fn new(
        connector: Arc<ChainConnector>,
        config: SafetyConfig,
        risk_oracle: Option<Arc<dyn RiskOracle>>,
    ) -> Self {
        let base_asset = connector
            .chain_config()
            .weth_address
            .parse()
            .expect("validated at config load");
        Self {
            connector,
            config,
            risk_oracle,
            base_asset,
        }
    }

    /// Evaluate one candidate. Idempotent and read-only; errors are
    /// transport faults from required checks, never verdicts.
    pub async fn evaluate(&self, candidate: &CandidatePair) -> Result<SafetyAssessment> {
        let token = candidate.target_token;
        let mut unknowns = 0u32;

        // Check 1: contract code must exist
        let code = self.connector.get_code(token).await?;
        if code.is_empty() {
            info!("{:#x} rejected: no contract code", token);
            return Ok(SafetyAssessment::rejected(token, ReasonCode::NoCode));
        }

        // Check 2: honeypot signals, evaluated together (logical OR)
        if self.config.check_honeypot {
            let scan = bytecode::scan(
                &code,
                &DEFAULT_RULES,
                self.config.selector_repeat_threshold,
                self.config.max_code_size,
            );
            let bytecode_signal = if scan.is_suspicious() {
                warn!("{:#x} bytecode findings: {:?}", token, scan.findings);
                Probe::Fail
            } else {
                Probe::Pass
            };

            let risk_signal = match &self.risk_oracle {
                Some(oracle) => oracle.screen(token).await,
                None => Probe::Unknown,
            };

            let introspection = probe::introspect_token(&self.connector, token).await;
            let probe_signal = introspection.plausibility();

            for signal in [risk_signal, probe_signal] {
                if signal.is_unknown() {
                    unknowns += 1;
                }
            }

            if bytecode_signal.failed() || risk_signal.failed() || probe_signal.failed() {
                return Ok(SafetyAssessment::rejected(token, ReasonCode::Honeypot));
            }
        }

        // Check 3: base-asset liquidity floor
        let pair_state = self.connector.pair_state(candidate.pair_address).await?;
        let liquidity_eth = pair_state.base_liquidity(self.base_asset);
        if liquidity_eth < self.config.min_liquidity_eth {
            info!(
                "{:#x} rejected: liquidity {:.4} ETH below minimum {:.4}",
                token, liquidity_eth, self.config.min_liquidity_eth
            );
            return Ok(SafetyAssessment {
                liquidity_eth,
                ..SafetyAssessment::rejected(token, ReasonCode::InsufficientLiquidity)
            });
        }

        // Check 4: trading restrictions
        let restrictions = if self.config.probe_restrictions {
            let restrictions = probe::probe_restrictions(&self.connector, token, &code).await;
            let verdict = probe::restrictions_verdict(
                &restrictions,
                eth_to_wei(self.config.min_max_tx_eth),
                eth_to_wei(self.config.min_max_wallet_eth),
            );
            if verdict.failed() {
                info!("{:#x} rejected: restrictive caps {:?}", token, restrictions);
                return Ok(SafetyAssessment {
                    liquidity_eth,
                    restrictions,
                    ..SafetyAssessment::rejected(token, ReasonCode::TradingRestricted)
                });
            }
            restrictions
        } else {
            Restrictions::default()
        };

        let confidence = (BASE_CONFIDENCE - UNKNOWN_PENALTY * unknowns as f64).max(0.0);
        info!(
            "{:#x} passed all safety checks (liquidity {:.4} ETH, confidence {:.2})",
            token, liquidity_eth, confidence
        );

        Ok(SafetyAssessment {
            token_address: token,
            has_code: true,
            is_honeypot: false,
            liquidity_eth,
            restrictions,
            verdict: Verdict::Safe,
            reason: ReasonCode::Clear,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_assessment_shape() {
        let token = Address::from([1u8; 20]);

        let no_code = SafetyAssessment::rejected(token, ReasonCode::NoCode);
        assert!(!no_code.has_code);
        assert!(!no_code.is_safe());
        assert_eq!(no_code.reason, ReasonCode::NoCode);

        let honeypot = SafetyAssessment::rejected(token, ReasonCode::Honeypot);
        assert!(honeypot.has_code);
        assert!(honeypot.is_honeypot);
        assert_eq!(honeypot.reason.to_string(), "Honeypot detected");
    }

    #[test]
    fn test_confidence_penalty() {
        // Two unknown signals reduce the baseline by 0.05 each
        let confidence = (BASE_CONFIDENCE - UNKNOWN_PENALTY * 2.0).max(0.0);
        assert!((confidence - 0.7).abs() < 1e-9);
    }
}
