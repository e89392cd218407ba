//! Safety evaluator
//!
//! Combines bytecode heuristics, an external risk API, and live function
//! probing into a pass/fail assessment for each candidate token. The
//! evaluator is idempotent and side-effect-free: it performs reads only.

pub mod bytecode;
pub mod evaluator;
pub mod probe;
pub mod risk_api;

pub use evaluator::SafetyEvaluator;
pub use risk_api::{HttpRiskOracle, RiskOracle};

use ethers::types::{Address, U256};

/// Tri-state outcome of a best-effort safety signal.
///
/// `Unknown` means the probe itself failed (our network, their rate limit)
/// and is distinct from `Fail`, which means the probe determined the token
/// is unsafe. Unknown never blocks a trade on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Pass,
    Fail,
    Unknown,
}

impl Probe {
    pub fn failed(&self) -> bool {
        matches!(self, Probe::Fail)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Probe::Unknown)
    }
}

/// Final pass/fail decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Unsafe,
}

/// Why a token was rejected (or cleared)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    Clear,
    NoCode,
    Honeypot,
    InsufficientLiquidity,
    TradingRestricted,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReasonCode::Clear => "Clear",
            ReasonCode::NoCode => "NoCode",
            ReasonCode::Honeypot => "Honeypot detected",
            ReasonCode::InsufficientLiquidity => "Insufficient liquidity",
            ReasonCode::TradingRestricted => "Trading restricted",
        };
        write!(f, "{}", s)
    }
}

/// Detected trading restrictions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Restrictions {
    pub max_tx: Option<U256>,
    pub max_wallet: Option<U256>,
    pub trading_enabled: Option<bool>,
    pub blacklist_present: bool,
}

/// Outcome of evaluating one candidate. Produced once, read-only after.
#[derive(Debug, Clone)]
pub struct SafetyAssessment {
    pub token_address: Address,
    pub has_code: bool,
    pub is_honeypot: bool,
    pub liquidity_eth: f64,
    pub restrictions: Restrictions,
    pub verdict: Verdict,
    pub reason: ReasonCode,
    /// 0..1; baseline 0.8 when every check passed, reduced per unknown signal
    pub confidence: f64,
}

impl SafetyAssessment {
    pub fn is_safe(&self) -> bool {
        self.verdict == Verdict::Safe
    }

    pub(crate) fn rejected(token_address: Address, reason: ReasonCode) -> Self {
        Self {
            token_address,
            has_code: reason != ReasonCode::NoCode,
            is_honeypot: reason == ReasonCode::Honeypot,
            liquidity_eth: 0.0,
            restrictions: Restrictions::default(),
            verdict: Verdict::Unsafe,
            reason,
            confidence: 1.0,
        }
    }
}
