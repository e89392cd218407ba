//! Error types for the sniper bot

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sniper bot
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    #[error("All RPC endpoints failed")]
    AllEndpointsFailed,

    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    // Resilience errors
    #[error("Circuit breaker is open")]
    CircuitOpen,

    // Contract errors
    #[error("Contract call failed: {0}")]
    ContractCall(String),

    #[error("Simulation reverted: {0}")]
    SimulationRevert(String),

    // Trading errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("Transaction {0} not confirmed within timeout")]
    ConfirmationTimeout(String),

    #[error("Slippage exceeded, swap would revert: {0}")]
    SlippageExceeded(String),

    #[error("Gas estimation failed: {0}")]
    GasEstimation(String),

    #[error("Insufficient balance: {available} ETH available, {required} ETH required")]
    InsufficientBalance { available: f64, required: f64 },

    // Safety decisions (negative verdicts, not faults)
    #[error("Token {token} rejected: {reason}")]
    SafetyRejected { token: String, reason: String },

    // Position management errors
    #[error("Position already open for token: {0}")]
    DuplicatePosition(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Invalid position transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Position limit reached: {open} open, limit is {limit}")]
    PositionLimitReached { open: usize, limit: usize },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::RpcConnection(_)
                | Error::TransactionSend(_)
                | Error::ConfirmationTimeout(_)
        )
    }

    /// Check if this error is a negative safety decision rather than a fault.
    /// Safety rejections are recorded in statistics and never retried.
    pub fn is_safety_rejection(&self) -> bool {
        matches!(self, Error::SafetyRejected { .. })
    }

    /// Errors that must halt the process instead of triggering failover
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ChainIdMismatch { .. }
                | Error::Config(_)
                | Error::MissingEnvVar(_)
                | Error::InvalidPrivateKey(_)
        )
    }
}

// Conversion from ethers provider errors
impl From<ethers::providers::ProviderError> for Error {
    fn from(e: ethers::providers::ProviderError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from wallet errors
impl From<ethers::signers::WalletError> for Error {
    fn from(e: ethers::signers::WalletError) -> Self {
        Error::InvalidPrivateKey(e.to_string())
    }
}

// Conversion from signer middleware errors (RPC calls through the signing client)
impl
    From<
        ethers::middleware::signer::SignerMiddlewareError<
            ethers::providers::Provider<ethers::providers::Http>,
            ethers::signers::LocalWallet,
        >,
    > for Error
{
    fn from(
        e: ethers::middleware::signer::SignerMiddlewareError<
            ethers::providers::Provider<ethers::providers::Http>,
            ethers::signers::LocalWallet,
        >,
    ) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Rpc("timeout".into()).is_retryable());
        assert!(Error::RpcTimeout(30000).is_retryable());
        assert!(!Error::CircuitOpen.is_retryable());
        assert!(!Error::SimulationRevert("TRANSFER_FAILED".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::ChainIdMismatch {
            expected: 1,
            actual: 56
        }
        .is_fatal());
        assert!(!Error::Rpc("x".into()).is_fatal());
    }

    #[test]
    fn test_safety_rejection_is_not_retryable() {
        let err = Error::SafetyRejected {
            token: "0xabc".into(),
            reason: "Honeypot detected".into(),
        };
        assert!(err.is_safety_rejection());
        assert!(!err.is_retryable());
    }
}
