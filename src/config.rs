//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub chain: ChainConfig,
    pub events: EventsConfig,
    pub trading: TradingConfig,
    pub safety: SafetyConfig,
    pub auto_sell: AutoSellConfig,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    /// Ordered fallback endpoints, tried after the primary
    #[serde(default)]
    pub backup_endpoints: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Sliding-window rate limit shared by every outbound chain call
    #[serde(default = "default_max_calls_per_second")]
    pub max_calls_per_second: usize,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Uniswap V2-style factory emitting PairCreated
    pub factory_address: String,
    /// Router used for swaps
    pub router_address: String,
    /// Wrapped native token every pair is evaluated against
    pub weth_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Bounded dedup set of already-seen pair addresses
    #[serde(default = "default_seen_cache_size")]
    pub seen_cache_size: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            seen_cache_size: default_seen_cache_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_buy_amount_eth")]
    pub buy_amount_eth: f64,
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: f64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default)]
    pub wait_for_confirmation: bool,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default)]
    pub gas: GasConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
    /// Fixed priority fee in gwei; when unset it is derived from feeHistory
    #[serde(default)]
    pub priority_fee_gwei: Option<f64>,
    #[serde(default = "default_fee_history_blocks")]
    pub fee_history_blocks: u64,
    #[serde(default = "default_fee_history_percentile")]
    pub fee_history_percentile: f64,
    /// Conservative limit used when estimation fails
    #[serde(default = "default_fallback_gas_limit")]
    pub fallback_gas_limit: u64,
    #[serde(default = "default_gas_buffer_pct")]
    pub gas_buffer_pct: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            priority_fee_gwei: None,
            fee_history_blocks: default_fee_history_blocks(),
            fee_history_percentile: default_fee_history_percentile(),
            fallback_gas_limit: default_fallback_gas_limit(),
            gas_buffer_pct: default_gas_buffer_pct(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_true")]
    pub check_honeypot: bool,
    #[serde(default = "default_min_liquidity_eth")]
    pub min_liquidity_eth: f64,
    #[serde(default = "default_true")]
    pub probe_restrictions: bool,
    /// Floor for maxTransactionAmount, in base-asset units
    #[serde(default = "default_min_max_tx_eth")]
    pub min_max_tx_eth: f64,
    /// Floor for maxWalletAmount, in base-asset units
    #[serde(default = "default_min_max_wallet_eth")]
    pub min_max_wallet_eth: f64,
    /// Repeats of a standard selector above this count flag tampered bytecode
    #[serde(default = "default_selector_repeat_threshold")]
    pub selector_repeat_threshold: usize,
    #[serde(default = "default_max_code_size")]
    pub max_code_size: usize,
    #[serde(default)]
    pub risk_api: RiskApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_risk_api_url")]
    pub base_url: String,
    #[serde(default = "default_risk_api_timeout_ms")]
    pub timeout_ms: u64,
    /// Buy/sell tax above this percentage flags the token
    #[serde(default = "default_max_tax_pct")]
    pub max_tax_pct: f64,
}

impl Default for RiskApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_risk_api_url(),
            timeout_ms: default_risk_api_timeout_ms(),
            max_tax_pct: default_max_tax_pct(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoSellConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_profit_target_pct")]
    pub profit_target_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_price_poll_interval_ms")]
    pub price_poll_interval_ms: u64,
    /// Sell attempts before escalating to an emergency sell
    #[serde(default = "default_max_sell_attempts")]
    pub max_sell_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_max_concurrent_evaluations")]
    pub max_concurrent_evaluations: usize,
    /// Fraction of the wallet balance a single buy may consume
    #[serde(default = "default_max_balance_fraction")]
    pub max_balance_fraction: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:8545".into())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_max_calls_per_second() -> usize {
    10
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_seen_cache_size() -> usize {
    10000
}

fn default_buy_amount_eth() -> f64 {
    0.1
}

fn default_slippage_pct() -> f64 {
    5.0
}

fn default_deadline_secs() -> u64 {
    300
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_fee_history_blocks() -> u64 {
    5
}

fn default_fee_history_percentile() -> f64 {
    50.0
}

fn default_fallback_gas_limit() -> u64 {
    300000
}

fn default_gas_buffer_pct() -> u64 {
    20
}

fn default_min_liquidity_eth() -> f64 {
    5.0
}

fn default_min_max_tx_eth() -> f64 {
    1.0
}

fn default_min_max_wallet_eth() -> f64 {
    10.0
}

fn default_selector_repeat_threshold() -> usize {
    2
}

fn default_max_code_size() -> usize {
    50000
}

fn default_risk_api_url() -> String {
    "https://api.honeypot.is/v2/IsHoneypot".into()
}

fn default_risk_api_timeout_ms() -> u64 {
    5000
}

fn default_max_tax_pct() -> f64 {
    10.0
}

fn default_profit_target_pct() -> f64 {
    50.0
}

fn default_stop_loss_pct() -> f64 {
    10.0
}

fn default_price_poll_interval_ms() -> u64 {
    30000
}

fn default_max_sell_attempts() -> u32 {
    3
}

fn default_max_positions() -> usize {
    10
}

fn default_max_concurrent_evaluations() -> usize {
    8
}

fn default_max_balance_fraction() -> f64 {
    0.1
}

fn default_notify_timeout_ms() -> u64 {
    10000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SNIPER_)
            .add_source(
                config::Environment::with_prefix("SNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        // Validate contract addresses
        for (name, address) in [
            ("factory_address", &self.chain.factory_address),
            ("router_address", &self.chain.router_address),
            ("weth_address", &self.chain.weth_address),
        ] {
            address
                .parse::<ethers::types::Address>()
                .map_err(|_| anyhow::anyhow!("Invalid {}: {}", name, address))?;
        }

        // Validate endpoints
        for endpoint in
            std::iter::once(&self.rpc.endpoint).chain(self.rpc.backup_endpoints.iter())
        {
            url::Url::parse(endpoint)
                .with_context(|| format!("Invalid RPC endpoint: {}", endpoint))?;
        }

        // Validate trading amounts
        if self.trading.buy_amount_eth <= 0.0 {
            anyhow::bail!("buy_amount_eth must be positive");
        }

        if self.trading.slippage_pct <= 0.0 || self.trading.slippage_pct > 100.0 {
            anyhow::bail!("slippage_pct must be between 0 and 100");
        }

        if self.safety.min_liquidity_eth < 0.0 {
            anyhow::bail!("min_liquidity_eth must be non-negative");
        }

        // Validate auto-sell percentages
        if self.auto_sell.enabled {
            if self.auto_sell.profit_target_pct <= 0.0 {
                anyhow::bail!("profit_target_pct must be positive");
            }
            if self.auto_sell.stop_loss_pct <= 0.0 || self.auto_sell.stop_loss_pct >= 100.0 {
                anyhow::bail!("stop_loss_pct must be between 0 and 100");
            }
        }

        // Validate limits
        if self.limits.max_positions == 0 {
            anyhow::bail!("max_positions must be at least 1");
        }

        if self.limits.max_balance_fraction <= 0.0 || self.limits.max_balance_fraction > 1.0 {
            anyhow::bail!("max_balance_fraction must be between 0 and 1");
        }

        if self.rpc.max_calls_per_second == 0 {
            anyhow::bail!("max_calls_per_second must be at least 1");
        }

        Ok(())
    }

    /// Read the signing key from the environment. Never part of the config
    /// file so it cannot leak through config dumps.
    pub fn private_key() -> Result<String> {
        std::env::var("PRIVATE_KEY")
            .map_err(|_| anyhow::anyhow!("PRIVATE_KEY environment variable not set"))
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    backups: {}
    timeout: {}ms
    rate_limit: {} calls/s
  Chain:
    chain_id: {}
    factory: {}
    router: {}
    weth: {}
  Trading:
    buy_amount: {} ETH
    slippage: {}%
  Safety:
    honeypot_check: {}
    min_liquidity: {} ETH
    risk_api: {}
  Auto-Sell:
    enabled: {}
    profit_target: {}%
    stop_loss: {}%
  Limits:
    max_positions: {}
    max_concurrent_evaluations: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.backup_endpoints.len(),
            self.rpc.timeout_ms,
            self.rpc.max_calls_per_second,
            self.chain.chain_id,
            self.chain.factory_address,
            self.chain.router_address,
            self.chain.weth_address,
            self.trading.buy_amount_eth,
            self.trading.slippage_pct,
            self.safety.check_honeypot,
            self.safety.min_liquidity_eth,
            if self.safety.risk_api.enabled {
                mask_url(&self.safety.risk_api.base_url)
            } else {
                "(disabled)".into()
            },
            self.auto_sell.enabled,
            self.auto_sell.profit_target_pct,
            self.auto_sell.stop_loss_pct,
            self.limits.max_positions,
            self.limits.max_concurrent_evaluations,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            rpc: RpcConfig {
                endpoint: "http://127.0.0.1:8545".into(),
                backup_endpoints: vec![],
                timeout_ms: default_timeout_ms(),
                max_calls_per_second: default_max_calls_per_second(),
                health_check_interval_secs: default_health_check_interval_secs(),
                circuit_breaker: CircuitBreakerConfig::default(),
                retry: RetryConfig::default(),
            },
            chain: ChainConfig {
                chain_id: 1,
                factory_address: "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f".into(),
                router_address: "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".into(),
                weth_address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".into(),
            },
            events: EventsConfig::default(),
            trading: TradingConfig {
                buy_amount_eth: default_buy_amount_eth(),
                slippage_pct: default_slippage_pct(),
                deadline_secs: default_deadline_secs(),
                wait_for_confirmation: false,
                confirmation_timeout_secs: default_confirmation_timeout_secs(),
                gas: GasConfig::default(),
            },
            safety: SafetyConfig {
                check_honeypot: true,
                min_liquidity_eth: default_min_liquidity_eth(),
                probe_restrictions: true,
                min_max_tx_eth: default_min_max_tx_eth(),
                min_max_wallet_eth: default_min_max_wallet_eth(),
                selector_repeat_threshold: default_selector_repeat_threshold(),
                max_code_size: default_max_code_size(),
                risk_api: RiskApiConfig::default(),
            },
            auto_sell: AutoSellConfig {
                enabled: true,
                profit_target_pct: default_profit_target_pct(),
                stop_loss_pct: default_stop_loss_pct(),
                price_poll_interval_ms: default_price_poll_interval_ms(),
                max_sell_attempts: default_max_sell_attempts(),
            },
            limits: LimitsConfig {
                max_positions: default_max_positions(),
                max_concurrent_evaluations: default_max_concurrent_evaluations(),
                max_balance_fraction: default_max_balance_fraction(),
            },
            notifications: NotificationConfig::default(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.slippage_pct, 5.0);
        assert_eq!(config.safety.selector_repeat_threshold, 2);
        assert_eq!(config.safety.max_code_size, 50000);
    }

    #[test]
    fn test_invalid_address_rejected() {
        let mut config = test_config();
        config.chain.factory_address = "not-an-address".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_stop_loss_rejected() {
        let mut config = test_config();
        config.auto_sell.stop_loss_pct = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com?key=secret"),
            "https://rpc.example.com?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }
}
