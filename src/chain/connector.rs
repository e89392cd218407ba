//! Chain connector
//!
//! Owns the RPC client: connects to the primary endpoint and falls back
//! through the configured backups, verifies the remote chain id (a mismatch
//! is fatal), caches contract bindings per address, self-tests liveness on a
//! fixed interval, and signs/submits transactions. Reads and writes acquire
//! the shared rate limiter and pass through the endpoint circuit breaker.

use dashmap::DashMap;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, Filter, Log, TransactionReceipt, TxHash, U256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::contracts::{
    Erc20Token, RestrictedToken, UniswapV2Factory, UniswapV2Pair, UniswapV2Router,
};
use crate::config::{ChainConfig, RpcConfig};
use crate::error::{Error, Result};
use crate::resilience::{CircuitBreaker, RateLimiter, RetryPolicy};

/// Signing client shared by all contract bindings
pub type ChainClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Reconnect after this many consecutive health-check failures
const HEALTH_FAILURE_LIMIT: u32 = 3;

pub struct ChainConnector {
    rpc_config: RpcConfig,
    chain_config: ChainConfig,
    wallet: LocalWallet,
    endpoints: Vec<String>,
    endpoint_index: AtomicUsize,
    client: RwLock<Arc<ChainClient>>,
    rate_limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    // Binding caches, keyed by address; append-only, cleared on failover
    pair_cache: DashMap<Address, Arc<UniswapV2Pair<ChainClient>>>,
    token_cache: DashMap<Address, Arc<Erc20Token<ChainClient>>>,
    restricted_cache: DashMap<Address, Arc<RestrictedToken<ChainClient>>>,
}

impl ChainConnector {
    /// Connect to the first reachable endpoint with the expected chain id
    pub async fn connect(
        rpc_config: RpcConfig,
        chain_config: ChainConfig,
        private_key: &str,
    ) -> Result<Arc<Self>> {
        let wallet: LocalWallet = private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()?
            .with_chain_id(chain_config.chain_id);

        let endpoints: Vec<String> = std::iter::once(rpc_config.endpoint.clone())
            .chain(rpc_config.backup_endpoints.iter().cloned())
            .collect();

        let retry = RetryPolicy::from_config(&rpc_config.retry);
        let (client, index) =
            Self::connect_any(&endpoints, 0, &wallet, chain_config.chain_id, &retry).await?;

        let connector = Arc::new(Self {
            rate_limiter: Arc::new(RateLimiter::per_second(rpc_config.max_calls_per_second)),
            breaker: Arc::new(CircuitBreaker::new(
                "rpc",
                rpc_config.circuit_breaker.failure_threshold,
                Duration::from_secs(rpc_config.circuit_breaker.open_timeout_secs),
            )),
            retry,
            rpc_config,
            chain_config,
            wallet,
            endpoints,
            endpoint_index: AtomicUsize::new(index),
            client: RwLock::new(client),
            pair_cache: DashMap::new(),
            token_cache: DashMap::new(),
            restricted_cache: DashMap::new(),
        });

        Ok(connector)
    }

    /// Try endpoints in order starting at `start`, wrapping each attempt in
    /// the retry policy. A wrong chain id halts immediately.
    async fn connect_any(
        endpoints: &[String],
        start: usize,
        wallet: &LocalWallet,
        expected_chain_id: u64,
        retry: &RetryPolicy,
    ) -> Result<(Arc<ChainClient>, usize)> {
        for offset in 0..endpoints.len() {
            let index = (start + offset) % endpoints.len();
            let url = &endpoints[index];

            let attempt = retry
                .run(|| async { Self::connect_endpoint(url, wallet, expected_chain_id).await })
                .await;

            match attempt {
                Ok(client) => {
                    info!("connected to RPC endpoint #{}", index);
                    return Ok((client, index));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("endpoint #{} unusable: {}", index, e);
                }
            }
        }

        Err(Error::AllEndpointsFailed)
    }

    async fn connect_endpoint(
        url: &str,
        wallet: &LocalWallet,
        expected_chain_id: u64,
    ) -> Result<Arc<ChainClient>> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| Error::RpcConnection(e.to_string()))?
            .interval(Duration::from_millis(500));

        let actual = provider.get_chainid().await?.as_u64();
        if actual != expected_chain_id {
            return Err(Error::ChainIdMismatch {
                expected: expected_chain_id,
                actual,
            });
        }

        Ok(Arc::new(SignerMiddleware::new(provider, wallet.clone())))
    }

    /// Rotate to the next endpoint and invalidate cached bindings
    pub async fn failover(&self) -> Result<()> {
        let next = (self.endpoint_index.load(Ordering::SeqCst) + 1) % self.endpoints.len();
        warn!("failing over to RPC endpoint #{}", next);

        let (client, index) = Self::connect_any(
            &self.endpoints,
            next,
            &self.wallet,
            self.chain_config.chain_id,
            &self.retry,
        )
        .await?;

        *self.client.write().await = client;
        self.endpoint_index.store(index, Ordering::SeqCst);

        // Cached bindings hold the dead client
        self.pair_cache.clear();
        self.token_cache.clear();
        self.restricted_cache.clear();

        Ok(())
    }

    /// Spawn the periodic liveness self-test
    pub fn spawn_health_task(self: &Arc<Self>, cancel: CancellationToken) {
        let connector = self.clone();
        let interval = Duration::from_secs(self.rpc_config.health_check_interval_secs);

        tokio::spawn(async move {
            let mut consecutive_failures = 0u32;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                match connector.block_number().await {
                    Ok(block) => {
                        consecutive_failures = 0;
                        debug!("health check OK at block {}", block);
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        warn!(
                            "health check failed ({}/{}): {}",
                            consecutive_failures, HEALTH_FAILURE_LIMIT, e
                        );

                        if consecutive_failures >= HEALTH_FAILURE_LIMIT {
                            if let Err(e) = connector.failover().await {
                                error!("failover failed: {}", e);
                            }
                            consecutive_failures = 0;
                        }
                    }
                }
            }

            info!("health check task stopped");
        });
    }

    /// Acquire the rate limiter, then run `op` under the circuit breaker
    async fn guard<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<ChainClient>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.rate_limiter.acquire().await;
        let client = self.client.read().await.clone();
        self.breaker.call(|| op(client)).await
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limiter.clone()
    }

    pub async fn client(&self) -> Arc<ChainClient> {
        self.client.read().await.clone()
    }

    // --- Reads ---

    pub async fn block_number(&self) -> Result<u64> {
        self.guard(|client| async move { Ok(client.get_block_number().await?.as_u64()) })
            .await
    }

    pub async fn get_code(&self, address: Address) -> Result<Bytes> {
        self.guard(|client| async move { Ok(client.get_code(address, None).await?) })
            .await
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256> {
        self.guard(|client| async move { Ok(client.get_balance(address, None).await?) })
            .await
    }

    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let filter = filter.clone();
        self.guard(|client| async move { Ok(client.get_logs(&filter).await?) })
            .await
    }

    /// Base fee of the latest block, falling back to the legacy gas price
    pub async fn base_fee(&self) -> Result<U256> {
        self.guard(|client| async move {
            let block = client
                .get_block(BlockNumber::Latest)
                .await?
                .ok_or_else(|| Error::Rpc("latest block unavailable".into()))?;
            match block.base_fee_per_gas {
                Some(fee) => Ok(fee),
                None => Ok(client.get_gas_price().await?),
            }
        })
        .await
    }

    /// Recent priority-fee rewards at the given percentile, newest last
    pub async fn fee_history_rewards(&self, blocks: u64, percentile: f64) -> Result<Vec<U256>> {
        self.guard(|client| async move {
            let history = client
                .fee_history(blocks, BlockNumber::Latest, &[percentile])
                .await?;
            Ok(history
                .reward
                .iter()
                .filter_map(|r| r.first().copied())
                .collect())
        })
        .await
    }

    /// Read-only execution of a prepared transaction (simulation).
    ///
    /// Deliberately not routed through the circuit breaker: a revert is a
    /// verdict about the contract, not about endpoint health, and doomed
    /// candidates must not open the RPC circuit.
    pub async fn call(&self, tx: &TypedTransaction) -> Result<Bytes> {
        self.rate_limiter.acquire().await;
        let client = self.client.read().await.clone();
        client
            .call(tx, None)
            .await
            .map_err(|e| Error::SimulationRevert(e.to_string()))
    }

    /// Gas estimation; reverts here are contract verdicts as well
    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        self.rate_limiter.acquire().await;
        let client = self.client.read().await.clone();
        client
            .estimate_gas(tx, None)
            .await
            .map_err(|e| Error::GasEstimation(e.to_string()))
    }

    // --- Writes ---

    /// Sign and submit a transaction, optionally blocking for its receipt
    pub async fn send_transaction(
        &self,
        tx: TypedTransaction,
        wait_for_confirmation: bool,
        confirmation_timeout: Duration,
    ) -> Result<TxHash> {
        self.rate_limiter.acquire().await;
        let client = self.client.read().await.clone();

        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| Error::TransactionSend(e.to_string()))?;
        let tx_hash = *pending;
        info!("transaction sent: {:?}", tx_hash);

        if wait_for_confirmation {
            let receipt = tokio::time::timeout(confirmation_timeout, pending)
                .await
                .map_err(|_| Error::ConfirmationTimeout(format!("{:?}", tx_hash)))?
                .map_err(|e| Error::Rpc(e.to_string()))?;

            match receipt {
                Some(r) if r.status == Some(1.into()) => {
                    info!("transaction confirmed: {:?}", tx_hash);
                }
                Some(_) => {
                    return Err(Error::TransactionSend(format!(
                        "transaction reverted on-chain: {:?}",
                        tx_hash
                    )));
                }
                None => {
                    return Err(Error::ConfirmationTimeout(format!("{:?}", tx_hash)));
                }
            }
        }

        Ok(tx_hash)
    }

    pub async fn get_receipt(&self, tx_hash: TxHash) -> Result<Option<TransactionReceipt>> {
        self.guard(|client| async move { Ok(client.get_transaction_receipt(tx_hash).await?) })
            .await
    }

    // --- Contract bindings ---

    pub async fn factory(&self) -> UniswapV2Factory<ChainClient> {
        let address: Address = self
            .chain_config
            .factory_address
            .parse()
            .expect("validated at config load");
        UniswapV2Factory::new(address, self.client().await)
    }

    pub async fn router(&self) -> UniswapV2Router<ChainClient> {
        let address: Address = self
            .chain_config
            .router_address
            .parse()
            .expect("validated at config load");
        UniswapV2Router::new(address, self.client().await)
    }

    pub async fn pair(&self, address: Address) -> Arc<UniswapV2Pair<ChainClient>> {
        if let Some(cached) = self.pair_cache.get(&address) {
            return cached.clone();
        }
        let binding = Arc::new(UniswapV2Pair::new(address, self.client().await));
        self.pair_cache.insert(address, binding.clone());
        binding
    }

    pub async fn token(&self, address: Address) -> Arc<Erc20Token<ChainClient>> {
        if let Some(cached) = self.token_cache.get(&address) {
            return cached.clone();
        }
        let binding = Arc::new(Erc20Token::new(address, self.client().await));
        self.token_cache.insert(address, binding.clone());
        binding
    }

    pub async fn restricted_token(&self, address: Address) -> Arc<RestrictedToken<ChainClient>> {
        if let Some(cached) = self.restricted_cache.get(&address) {
            return cached.clone();
        }
        let binding = Arc::new(RestrictedToken::new(address, self.client().await));
        self.restricted_cache.insert(address, binding.clone());
        binding
    }

    /// Reserves of a pair plus its token0, the inputs for liquidity and
    /// price computation
    pub async fn pair_state(&self, pair_address: Address) -> Result<PairState> {
        self.rate_limiter.acquire().await;
        let pair = self.pair(pair_address).await;

        let (reserve0, reserve1, _) = pair
            .get_reserves()
            .call()
            .await
            .map_err(|e| Error::ContractCall(e.to_string()))?;
        let token0 = pair
            .token_0()
            .call()
            .await
            .map_err(|e| Error::ContractCall(e.to_string()))?;

        Ok(PairState {
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
            token0,
        })
    }
}

/// Snapshot of a pair's reserves
#[derive(Debug, Clone, Copy)]
pub struct PairState {
    pub reserve0: U256,
    pub reserve1: U256,
    pub token0: Address,
}

impl PairState {
    /// (base-asset reserve, token reserve) given the base-asset address
    pub fn oriented(&self, base_asset: Address) -> (U256, U256) {
        if self.token0 == base_asset {
            (self.reserve0, self.reserve1)
        } else {
            (self.reserve1, self.reserve0)
        }
    }

    /// Base-asset reserve converted to a human unit (18 decimals)
    pub fn base_liquidity(&self, base_asset: Address) -> f64 {
        let (base_reserve, _) = self.oriented(base_asset);
        wei_to_eth(base_reserve)
    }

    /// Spot price as the base/token reserve ratio
    pub fn spot_price(&self, base_asset: Address) -> f64 {
        let (base_reserve, token_reserve) = self.oriented(base_asset);
        if token_reserve.is_zero() {
            return 0.0;
        }
        u256_to_f64(base_reserve) / u256_to_f64(token_reserve)
    }
}

/// Convert a wei amount to ETH as f64 (display/threshold use only)
pub fn wei_to_eth(wei: U256) -> f64 {
    u256_to_f64(wei) / 1e18
}

/// Convert an ETH amount to wei
pub fn eth_to_wei(eth: f64) -> U256 {
    // Split to keep precision for small fractional amounts
    let wei = eth * 1e18;
    U256::from(wei as u128)
}

fn u256_to_f64(value: U256) -> f64 {
    // Lossy for very large values; fine for ratios and display
    value.to_string().parse().unwrap_or(f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_pair_state_orientation() {
        let weth = addr(0xAA);
        let state = PairState {
            reserve0: U256::from(1000u64),
            reserve1: U256::from(5000u64),
            token0: weth,
        };

        assert_eq!(
            state.oriented(weth),
            (U256::from(1000u64), U256::from(5000u64))
        );

        let flipped = PairState {
            token0: addr(0xBB),
            ..state
        };
        assert_eq!(
            flipped.oriented(weth),
            (U256::from(5000u64), U256::from(1000u64))
        );
    }

    #[test]
    fn test_spot_price_ratio() {
        let weth = addr(0xAA);
        let state = PairState {
            reserve0: U256::from(2000u64),
            reserve1: U256::from(1000u64),
            token0: weth,
        };
        assert!((state.spot_price(weth) - 2.0).abs() < f64::EPSILON);

        let empty = PairState {
            reserve0: U256::zero(),
            reserve1: U256::zero(),
            token0: weth,
        };
        assert_eq!(empty.spot_price(weth), 0.0);
    }

    #[test]
    fn test_wei_eth_conversion() {
        assert!((wei_to_eth(U256::exp10(18)) - 1.0).abs() < f64::EPSILON);
        assert_eq!(eth_to_wei(1.0), U256::exp10(18));
        assert_eq!(eth_to_wei(0.1), U256::exp10(17));
    }
}
