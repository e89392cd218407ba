//! Pair event watcher
//!
//! Polls the factory's PairCreated logs from a monotonically advancing
//! block cursor, classifies the non-base token of each new pair, and emits
//! deduplicated candidates. Event handling never blocks on evaluation; each
//! accepted candidate is handed to the orchestrator over a channel.

use ethers::contract::EthEvent;
use ethers::types::{Address, Filter};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::contracts::PairCreatedFilter;
use crate::chain::ChainConnector;
use crate::config::EventsConfig;
use crate::error::Result;
use crate::stats::BotStats;

/// A newly listed pair awaiting safety evaluation. Immutable once emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidatePair {
    pub pair_address: Address,
    pub token0: Address,
    pub token1: Address,
    /// The non-base token being evaluated for purchase
    pub target_token: Address,
    pub is_target_token0: bool,
    pub block_seen: u64,
}

impl CandidatePair {
    /// Classify a decoded PairCreated event against the base asset.
    /// Pairs not involving the base asset are discarded.
    pub fn classify(event: &PairCreatedFilter, base_asset: Address, block_seen: u64) -> Option<Self> {
        let (target_token, is_target_token0) = if event.token_0 == base_asset {
            (event.token_1, false)
        } else if event.token_1 == base_asset {
            (event.token_0, true)
        } else {
            return None;
        };

        Some(Self {
            pair_address: event.pair,
            token0: event.token_0,
            token1: event.token_1,
            target_token,
            is_target_token0,
            block_seen,
        })
    }
}

/// Bounded insertion-ordered set of already-processed pair addresses.
/// Replayed events are absorbed here, so the same pair is evaluated once.
pub struct SeenCache {
    capacity: usize,
    set: HashSet<Address>,
    order: VecDeque<Address>,
}

impl SeenCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            set: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Insert an address; returns false if it was already present
    pub fn insert(&mut self, address: Address) -> bool {
        if !self.set.insert(address) {
            return false;
        }
        self.order.push_back(address);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.set.contains(address)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Watches the factory for new pairs and emits candidates
pub struct PairWatcher {
    connector: Arc<ChainConnector>,
    config: EventsConfig,
    stats: Arc<BotStats>,
    seen: SeenCache,
}

impl PairWatcher {
    pub fn new(connector: Arc<ChainConnector>, config: EventsConfig, stats: Arc<BotStats>) -> Self {
        let seen = SeenCache::new(config.seen_cache_size);
        Self {
            connector,
            config,
            stats,
            seen,
        }
    }

    /// Poll loop. Exits cleanly on cancellation; transient failures recreate
    /// the log query with exponential backoff, escalating to an endpoint
    /// failover after `max_reconnect_attempts` consecutive failures.
    pub async fn run(
        mut self,
        candidate_tx: mpsc::Sender<CandidatePair>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let base_asset: Address = self
            .connector
            .chain_config()
            .weth_address
            .parse()
            .expect("validated at config load");
        let factory: Address = self
            .connector
            .chain_config()
            .factory_address
            .parse()
            .expect("validated at config load");

        let mut cursor = self.connector.block_number().await?;
        info!("listening for new pairs from block {}", cursor);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut reconnect_attempts = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("pair watcher stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }

            match self.poll_once(factory, base_asset, cursor, &candidate_tx).await {
                Ok(next_cursor) => {
                    cursor = next_cursor;
                    reconnect_attempts = 0;
                }
                Err(e) => {
                    reconnect_attempts += 1;
                    error!(
                        "event poll failed ({}/{}): {}",
                        reconnect_attempts, self.config.max_reconnect_attempts, e
                    );

                    if reconnect_attempts >= self.config.max_reconnect_attempts {
                        warn!("max reconnect attempts reached, forcing endpoint failover");
                        if let Err(e) = self.connector.failover().await {
                            error!("failover failed: {}", e);
                        }
                        reconnect_attempts = 0;
                    }

                    let backoff =
                        Duration::from_secs((10 * reconnect_attempts as u64).min(60).max(1));
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    /// Fetch and dispatch logs in [cursor, latest]; returns the next cursor
    async fn poll_once(
        &mut self,
        factory: Address,
        base_asset: Address,
        cursor: u64,
        candidate_tx: &mpsc::Sender<CandidatePair>,
    ) -> Result<u64> {
        let latest = self.connector.block_number().await?;
        if latest < cursor {
            return Ok(cursor);
        }

        let filter = Filter::new()
            .address(factory)
            .event(&PairCreatedFilter::abi_signature())
            .from_block(cursor)
            .to_block(latest);

        let logs = self.connector.get_logs(&filter).await?;

        for log in logs {
            let block = log.block_number.map(|b| b.as_u64()).unwrap_or(cursor);
            let raw = ethers::abi::RawLog::from(log);
            let event = match <PairCreatedFilter as EthEvent>::decode_log(&raw) {
                Ok(ev) => ev,
                Err(e) => {
                    warn!("undecodable PairCreated log: {}", e);
                    continue;
                }
            };

            self.stats.pair_seen();

            let Some(candidate) = CandidatePair::classify(&event, base_asset, block) else {
                debug!("skipping pair {:?} - no base-asset side", event.pair);
                continue;
            };

            // Replays produce no duplicate work
            if !self.seen.insert(candidate.pair_address) {
                debug!("skipping already-seen pair {:?}", candidate.pair_address);
                continue;
            }

            info!(
                "new pair {:?} (target token {:?}) at block {}",
                candidate.pair_address, candidate.target_token, block
            );

            if candidate_tx.send(candidate).await.is_err() {
                // Orchestrator is gone; shut down quietly
                return Ok(latest + 1);
            }
        }

        Ok(latest + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn event(token_0: Address, token_1: Address, pair: Address) -> PairCreatedFilter {
        PairCreatedFilter {
            token_0,
            token_1,
            pair,
            pair_index: U256::one(),
        }
    }

    #[test]
    fn test_classify_base_as_token0() {
        let weth = addr(0x01);
        let candidate =
            CandidatePair::classify(&event(weth, addr(0x02), addr(0x03)), weth, 100).unwrap();

        assert_eq!(candidate.target_token, addr(0x02));
        assert!(!candidate.is_target_token0);
        assert_eq!(candidate.block_seen, 100);
    }

    #[test]
    fn test_classify_base_as_token1() {
        let weth = addr(0x01);
        let candidate =
            CandidatePair::classify(&event(addr(0x02), weth, addr(0x03)), weth, 100).unwrap();

        assert_eq!(candidate.target_token, addr(0x02));
        assert!(candidate.is_target_token0);
    }

    #[test]
    fn test_classify_discards_non_base_pair() {
        let weth = addr(0x01);
        assert!(CandidatePair::classify(&event(addr(0x02), addr(0x03), addr(0x04)), weth, 100)
            .is_none());
    }

    #[test]
    fn test_seen_cache_dedup() {
        let mut seen = SeenCache::new(10);

        // Submitting the same pair twice yields exactly one admission
        assert!(seen.insert(addr(0x01)));
        assert!(!seen.insert(addr(0x01)));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_seen_cache_bounded_eviction() {
        let mut seen = SeenCache::new(3);

        for byte in 1..=4u8 {
            assert!(seen.insert(addr(byte)));
        }

        assert_eq!(seen.len(), 3);
        // Oldest entry evicted, newest retained
        assert!(!seen.contains(&addr(0x01)));
        assert!(seen.contains(&addr(0x04)));
    }
}
