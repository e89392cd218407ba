//! CLI command implementations
//!
//! `start` is the orchestrator: it owns every component, applies global
//! admission control, and drives graceful shutdown. On a shutdown signal it
//! stops accepting new events and lets in-flight evaluations finish, but
//! never force-closes open positions.

use anyhow::Result;
use ethers::types::U256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::connector::{eth_to_wei, wei_to_eth};
use crate::chain::ChainConnector;
use crate::config::Config;
use crate::error::Error;
use crate::ledger::{LogLedger, TradeLedger};
use crate::notify::Notifier;
use crate::position::{spawn_monitor, PositionManager};
use crate::safety::{HttpRiskOracle, ReasonCode, RiskOracle, SafetyEvaluator};
use crate::stats::BotStats;
use crate::trade::TradeEngine;
use crate::watcher::{CandidatePair, PairWatcher};

/// Cadence of the statistics reporter
const STATS_INTERVAL: Duration = Duration::from_secs(300);
/// Candidate channel depth between watcher and dispatcher
const CANDIDATE_CHANNEL_CAPACITY: usize = 256;

/// Everything a candidate evaluation needs, owned by the orchestrator for
/// the lifetime of the process
struct BotContext {
    config: Config,
    connector: Arc<ChainConnector>,
    evaluator: SafetyEvaluator,
    engine: Arc<TradeEngine>,
    manager: Arc<PositionManager>,
    notifier: Arc<Notifier>,
    ledger: Arc<dyn TradeLedger>,
    stats: Arc<BotStats>,
    cancel: CancellationToken,
    dry_run: bool,
}

/// Start the sniper bot
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - no real trades will be executed");
    }

    info!("Starting pair sniper bot...");
    info!(
        "Buy amount: {} ETH, Slippage: {}%",
        config.trading.buy_amount_eth, config.trading.slippage_pct
    );

    let private_key = Config::private_key()?;
    let connector = ChainConnector::connect(
        config.rpc.clone(),
        config.chain.clone(),
        &private_key,
    )
    .await?;
    info!("Trading wallet: {:#x}", connector.address());

    let cancel = CancellationToken::new();
    connector.spawn_health_task(cancel.clone());

    let stats = Arc::new(BotStats::default());
    let notifier = Arc::new(Notifier::new(&config.notifications));
    let ledger: Arc<dyn TradeLedger> = Arc::new(LogLedger);

    let risk_oracle: Option<Arc<dyn RiskOracle>> = if config.safety.risk_api.enabled {
        Some(Arc::new(HttpRiskOracle::new(config.safety.risk_api.clone())))
    } else {
        None
    };
    let evaluator = SafetyEvaluator::new(connector.clone(), config.safety.clone(), risk_oracle);
    let engine = Arc::new(TradeEngine::new(connector.clone(), config.trading.clone()));
    let manager = PositionManager::new(config.limits.max_positions);

    notifier
        .notify(
            &format!("Sniper bot started on chain {}", config.chain.chain_id),
            "info",
            serde_json::json!({ "chain_id": config.chain.chain_id }),
        )
        .await;

    // Shutdown on Ctrl-C
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                cancel.cancel();
            }
        });
    }

    // Statistics reporter
    {
        let stats = stats.clone();
        let manager = manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(STATS_INTERVAL) => {}
                }
                info!("=== Bot statistics: {} ===", stats.snapshot());
                info!("Active positions: {}", manager.live_count().await);
            }
        });
    }

    // Pair event watcher
    let (candidate_tx, mut candidate_rx) = mpsc::channel(CANDIDATE_CHANNEL_CAPACITY);
    let watcher = PairWatcher::new(connector.clone(), config.events.clone(), stats.clone());
    let watcher_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { watcher.run(candidate_tx, cancel).await })
    };

    let context = Arc::new(BotContext {
        config: config.clone(),
        connector,
        evaluator,
        engine,
        manager,
        notifier: notifier.clone(),
        ledger,
        stats: stats.clone(),
        cancel: cancel.clone(),
        dry_run,
    });

    // Dispatch loop: one short-lived evaluation task per candidate, gated
    // by the admission semaphore so the watcher never backs up on us
    let semaphore = Arc::new(Semaphore::new(config.limits.max_concurrent_evaluations));
    let mut evaluations = JoinSet::new();

    info!("Bot is running! Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = candidate_rx.recv() => {
                let Some(candidate) = maybe else { break };
                let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
                let context = context.clone();
                evaluations.spawn(async move {
                    handle_candidate(context, candidate).await;
                    drop(permit);
                });
            }
        }
    }

    // Allow in-flight evaluations to finish; open positions stay open
    info!("draining in-flight evaluations...");
    while evaluations.join_next().await.is_some() {}
    if let Err(e) = watcher_handle.await {
        warn!("watcher task join error: {}", e);
    }

    let snapshot = stats.snapshot();
    info!("Final statistics: {}", snapshot);
    notifier
        .notify(
            "Sniper bot shutting down",
            "info",
            serde_json::to_value(format!("{}", snapshot)).unwrap_or_default(),
        )
        .await;

    Ok(())
}

/// Evaluate one candidate and, when it clears all checks, execute the buy
/// and attach the position monitor
async fn handle_candidate(ctx: Arc<BotContext>, candidate: CandidatePair) {
    ctx.stats.pair_analyzed();
    let token = candidate.target_token;

    let assessment = match ctx.evaluator.evaluate(&candidate).await {
        Ok(assessment) => assessment,
        Err(e) => {
            error!("safety evaluation failed for {:#x}: {}", token, e);
            return;
        }
    };

    if !assessment.is_safe() {
        ctx.stats.safety_rejection();
        if assessment.reason == ReasonCode::Honeypot {
            ctx.stats.honeypot_detected();
        }
        warn!("{:#x} failed safety checks: {}", token, assessment.reason);
        return;
    }

    info!(
        "{:#x} passed safety checks (confidence {:.2})",
        token, assessment.confidence
    );

    if ctx.dry_run {
        info!("DRY-RUN: would buy {:#x}", token);
        return;
    }

    // Reserve the position slot before spending anything
    if let Err(e) = ctx
        .manager
        .try_open(token, candidate.pair_address, candidate.is_target_token0)
        .await
    {
        debug!("not buying {:#x}: {}", token, e);
        return;
    }

    if let Err(e) = execute_buy(&ctx, &candidate).await {
        ctx.stats.trade_failed();
        ctx.manager.abort(&token).await;
        error!("buy failed for {:#x}: {}", token, e);
        ctx.notifier
            .notify(
                &format!("Buy failed for {:#x}: {}", token, e),
                "error",
                serde_json::json!({ "token": format!("{:#x}", token) }),
            )
            .await;
    }
}

async fn execute_buy(ctx: &Arc<BotContext>, candidate: &CandidatePair) -> crate::Result<()> {
    let token = candidate.target_token;
    let base_asset = ctx
        .connector
        .chain_config()
        .weth_address
        .parse()
        .expect("validated at config load");

    // Size the buy against the available balance
    let balance = ctx.connector.get_balance(ctx.connector.address()).await?;
    let configured = eth_to_wei(ctx.config.trading.buy_amount_eth);
    let cap = balance * U256::from((ctx.config.limits.max_balance_fraction * 100.0) as u64)
        / U256::from(100u64);
    let amount_in = configured.min(cap);

    if amount_in.is_zero() {
        return Err(Error::InsufficientBalance {
            available: wei_to_eth(balance),
            required: ctx.config.trading.buy_amount_eth,
        });
    }

    // Entry terms from the pool state just before submission
    let entry_price = ctx
        .connector
        .pair_state(candidate.pair_address)
        .await?
        .spot_price(base_asset);

    ctx.stats.trade_attempted();
    let outcome = ctx.engine.buy(token, amount_in).await?;
    ctx.stats.trade_succeeded();

    ctx.manager
        .mark_bought(
            &token,
            entry_price,
            amount_in,
            outcome.tx_hash,
            ctx.config.auto_sell.profit_target_pct,
            ctx.config.auto_sell.stop_loss_pct,
        )
        .await?;

    ctx.ledger
        .record_trade(&outcome.order, &format!("{:?}", outcome.tx_hash))
        .await;
    ctx.notifier
        .notify(
            &format!(
                "Bought {:#x} for {} ETH",
                token,
                wei_to_eth(amount_in)
            ),
            "success",
            serde_json::json!({
                "token": format!("{:#x}", token),
                "amount_eth": wei_to_eth(amount_in),
                "tx_hash": format!("{:?}", outcome.tx_hash),
            }),
        )
        .await;

    if ctx.config.auto_sell.enabled {
        ctx.manager.activate(&token).await?;
        spawn_monitor(
            token,
            ctx.connector.clone(),
            ctx.manager.clone(),
            ctx.engine.clone(),
            ctx.notifier.clone(),
            ctx.ledger.clone(),
            ctx.config.auto_sell.clone(),
            ctx.cancel.clone(),
        );
    } else {
        info!(
            "auto-sell disabled, position {:#x} stays unmonitored until closed manually",
            token
        );
    }

    Ok(())
}

/// Check system health (RPC reachability, chain id, wallet balance)
pub async fn health(config: &Config) -> Result<()> {
    let private_key = Config::private_key()?;
    let connector =
        ChainConnector::connect(config.rpc.clone(), config.chain.clone(), &private_key).await?;

    let block = connector.block_number().await?;
    let balance = connector.get_balance(connector.address()).await?;

    println!("RPC:      OK (block {})", block);
    println!("Chain ID: {} (verified)", config.chain.chain_id);
    println!("Wallet:   {:#x}", connector.address());
    println!("Balance:  {:.6} ETH", wei_to_eth(balance));

    Ok(())
}

/// Show current configuration with secrets masked
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
