//! The discovery loop.
//!
//! One pass: read a pool snapshot, evaluate the direct pairs, then (if enabled) the
//! cycles through the base tokens, hand the survivors to the dispatcher, and finally
//! train the scorer on whatever outcomes came back. Passes are sequential; only the
//! settlement work runs in background tasks.
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::arb::finder::CycleFinder;
use crate::arb::graph::PoolGraph;
use crate::arb::optimize::{OptimalTrade, OptimizeError, TradeSizeOptimizer};
use crate::arb::path::MultiHopPath;
use crate::arb::pool::PoolId;
use crate::arb::quote::PathQuote;
use crate::arb::token::{Token, TokenId};
use crate::config::Config;
use crate::exec::dispatcher::{ExecutionDispatcher, ExecutionReport, Opportunity, OpportunityKind};
use crate::exec::settlement::Settlement;
use crate::market::prices::PriceOracle;
use crate::market::source::{MarketSnapshot, PairSource};
use crate::score::features::{extract_features, MarketContext};
use crate::score::model::{OpportunityScorer, TrainingExample};

/// Capacity of the execution outcome channel
const REPORT_CHANNEL_SIZE: usize = 1000;

/// Loop behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Whether cycles are searched besides direct pairs
    pub multi_hop_enabled: bool,
    /// Maximum cycle length
    pub max_hops: usize,
    /// Sleep between passes
    pub poll_interval: Duration,
    /// Gas price used as a feature, in wei
    pub gas_price_wei: u128,
}

impl From<&Config> for LoopSettings {
    fn from(config: &Config) -> Self {
        Self {
            multi_hop_enabled: config.multi_hop_enabled,
            max_hops: config.max_hops,
            poll_interval: config.poll_interval,
            gas_price_wei: config.gas_price_wei,
        }
    }
}

/// What the loop watches
#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    /// Token reference data
    pub tokens: HashMap<TokenId, Token>,
    /// Pool pairs evaluated as direct arbitrages
    pub pairs: Vec<(PoolId, PoolId)>,
    /// Start tokens of the cycle search
    pub base_tokens: Vec<TokenId>,
}

/// Counters of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Block of the snapshot
    pub block_number: u64,
    /// Direct pairs evaluated
    pub pairs: usize,
    /// Distinct cycles found
    pub cycles: usize,
    /// Candidates with a positive simulated or quoted profit
    pub profitable: usize,
    /// Candidates handed to the dispatcher
    pub dispatched: usize,
    /// Candidates rejected by the dispatch thresholds
    pub skipped: usize,
    /// Examples the scorer was trained on at the end of the pass
    pub trained_on: usize,
}

impl Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {}: {} pairs, {} cycles, {} profitable, {} dispatched, {} skipped, {} trained",
            self.block_number,
            self.pairs,
            self.cycles,
            self.profitable,
            self.dispatched,
            self.skipped,
            self.trained_on
        )
    }
}

/// Cycles through the base tokens of a snapshot, each with its optimal trade size
#[must_use]
pub fn discover_cycles(
    snapshot: &MarketSnapshot,
    finder: &CycleFinder,
    optimizer: &TradeSizeOptimizer,
    base_tokens: &[TokenId],
) -> Vec<(MultiHopPath, Result<OptimalTrade, OptimizeError>)> {
    let graph = PoolGraph::from_pools(&snapshot.pools);
    finder
        .find_from_all(&graph, base_tokens)
        .into_iter()
        .map(|cycle| {
            let trade = optimizer.optimize(&cycle);
            (cycle, trade)
        })
        .collect()
}

/// Drives discovery, scoring and dispatch
pub struct MainLoop {
    /// Pool reserves
    source: Arc<dyn PairSource>,
    /// Quotes for direct pairs
    settlement: Arc<dyn Settlement>,
    /// Reference prices for features
    prices: Arc<dyn PriceOracle>,
    /// Decision and submission
    dispatcher: Arc<ExecutionDispatcher>,
    /// Confidence model
    scorer: OpportunityScorer,
    /// What to watch
    watchlist: Watchlist,
    /// Loop behaviour
    settings: LoopSettings,
    /// Cycle search
    finder: CycleFinder,
    /// Trade sizing
    optimizer: TradeSizeOptimizer,
    /// Sender handed to dispatch tasks
    reports_tx: mpsc::Sender<ExecutionReport>,
    /// Outcomes of dispatch tasks
    reports_rx: mpsc::Receiver<ExecutionReport>,
    /// Dispatch tasks that may still be running
    in_flight: Vec<JoinHandle<()>>,
}

impl MainLoop {
    /// Creates the loop.
    #[must_use]
    pub fn new(
        source: Arc<dyn PairSource>,
        settlement: Arc<dyn Settlement>,
        prices: Arc<dyn PriceOracle>,
        dispatcher: Arc<ExecutionDispatcher>,
        watchlist: Watchlist,
        settings: LoopSettings,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::channel(REPORT_CHANNEL_SIZE);
        Self {
            source,
            settlement,
            prices,
            dispatcher,
            scorer: OpportunityScorer::default(),
            watchlist,
            settings,
            finder: CycleFinder::new(settings.max_hops),
            optimizer: TradeSizeOptimizer::default(),
            reports_tx,
            reports_rx,
            in_flight: Vec::new(),
        }
    }

    /// Replaces the scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: OpportunityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// The confidence model
    #[must_use]
    pub const fn scorer(&self) -> &OpportunityScorer {
        &self.scorer
    }

    /// Runs passes until ctrl-c, sleeping `poll_interval` between them.
    ///
    /// The signal interrupts a pass in progress as well as the sleep. Dispatches
    /// already spawned are awaited before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handler cannot be installed.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "bot: watching {} pairs and {} base tokens, multi-hop {}",
            self.watchlist.pairs.len(),
            self.watchlist.base_tokens.len(),
            if self.settings.multi_hop_enabled { "on" } else { "off" }
        );

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            let interrupted = tokio::select! {
                signal = &mut shutdown => {
                    signal?;
                    true
                }
                pass = self.run_pass() => {
                    match pass {
                        Ok(summary) => info!("bot: {summary}"),
                        Err(e) => error!("bot: pass failed: {e}"),
                    }
                    false
                }
            };
            if interrupted {
                break;
            }

            let interrupted = tokio::select! {
                signal = &mut shutdown => {
                    signal?;
                    true
                }
                () = tokio::time::sleep(self.settings.poll_interval) => false,
            };
            if interrupted {
                break;
            }
        }

        info!(
            "bot: received shutdown signal, waiting for {} dispatches",
            self.in_flight.len()
        );
        self.finish().await;
        Ok(())
    }

    /// Runs one pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read. Failures of individual pairs or
    /// cycles are logged and skipped.
    pub async fn run_pass(&mut self) -> Result<PassSummary> {
        let snapshot = self.source.snapshot().await?;
        let ctx = MarketContext {
            gas_price_wei: self.settings.gas_price_wei,
            block_number: snapshot.block_number,
            timestamp: snapshot.timestamp,
        };
        let mut summary = PassSummary {
            block_number: snapshot.block_number,
            ..PassSummary::default()
        };

        let pairs = self.watchlist.pairs.clone();
        for (pair_a, pair_b) in pairs {
            summary.pairs += 1;
            self.evaluate_pair(&snapshot, &ctx, pair_a, pair_b, &mut summary)
                .await;
        }

        if self.settings.multi_hop_enabled {
            self.evaluate_cycles(&snapshot, &ctx, &mut summary);
        }

        summary.trained_on = self.drain_and_train();
        Ok(summary)
    }

    /// Quotes a direct pair and considers it for dispatch
    async fn evaluate_pair(
        &mut self,
        snapshot: &MarketSnapshot,
        ctx: &MarketContext,
        pair_a: PoolId,
        pair_b: PoolId,
        summary: &mut PassSummary,
    ) {
        let (Some(pool_a), Some(pool_b)) = (snapshot.pool(&pair_a), snapshot.pool(&pair_b)) else {
            debug!("bot: no reserves for pair {pair_a}/{pair_b}");
            return;
        };
        let path = match MultiHopPath::round_trip(pool_a, pool_b) {
            Ok(path) => path,
            Err(e) => {
                warn!("bot: pair {pair_a}/{pair_b} is not a round trip: {e}");
                return;
            }
        };

        let (profit, profit_token) = match self.settlement.quote_profit(pair_a, pair_b).await {
            Ok(quote) => quote,
            Err(e) => {
                error!("bot: quote for {pair_a}/{pair_b} failed: {e}");
                return;
            }
        };
        if profit.is_zero() {
            return;
        }
        summary.profitable += 1;

        let features = extract_features(&path, &self.watchlist.tokens, self.prices.as_ref(), ctx);
        let confidence = self.scorer.predict_confidence(&features);
        self.consider(
            Opportunity {
                kind: OpportunityKind::Direct { pair_a, pair_b },
                profit,
                profit_token,
                confidence,
                features,
            },
            summary,
        );
    }

    /// Finds, sizes and scores the cycles of the snapshot
    fn evaluate_cycles(&mut self, snapshot: &MarketSnapshot, ctx: &MarketContext, summary: &mut PassSummary) {
        let cycles = discover_cycles(
            snapshot,
            &self.finder,
            &self.optimizer,
            &self.watchlist.base_tokens,
        );
        summary.cycles = cycles.len();

        for (cycle, trade) in cycles {
            let trade = match trade {
                Ok(trade) if trade.is_profitable() => trade,
                Ok(_) => continue,
                Err(e) => {
                    debug!("bot: no trade size for {cycle}: {e}");
                    continue;
                }
            };
            summary.profitable += 1;

            if let Ok(quote) = PathQuote::new(&cycle, trade.amount_in) {
                debug!(
                    "bot: {cycle} {} -> {} ({} bps, ratio {:.6})",
                    quote.amount_in(),
                    quote.amount_out(),
                    quote.profit_margin_bps(),
                    quote.profit_ratio()
                );
            }

            let features = extract_features(&cycle, &self.watchlist.tokens, self.prices.as_ref(), ctx);
            let confidence = self.scorer.predict_confidence(&features);
            self.consider(
                Opportunity {
                    kind: OpportunityKind::Cycle {
                        pools: cycle.pools(),
                        token_in: cycle.start_token(),
                        amount_in: trade.amount_in,
                    },
                    profit: trade.amount_out - trade.amount_in,
                    profit_token: cycle.start_token(),
                    confidence,
                    features,
                },
                summary,
            );
        }
    }

    /// Screens an opportunity; dispatches it in the background if it passes
    fn consider(&mut self, opportunity: Opportunity, summary: &mut PassSummary) {
        match self.dispatcher.screen(&opportunity) {
            Ok(net_profit) => {
                summary.dispatched += 1;
                let task = self
                    .dispatcher
                    .spawn(opportunity, net_profit, self.reports_tx.clone());
                self.in_flight.push(task);
            }
            Err(reason) => {
                summary.skipped += 1;
                debug!("bot: skipping {}: {reason}", opportunity.kind);
            }
        }
    }

    /// Waits for every dispatch task still running, then trains on their outcomes.
    /// Returns the number of new examples.
    pub async fn finish(&mut self) -> usize {
        for task in std::mem::take(&mut self.in_flight) {
            if let Err(e) = task.await {
                error!("bot: dispatch task failed: {e}");
            }
        }
        self.drain_and_train()
    }

    /// Collects finished outcomes and trains the scorer on their labels.
    /// Returns the number of new examples.
    fn drain_and_train(&mut self) -> usize {
        self.in_flight.retain(|task| !task.is_finished());
        let mut examples: Vec<TrainingExample> = Vec::new();
        while let Ok(report) = self.reports_rx.try_recv() {
            examples.extend(report.training_example());
        }
        let count = examples.len();
        if count > 0 {
            self.scorer.train(examples);
        }
        count
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy::primitives::{TxHash, U256};
    use async_trait::async_trait;

    use super::*;
    use crate::arb::test_helpers::*;
    use crate::exec::dispatcher::DispatcherConfig;
    use crate::exec::settlement::{Confirmation, GasConfig};
    use crate::market::prices::StaticPrices;
    use crate::market::source::FixedPairSource;
    use crate::score::model::TrainingConfig;

    const E18: u128 = 1_000_000_000_000_000_000;

    #[derive(Default)]
    struct RecordingSettlement {
        quotes: AtomicUsize,
        cycles: AtomicUsize,
        arbitrages: AtomicUsize,
        /// Confirmations still to report as reverted
        reverts: AtomicUsize,
    }

    #[async_trait]
    impl Settlement for RecordingSettlement {
        async fn quote_profit(&self, _pair_a: PoolId, _pair_b: PoolId) -> Result<(U256, TokenId)> {
            self.quotes.fetch_add(1, Ordering::SeqCst);
            Ok((U256::from(E18 / 10), token_id("A")))
        }

        async fn execute_arbitrage(&self, _pair_a: PoolId, _pair_b: PoolId, _gas: GasConfig) -> Result<TxHash> {
            self.arbitrages.fetch_add(1, Ordering::SeqCst);
            Ok(TxHash::with_last_byte(1))
        }

        async fn execute_cycle(
            &self,
            _pools: &[PoolId],
            _token_in: TokenId,
            _amount_in: U256,
            _gas: GasConfig,
        ) -> Result<TxHash> {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            Ok(TxHash::with_last_byte(2))
        }

        async fn wait_for_confirmation(&self, _tx: TxHash) -> Result<Confirmation> {
            let reverted = self
                .reverts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if reverted {
                Ok(Confirmation::Reverted)
            } else {
                Ok(Confirmation::Confirmed { profit: None })
            }
        }
    }

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            block_number: 42,
            timestamp: 1_700_000_000,
            pools: vec![
                pool("P1", "A", "B", 1_000 * E18, 1_000 * E18),
                pool("P2", "B", "C", 2_000 * E18, 1_800 * E18),
                pool("P3", "C", "A", 1_500 * E18, 1_600 * E18),
            ],
        }
    }

    fn prices() -> Arc<StaticPrices> {
        Arc::new(
            [(token_id("A"), 100.0), (token_id("WETH"), 2_000.0)]
                .into_iter()
                .collect(),
        )
    }

    fn tokens() -> HashMap<TokenId, Token> {
        ["A", "B", "C"]
            .into_iter()
            .map(|label| (token_id(label), token(label, 18)))
            .collect()
    }

    fn dispatcher(settlement: Arc<RecordingSettlement>, config: DispatcherConfig) -> Arc<ExecutionDispatcher> {
        let decimals = tokens().values().map(|token| (token.id, token.decimals)).collect();
        Arc::new(ExecutionDispatcher::new(
            settlement,
            prices(),
            decimals,
            DispatcherConfig {
                native_token: token_id("WETH"),
                ..config
            },
        ))
    }

    fn main_loop(settlement: Arc<RecordingSettlement>, min_profit_usd: f64, multi_hop_enabled: bool) -> MainLoop {
        let dispatcher = dispatcher(
            Arc::clone(&settlement),
            DispatcherConfig {
                min_profit_usd,
                ..DispatcherConfig::default()
            },
        );

        MainLoop::new(
            Arc::new(FixedPairSource::new(snapshot())),
            settlement,
            prices(),
            dispatcher,
            Watchlist {
                tokens: tokens(),
                pairs: vec![(pool_id("P1"), pool_id("P9"))],
                base_tokens: vec![token_id("A"), token_id("B")],
            },
            LoopSettings {
                multi_hop_enabled,
                max_hops: 3,
                poll_interval: Duration::from_millis(10),
                gas_price_wei: 1_000_000_000,
            },
        )
        .with_scorer(OpportunityScorer::new(TrainingConfig {
            seed: Some(1),
            ..TrainingConfig::default()
        }))
    }

    #[tokio::test]
    async fn test_pass_dispatches_profitable_cycle() {
        let settlement = Arc::new(RecordingSettlement::default());
        let mut bot = main_loop(Arc::clone(&settlement), 1.0, true);

        let summary = bot.run_pass().await.unwrap();

        // The triangle seen from A and from B is deduplicated to its two directions
        assert_eq!(summary.block_number, 42);
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.profitable, 1);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.skipped, 0);
        // Pair P1/P9 has no reserves in the snapshot and is never quoted
        assert_eq!(summary.pairs, 1);
        assert_eq!(settlement.quotes.load(Ordering::SeqCst), 0);

        // The dispatch task's outcome becomes a training example
        assert_eq!(bot.finish().await, 1);
        assert_eq!(settlement.cycles.load(Ordering::SeqCst), 1);
        assert!(bot.scorer().is_trained());
    }

    #[tokio::test]
    async fn test_pass_below_threshold_is_not_labelled() {
        let settlement = Arc::new(RecordingSettlement::default());
        let mut bot = main_loop(Arc::clone(&settlement), 1e9, true);

        let summary = bot.run_pass().await.unwrap();

        assert_eq!(summary.dispatched, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.trained_on, 0);
        assert_eq!(bot.scorer().corpus_len(), 0);
        assert!(!bot.scorer().is_trained());
        assert_eq!(settlement.cycles.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_threshold_skip_does_not_block_later_dispatch() {
        let settlement = Arc::new(RecordingSettlement::default());
        let mut bot = main_loop(Arc::clone(&settlement), 1e9, true);
        assert_eq!(bot.run_pass().await.unwrap().dispatched, 0);

        bot.dispatcher = dispatcher(
            Arc::clone(&settlement),
            DispatcherConfig {
                min_profit_usd: 1.0,
                ..DispatcherConfig::default()
            },
        );
        for _ in 0..3 {
            let summary = bot.run_pass().await.unwrap();
            assert_eq!(summary.dispatched, 1);
            assert_eq!(summary.skipped, 0);
            bot.finish().await;
        }
        assert_eq!(settlement.cycles.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reverted_cycle_is_retried_after_low_confidence_streak() {
        let settlement = Arc::new(RecordingSettlement {
            reverts: AtomicUsize::new(1),
            ..RecordingSettlement::default()
        });
        let mut bot = main_loop(Arc::clone(&settlement), 1.0, true);
        bot.dispatcher = dispatcher(
            Arc::clone(&settlement),
            DispatcherConfig {
                min_profit_usd: 1.0,
                explore_after: 1,
                ..DispatcherConfig::default()
            },
        );

        // The revert is the only label, so the model now distrusts the cycle
        assert_eq!(bot.run_pass().await.unwrap().dispatched, 1);
        assert_eq!(bot.finish().await, 1);

        let summary = bot.run_pass().await.unwrap();
        assert_eq!(summary.dispatched, 0);
        assert_eq!(summary.skipped, 1);

        let summary = bot.run_pass().await.unwrap();
        assert_eq!(summary.dispatched, 1);
        assert_eq!(bot.finish().await, 1);
        assert_eq!(settlement.cycles.load(Ordering::SeqCst), 2);
        assert_eq!(bot.scorer().corpus_len(), 2);
    }

    #[tokio::test]
    async fn test_direct_pair_is_quoted_and_dispatched() {
        let settlement = Arc::new(RecordingSettlement::default());
        let mut bot = main_loop(Arc::clone(&settlement), 1.0, false);
        bot.watchlist.pairs = vec![(pool_id("P1"), pool_id("P4"))];
        let mut market = snapshot();
        market
            .pools
            .push(pool("P4", "B", "A", 1_000 * E18, 1_100 * E18));
        bot.source = Arc::new(FixedPairSource::new(market));

        let summary = bot.run_pass().await.unwrap();

        assert_eq!(summary.cycles, 0);
        assert_eq!(summary.profitable, 1);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(settlement.quotes.load(Ordering::SeqCst), 1);

        assert_eq!(bot.finish().await, 1);
        assert_eq!(settlement.arbitrages.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_discover_cycles_sizes_each_cycle() {
        let cycles = discover_cycles(
            &snapshot(),
            &CycleFinder::new(3),
            &TradeSizeOptimizer::default(),
            &[token_id("A")],
        );
        assert_eq!(cycles.len(), 2);
        let profitable = cycles
            .iter()
            .filter(|(_, trade)| matches!(trade, Ok(trade) if trade.is_profitable()))
            .count();
        assert_eq!(profitable, 1);
    }
}
