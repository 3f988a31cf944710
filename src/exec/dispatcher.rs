//! Execution dispatch: the last gate between a scored opportunity and the chain.
//!
//! All submissions for the shared account go through one permit, so at most one
//! settlement transaction is in flight at a time. Waiting for the permit is bounded
//! twice: by the number of pending requests and by the acquisition timeout. Past
//! either bound the opportunity is skipped, never queued indefinitely.
//!
//! A model that stopped trusting every candidate would never see another outcome to
//! learn from. After `explore_after` consecutive low-confidence skips, the next
//! candidate that clears the profit threshold is executed anyway and its outcome trains
//! the model like any other.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{TxHash, U256};
use bigdecimal::{BigDecimal, ToPrimitive};
use derive_more::Display;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::settlement::{Confirmation, GasConfig, Settlement};
use crate::arb::pool::PoolId;
use crate::arb::token::TokenId;
use crate::market::prices::PriceOracle;
use crate::notify::SlackNotifier;
use crate::score::features::MarketFeatures;
use crate::score::model::TrainingExample;
use crate::utils::constants::WETH;

/// Default bound on requests waiting for or holding the permit
pub const DEFAULT_QUEUE_DEPTH: usize = 20;
/// Default bound on the wait for the permit
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);
/// Default number of consecutive low-confidence skips before one is executed anyway
pub const DEFAULT_EXPLORE_AFTER: usize = 50;

/// What gets submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpportunityKind {
    /// Two pools of the same pair, settled by `executeArbitrage`
    Direct {
        /// Pool bought from
        pair_a: PoolId,
        /// Pool sold into
        pair_b: PoolId,
    },
    /// Closed path of any length, settled by `executeCycle`
    Cycle {
        /// Pools in trading order
        pools: Vec<PoolId>,
        /// Token sold into the first pool
        token_in: TokenId,
        /// Optimal input amount
        amount_in: U256,
    },
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { pair_a, pair_b } => write!(f, "direct {pair_a}/{pair_b}"),
            Self::Cycle { pools, token_in, .. } => {
                write!(f, "{}-hop cycle from {token_in}", pools.len())
            }
        }
    }
}

/// A candidate ready for the dispatch decision
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    /// What to submit
    pub kind: OpportunityKind,
    /// Expected profit, in base units of `profit_token`
    pub profit: U256,
    /// Token the profit is denominated in
    pub profit_token: TokenId,
    /// Model confidence in `[0, 1]`
    pub confidence: f64,
    /// Features the confidence was computed from
    pub features: MarketFeatures,
}

/// Why an opportunity was not submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SkipReason {
    /// Net profit below the configured minimum
    #[display("below profit threshold")]
    BelowProfitThreshold,
    /// Confidence below the configured minimum
    #[display("low confidence")]
    LowConfidence,
    /// The profit or gas token has no reference price or metadata
    #[display("missing price")]
    MissingPrice,
    /// Too many requests already waiting for the permit
    #[display("queue full")]
    QueueFull,
    /// The permit was not acquired in time
    #[display("lock timeout")]
    LockTimeout,
}

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Confirmed on chain
    Executed {
        /// Settlement transaction
        tx: TxHash,
        /// Profit the contract reported, if it emitted one
        realized_profit: Option<U256>,
    },
    /// Included but reverted
    Reverted {
        /// Settlement transaction
        tx: TxHash,
    },
    /// Submission or confirmation failed
    Failed(String),
    /// Not submitted
    Skipped(SkipReason),
}

/// Share of `expected` that `realized` amounts to, clamped to `[0, 1]`.
/// Nothing was expected means nothing could be missed: 1.
#[must_use]
pub fn realized_ratio(realized: U256, expected: U256) -> f64 {
    if expected.is_zero() {
        return 1.0;
    }
    (f64::from(realized) / f64::from(expected)).clamp(0.0, 1.0)
}

/// Outcome of an opportunity, sent back to the discovery loop
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Features at decision time
    pub features: MarketFeatures,
    /// Profit expected at decision time, in base units of the profit token
    pub expected_profit: U256,
    /// What happened
    pub outcome: Outcome,
}

impl ExecutionReport {
    /// Labelled example for the scorer, only for opportunities that reached the chain.
    ///
    /// The target is the realized profit ratio: the share of the expected profit the
    /// settlement returned. A confirmation without a reported profit counts as fully
    /// realized, a revert or failed submission as nothing. Skipped opportunities say
    /// nothing about execution and carry no label.
    #[must_use]
    pub fn training_example(&self) -> Option<TrainingExample> {
        let target = match &self.outcome {
            Outcome::Executed {
                realized_profit: Some(profit),
                ..
            } => realized_ratio(*profit, self.expected_profit),
            Outcome::Executed {
                realized_profit: None,
                ..
            } => 1.0,
            Outcome::Reverted { .. } | Outcome::Failed(_) => 0.0,
            Outcome::Skipped(_) => return None,
        };
        Some(TrainingExample {
            features: self.features,
            target,
            executed: true,
        })
    }
}

/// Dispatch thresholds and limits
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Minimum net profit, in the reference currency
    pub min_profit_usd: f64,
    /// Minimum model confidence
    pub min_confidence: f64,
    /// Gas parameters of submissions
    pub gas: GasConfig,
    /// Token gas is paid in
    pub native_token: TokenId,
    /// Bound on requests waiting for or holding the permit
    pub queue_depth: usize,
    /// Bound on the wait for the permit
    pub lock_timeout: Duration,
    /// Consecutive low-confidence skips before one is executed anyway, 0 never
    pub explore_after: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            min_profit_usd: 1.0,
            min_confidence: 0.5,
            gas: GasConfig {
                gas_price_wei: 1_000_000_000,
                gas_limit: 300_000,
            },
            native_token: TokenId::from(WETH),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            explore_after: DEFAULT_EXPLORE_AFTER,
        }
    }
}

/// Releases a pending-queue slot when dropped
struct QueueSlot<'a> {
    /// Counter the slot was taken from
    pending: &'a AtomicUsize,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decides on and submits opportunities, one settlement at a time.
pub struct ExecutionDispatcher {
    /// Settlement contract
    settlement: Arc<dyn Settlement>,
    /// Reference prices
    prices: Arc<dyn PriceOracle>,
    /// Decimals of the tokens profits can be denominated in
    decimals: HashMap<TokenId, u8>,
    /// Thresholds and limits
    config: DispatcherConfig,
    /// The single submission permit
    lock: Semaphore,
    /// Requests waiting for or holding the permit
    pending: AtomicUsize,
    /// Low-confidence skips since the last candidate went through
    low_confidence_streak: AtomicUsize,
    /// Alerts on reverts
    notifier: Option<SlackNotifier>,
}

impl ExecutionDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        settlement: Arc<dyn Settlement>,
        prices: Arc<dyn PriceOracle>,
        decimals: HashMap<TokenId, u8>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            settlement,
            prices,
            decimals,
            config,
            lock: Semaphore::new(1),
            pending: AtomicUsize::new(0),
            low_confidence_streak: AtomicUsize::new(0),
            notifier: None,
        }
    }

    /// Alerts reverts through `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Option<SlackNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Requests currently waiting for or holding the permit
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Reference value of the gas a submission may burn
    #[allow(clippy::cast_precision_loss)]
    fn gas_cost(&self) -> Option<f64> {
        let native_price = self.prices.price(&self.config.native_token)?;
        let gas = &self.config.gas;
        Some(gas.gas_price_wei as f64 * gas.gas_limit as f64 / 1e18 * native_price)
    }

    /// Reference value of `amount` base units of `token`
    fn reference_value(&self, amount: U256, token: &TokenId) -> Option<f64> {
        let price = self.prices.price(token)?;
        let decimals = self.decimals.get(token)?;
        let units = BigDecimal::from_str(&format!("{amount}e-{decimals}")).ok()?;
        Some(units.to_f64()? * price)
    }

    /// Net profit of the opportunity after gas, in the reference currency.
    ///
    /// # Errors
    ///
    /// Returns [`SkipReason::MissingPrice`] if the profit cannot be valued.
    pub fn net_profit(&self, opportunity: &Opportunity) -> Result<f64, SkipReason> {
        let profit = self
            .reference_value(opportunity.profit, &opportunity.profit_token)
            .ok_or(SkipReason::MissingPrice)?;
        let gas_cost = self.gas_cost().ok_or(SkipReason::MissingPrice)?;
        Ok(profit - gas_cost)
    }

    /// Applies the profit and confidence thresholds. Returns the net profit.
    ///
    /// A low-confidence candidate still passes once every `explore_after` skips.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] of the first failed check.
    pub fn screen(&self, opportunity: &Opportunity) -> Result<f64, SkipReason> {
        let net_profit = self.net_profit(opportunity)?;
        if net_profit < self.config.min_profit_usd {
            return Err(SkipReason::BelowProfitThreshold);
        }
        if opportunity.confidence >= self.config.min_confidence {
            self.low_confidence_streak.store(0, Ordering::SeqCst);
            return Ok(net_profit);
        }

        let explore_after = self.config.explore_after;
        let streak = self.low_confidence_streak.fetch_add(1, Ordering::SeqCst);
        if explore_after > 0 && streak >= explore_after {
            self.low_confidence_streak.store(0, Ordering::SeqCst);
            info!(
                "dispatcher: exploring {} at confidence {:.3} after {streak} low-confidence skips",
                opportunity.kind, opportunity.confidence
            );
            return Ok(net_profit);
        }
        Err(SkipReason::LowConfidence)
    }

    /// Takes a pending-queue slot, `None` if the queue is full
    fn reserve_slot(&self) -> Option<QueueSlot<'_>> {
        let depth = self.config.queue_depth;
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                (pending < depth).then_some(pending + 1)
            })
            .ok()?;
        Some(QueueSlot {
            pending: &self.pending,
        })
    }

    /// Screens, then executes the opportunity.
    pub async fn dispatch(&self, opportunity: &Opportunity) -> Outcome {
        match self.screen(opportunity) {
            Ok(net_profit) => self.execute(opportunity, net_profit).await,
            Err(reason) => {
                debug!("dispatcher: skipping {}: {reason}", opportunity.kind);
                Outcome::Skipped(reason)
            }
        }
    }

    /// Executes an opportunity that passed [`ExecutionDispatcher::screen`].
    ///
    /// Waits for the submission permit within the configured bounds, submits, waits for
    /// the confirmation and releases the permit on every path out.
    pub async fn execute(&self, opportunity: &Opportunity, net_profit: f64) -> Outcome {
        let outcome = {
            let Some(_slot) = self.reserve_slot() else {
                debug!("dispatcher: skipping {}: queue full", opportunity.kind);
                return Outcome::Skipped(SkipReason::QueueFull);
            };
            let _permit = match timeout(self.config.lock_timeout, self.lock.acquire()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(e)) => return Outcome::Failed(e.to_string()),
                Err(_) => {
                    debug!("dispatcher: skipping {}: lock timeout", opportunity.kind);
                    return Outcome::Skipped(SkipReason::LockTimeout);
                }
            };

            info!(
                "dispatcher: executing {} for ${net_profit:.2} net, confidence {:.3}",
                opportunity.kind, opportunity.confidence
            );
            self.submit(opportunity).await
        };

        match &outcome {
            Outcome::Executed { tx, .. } => info!("dispatcher: {} confirmed in {tx}", opportunity.kind),
            Outcome::Reverted { tx } => {
                error!("dispatcher: {} reverted in {tx}", opportunity.kind);
                self.alert(&format!("{} reverted in {tx}", opportunity.kind)).await;
            }
            Outcome::Failed(reason) => error!("dispatcher: {} failed: {reason}", opportunity.kind),
            Outcome::Skipped(_) => {}
        }
        outcome
    }

    /// Submits and waits for exactly one confirmation
    async fn submit(&self, opportunity: &Opportunity) -> Outcome {
        let gas = self.config.gas;
        let submission = match &opportunity.kind {
            OpportunityKind::Direct { pair_a, pair_b } => {
                self.settlement.execute_arbitrage(*pair_a, *pair_b, gas).await
            }
            OpportunityKind::Cycle {
                pools,
                token_in,
                amount_in,
            } => {
                self.settlement
                    .execute_cycle(pools, *token_in, *amount_in, gas)
                    .await
            }
        };
        let tx = match submission {
            Ok(tx) => tx,
            Err(e) => return Outcome::Failed(format!("submission failed: {e}")),
        };

        match self.settlement.wait_for_confirmation(tx).await {
            Ok(Confirmation::Confirmed { profit }) => Outcome::Executed {
                tx,
                realized_profit: profit,
            },
            Ok(Confirmation::Reverted) => Outcome::Reverted { tx },
            Err(e) => Outcome::Failed(format!("confirmation of {tx} failed: {e}")),
        }
    }

    /// Sends an alert if a notifier is configured
    async fn alert(&self, message: &str) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.send_alert(message).await {
                warn!("dispatcher: failed to send alert: {e}");
            }
        }
    }

    /// Executes a screened opportunity in a background task and reports the outcome
    /// on `reports`.
    pub fn spawn(
        self: &Arc<Self>,
        opportunity: Opportunity,
        net_profit: f64,
        reports: mpsc::Sender<ExecutionReport>,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = dispatcher.execute(&opportunity, net_profit).await;
            let report = ExecutionReport {
                features: opportunity.features,
                expected_profit: opportunity.profit,
                outcome,
            };
            if let Err(e) = reports.send(report).await {
                error!("dispatcher: outcome channel closed: {e}");
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use eyre::{eyre, Result};

    use super::*;
    use crate::arb::test_helpers::*;
    use crate::market::prices::StaticPrices;

    const E18: u128 = 1_000_000_000_000_000_000;
    const CONFIRMED: Confirmation = Confirmation::Confirmed { profit: None };

    struct MockSettlement {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        submissions: AtomicUsize,
        fail_submission: AtomicBool,
        delay: Duration,
        confirmation: Confirmation,
    }

    impl MockSettlement {
        fn new(delay: Duration, confirmation: Confirmation) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                submissions: AtomicUsize::new(0),
                fail_submission: AtomicBool::new(false),
                delay,
                confirmation,
            }
        }

        fn enter(&self) -> Result<TxHash> {
            let submissions = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_submission.load(Ordering::SeqCst) {
                return Err(eyre!("nonce too low"));
            }
            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            Ok(TxHash::with_last_byte(u8::try_from(submissions).unwrap()))
        }
    }

    #[async_trait]
    impl Settlement for MockSettlement {
        async fn quote_profit(&self, _pair_a: PoolId, _pair_b: PoolId) -> Result<(U256, TokenId)> {
            Ok((U256::from(2 * E18), token_id("A")))
        }

        async fn execute_arbitrage(&self, _pair_a: PoolId, _pair_b: PoolId, _gas: GasConfig) -> Result<TxHash> {
            self.enter()
        }

        async fn execute_cycle(
            &self,
            _pools: &[PoolId],
            _token_in: TokenId,
            _amount_in: U256,
            _gas: GasConfig,
        ) -> Result<TxHash> {
            self.enter()
        }

        async fn wait_for_confirmation(&self, _tx: TxHash) -> Result<Confirmation> {
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.confirmation)
        }
    }

    fn dispatcher(settlement: Arc<MockSettlement>, config: DispatcherConfig) -> ExecutionDispatcher {
        let prices: StaticPrices = [(token_id("A"), 1.0), (token_id("WETH"), 2_000.0)]
            .into_iter()
            .collect();
        let decimals = HashMap::from([(token_id("A"), 18)]);
        ExecutionDispatcher::new(settlement, Arc::new(prices), decimals, config)
    }

    fn config() -> DispatcherConfig {
        // gas: 1 gwei * 300k * 2000 = $0.60
        DispatcherConfig {
            native_token: token_id("WETH"),
            ..DispatcherConfig::default()
        }
    }

    fn opportunity(profit: u128, confidence: f64) -> Opportunity {
        Opportunity {
            kind: OpportunityKind::Direct {
                pair_a: pool_id("P1"),
                pair_b: pool_id("P2"),
            },
            profit: U256::from(profit),
            profit_token: token_id("A"),
            confidence,
            features: MarketFeatures::default(),
        }
    }

    #[test]
    fn test_net_profit() {
        let settlement = Arc::new(MockSettlement::new(Duration::ZERO, CONFIRMED));
        let dispatcher = dispatcher(settlement, config());
        let net = dispatcher.net_profit(&opportunity(2 * E18, 0.9)).unwrap();
        assert!((net - 1.4).abs() < 1e-9, "{net}");
    }

    #[tokio::test]
    async fn test_skips_below_threshold_and_low_confidence() {
        let settlement = Arc::new(MockSettlement::new(Duration::ZERO, CONFIRMED));
        let dispatcher = dispatcher(Arc::clone(&settlement), config());

        // $1.50 - $0.60 < $1
        assert_eq!(
            dispatcher.dispatch(&opportunity(3 * E18 / 2, 0.9)).await,
            Outcome::Skipped(SkipReason::BelowProfitThreshold)
        );
        assert_eq!(
            dispatcher.dispatch(&opportunity(2 * E18, 0.4)).await,
            Outcome::Skipped(SkipReason::LowConfidence)
        );
        assert_eq!(settlement.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skips_missing_price() {
        let settlement = Arc::new(MockSettlement::new(Duration::ZERO, CONFIRMED));
        let dispatcher = dispatcher(settlement, config());
        let mut unpriced = opportunity(2 * E18, 0.9);
        unpriced.profit_token = token_id("B");
        assert_eq!(
            dispatcher.dispatch(&unpriced).await,
            Outcome::Skipped(SkipReason::MissingPrice)
        );
    }

    #[tokio::test]
    async fn test_executes_cycle() {
        let settlement = Arc::new(MockSettlement::new(Duration::ZERO, CONFIRMED));
        let dispatcher = dispatcher(Arc::clone(&settlement), config());
        let cycle = Opportunity {
            kind: OpportunityKind::Cycle {
                pools: vec![pool_id("P1"), pool_id("P2"), pool_id("P3")],
                token_in: token_id("A"),
                amount_in: U256::from(E18),
            },
            ..opportunity(2 * E18, 0.9)
        };
        assert!(matches!(dispatcher.dispatch(&cycle).await, Outcome::Executed { .. }));
        assert_eq!(settlement.submissions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let settlement = Arc::new(MockSettlement::new(
            Duration::from_millis(50),
            CONFIRMED,
        ));
        let dispatcher = dispatcher(Arc::clone(&settlement), config());
        let first = opportunity(2 * E18, 0.9);
        let second = opportunity(3 * E18, 0.9);

        let (a, b) = tokio::join!(dispatcher.dispatch(&first), dispatcher.dispatch(&second));

        assert!(matches!(a, Outcome::Executed { .. }));
        assert!(matches!(b, Outcome::Executed { .. }));
        assert_eq!(settlement.submissions.load(Ordering::SeqCst), 2);
        assert_eq!(settlement.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_queue_full() {
        let settlement = Arc::new(MockSettlement::new(
            Duration::from_millis(200),
            CONFIRMED,
        ));
        let dispatcher = dispatcher(
            Arc::clone(&settlement),
            DispatcherConfig {
                queue_depth: 1,
                ..config()
            },
        );
        let first = opportunity(2 * E18, 0.9);
        let second = opportunity(2 * E18, 0.9);

        let (a, b) = tokio::join!(dispatcher.dispatch(&first), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let started = tokio::time::Instant::now();
            let outcome = dispatcher.dispatch(&second).await;
            (outcome, started.elapsed())
        });

        assert!(matches!(a, Outcome::Executed { .. }));
        assert_eq!(b.0, Outcome::Skipped(SkipReason::QueueFull));
        assert!(b.1 < DEFAULT_LOCK_TIMEOUT);
        assert_eq!(settlement.submissions.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let settlement = Arc::new(MockSettlement::new(
            Duration::from_millis(300),
            CONFIRMED,
        ));
        let dispatcher = dispatcher(
            Arc::clone(&settlement),
            DispatcherConfig {
                lock_timeout: Duration::from_millis(30),
                ..config()
            },
        );
        let first = opportunity(2 * E18, 0.9);
        let second = opportunity(2 * E18, 0.9);

        let (a, b) = tokio::join!(dispatcher.dispatch(&first), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            dispatcher.dispatch(&second).await
        });

        assert!(matches!(a, Outcome::Executed { .. }));
        assert_eq!(b, Outcome::Skipped(SkipReason::LockTimeout));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_revert_is_reported() {
        let settlement = Arc::new(MockSettlement::new(Duration::ZERO, Confirmation::Reverted));
        let dispatcher = dispatcher(settlement, config());
        let outcome = dispatcher.dispatch(&opportunity(2 * E18, 0.9)).await;
        assert_eq!(
            outcome,
            Outcome::Reverted {
                tx: TxHash::with_last_byte(1)
            }
        );
    }

    #[tokio::test]
    async fn test_failed_submission_releases_lock() {
        let settlement = Arc::new(MockSettlement::new(Duration::ZERO, CONFIRMED));
        settlement.fail_submission.store(true, Ordering::SeqCst);
        let dispatcher = dispatcher(Arc::clone(&settlement), config());

        let outcome = dispatcher.dispatch(&opportunity(2 * E18, 0.9)).await;
        assert!(matches!(outcome, Outcome::Failed(reason) if reason.contains("nonce too low")));

        settlement.fail_submission.store(false, Ordering::SeqCst);
        let outcome = dispatcher.dispatch(&opportunity(2 * E18, 0.9)).await;
        assert!(matches!(outcome, Outcome::Executed { .. }));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_spawn_reports_outcome() {
        let settlement = Arc::new(MockSettlement::new(Duration::ZERO, CONFIRMED));
        let dispatcher = Arc::new(dispatcher(settlement, config()));
        let (tx, mut rx) = mpsc::channel(4);

        let opportunity = opportunity(2 * E18, 0.9);
        let net = dispatcher.screen(&opportunity).unwrap();
        dispatcher.spawn(opportunity, net, tx).await.unwrap();

        let report = rx.recv().await.unwrap();
        assert!(matches!(report.outcome, Outcome::Executed { .. }));
        assert_eq!(report.expected_profit, U256::from(2 * E18));
        let example = report.training_example().unwrap();
        assert_eq!(example.target, 1.0);
        assert!(example.executed);
    }

    #[tokio::test]
    async fn test_realized_profit_sets_target() {
        let settlement = Arc::new(MockSettlement::new(
            Duration::ZERO,
            Confirmation::Confirmed {
                profit: Some(U256::from(E18 / 2)),
            },
        ));
        let dispatcher = Arc::new(dispatcher(settlement, config()));
        let (tx, mut rx) = mpsc::channel(4);

        let opportunity = opportunity(2 * E18, 0.9);
        let net = dispatcher.screen(&opportunity).unwrap();
        dispatcher.spawn(opportunity, net, tx).await.unwrap();

        let report = rx.recv().await.unwrap();
        assert_eq!(
            report.outcome,
            Outcome::Executed {
                tx: TxHash::with_last_byte(1),
                realized_profit: Some(U256::from(E18 / 2)),
            }
        );
        let example = report.training_example().unwrap();
        assert!((example.target - 0.25).abs() < 1e-12, "{}", example.target);
    }

    #[test]
    fn test_realized_ratio() {
        assert!((realized_ratio(U256::from(3), U256::from(4)) - 0.75).abs() < 1e-12);
        assert_eq!(realized_ratio(U256::from(9), U256::from(4)), 1.0);
        assert_eq!(realized_ratio(U256::ZERO, U256::from(4)), 0.0);
        assert_eq!(realized_ratio(U256::from(1), U256::ZERO), 1.0);
    }

    #[tokio::test]
    async fn test_explores_after_low_confidence_streak() {
        let settlement = Arc::new(MockSettlement::new(Duration::ZERO, CONFIRMED));
        let dispatcher = dispatcher(
            Arc::clone(&settlement),
            DispatcherConfig {
                explore_after: 2,
                ..config()
            },
        );
        let doubtful = opportunity(2 * E18, 0.01);

        for _ in 0..2 {
            assert_eq!(
                dispatcher.dispatch(&doubtful).await,
                Outcome::Skipped(SkipReason::LowConfidence)
            );
        }
        assert!(matches!(dispatcher.dispatch(&doubtful).await, Outcome::Executed { .. }));
        // The streak starts over
        assert_eq!(
            dispatcher.dispatch(&doubtful).await,
            Outcome::Skipped(SkipReason::LowConfidence)
        );
        assert_eq!(settlement.submissions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exploration_disabled() {
        let settlement = Arc::new(MockSettlement::new(Duration::ZERO, CONFIRMED));
        let dispatcher = dispatcher(
            Arc::clone(&settlement),
            DispatcherConfig {
                explore_after: 0,
                ..config()
            },
        );
        for _ in 0..10 {
            assert_eq!(
                dispatcher.dispatch(&opportunity(2 * E18, 0.01)).await,
                Outcome::Skipped(SkipReason::LowConfidence)
            );
        }
        assert_eq!(settlement.submissions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_training_labels() {
        let report = |outcome| ExecutionReport {
            features: MarketFeatures::default(),
            expected_profit: U256::from(100),
            outcome,
        };
        let confirmed = report(Outcome::Executed {
            tx: TxHash::ZERO,
            realized_profit: None,
        })
        .training_example()
        .unwrap();
        assert_eq!((confirmed.target, confirmed.executed), (1.0, true));

        let reverted = report(Outcome::Reverted { tx: TxHash::ZERO })
            .training_example()
            .unwrap();
        assert_eq!((reverted.target, reverted.executed), (0.0, true));

        for reason in [
            SkipReason::BelowProfitThreshold,
            SkipReason::LowConfidence,
            SkipReason::MissingPrice,
            SkipReason::QueueFull,
            SkipReason::LockTimeout,
        ] {
            assert!(report(Outcome::Skipped(reason)).training_example().is_none());
        }
    }
}
