//! Trade sizing by ternary search.
//!
//! The profit `f(x) = simulate(path, x) − x` of a constant-product path is treated as
//! unimodal on the search interval. That holds near realistic trade sizes but is not a
//! proven global property of multi-hop, multi-fee chains: pathological reserves can make
//! the search settle on a local optimum. The result is a local optimum, nothing more.
use alloy::primitives::{I256, U256};
use log::trace;
use thiserror::Error;

use super::path::MultiHopPath;
use super::simulate::{simulate_path, SimulationError};

/// Default number of ternary search iterations
pub const DEFAULT_ITERATIONS: usize = 30;

/// Default upper bound of the search, in basis points of the first hop's input reserve
pub const DEFAULT_MAX_INPUT_BPS: u32 = 2_000;

/// Why no trade size could be found
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum OptimizeError {
    /// The search interval is empty
    #[error("empty search interval [{min}, {max}]")]
    EmptyInterval {
        /// Lower bound
        min: U256,
        /// Upper bound
        max: U256,
    },
    /// A probe hit a drained pool or rounded to nothing
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Best trade size found for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimalTrade {
    /// Input amount, in the path's start token
    pub amount_in: U256,
    /// Simulated output, in the path's start token
    pub amount_out: U256,
}

impl OptimalTrade {
    /// Simulated profit, negative when the path loses at every size
    #[must_use]
    pub fn profit(&self) -> I256 {
        I256::from_raw(self.amount_out).saturating_sub(I256::from_raw(self.amount_in))
    }

    /// Whether the trade returns more than it takes
    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.amount_out > self.amount_in
    }
}

/// Finds the input amount maximizing simulated profit of a path.
#[derive(Debug, Clone, Copy)]
pub struct TradeSizeOptimizer {
    /// Number of ternary search iterations
    iterations: usize,
    /// Upper search bound as a fraction of the first input reserve, in basis points
    max_input_bps: u32,
}

impl Default for TradeSizeOptimizer {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS, DEFAULT_MAX_INPUT_BPS)
    }
}

impl TradeSizeOptimizer {
    /// Creates an optimizer.
    #[must_use]
    pub const fn new(iterations: usize, max_input_bps: u32) -> Self {
        Self {
            iterations,
            max_input_bps,
        }
    }

    /// Default search interval for a path: from 1 base unit up to `max_input_bps`
    /// of the first hop's input reserve.
    #[must_use]
    pub fn search_bounds(&self, path: &MultiHopPath) -> (U256, U256) {
        let reserve_in = path
            .edges()
            .first()
            .map_or(U256::ZERO, |edge| edge.reserve_in);
        let max = reserve_in.saturating_mul(U256::from(self.max_input_bps)) / U256::from(10_000);
        (U256::from(1), max)
    }

    /// Optimizes over the default interval of the path.
    ///
    /// # Errors
    ///
    /// See [`TradeSizeOptimizer::optimize_within`].
    pub fn optimize(&self, path: &MultiHopPath) -> Result<OptimalTrade, OptimizeError> {
        let (min, max) = self.search_bounds(path);
        self.optimize_within(path, min, max)
    }

    /// Optimizes over `[min, max]`.
    ///
    /// Returns the midpoint of the final interval and its simulated output. Bounds are not
    /// retried: if a probe fails the search stops and the caller decides what to do.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::EmptyInterval`] if `max <= min`, or the simulation error of
    /// the first probe that hits a drained pool.
    pub fn optimize_within(
        &self,
        path: &MultiHopPath,
        min: U256,
        max: U256,
    ) -> Result<OptimalTrade, OptimizeError> {
        if max <= min {
            return Err(OptimizeError::EmptyInterval { min, max });
        }

        let amount_in = ternary_search(min, max, self.iterations, |x| {
            simulate_path(path, x).map(|out| I256::from_raw(out).saturating_sub(I256::from_raw(x)))
        })?;
        let amount_out = simulate_path(path, amount_in)?;
        trace!("Optimal size for {path}: {amount_in} -> {amount_out}");

        Ok(OptimalTrade {
            amount_in,
            amount_out,
        })
    }
}

/// Maximizes `objective` over `[lo, hi]` assuming it is unimodal there.
///
/// Each iteration probes the two points splitting the interval into thirds and drops the
/// third next to the lower probe. Stops early once the interval is too narrow to split.
/// Returns the midpoint of the final interval.
///
/// # Errors
///
/// Returns the first error produced by `objective`.
pub fn ternary_search<E, F>(lo: U256, hi: U256, iterations: usize, mut objective: F) -> Result<U256, E>
where
    F: FnMut(U256) -> Result<I256, E>,
{
    let (mut lo, mut hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    for _ in 0..iterations {
        let third = (hi - lo) / U256::from(3);
        if third.is_zero() {
            break;
        }
        let left = lo + third;
        let right = hi - third;
        if objective(left)? < objective(right)? {
            lo = left;
        } else {
            hi = right;
        }
    }
    Ok(lo + (hi - lo) / U256::from(2))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::arb::finder::CycleFinder;
    use crate::arb::graph::PoolGraph;
    use crate::arb::test_helpers::*;

    const E18: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_ternary_search_analytic_maximum() {
        // f(x) = -(x - 700_000)^2, maximized at 700_000
        let peak = I256::try_from(700_000).unwrap();
        let x_star = ternary_search(U256::ZERO, U256::from(1_000_000), 30, |x| {
            let d = I256::from_raw(x) - peak;
            Ok::<_, Infallible>(-(d * d))
        })
        .unwrap();

        let x_star = x_star.to::<u64>();
        assert!(x_star.abs_diff(700_000) <= 7_000, "x* = {x_star}");
    }

    #[test]
    fn test_ternary_search_stops_on_error() {
        let mut calls = 0;
        let result = ternary_search(U256::ZERO, U256::from(1_000), 30, |_| {
            calls += 1;
            Err::<I256, _>("drained")
        });
        assert_eq!(result, Err("drained"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_optimize_matches_brute_force() {
        let cycle = path(&[
            ("P1", "A", "B", 1_000_000, 2_000_000), // 2 rate
            ("P2", "B", "A", 3_000_000, 3_000_000), // 1 rate
        ]);

        let trade = TradeSizeOptimizer::default()
            .optimize_within(&cycle, U256::from(1), U256::from(600_000))
            .unwrap();

        let best = (97..600_000u64)
            .step_by(97)
            .map(|x| {
                let out = simulate_path(&cycle, U256::from(x)).unwrap();
                I256::from_raw(out) - I256::from_raw(U256::from(x))
            })
            .max()
            .unwrap();

        assert!(trade.is_profitable());
        assert!(trade.profit() >= best, "{} < {best}", trade.profit());
    }

    #[test]
    fn test_optimize_unprofitable_path() {
        let cycle = path(&[("P1", "A", "B", 100_000, 200_000), ("P2", "B", "A", 300_000, 100_000)]);
        // The search walks towards tiny inputs, which eventually round down to nothing
        let result = TradeSizeOptimizer::default().optimize(&cycle);
        assert!(!matches!(result, Ok(trade) if trade.is_profitable()));
    }

    #[test]
    fn test_optimize_empty_interval() {
        let cycle = path(&[("P1", "A", "B", 100, 200), ("P2", "B", "A", 300, 300)]);
        assert_eq!(
            TradeSizeOptimizer::default().optimize_within(&cycle, U256::from(10), U256::from(10)),
            Err(OptimizeError::EmptyInterval {
                min: U256::from(10),
                max: U256::from(10)
            })
        );
    }

    #[test]
    fn test_optimize_drained_pool() {
        let cycle = path(&[("P1", "A", "B", 100_000, 200_000), ("P2", "B", "A", 0, 300_000)]);
        assert!(matches!(
            TradeSizeOptimizer::default().optimize(&cycle),
            Err(OptimizeError::Simulation(SimulationError::NoLiquidity { hop: 1, .. }))
        ));
    }

    #[test]
    fn test_default_bounds() {
        let cycle = path(&[("P1", "A", "B", 1_600, 1_500), ("P2", "B", "A", 300, 300)]);
        let (min, max) = TradeSizeOptimizer::default().search_bounds(&cycle);
        assert_eq!(min, U256::from(1));
        assert_eq!(max, U256::from(320));
    }

    /// Pools A–B (1000/1000), B–C (2000/1800), C–A (1500/1600), 0.3% fee, 18 decimals.
    /// Traversed A→B→C→A the triangle loses (rate ≈ 0.951); the reverse A→C→B→A gains
    /// (rate ≈ 1.032) and is the cycle that gets sized.
    #[test]
    fn test_end_to_end_reverse_triangle_a_c_b_a() {
        let graph = PoolGraph::from_pools(&[
            pool("P1", "A", "B", 1_000 * E18, 1_000 * E18),
            pool("P2", "B", "C", 2_000 * E18, 1_800 * E18),
            pool("P3", "C", "A", 1_500 * E18, 1_600 * E18),
        ]);
        let cycles = CycleFinder::new(3).find(&graph, token_id("A"));
        assert_eq!(cycles.len(), 2);

        let optimizer = TradeSizeOptimizer::default();
        let trades: Vec<_> = cycles
            .iter()
            .map(|cycle| (cycle, optimizer.optimize(cycle).unwrap()))
            .collect();

        let (_, losing) = trades
            .iter()
            .find(|(cycle, _)| cycle.edges()[0].token_out == token_id("B"))
            .unwrap();
        assert!(!losing.is_profitable());

        let (winning, trade) = trades
            .iter()
            .find(|(cycle, _)| cycle.edges()[0].token_out == token_id("C"))
            .unwrap();
        assert_eq!(winning.pools(), vec![pool_id("P3"), pool_id("P2"), pool_id("P1")]);
        assert_eq!(trade.amount_in, U256::from(7_376_707_316_417_892_294_u128));
        assert_eq!(trade.amount_out, U256::from(7_494_970_758_155_928_494_u128));
        assert_eq!(
            trade.profit(),
            I256::from_raw(U256::from(118_263_441_738_036_200_u128))
        );
    }
}
