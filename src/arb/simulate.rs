//! Constant-product AMM math.
//!
//! `amount_out = floor(x·(1000−fee)·reserve_out / (reserve_in·1000 + x·(1000−fee)))`
//!
//! A drained pool or a hop that rounds down to nothing is not a fault: it is reported
//! as a [`SimulationError`] so callers can skip the path and move on.
use alloy::primitives::U256;
use thiserror::Error;

use super::edge::PoolEdge;
use super::path::MultiHopPath;
use super::pool::{PoolId, FEE_DENOMINATOR};

/// Why a path produced no viable output
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SimulationError {
    /// A reserve of the pool is zero
    #[error("pool {pool} at hop {hop} has no liquidity")]
    NoLiquidity {
        /// Index of the failing edge
        hop: usize,
        /// The drained pool
        pool: PoolId,
    },
    /// The hop rounds down to zero output
    #[error("hop {hop} through pool {pool} yields no output")]
    ZeroOutput {
        /// Index of the failing edge
        hop: usize,
        /// The pool that produced nothing
        pool: PoolId,
    },
    /// Intermediate product does not fit in 256 bits, or the fee is 100% or more
    #[error("degenerate arithmetic at hop {hop} through pool {pool}")]
    Degenerate {
        /// Index of the failing edge
        hop: usize,
        /// The pool being simulated
        pool: PoolId,
    },
}

/// Output of a single constant-product swap, with the fee taken from the input.
///
/// Returns `None` when a reserve is zero, the fee is 100% or more, or the arithmetic
/// overflows. `amount_out(0, ..)` is zero for any pool with liquidity.
#[must_use]
pub fn amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256, fee_ppt: u32) -> Option<U256> {
    if reserve_in.is_zero() || reserve_out.is_zero() || fee_ppt >= FEE_DENOMINATOR {
        return None;
    }
    let effective_in = amount_in.checked_mul(U256::from(FEE_DENOMINATOR - fee_ppt))?;
    let numerator = effective_in.checked_mul(reserve_out)?;
    let denominator = reserve_in
        .checked_mul(U256::from(FEE_DENOMINATOR))?
        .checked_add(effective_in)?;
    numerator.checked_div(denominator)
}

/// Output of one edge for the given input
///
/// # Errors
///
/// See [`SimulationError`]. `hop` is reported as given.
pub fn edge_amount_out(edge: &PoolEdge, amount_in: U256, hop: usize) -> Result<U256, SimulationError> {
    if !edge.has_liquidity() {
        return Err(SimulationError::NoLiquidity { hop, pool: edge.pool });
    }
    let out = amount_out(amount_in, edge.reserve_in, edge.reserve_out, edge.fee_ppt)
        .ok_or(SimulationError::Degenerate { hop, pool: edge.pool })?;
    if out.is_zero() {
        return Err(SimulationError::ZeroOutput { hop, pool: edge.pool });
    }
    Ok(out)
}

/// Runs `amount_in` through the edges in order, feeding each output into the next edge.
///
/// An empty edge list or a zero input yields zero.
///
/// # Errors
///
/// Returns a [`SimulationError`] if any hop has no liquidity or no output.
pub fn simulate_edges(edges: &[PoolEdge], amount_in: U256) -> Result<U256, SimulationError> {
    if edges.is_empty() || amount_in.is_zero() {
        return Ok(U256::ZERO);
    }
    edges
        .iter()
        .enumerate()
        .try_fold(amount_in, |amount, (hop, edge)| edge_amount_out(edge, amount, hop))
}

/// Output of the path for the given input. See [`simulate_edges`].
///
/// # Errors
///
/// Returns a [`SimulationError`] if any hop has no liquidity or no output.
pub fn simulate_path(path: &MultiHopPath, amount_in: U256) -> Result<U256, SimulationError> {
    simulate_edges(path.edges(), amount_in)
}
