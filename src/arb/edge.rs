//! A pool edge is one of the two trading directions of a pool: `ZeroForOne` or `OneForZero`.
//! It carries the reserves seen from the input side, so the AMM formula can be applied
//! without knowing which of the pool's tokens is token0.
use std::fmt::{self, Debug, Display};

use alloy::primitives::U256;

use super::pool::{Pool, PoolId, VenueId, FEE_DENOMINATOR};
use super::token::TokenId;

/// The direction of a swap in a liquidity pool.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Direction {
    /// Swap from token0 to token1 in the pool
    ZeroForOne,
    /// Swap from token1 to token0 in the pool
    OneForZero,
}

impl Debug for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroForOne => write!(f, "0>1"),
            Self::OneForZero => write!(f, "1>0"),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Directed trading edge `token_in -> token_out` through one specific pool.
///
/// This is a value snapshot: the discovery code reads it, never updates it.
#[derive(Clone, PartialEq, Eq)]
pub struct PoolEdge {
    /// The pool the trade goes through
    pub pool: PoolId,
    /// The venue of the pool
    pub venue: VenueId,
    /// Which side of the pool is sold
    pub direction: Direction,
    /// The token sold into the pool
    pub token_in: TokenId,
    /// The token bought from the pool
    pub token_out: TokenId,
    /// Pool reserve of `token_in`
    pub reserve_in: U256,
    /// Pool reserve of `token_out`
    pub reserve_out: U256,
    /// Swap fee in parts-per-thousand
    pub fee_ppt: u32,
}

impl Debug for PoolEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Edge(pool 0>1, 1000 WETH / 2000 USDC @ 3)
        write!(
            f,
            "Edge({:?} {:?}, {} {:?} / {} {:?} @ {})",
            self.pool,
            self.direction,
            self.reserve_in,
            self.token_in,
            self.reserve_out,
            self.token_out,
            self.fee_ppt
        )
    }
}

impl Display for PoolEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.token_in, self.pool, self.token_out)
    }
}

impl PoolEdge {
    /// Edge for the forward direction: token0 -> token1
    #[must_use]
    pub fn forward(pool: &Pool) -> Self {
        Self {
            pool: pool.id,
            venue: pool.venue.clone(),
            direction: Direction::ZeroForOne,
            token_in: pool.token0,
            token_out: pool.token1,
            reserve_in: pool.reserve0,
            reserve_out: pool.reserve1,
            fee_ppt: pool.fee_ppt,
        }
    }

    /// Edge for the reverse direction: token1 -> token0
    #[must_use]
    pub fn reverse(pool: &Pool) -> Self {
        Self {
            pool: pool.id,
            venue: pool.venue.clone(),
            direction: Direction::OneForZero,
            token_in: pool.token1,
            token_out: pool.token0,
            reserve_in: pool.reserve1,
            reserve_out: pool.reserve0,
            fee_ppt: pool.fee_ppt,
        }
    }

    /// Whether both reserves are positive
    #[must_use]
    pub fn has_liquidity(&self) -> bool {
        !self.reserve_in.is_zero() && !self.reserve_out.is_zero()
    }

    /// Marginal exchange rate of the edge after fees, ignoring slippage.
    /// Returns 0.0 for a drained pool.
    #[must_use]
    pub fn spot_rate(&self) -> f64 {
        if !self.has_liquidity() {
            return 0.0;
        }
        let fee_factor =
            f64::from(FEE_DENOMINATOR.saturating_sub(self.fee_ppt)) / f64::from(FEE_DENOMINATOR);
        f64::from(self.reserve_out) / f64::from(self.reserve_in) * fee_factor
    }

    /// Fee as a fraction (3 ppt -> 0.003)
    #[must_use]
    pub fn fee_fraction(&self) -> f64 {
        f64::from(self.fee_ppt) / f64::from(FEE_DENOMINATOR)
    }
}
