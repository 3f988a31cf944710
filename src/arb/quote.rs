use alloy::primitives::{I256, U256};

use super::path::MultiHopPath;
use super::pool::PoolId;
use super::simulate::{edge_amount_out, SimulationError};

/// Amounts for one hop of a quoted path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopQuote {
    /// Pool the hop goes through
    pub pool: PoolId,
    /// Amount sold into the pool
    pub amount_in: U256,
    /// Amount bought from the pool
    pub amount_out: U256,
}

/// Represents a quote for a complete path, containing the amounts of every hop.
///
/// This is the detailed counterpart of [`super::simulate::simulate_path`]: same math,
/// but the whole trail is kept for logging and for sizing the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuote {
    /// Quotes for each hop in the path
    hops: Vec<HopQuote>,
}

impl PathQuote {
    /// Simulates the path with the given initial amount, recording every hop.
    ///
    /// # Errors
    ///
    /// Returns a [`SimulationError`] if any hop has no liquidity or no output.
    pub fn new(path: &MultiHopPath, amount_in: U256) -> Result<Self, SimulationError> {
        let mut hops = Vec::with_capacity(path.len());
        path.edges()
            .iter()
            .enumerate()
            .try_fold(amount_in, |amount, (hop, edge)| {
                let out = edge_amount_out(edge, amount, hop)?;
                hops.push(HopQuote {
                    pool: edge.pool,
                    amount_in: amount,
                    amount_out: out,
                });
                Ok(out)
            })?;
        Ok(Self { hops })
    }

    /// The hop quotes in trading order
    #[must_use]
    pub fn hops(&self) -> &[HopQuote] {
        &self.hops
    }

    /// The initial amount input into the first hop
    #[must_use]
    pub fn amount_in(&self) -> U256 {
        self.hops.first().map_or(U256::ZERO, |hop| hop.amount_in)
    }

    /// The final amount output from the last hop
    #[must_use]
    pub fn amount_out(&self) -> U256 {
        self.hops.last().map_or(U256::ZERO, |hop| hop.amount_out)
    }

    /// Profit of the quote, negative for a losing path
    #[must_use]
    pub fn profit(&self) -> I256 {
        I256::from_raw(self.amount_out()).saturating_sub(I256::from_raw(self.amount_in()))
    }

    /// Whether the path returns more than it takes
    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.profit().is_positive()
    }

    /// Profit margin in basis points (10,000 = 100%)
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn profit_margin_bps(&self) -> i32 {
        let profit = self.profit();
        let amount_in = self.amount_in();
        if amount_in.is_zero() {
            return 0;
        }

        let scaled_profit = profit.unsigned_abs().saturating_mul(U256::from(10_000));
        let margin = scaled_profit / amount_in;
        let result = if margin > U256::from(i32::MAX as u64) {
            i32::MAX
        } else {
            // SAFETY: the margin fits in an i32
            margin.as_limbs()[0] as i32
        };

        if profit.is_negative() {
            -result
        } else {
            result
        }
    }

    /// Profit as a fraction of the input
    #[must_use]
    pub fn profit_ratio(&self) -> f64 {
        let amount_in = self.amount_in();
        if amount_in.is_zero() {
            return 0.0;
        }
        let magnitude = f64::from(self.profit().unsigned_abs()) / f64::from(amount_in);
        if self.profit().is_negative() {
            -magnitude
        } else {
            magnitude
        }
    }
}
