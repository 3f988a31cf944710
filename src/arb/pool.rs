use std::fmt::{self, Debug};
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use derive_more::Display;
use eyre::{Error, Result};

use super::token::TokenId;

/// Default AMM fee in parts-per-thousand (0.3%)
pub const DEFAULT_FEE_PPT: u32 = 3;

/// Fee denominator: fees are expressed in parts-per-thousand
pub const FEE_DENOMINATOR: u32 = 1000;

/// Identifier of a liquidity pool: the pair contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct PoolId(pub Address);

impl Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for PoolId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl FromStr for PoolId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Address::from_str(s)?))
    }
}

/// Identifier of the exchange (factory / router family) a pool belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct VenueId(pub String);

impl From<&str> for VenueId {
    fn from(venue: &str) -> Self {
        Self(venue.to_string())
    }
}

/// A constant-product pool snapshot at one block height.
///
/// Snapshots go stale on every new block. They are refreshed by the pair source,
/// never mutated by the discovery code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    /// Pair contract address
    pub id: PoolId,
    /// Venue the pool trades on
    pub venue: VenueId,
    /// First token of the pair
    pub token0: TokenId,
    /// Second token of the pair
    pub token1: TokenId,
    /// Reserve of `token0`
    pub reserve0: U256,
    /// Reserve of `token1`
    pub reserve1: U256,
    /// Swap fee in parts-per-thousand
    pub fee_ppt: u32,
}

impl Pool {
    /// Creates a pool snapshot.
    #[must_use]
    pub const fn new(
        id: PoolId,
        venue: VenueId,
        token0: TokenId,
        token1: TokenId,
        reserve0: U256,
        reserve1: U256,
        fee_ppt: u32,
    ) -> Self {
        Self {
            id,
            venue,
            token0,
            token1,
            reserve0,
            reserve1,
            fee_ppt,
        }
    }

    /// Whether both reserves are non-zero and the fee is below 100%
    #[must_use]
    pub fn is_tradable(&self) -> bool {
        !self.reserve0.is_zero() && !self.reserve1.is_zero() && self.fee_ppt < FEE_DENOMINATOR
    }
}
