use std::fmt::{self, Debug};
use std::str::FromStr;

use alloy::primitives::Address;
use derive_more::Display;
use eyre::{Error, Result};

/// Identifier of a token: its contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct TokenId(pub Address);

impl Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for TokenId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl FromStr for TokenId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Address::from_str(s)?))
    }
}

/// Reference data about a token. Owned by whoever supplies the market, never mutated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Contract address
    pub id: TokenId,
    /// Ticker symbol, only used for display
    pub symbol: String,
    /// Decimal precision of the token's base unit
    pub decimals: u8,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub fn new(id: TokenId, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Converts a raw amount in base units into whole tokens.
    #[must_use]
    pub fn to_units(&self, raw: f64) -> f64 {
        raw / 10f64.powi(i32::from(self.decimals))
    }
}
