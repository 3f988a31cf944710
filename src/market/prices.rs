//! Reference-currency prices used to compare profits across tokens.
use std::collections::HashMap;

use crate::arb::token::TokenId;

/// Price lookup for tokens, in the reference currency (USD)
pub trait PriceOracle: Send + Sync {
    /// Price of one whole token, `None` if unknown
    fn price(&self, token: &TokenId) -> Option<f64>;
}

/// Fixed prices loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticPrices {
    /// Price per token
    prices: HashMap<TokenId, f64>,
}

impl StaticPrices {
    /// Creates an empty price table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price of a token. Non-finite or negative prices are ignored.
    pub fn set(&mut self, token: TokenId, price: f64) {
        if price.is_finite() && price >= 0.0 {
            self.prices.insert(token, price);
        } else {
            log::warn!("Ignoring invalid price {price} for {token}");
        }
    }

    /// Number of priced tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no token is priced
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(TokenId, f64)> for StaticPrices {
    fn from_iter<I: IntoIterator<Item = (TokenId, f64)>>(iter: I) -> Self {
        let mut prices = Self::new();
        for (token, price) in iter {
            prices.set(token, price);
        }
        prices
    }
}

impl PriceOracle for StaticPrices {
    fn price(&self, token: &TokenId) -> Option<f64> {
        self.prices.get(token).copied()
    }
}
