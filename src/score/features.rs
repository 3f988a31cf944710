//! Market features of a candidate path.
//!
//! Features are addressed by name through [`FEATURE_NAMES`], a fixed and versioned list
//! shared by extraction, scoring and training. Weights learned under one version keep
//! their meaning as long as the list does not change; any change bumps
//! [`FEATURE_SET_VERSION`].
//!
//! Quantities spanning many orders of magnitude (reference liquidity, gas price, block
//! height, unix time) enter as `ln(1 + x)` so that no single feature dominates the
//! gradient of the model.
use std::collections::{HashMap, HashSet};

use alloy::primitives::U256;
use itertools::Itertools;

use crate::arb::edge::PoolEdge;
use crate::arb::path::MultiHopPath;
use crate::arb::token::{Token, TokenId};
use crate::market::prices::PriceOracle;

/// Version of [`FEATURE_NAMES`]
pub const FEATURE_SET_VERSION: u32 = 2;

/// Number of features
pub const FEATURE_COUNT: usize = 12;

/// Canonical, ordered feature names
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "price_spread",
    "price_volatility",
    "min_liquidity",
    "avg_liquidity",
    "liquidity_imbalance",
    "volume_imbalance",
    "path_length",
    "venue_count",
    "avg_fee",
    "gas_price",
    "block_number",
    "timestamp",
];

/// Chain state the features are taken at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarketContext {
    /// Gas price in wei
    pub gas_price_wei: u128,
    /// Block height of the snapshot
    pub block_number: u64,
    /// Unix time of the snapshot, in seconds
    pub timestamp: u64,
}

/// Numeric snapshot of a path and the market around it. Always recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarketFeatures {
    /// Product of the fee-adjusted spot rates, minus one
    pub price_spread: f64,
    /// Population standard deviation of the log spot rates
    pub price_volatility: f64,
    /// `ln(1 + v)` of the smallest pool value along the path
    pub min_liquidity: f64,
    /// `ln(1 + v)` of the mean pool value along the path
    pub avg_liquidity: f64,
    /// `(max - min) / max` of the pool values
    pub liquidity_imbalance: f64,
    /// Mean relative difference between the two sides of each pool
    pub volume_imbalance: f64,
    /// Number of hops
    pub path_length: f64,
    /// Number of distinct venues
    pub venue_count: f64,
    /// Mean fee as a fraction
    pub avg_fee: f64,
    /// `ln(1 + gwei)` of the gas price
    pub gas_price: f64,
    /// `ln(1 + n)` of the block height
    pub block_number: f64,
    /// `ln(1 + t)` of the unix time in seconds
    pub timestamp: f64,
}

impl MarketFeatures {
    /// Value of a feature by name, `None` for an unknown name
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        let value = match name {
            "price_spread" => self.price_spread,
            "price_volatility" => self.price_volatility,
            "min_liquidity" => self.min_liquidity,
            "avg_liquidity" => self.avg_liquidity,
            "liquidity_imbalance" => self.liquidity_imbalance,
            "volume_imbalance" => self.volume_imbalance,
            "path_length" => self.path_length,
            "venue_count" => self.venue_count,
            "avg_fee" => self.avg_fee,
            "gas_price" => self.gas_price,
            "block_number" => self.block_number,
            "timestamp" => self.timestamp,
            _ => return None,
        };
        Some(value)
    }

    /// Values in [`FEATURE_NAMES`] order
    #[must_use]
    pub const fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.price_spread,
            self.price_volatility,
            self.min_liquidity,
            self.avg_liquidity,
            self.liquidity_imbalance,
            self.volume_imbalance,
            self.path_length,
            self.venue_count,
            self.avg_fee,
            self.gas_price,
            self.block_number,
            self.timestamp,
        ]
    }

    /// `(name, value)` pairs in [`FEATURE_NAMES`] order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.values())
    }
}

/// Reference value of both sides of a pool edge: `(value_in, value_out)`.
/// A side without token metadata or price is worth 0.
fn edge_values(
    edge: &PoolEdge,
    tokens: &HashMap<TokenId, Token>,
    prices: &dyn PriceOracle,
) -> (f64, f64) {
    let value = |token: &TokenId, reserve: U256| {
        match (tokens.get(token), prices.price(token)) {
            (Some(token), Some(price)) => token.to_units(f64::from(reserve)) * price,
            _ => 0.0,
        }
    };
    (
        value(&edge.token_in, edge.reserve_in),
        value(&edge.token_out, edge.reserve_out),
    )
}

/// Population standard deviation, 0 for fewer than two samples
fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Extracts the features of a path. Deterministic: same inputs, same features.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn extract_features(
    path: &MultiHopPath,
    tokens: &HashMap<TokenId, Token>,
    prices: &dyn PriceOracle,
    ctx: &MarketContext,
) -> MarketFeatures {
    let edges = path.edges();
    if edges.is_empty() {
        return MarketFeatures::default();
    }
    let hops = edges.len() as f64;

    let rates: Vec<f64> = edges.iter().map(PoolEdge::spot_rate).collect();
    let price_spread = rates.iter().product::<f64>() - 1.0;
    let log_rates: Vec<f64> = rates.iter().filter(|r| **r > 0.0).map(|r| r.ln()).collect();

    let values: Vec<(f64, f64)> = edges
        .iter()
        .map(|edge| edge_values(edge, tokens, prices))
        .collect();
    let liquidity: Vec<f64> = values.iter().map(|(v_in, v_out)| v_in + v_out).collect();
    let (min_liquidity, max_liquidity) = liquidity
        .iter()
        .copied()
        .minmax()
        .into_option()
        .unwrap_or((0.0, 0.0));
    let liquidity_imbalance = if max_liquidity > 0.0 {
        (max_liquidity - min_liquidity) / max_liquidity
    } else {
        0.0
    };
    let volume_imbalance = values
        .iter()
        .map(|(v_in, v_out)| {
            let total = v_in + v_out;
            if total > 0.0 {
                (v_in - v_out).abs() / total
            } else {
                0.0
            }
        })
        .sum::<f64>()
        / hops;

    let venues: HashSet<_> = edges.iter().map(|edge| &edge.venue).collect();

    MarketFeatures {
        price_spread,
        price_volatility: std_dev(&log_rates),
        min_liquidity: min_liquidity.ln_1p(),
        avg_liquidity: (liquidity.iter().sum::<f64>() / hops).ln_1p(),
        liquidity_imbalance,
        volume_imbalance,
        path_length: hops,
        venue_count: venues.len() as f64,
        avg_fee: edges.iter().map(PoolEdge::fee_fraction).sum::<f64>() / hops,
        gas_price: (ctx.gas_price_wei as f64 / 1e9).ln_1p(),
        block_number: (ctx.block_number as f64).ln_1p(),
        timestamp: (ctx.timestamp as f64).ln_1p(),
    }
}
