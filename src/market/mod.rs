//! # Market Module
//!
//! External market data consumed by the discovery loop: pool reserves and token prices.

/// Reference prices
pub mod prices;
/// Pool reserve snapshots
pub mod source;

pub use prices::{PriceOracle, StaticPrices};
pub use source::{ChainPairSource, FixedPairSource, MarketSnapshot, PairSource, PoolSpec};
