//! # Arbitrage Module
//!
//! Opportunity discovery over constant-product pools: the token graph of a market
//! snapshot, cycle enumeration, AMM simulation along a path and trade sizing.
//!
//! Data flows `PoolGraph -> CycleFinder -> simulate_path -> TradeSizeOptimizer`.

/// Directed pool edges and swap directions
pub mod edge;
/// Cycle enumeration by depth-first search
pub mod finder;
/// Token graph built from a pool snapshot
pub mod graph;
/// Trade sizing by ternary search
pub mod optimize;
/// Multi-hop paths and cycles
pub mod path;
/// Pool snapshots and identifiers
pub mod pool;
/// Per-hop quotes of a path
pub mod quote;
/// Constant-product AMM math
pub mod simulate;
/// Test helpers and utilities
#[cfg(test)]
pub(crate) mod test_helpers;
/// Token identifiers and reference data
pub mod token;

pub use edge::{Direction, PoolEdge};
pub use finder::CycleFinder;
pub use graph::PoolGraph;
pub use optimize::{OptimalTrade, OptimizeError, TradeSizeOptimizer};
pub use path::{MultiHopPath, PathError};
pub use pool::{Pool, PoolId, VenueId};
pub use quote::PathQuote;
pub use simulate::{amount_out, simulate_path, SimulationError};
pub use token::{Token, TokenId};
