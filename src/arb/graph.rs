use std::collections::HashMap;

use log::debug;

use super::edge::PoolEdge;
use super::pool::Pool;
use super::token::TokenId;

/// Token graph of one market snapshot: every token maps to its outgoing edges.
///
/// Each tradable pool contributes two edges, one per direction. Drained pools
/// (a zero reserve) and pools with a fee of 100% or more are left out.
#[derive(Debug, Clone, Default)]
pub struct PoolGraph {
    /// Outgoing edges per token, in pool insertion order
    adjacency: HashMap<TokenId, Vec<PoolEdge>>,
    /// Number of pools that made it into the graph
    pool_count: usize,
}

impl PoolGraph {
    /// Builds the graph from a pool snapshot.
    #[must_use]
    pub fn from_pools<'a>(pools: impl IntoIterator<Item = &'a Pool>) -> Self {
        let mut graph = Self::default();
        for pool in pools {
            graph.insert(pool);
        }
        graph
    }

    /// Adds both directions of a pool. Returns false if the pool was skipped.
    pub fn insert(&mut self, pool: &Pool) -> bool {
        if !pool.is_tradable() {
            debug!("Skipping pool {} without liquidity", pool.id);
            return false;
        }
        if pool.token0 == pool.token1 {
            debug!("Skipping pool {} with identical tokens", pool.id);
            return false;
        }

        self.adjacency
            .entry(pool.token0)
            .or_default()
            .push(PoolEdge::forward(pool));
        self.adjacency
            .entry(pool.token1)
            .or_default()
            .push(PoolEdge::reverse(pool));
        self.pool_count += 1;
        true
    }

    /// Outgoing edges of a token; empty for a token the graph doesn't know.
    #[must_use]
    pub fn edges_from(&self, token: &TokenId) -> &[PoolEdge] {
        self.adjacency.get(token).map_or(&[], Vec::as_slice)
    }

    /// Number of tokens with at least one outgoing edge
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of pools in the graph
    #[must_use]
    pub const fn pool_count(&self) -> usize {
        self.pool_count
    }

    /// Tokens present in the graph
    pub fn tokens(&self) -> impl Iterator<Item = &TokenId> {
        self.adjacency.keys()
    }
}
