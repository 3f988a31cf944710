use std::collections::HashSet;

use log::debug;

use super::edge::PoolEdge;
use super::graph::PoolGraph;
use super::path::MultiHopPath;
use super::pool::PoolId;
use super::token::TokenId;

/// Default maximum number of hops in a cycle
pub const DEFAULT_MAX_HOPS: usize = 3;

/// Hard upper bound on the hop count. The search is exponential in the hop count.
pub const MAX_SUPPORTED_HOPS: usize = 4;

/// Enumerates closed paths back to a start token.
///
/// Depth-first search with an explicit stack: the current path lives in one
/// append/pop buffer, and a set of pool ids prevents using a pool twice on the
/// same path. Single-pool round trips never show up, a cycle needs at least 2 edges.
#[derive(Debug, Clone, Copy)]
pub struct CycleFinder {
    /// Maximum number of edges in a returned cycle
    max_hops: usize,
}

impl Default for CycleFinder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HOPS)
    }
}

impl CycleFinder {
    /// Creates a finder. The hop count is clamped to [`MAX_SUPPORTED_HOPS`].
    #[must_use]
    pub fn new(max_hops: usize) -> Self {
        Self {
            max_hops: max_hops.min(MAX_SUPPORTED_HOPS),
        }
    }

    /// Maximum number of edges in a returned cycle
    #[must_use]
    pub const fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// All cycles through `start` of 2 to `max_hops` edges.
    ///
    /// A start token without cycles (or unknown to the graph) yields an empty result.
    #[must_use]
    pub fn find(&self, graph: &PoolGraph, start: TokenId) -> Vec<MultiHopPath> {
        let mut cycles = Vec::new();
        if self.max_hops < 2 {
            return cycles;
        }

        let mut path: Vec<&PoolEdge> = Vec::with_capacity(self.max_hops);
        let mut used: HashSet<PoolId> = HashSet::with_capacity(self.max_hops);
        // Next edge to try at each depth
        let mut cursors: Vec<usize> = Vec::with_capacity(self.max_hops);
        cursors.push(0);

        while let Some(cursor) = cursors.last_mut() {
            let current = path.last().map_or(start, |edge| edge.token_out);
            let edges = graph.edges_from(&current);

            let Some(edge) = edges.get(*cursor) else {
                // Exhausted this depth: backtrack
                cursors.pop();
                if let Some(edge) = path.pop() {
                    used.remove(&edge.pool);
                }
                continue;
            };
            *cursor += 1;

            if used.contains(&edge.pool) {
                continue;
            }

            if edge.token_out == start {
                if !path.is_empty() {
                    let edges = path.iter().copied().chain([edge]).cloned().collect();
                    cycles.push(MultiHopPath::from_trusted(start, edges));
                }
                continue;
            }

            if path.len() + 1 < self.max_hops {
                used.insert(edge.pool);
                path.push(edge);
                cursors.push(0);
            }
        }

        debug!("Found {} cycles from {start} within {} hops", cycles.len(), self.max_hops);
        cycles
    }

    /// Cycles from several base tokens, each distinct cycle reported once.
    ///
    /// A cycle reachable from two base tokens is kept for the first base token in
    /// `starts` that finds it.
    #[must_use]
    pub fn find_from_all(&self, graph: &PoolGraph, starts: &[TokenId]) -> Vec<MultiHopPath> {
        let mut seen = HashSet::new();
        starts
            .iter()
            .flat_map(|start| self.find(graph, *start))
            .filter(|cycle| seen.insert(cycle.signature()))
            .collect()
    }
}
