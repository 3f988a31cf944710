//! `MultiHopPath` is an ordered sequence of pool edges starting at a given token.
//! A closed path (one that ends where it starts) is a cycle, the unit of arbitrage.
use std::collections::HashSet;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use thiserror::Error;

use super::edge::{Direction, PoolEdge};
use super::pool::{Pool, PoolId};
use super::token::TokenId;

/// Reasons a sequence of edges is not a valid path
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path has no edges
    #[error("Path must have at least 1 edge")]
    Empty,
    /// The first edge does not sell the start token
    #[error("Edge 0 token_in ({found}) does not match start token ({start})")]
    WrongStart {
        /// The declared start token
        start: TokenId,
        /// The first edge's input token
        found: TokenId,
    },
    /// Two consecutive edges do not chain
    #[error("Edge {index} token_out ({token_out}) does not match edge {next} token_in ({token_in})")]
    Broken {
        /// Index of the edge whose output does not chain
        index: usize,
        /// Index of the following edge
        next: usize,
        /// Output token of edge `index`
        token_out: TokenId,
        /// Input token of edge `next`
        token_in: TokenId,
    },
    /// The same pool is traversed twice
    #[error("Path uses pool {0} more than once")]
    RepeatedPool(PoolId),
    /// A round trip that does not come back to its start token
    #[error("Path starting at {start} ends at {end}")]
    NotClosed {
        /// The start token
        start: TokenId,
        /// The token the last edge outputs
        end: TokenId,
    },
}

/// Ordered sequence of edges plus the token the path starts from.
///
/// Invariants, checked by [`MultiHopPath::new`]:
/// * `edges[0].token_in == start_token`
/// * `edges[i].token_out == edges[i + 1].token_in`
/// * no pool id appears twice
#[derive(Clone)]
pub struct MultiHopPath {
    /// Token the path starts from
    start_token: TokenId,
    /// Edges in trading order
    edges: Vec<PoolEdge>,
}

impl Debug for MultiHopPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Path({})",
            self.edges.iter().map(|e| format!("{e:?}")).join(", ")
        )
    }
}

impl Display for MultiHopPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start_token)?;
        for edge in &self.edges {
            write!(f, " -[{}]-> {}", edge.pool, edge.token_out)?;
        }
        Ok(())
    }
}

/// Paths are identified by their start token and the pools and directions they use.
/// Reserves are not part of the identity.
impl PartialEq for MultiHopPath {
    fn eq(&self, other: &Self) -> bool {
        self.start_token == other.start_token
            && self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(&other.edges)
                .all(|(a, b)| a.pool == b.pool && a.direction == b.direction)
    }
}

impl Eq for MultiHopPath {}

impl Hash for MultiHopPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start_token.hash(state);
        for edge in &self.edges {
            edge.pool.hash(state);
            edge.direction.hash(state);
        }
    }
}

impl MultiHopPath {
    /// Creates a path after validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] if the path is empty, does not start at `start_token`,
    /// does not chain, or repeats a pool.
    pub fn new(start_token: TokenId, edges: Vec<PoolEdge>) -> Result<Self, PathError> {
        let Some(first) = edges.first() else {
            return Err(PathError::Empty);
        };
        if first.token_in != start_token {
            return Err(PathError::WrongStart {
                start: start_token,
                found: first.token_in,
            });
        }

        for (index, (edge, next)) in edges.iter().tuple_windows().enumerate() {
            if edge.token_out != next.token_in {
                return Err(PathError::Broken {
                    index,
                    next: index + 1,
                    token_out: edge.token_out,
                    token_in: next.token_in,
                });
            }
        }

        let mut pools = HashSet::with_capacity(edges.len());
        for edge in &edges {
            if !pools.insert(edge.pool) {
                return Err(PathError::RepeatedPool(edge.pool));
            }
        }

        Ok(Self { start_token, edges })
    }

    /// Two-pool round trip: sell token0 of `first` into `first`, buy it back from `second`.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] if the pools are the same or do not trade the same pair.
    pub fn round_trip(first: &Pool, second: &Pool) -> Result<Self, PathError> {
        let out = PoolEdge::forward(first);
        let back = if second.token0 == out.token_out {
            PoolEdge::forward(second)
        } else {
            PoolEdge::reverse(second)
        };
        let path = Self::new(out.token_in, vec![out, back])?;
        if !path.is_cycle() {
            return Err(PathError::NotClosed {
                start: path.start_token,
                end: path.end_token(),
            });
        }
        Ok(path)
    }

    /// Builds a path from a DFS buffer that is already known to be valid.
    pub(crate) fn from_trusted(start_token: TokenId, edges: Vec<PoolEdge>) -> Self {
        debug_assert!(Self::new(start_token, edges.clone()).is_ok());
        Self { start_token, edges }
    }

    /// The token the path starts from
    #[must_use]
    pub const fn start_token(&self) -> TokenId {
        self.start_token
    }

    /// The edges in trading order
    #[must_use]
    pub fn edges(&self) -> &[PoolEdge] {
        &self.edges
    }

    /// Number of hops
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Always false for a validated path
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The token the path ends at
    #[must_use]
    pub fn end_token(&self) -> TokenId {
        self.edges
            .last()
            .map_or(self.start_token, |edge| edge.token_out)
    }

    /// Whether the path ends at its start token through at least 2 pools
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        self.edges.len() >= 2 && self.end_token() == self.start_token
    }

    /// Pool ids in trading order
    #[must_use]
    pub fn pools(&self) -> Vec<PoolId> {
        self.edges.iter().map(|edge| edge.pool).collect()
    }

    /// Identity of a cycle regardless of where it starts: the (pool, direction) sequence
    /// rotated so that its smallest element comes first. The same cycle found from
    /// different base tokens has the same signature; the reverse traversal does not.
    #[must_use]
    pub fn signature(&self) -> Vec<(PoolId, Direction)> {
        let mut hops: Vec<_> = self
            .edges
            .iter()
            .map(|edge| (edge.pool, edge.direction))
            .collect();
        if let Some(min_pos) = hops.iter().position_min() {
            hops.rotate_left(min_pos);
        }
        hops
    }
}
