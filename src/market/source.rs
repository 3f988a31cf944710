//! Pool snapshots: the reserves of every configured pool at one block height.
use alloy::primitives::U256;
use alloy::providers::Provider;
use alloy::sol;
use async_trait::async_trait;
use eyre::Result;
use futures::future::join_all;
use log::{debug, warn};

use crate::arb::pool::{Pool, PoolId, VenueId};
use crate::arb::token::TokenId;

sol! {
    #[sol(rpc)]
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint256 reserve0, uint256 reserve1, uint32 blockTimestampLast);
    }
}

/// Static description of a pool, everything but its reserves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSpec {
    /// Pair contract address
    pub id: PoolId,
    /// Venue the pool trades on
    pub venue: VenueId,
    /// First token of the pair
    pub token0: TokenId,
    /// Second token of the pair
    pub token1: TokenId,
    /// Swap fee in parts-per-thousand
    pub fee_ppt: u32,
}

impl PoolSpec {
    /// Snapshot of the pool with the given reserves
    #[must_use]
    pub fn with_reserves(&self, reserve0: U256, reserve1: U256) -> Pool {
        Pool::new(
            self.id,
            self.venue.clone(),
            self.token0,
            self.token1,
            reserve0,
            reserve1,
            self.fee_ppt,
        )
    }
}

/// Reserves of the known pools at one block height
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    /// Block the reserves were read at
    pub block_number: u64,
    /// Unix time of the read, in seconds
    pub timestamp: u64,
    /// Pools whose reserves could be read
    pub pools: Vec<Pool>,
}

impl MarketSnapshot {
    /// Looks up a pool of the snapshot.
    #[must_use]
    pub fn pool(&self, id: &PoolId) -> Option<&Pool> {
        self.pools.iter().find(|pool| &pool.id == id)
    }
}

/// Supplier of fresh pool reserves, read once per pass
#[async_trait]
pub trait PairSource: Send + Sync {
    /// Reads the current reserves of every known pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the block height cannot be read. Pools that fail individually
    /// are left out of the snapshot.
    async fn snapshot(&self) -> Result<MarketSnapshot>;
}

/// Reads reserves from the pair contracts with one `getReserves` call per pool
pub struct ChainPairSource<P> {
    /// Chain provider
    provider: P,
    /// Pools to read
    pools: Vec<PoolSpec>,
}

impl<P: Provider + Clone> ChainPairSource<P> {
    /// Creates a source for the given pools.
    pub const fn new(provider: P, pools: Vec<PoolSpec>) -> Self {
        Self { provider, pools }
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> PairSource for ChainPairSource<P> {
    async fn snapshot(&self) -> Result<MarketSnapshot> {
        let block_number = self.provider.get_block_number().await?;

        let calls = self.pools.iter().map(|spec| async move {
            let pair = IUniswapV2Pair::new(spec.id.0, &self.provider);
            (spec, pair.getReserves().call().await)
        });

        let pools: Vec<Pool> = join_all(calls)
            .await
            .into_iter()
            .filter_map(|(spec, result)| match result {
                Ok(reserves) => Some(spec.with_reserves(reserves.reserve0, reserves.reserve1)),
                Err(e) => {
                    warn!("source::snapshot: failed to read reserves of {}: {e}", spec.id);
                    None
                }
            })
            .collect();

        debug!(
            "source::snapshot: {} of {} pools at block {block_number}",
            pools.len(),
            self.pools.len()
        );

        Ok(MarketSnapshot {
            block_number,
            timestamp: unix_now(),
            pools,
        })
    }
}

/// Replays a fixed snapshot, for dry runs and tests
#[derive(Debug, Clone, Default)]
pub struct FixedPairSource {
    /// The snapshot returned on every read
    snapshot: MarketSnapshot,
}

impl FixedPairSource {
    /// Creates a source that always returns `snapshot`.
    #[must_use]
    pub const fn new(snapshot: MarketSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl PairSource for FixedPairSource {
    async fn snapshot(&self) -> Result<MarketSnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// Current unix time in seconds
#[must_use]
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
