//! Boundary to the on-chain settlement contract.
//!
//! The contract holds the shared account's funds and performs the swaps atomically.
//! Everything here blocks on the chain: quotes, submissions and confirmations.
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::Provider;
use alloy::rpc::types::Log;
use alloy::sol;
use async_trait::async_trait;
use eyre::{eyre, Result};
use log::{debug, info};

use crate::arb::pool::PoolId;
use crate::arb::token::TokenId;

sol! {
    #[sol(rpc)]
    interface IArbitrageSettlement {
        event ArbitrageSettled(address indexed profitToken, uint256 profit);

        function quoteProfit(address pairA, address pairB) external view returns (uint256 profit, address profitToken);
        function executeArbitrage(address pairA, address pairB) external returns (uint256 profit);
        function executeCycle(address[] calldata pools, address tokenIn, uint256 amountIn) external returns (uint256 profit);
    }
}

/// Gas parameters of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasConfig {
    /// Gas price in wei
    pub gas_price_wei: u128,
    /// Gas limit of the transaction
    pub gas_limit: u64,
}

/// Final state of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Included and successful
    Confirmed {
        /// Profit reported by the contract's `ArbitrageSettled` event
        profit: Option<U256>,
    },
    /// Included but reverted
    Reverted,
}

/// Operations of the settlement contract
#[async_trait]
pub trait Settlement: Send + Sync {
    /// Simulates the direct arbitrage between two pools of the same pair.
    /// Returns the profit and the token it is denominated in.
    async fn quote_profit(&self, pair_a: PoolId, pair_b: PoolId) -> Result<(U256, TokenId)>;

    /// Submits the direct arbitrage between two pools.
    async fn execute_arbitrage(&self, pair_a: PoolId, pair_b: PoolId, gas: GasConfig) -> Result<TxHash>;

    /// Submits a cycle through `pools`, selling `amount_in` of `token_in` into the first one.
    async fn execute_cycle(
        &self,
        pools: &[PoolId],
        token_in: TokenId,
        amount_in: U256,
        gas: GasConfig,
    ) -> Result<TxHash>;

    /// Waits for the transaction to be included.
    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<Confirmation>;
}

/// Default delay between receipt polls
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Default number of receipt polls before giving up
const RECEIPT_MAX_POLLS: usize = 120;

/// Profit of the first `ArbitrageSettled` event emitted by `contract` among `logs`
fn settled_profit(logs: &[Log], contract: Address) -> Option<U256> {
    logs.iter()
        .filter(|log| log.address() == contract)
        .find_map(|log| log.log_decode::<IArbitrageSettlement::ArbitrageSettled>().ok())
        .map(|event| event.inner.data.profit)
}

/// Settlement contract reached through an alloy provider with a wallet
pub struct ChainSettlement<P> {
    /// Provider with the signing wallet attached
    provider: P,
    /// Address of the settlement contract
    address: Address,
    /// Delay between receipt polls
    poll_interval: Duration,
    /// Receipt polls before giving up
    max_polls: usize,
}

impl<P: Provider + Clone> ChainSettlement<P> {
    /// Creates a client for the contract at `address`.
    pub const fn new(provider: P, address: Address) -> Self {
        Self {
            provider,
            address,
            poll_interval: RECEIPT_POLL_INTERVAL,
            max_polls: RECEIPT_MAX_POLLS,
        }
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> Settlement for ChainSettlement<P> {
    async fn quote_profit(&self, pair_a: PoolId, pair_b: PoolId) -> Result<(U256, TokenId)> {
        let contract = IArbitrageSettlement::new(self.address, &self.provider);
        let quote = contract.quoteProfit(pair_a.0, pair_b.0).call().await?;
        Ok((quote.profit, TokenId::from(quote.profitToken)))
    }

    async fn execute_arbitrage(&self, pair_a: PoolId, pair_b: PoolId, gas: GasConfig) -> Result<TxHash> {
        let contract = IArbitrageSettlement::new(self.address, &self.provider);
        let pending = contract
            .executeArbitrage(pair_a.0, pair_b.0)
            .gas(gas.gas_limit)
            .gas_price(gas.gas_price_wei)
            .send()
            .await?;
        let tx = *pending.tx_hash();
        info!("settlement: submitted arbitrage {pair_a}/{pair_b} in {tx}");
        Ok(tx)
    }

    async fn execute_cycle(
        &self,
        pools: &[PoolId],
        token_in: TokenId,
        amount_in: U256,
        gas: GasConfig,
    ) -> Result<TxHash> {
        let contract = IArbitrageSettlement::new(self.address, &self.provider);
        let addresses = pools.iter().map(|pool| pool.0).collect::<Vec<_>>();
        let pending = contract
            .executeCycle(addresses, token_in.0, amount_in)
            .gas(gas.gas_limit)
            .gas_price(gas.gas_price_wei)
            .send()
            .await?;
        let tx = *pending.tx_hash();
        info!(
            "settlement: submitted {}-hop cycle from {token_in} in {tx}",
            pools.len()
        );
        Ok(tx)
    }

    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<Confirmation> {
        for _ in 0..self.max_polls {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx).await? {
                debug!(
                    "settlement: {tx} included in block {:?}",
                    receipt.block_number
                );
                return Ok(if receipt.status() {
                    Confirmation::Confirmed {
                        profit: settled_profit(receipt.inner.logs(), self.address),
                    }
                } else {
                    Confirmation::Reverted
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(eyre!("no receipt for {tx} after {} polls", self.max_polls))
    }
}
