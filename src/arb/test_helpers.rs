#![allow(dead_code)]
use alloy::primitives::{Address, U256};

use super::edge::PoolEdge;
use super::path::MultiHopPath;
use super::pool::{Pool, PoolId, VenueId, DEFAULT_FEE_PPT};
use super::token::{Token, TokenId};

/// Deterministic address from a short label ("A", "P1", ...)
pub fn address_from_str(label: &str) -> Address {
    Address::left_padding_from(label.as_bytes())
}

pub fn token_id(label: &str) -> TokenId {
    TokenId::from(address_from_str(label))
}

pub fn pool_id(label: &str) -> PoolId {
    PoolId::from(address_from_str(label))
}

pub fn token(label: &str, decimals: u8) -> Token {
    Token::new(token_id(label), label, decimals)
}

pub fn pool(id: &str, token0: &str, token1: &str, reserve0: u128, reserve1: u128) -> Pool {
    pool_on("uniswap", id, token0, token1, reserve0, reserve1)
}

pub fn pool_on(
    venue: &str,
    id: &str,
    token0: &str,
    token1: &str,
    reserve0: u128,
    reserve1: u128,
) -> Pool {
    Pool::new(
        pool_id(id),
        VenueId::from(venue),
        token_id(token0),
        token_id(token1),
        U256::from(reserve0),
        U256::from(reserve1),
        DEFAULT_FEE_PPT,
    )
}

pub fn edge(id: &str, token_in: &str, token_out: &str, reserve_in: u128, reserve_out: u128) -> PoolEdge {
    edge_with_fee(id, token_in, token_out, reserve_in, reserve_out, DEFAULT_FEE_PPT)
}

pub fn edge_with_fee(
    id: &str,
    token_in: &str,
    token_out: &str,
    reserve_in: u128,
    reserve_out: u128,
    fee_ppt: u32,
) -> PoolEdge {
    let mut pool = pool(id, token_in, token_out, reserve_in, reserve_out);
    pool.fee_ppt = fee_ppt;
    PoolEdge::forward(&pool)
}

/// Path starting at the first edge's input token
#[allow(clippy::unwrap_used)]
pub fn path(edges: &[(&str, &str, &str, u128, u128)]) -> MultiHopPath {
    let edges: Vec<PoolEdge> = edges
        .iter()
        .map(|(id, token_in, token_out, reserve_in, reserve_out)| {
            edge(id, token_in, token_out, *reserve_in, *reserve_out)
        })
        .collect();
    MultiHopPath::new(edges[0].token_in, edges).unwrap()
}
