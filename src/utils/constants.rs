use alloy::primitives::{address, Address};

/// WETH address on Base, the token gas is paid in
pub const WETH: Address = address!("0x4200000000000000000000000000000000000006");
