//! Configuration: environment variables (optionally from a `.env` file) plus a JSON
//! market file describing the tokens, pools, direct pairs and base tokens to watch.
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use url::Url;

use crate::arb::finder::DEFAULT_MAX_HOPS;
use crate::arb::pool::{PoolId, VenueId, DEFAULT_FEE_PPT, FEE_DENOMINATOR};
use crate::arb::token::{Token, TokenId};
use crate::exec::dispatcher::{DispatcherConfig, DEFAULT_EXPLORE_AFTER, DEFAULT_QUEUE_DEPTH};
use crate::exec::settlement::GasConfig;
use crate::market::prices::StaticPrices;
use crate::market::source::PoolSpec;
use crate::utils::constants::WETH;

/// Wei per gwei
const WEI_PER_GWEI: f64 = 1e9;

/// Runtime configuration read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP endpoint of the node
    pub rpc_url: Url,
    /// Signing key of the shared account, required to submit
    pub private_key: Option<String>,
    /// Settlement contract, required to quote and submit
    pub settlement_address: Option<Address>,
    /// Path of the JSON market file
    pub market_file: PathBuf,
    /// Minimum net profit, in USD
    pub min_profit_usd: f64,
    /// Minimum model confidence
    pub min_confidence: f64,
    /// Gas price in wei
    pub gas_price_wei: u128,
    /// Gas limit of submissions
    pub gas_limit: u64,
    /// Whether cycles are searched besides direct pairs
    pub multi_hop_enabled: bool,
    /// Maximum cycle length
    pub max_hops: usize,
    /// Sleep between passes
    pub poll_interval: Duration,
    /// Bound on the wait for the submission permit
    pub lock_timeout: Duration,
    /// Bound on requests waiting for the submission permit
    pub queue_depth: usize,
    /// Low-confidence skips before a candidate is executed anyway, 0 to never explore
    pub explore_after: usize,
}

impl Config {
    /// Reads the configuration from the environment, loading `.env` first if present.
    ///
    /// # Errors
    ///
    /// Returns an error if `RPC_URL` is missing or any variable does not parse.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let rpc_url = required("RPC_URL")?
            .parse::<Url>()
            .wrap_err("RPC_URL is not a valid URL")?;
        let settlement_address = optional("SETTLEMENT_ADDRESS")
            .map(|address| address.parse::<Address>())
            .transpose()
            .wrap_err("SETTLEMENT_ADDRESS is not a valid address")?;
        let gas_price_gwei: f64 = parse_or("GAS_PRICE_GWEI", 1.0)?;
        if !gas_price_gwei.is_finite() || gas_price_gwei < 0.0 {
            return Err(eyre!("GAS_PRICE_GWEI must be a non-negative number"));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let gas_price_wei = (gas_price_gwei * WEI_PER_GWEI) as u128;

        Ok(Self {
            rpc_url,
            private_key: optional("PRIVATE_KEY"),
            settlement_address,
            market_file: PathBuf::from(optional("MARKET_FILE").unwrap_or_else(|| "market.json".into())),
            min_profit_usd: parse_or("MIN_PROFIT_USD", 1.0)?,
            min_confidence: parse_or("MIN_CONFIDENCE", 0.5)?,
            gas_price_wei,
            gas_limit: parse_or("GAS_LIMIT", 500_000)?,
            multi_hop_enabled: parse_or("MULTI_HOP_ENABLED", true)?,
            max_hops: parse_or("MAX_HOPS", DEFAULT_MAX_HOPS)?,
            poll_interval: Duration::from_millis(parse_or("POLL_INTERVAL_MS", 1_000)?),
            lock_timeout: Duration::from_millis(parse_or("LOCK_TIMEOUT_MS", 2_000)?),
            queue_depth: parse_or("QUEUE_DEPTH", DEFAULT_QUEUE_DEPTH)?,
            explore_after: parse_or("EXPLORE_AFTER", DEFAULT_EXPLORE_AFTER)?,
        })
    }

    /// Gas parameters of submissions
    #[must_use]
    pub const fn gas(&self) -> GasConfig {
        GasConfig {
            gas_price_wei: self.gas_price_wei,
            gas_limit: self.gas_limit,
        }
    }

    /// Dispatcher thresholds and limits
    #[must_use]
    pub const fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            min_profit_usd: self.min_profit_usd,
            min_confidence: self.min_confidence,
            gas: self.gas(),
            native_token: TokenId(WETH),
            queue_depth: self.queue_depth,
            lock_timeout: self.lock_timeout,
            explore_after: self.explore_after,
        }
    }
}

/// Value of a variable, `None` if unset or blank
fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Value of a variable that must be set
fn required(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| eyre!("{name} must be set"))
}

/// Parses a variable, `default` if unset
fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    parse_value(name, optional(name).as_deref(), default)
}

/// Parses `value` of variable `name`, `default` if `None`
fn parse_value<T>(name: &str, value: Option<&str>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value.map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|e| eyre!("{name}={value} is invalid: {e}"))
    })
}

/// A token of the market file
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    /// Contract address
    pub address: Address,
    /// Ticker symbol
    pub symbol: String,
    /// Decimal precision
    pub decimals: u8,
    /// Reference price in USD, if known
    #[serde(default)]
    pub price: Option<f64>,
}

/// A pool of the market file
#[derive(Debug, Clone, Deserialize)]
pub struct PoolEntry {
    /// Pair contract address
    pub address: Address,
    /// First token of the pair
    pub token0: Address,
    /// Second token of the pair
    pub token1: Address,
    /// Swap fee in parts-per-thousand
    #[serde(default = "default_fee_ppt")]
    pub fee_ppt: u32,
    /// Venue name
    #[serde(default = "default_venue")]
    pub venue: String,
}

/// Default fee of a pool entry
const fn default_fee_ppt() -> u32 {
    DEFAULT_FEE_PPT
}

/// Default venue of a pool entry
fn default_venue() -> String {
    "uniswap_v2".to_string()
}

/// The market to watch
#[derive(Debug, Clone, Deserialize)]
pub struct MarketFile {
    /// Token reference data and prices
    pub tokens: Vec<TokenEntry>,
    /// Pools whose reserves are read every pass
    pub pools: Vec<PoolEntry>,
    /// Pool pairs evaluated as direct arbitrages
    #[serde(default)]
    pub pairs: Vec<(Address, Address)>,
    /// Start tokens of the cycle search
    #[serde(default)]
    pub base_tokens: Vec<Address>,
}

impl MarketFile {
    /// Reads and validates a market file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON or is inconsistent.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read market file {}", path.display()))?;
        Self::parse(&json)
    }

    /// Parses and validates a market description.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid JSON, a fee of 100% or more, a pair naming an unknown
    /// pool, or a base token without reference data.
    pub fn parse(json: &str) -> Result<Self> {
        let market: Self = serde_json::from_str(json)?;
        market.validate()?;
        Ok(market)
    }

    /// Checks that every reference points at something declared
    fn validate(&self) -> Result<()> {
        let pools: HashSet<_> = self.pools.iter().map(|pool| pool.address).collect();
        let tokens: HashSet<_> = self.tokens.iter().map(|token| token.address).collect();

        if let Some(pool) = self.pools.iter().find(|pool| pool.fee_ppt >= FEE_DENOMINATOR) {
            return Err(eyre!("pool {} has fee {} ppt", pool.address, pool.fee_ppt));
        }
        for (a, b) in &self.pairs {
            if let Some(unknown) = [a, b].into_iter().find(|pool| !pools.contains(*pool)) {
                return Err(eyre!("pair {a}/{b} references unknown pool {unknown}"));
            }
        }
        if let Some(unknown) = self.base_tokens.iter().find(|token| !tokens.contains(*token)) {
            return Err(eyre!("base token {unknown} is not listed in tokens"));
        }
        for pool in &self.pools {
            for token in [pool.token0, pool.token1] {
                if !tokens.contains(&token) {
                    log::warn!("config: pool {} trades unlisted token {token}", pool.address);
                }
            }
        }
        Ok(())
    }

    /// Token reference data by id
    #[must_use]
    pub fn tokens(&self) -> HashMap<TokenId, Token> {
        self.tokens
            .iter()
            .map(|entry| {
                let id = TokenId(entry.address);
                (id, Token::new(id, entry.symbol.clone(), entry.decimals))
            })
            .collect()
    }

    /// Reference prices of the tokens that have one
    #[must_use]
    pub fn prices(&self) -> StaticPrices {
        self.tokens
            .iter()
            .filter_map(|entry| entry.price.map(|price| (TokenId(entry.address), price)))
            .collect()
    }

    /// Pools to read reserves for
    #[must_use]
    pub fn pool_specs(&self) -> Vec<PoolSpec> {
        self.pools
            .iter()
            .map(|entry| PoolSpec {
                id: PoolId(entry.address),
                venue: VenueId(entry.venue.clone()),
                token0: TokenId(entry.token0),
                token1: TokenId(entry.token1),
                fee_ppt: entry.fee_ppt,
            })
            .collect()
    }

    /// Direct pairs
    #[must_use]
    pub fn pairs(&self) -> Vec<(PoolId, PoolId)> {
        self.pairs
            .iter()
            .map(|(a, b)| (PoolId(*a), PoolId(*b)))
            .collect()
    }

    /// Start tokens of the cycle search
    #[must_use]
    pub fn base_tokens(&self) -> Vec<TokenId> {
        self.base_tokens.iter().copied().map(TokenId).collect()
    }
}
