/*!
 * # Hopper - AMM Arbitrage Discovery and Execution
 *
 * Hopper watches constant-product liquidity pools on an EVM chain, finds closed
 * trading cycles whose output exceeds their input, sizes them, scores them with an
 * online confidence model and submits the best ones to a settlement contract, one
 * transaction at a time.
 *
 * ## Module Structure
 *
 * - `arb`: Pool graph, cycle search, AMM simulation and trade sizing
 * - `score`: Market features and the confidence model
 * - `exec`: Settlement contract boundary and single-flight dispatch
 * - `market`: Pool reserve snapshots and reference prices
 * - `bot`: The discovery loop
 * - `config`: Environment and market file configuration
 * - `notify`: Alerts
 * - `utils`: Logging and constants
 */

/// Arbitrage discovery over pool graphs
pub mod arb;
/// The discovery loop
pub mod bot;
/// Configuration management for the system
pub mod config;
/// Settlement and dispatch
pub mod exec;
/// Market data suppliers
pub mod market;
/// Alerting
pub mod notify;
/// Opportunity scoring
pub mod score;
/// Utility functions and helpers
pub mod utils;
