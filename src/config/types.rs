//! Configuration sections

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Version tag for logging
    pub tag: String,
    /// Head poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Submit only when the epoch closes within this many seconds
    pub submission_window_secs: u64,
    /// Stake at 100% confidence
    pub base_stake: f64,
    /// Feed re-discovery interval in seconds (0 = discover once)
    pub discovery_refresh_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Endpoint for confidential transactions
    pub confidential_rpc_url: Option<String>,
    /// Route submissions and claims through the confidential endpoint
    pub confidential: bool,
    /// Chain id (queried from the node when unset)
    pub chain_id: Option<u64>,
    /// Hex private key with 0x prefix
    pub private_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Subgraph GraphQL endpoint
    pub subgraph_url: String,
    /// Comma-separated pairs, e.g. "BTC/USDT,ETH-USDT"
    pub pair_filter: Option<String>,
    /// Comma-separated timeframes, e.g. "5m,1h"
    pub timeframe_filter: Option<String>,
    /// Comma-separated sources, e.g. "binance,kraken"
    pub source_filter: Option<String>,
    /// Comma-separated owner addresses
    pub owner_filter: Option<String>,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TruevalConfig {
    pub binance_url: String,
    pub kraken_url: String,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
