//! Configuration management for the agent
//!
//! Loads defaults, optional `config/default` and `config/local` files,
//! `PREDICTOOR__*` environment variables, and the flat variables the agent has
//! always read (`RPC_URL`, `SUBGRAPH_URL`, `PRIVATE_KEY`, ...). Nothing is
//! reloaded after startup.

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::registry::{FeedFilters, RefreshPolicy};
use crate::trueval::sources::{BINANCE_REST_URL, KRAKEN_REST_URL};

/// Flat environment variables and the keys they override
const LEGACY_ENV: &[(&str, &str)] = &[
    ("RPC_URL", "chain.rpc_url"),
    ("PRIVATE_KEY", "chain.private_key"),
    ("SUBGRAPH_URL", "discovery.subgraph_url"),
    ("PAIR_FILTER", "discovery.pair_filter"),
    ("TIMEFRAME_FILTER", "discovery.timeframe_filter"),
    ("SOURCE_FILTER", "discovery.source_filter"),
    ("OWNER_ADDRS", "discovery.owner_filter"),
    ("SECONDS_TILL_EPOCH_END", "agent.submission_window_secs"),
    ("STAKE_AMOUNT", "agent.base_stake"),
];

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub chain: ChainConfig,
    pub discovery: DiscoveryConfig,
    pub trueval: TruevalConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Builder preloaded with every default
    pub fn with_defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            // Agent defaults
            .set_default("agent.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("agent.poll_interval_ms", 1000)?
            .set_default("agent.submission_window_secs", 5)?
            .set_default("agent.base_stake", 1.0)?
            .set_default("agent.discovery_refresh_secs", 0)?
            // Chain defaults
            .set_default("chain.rpc_url", "")?
            .set_default("chain.confidential", false)?
            .set_default("chain.private_key", "")?
            // Discovery defaults
            .set_default("discovery.subgraph_url", "")?
            .set_default("discovery.timeout_secs", 30)?
            // Trueval defaults
            .set_default("trueval.binance_url", BINANCE_REST_URL)?
            .set_default("trueval.kraken_url", KRAKEN_REST_URL)?
            .set_default("trueval.timeout_secs", 30)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;
        Ok(builder)
    }

    /// Load configuration from files and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let mut builder = Self::with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("PREDICTOOR").separator("__"));

        for (var, key) in LEGACY_ENV {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        let config = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Reject configurations the agent cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.trim().is_empty() {
            bail!("chain.rpc_url is not set (RPC_URL)");
        }
        if self.discovery.subgraph_url.trim().is_empty() {
            bail!("discovery.subgraph_url is not set (SUBGRAPH_URL)");
        }

        let pk = self.chain.private_key.trim();
        if pk.is_empty() {
            bail!("chain.private_key is not set (PRIVATE_KEY)");
        }
        if !pk.starts_with("0x")
            || pk.len() != 66
            || !pk[2..].chars().all(|c| c.is_ascii_hexdigit())
        {
            bail!("PRIVATE_KEY must be a hex string with 0x prefix (66 chars total)");
        }

        if self.chain.confidential && self.chain.confidential_rpc_url.is_none() {
            bail!("chain.confidential is set but chain.confidential_rpc_url is not");
        }
        if self.agent.submission_window_secs == 0 {
            bail!("agent.submission_window_secs must be positive");
        }
        if !self.agent.base_stake.is_finite() || self.agent.base_stake <= 0.0 {
            bail!("agent.base_stake must be a positive number");
        }
        if self.agent.poll_interval_ms == 0 {
            bail!("agent.poll_interval_ms must be positive");
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.agent.poll_interval_ms)
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::from_secs(self.agent.discovery_refresh_secs)
    }

    pub fn feed_filters(&self) -> FeedFilters {
        FeedFilters::from_csv(
            self.discovery.pair_filter.as_deref(),
            self.discovery.timeframe_filter.as_deref(),
            self.discovery.source_filter.as_deref(),
            self.discovery.owner_filter.as_deref(),
        )
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "tag={} window={}s base_stake={} poll={}ms refresh={}s pairs={:?} timeframes={:?} sources={:?} confidential={}",
            self.agent.tag,
            self.agent.submission_window_secs,
            self.agent.base_stake,
            self.agent.poll_interval_ms,
            self.agent.discovery_refresh_secs,
            self.discovery.pair_filter,
            self.discovery.timeframe_filter,
            self.discovery.source_filter,
            self.chain.confidential,
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn build(overrides: &[(&str, &str)]) -> AppConfig {
        let mut builder = AppConfig::with_defaults().unwrap();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap().try_deserialize().unwrap()
    }

    fn valid() -> Vec<(&'static str, &'static str)> {
        vec![
            ("chain.rpc_url", "http://localhost:8545"),
            ("chain.private_key", KEY),
            ("discovery.subgraph_url", "http://localhost:9000/subgraphs/name/pdr"),
        ]
    }

    #[test]
    fn defaults_match_agent_behaviour() {
        let cfg = build(&valid());
        assert_eq!(cfg.agent.submission_window_secs, 5);
        assert_eq!(cfg.agent.base_stake, 1.0);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.refresh_policy(), RefreshPolicy::Never);
        assert_eq!(cfg.feed_filters(), FeedFilters::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_endpoints_are_fatal() {
        assert!(build(&[]).validate().is_err());

        let mut no_subgraph = valid();
        no_subgraph.retain(|(k, _)| *k != "discovery.subgraph_url");
        let err = build(&no_subgraph).validate().unwrap_err();
        assert!(err.to_string().contains("subgraph_url"));
    }

    #[test]
    fn malformed_private_key_is_fatal() {
        let mut overrides = valid();
        overrides.push(("chain.private_key", "deadbeef"));
        assert!(build(&overrides).validate().is_err());
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let mut overrides = valid();
        overrides.push(("agent.submission_window_secs", "10"));
        overrides.push(("agent.base_stake", "2.5"));
        overrides.push(("discovery.pair_filter", "BTC/USDT, eth-usdt"));
        let cfg = build(&overrides);
        assert_eq!(cfg.agent.submission_window_secs, 10);
        assert_eq!(cfg.agent.base_stake, 2.5);
        assert_eq!(cfg.feed_filters().pairs, vec!["BTC/USDT", "eth-usdt"]);
    }

    #[test]
    fn confidential_requires_endpoint() {
        let mut overrides = valid();
        overrides.push(("chain.confidential", "true"));
        assert!(build(&overrides).validate().is_err());
        overrides.push(("chain.confidential_rpc_url", "http://localhost:8546"));
        assert!(build(&overrides).validate().is_ok());
    }

    #[test]
    fn digest_has_no_secrets() {
        let cfg = build(&valid());
        assert!(!cfg.digest().contains(KEY));
    }
}
