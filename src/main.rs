//! Predictoor agent
//!
//! Loads configuration, connects to the chain, and submits predictions for
//! every discovered feed until interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use predictoor::agent::Agent;
use predictoor::chain::{ChainClient, ChainPoller, EthersChainClient};
use predictoor::config::AppConfig;
use predictoor::gate::SubmissionGate;
use predictoor::predictor::{Predictor, RandomPredictor};
use predictoor::registry::{FeedRegistry, SubgraphDiscovery};
use predictoor::settlement::SettlementExecutor;
use predictoor::stake::StakeSizer;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AppConfig::load()?;
    predictoor::logging::init(&cfg.logging);
    cfg.validate().context("Invalid configuration")?;

    info!(config = %cfg, "Predictoor starting up");

    let client = EthersChainClient::connect(&cfg.chain).await?;
    let sizer = StakeSizer::new(cfg.agent.base_stake);
    info!(
        owner = %format!("{:#x}", client.owner()),
        base_stake = sizer.base_stake(),
        "Predicting as"
    );
    let chain: Arc<dyn ChainClient> = Arc::new(client);
    let predictor: Arc<dyn Predictor> = Arc::new(RandomPredictor);

    let discovery = SubgraphDiscovery::new(
        cfg.discovery.subgraph_url.clone(),
        Duration::from_secs(cfg.discovery.timeout_secs),
    )?;
    let registry = FeedRegistry::new(Box::new(discovery)).with_refresh_policy(cfg.refresh_policy());

    let executor = SettlementExecutor::new(
        chain.clone(),
        predictor,
        sizer,
    )
    .with_confidential(cfg.chain.confidential);

    let mut agent = Agent::new(
        chain,
        ChainPoller::new(cfg.poll_interval()),
        registry,
        cfg.feed_filters(),
        SubmissionGate::new(cfg.agent.submission_window_secs),
        executor,
    );

    tokio::select! {
        result = agent.run() => {
            if let Err(e) = &result {
                error!(error = %format!("{:#}", e), "Agent stopped");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    }
}
