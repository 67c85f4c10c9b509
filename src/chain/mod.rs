//! Chain access
//!
//! - `ChainClient`: the RPC seam used by the poller and the settlement executor
//! - `EthersChainClient`: JSON-RPC implementation on top of ethers
//! - `ChainPoller`: turns head-height polling into one tick per new head

pub mod ethers_client;
pub mod poller;

pub use ethers_client::EthersChainClient;
pub use poller::ChainPoller;

use async_trait::async_trait;
use ethers::types::Address;
use thiserror::Error;

use crate::types::{BlockSnapshot, TxSummary};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("contract call failed: {0}")]
    Contract(String),
    #[error("invalid amount {0}")]
    InvalidAmount(f64),
    #[error("transaction {0} dropped before confirmation")]
    Dropped(String),
    #[error("confidential submission requested but no confidential endpoint is configured")]
    ConfidentialUnavailable,
}

/// Everything the agent needs from the chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head height
    async fn current_height(&self) -> Result<u64, ChainError>;

    async fn get_block(&self, height: u64) -> Result<BlockSnapshot, ChainError>;

    /// Epoch index the feed contract reports
    async fn get_epoch(&self, feed: Address) -> Result<u64, ChainError>;

    async fn get_seconds_per_epoch(&self, feed: Address) -> Result<u64, ChainError>;

    async fn submit_prediction(
        &self,
        feed: Address,
        value: f64,
        stake: f64,
        target_timestamp: u64,
        confidential: bool,
    ) -> Result<TxSummary, ChainError>;

    async fn claim_payout(
        &self,
        feed: Address,
        slot: u64,
        confidential: bool,
    ) -> Result<TxSummary, ChainError>;
}
