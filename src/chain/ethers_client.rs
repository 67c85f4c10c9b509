//! JSON-RPC chain client
//!
//! Reads heads and feed contract state over HTTP and sends signed
//! `submitPredval` / `payout` transactions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::contract::{abigen, ContractCall};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, I256, U256};
use ethers::utils::parse_units;
use std::sync::Arc;

use super::{ChainClient, ChainError};
use crate::config::ChainConfig;
use crate::types::{BlockSnapshot, TxSummary};

abigen!(
    PredictoorContract,
    r#"[
        function curEpoch() external view returns (uint256)
        function secondsPerEpoch() external view returns (uint256)
        function submitPredval(int256 predictedValue, uint256 stake, uint256 epochStart) external
        function payout(uint256 slot, address predictoor) external
    ]"#
);

/// Amounts are sent as 18-decimal fixed point
const AMOUNT_DECIMALS: u32 = 18;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EthersChainClient {
    provider: Provider<Http>,
    signer: Arc<SignerClient>,
    /// Signer routed through the confidential endpoint, if configured
    confidential: Option<Arc<SignerClient>>,
    owner: Address,
}

impl EthersChainClient {
    pub async fn connect(config: &ChainConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .with_context(|| format!("Invalid chain RPC url '{}'", config.rpc_url))?;

        let chain_id = match config.chain_id {
            Some(id) => id,
            None => provider
                .get_chainid()
                .await
                .context("Failed to query chain id")?
                .as_u64(),
        };

        let wallet: LocalWallet = config
            .private_key
            .parse()
            .context("Invalid PRIVATE_KEY")?;
        let wallet = wallet.with_chain_id(chain_id);
        let owner = wallet.address();

        let signer = Arc::new(SignerMiddleware::new(provider.clone(), wallet.clone()));
        let confidential = match &config.confidential_rpc_url {
            Some(url) => {
                let private = Provider::<Http>::try_from(url.as_str())
                    .with_context(|| format!("Invalid confidential RPC url '{}'", url))?;
                Some(Arc::new(SignerMiddleware::new(private, wallet)))
            }
            None => None,
        };

        tracing::info!(
            chain_id = chain_id,
            owner = %format!("{:#x}", owner),
            confidential = confidential.is_some(),
            "Chain client ready"
        );

        Ok(Self {
            provider,
            signer,
            confidential,
            owner,
        })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    fn client_for(&self, confidential: bool) -> Result<Arc<SignerClient>, ChainError> {
        if !confidential {
            return Ok(self.signer.clone());
        }
        self.confidential
            .clone()
            .ok_or(ChainError::ConfidentialUnavailable)
    }

    fn contract(&self, feed: Address) -> PredictoorContract<SignerClient> {
        PredictoorContract::new(feed, self.signer.clone())
    }
}

fn contract_error(e: impl std::fmt::Display) -> ChainError {
    ChainError::Contract(e.to_string())
}

fn rpc_error(e: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(e.to_string())
}

/// Non-negative amount to 18-decimal fixed point
fn to_fixed_point(amount: f64) -> Result<U256, ChainError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ChainError::InvalidAmount(amount));
    }
    let units = parse_units(format!("{:.18}", amount), AMOUNT_DECIMALS)
        .map_err(|_| ChainError::InvalidAmount(amount))?;
    Ok(units.into())
}

fn to_signed_fixed_point(value: f64) -> Result<I256, ChainError> {
    if !value.is_finite() {
        return Err(ChainError::InvalidAmount(value));
    }
    let magnitude = I256::from_raw(to_fixed_point(value.abs())?);
    Ok(if value < 0.0 { -magnitude } else { magnitude })
}

async fn broadcast(call: ContractCall<SignerClient, ()>) -> Result<TxSummary, ChainError> {
    let pending = call.send().await.map_err(contract_error)?;
    let tx_hash = format!("{:#x}", pending.tx_hash());
    let receipt = pending.await.map_err(rpc_error)?;
    match receipt {
        Some(receipt) => Ok(TxSummary {
            tx_hash,
            block: receipt.block_number.map(|b| b.as_u64()),
        }),
        None => Err(ChainError::Dropped(tx_hash)),
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn current_height(&self) -> Result<u64, ChainError> {
        let height = self.provider.get_block_number().await.map_err(rpc_error)?;
        Ok(height.as_u64())
    }

    async fn get_block(&self, height: u64) -> Result<BlockSnapshot, ChainError> {
        let block = self
            .provider
            .get_block(height)
            .await
            .map_err(rpc_error)?
            .ok_or(ChainError::BlockNotFound(height))?;
        Ok(BlockSnapshot {
            number: block.number.map(|n| n.as_u64()).unwrap_or(height),
            timestamp: block.timestamp.low_u64(),
        })
    }

    async fn get_epoch(&self, feed: Address) -> Result<u64, ChainError> {
        let epoch = self
            .contract(feed)
            .cur_epoch()
            .call()
            .await
            .map_err(contract_error)?;
        Ok(epoch.low_u64())
    }

    async fn get_seconds_per_epoch(&self, feed: Address) -> Result<u64, ChainError> {
        let seconds = self
            .contract(feed)
            .seconds_per_epoch()
            .call()
            .await
            .map_err(contract_error)?;
        Ok(seconds.low_u64())
    }

    async fn submit_prediction(
        &self,
        feed: Address,
        value: f64,
        stake: f64,
        target_timestamp: u64,
        confidential: bool,
    ) -> Result<TxSummary, ChainError> {
        let value_fp = to_signed_fixed_point(value)?;
        let stake_fp = to_fixed_point(stake)?;
        let contract = PredictoorContract::new(feed, self.client_for(confidential)?);

        tracing::debug!(
            feed = %format!("{:#x}", feed),
            value = value,
            stake = stake,
            target_timestamp = target_timestamp,
            confidential = confidential,
            "Sending submitPredval transaction"
        );

        broadcast(contract.submit_predval(value_fp, stake_fp, U256::from(target_timestamp))).await
    }

    async fn claim_payout(
        &self,
        feed: Address,
        slot: u64,
        confidential: bool,
    ) -> Result<TxSummary, ChainError> {
        let contract = PredictoorContract::new(feed, self.client_for(confidential)?);

        tracing::debug!(
            feed = %format!("{:#x}", feed),
            slot = slot,
            confidential = confidential,
            "Sending payout transaction"
        );

        broadcast(contract.payout(U256::from(slot), self.owner)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_scales_by_eighteen_decimals() {
        assert_eq!(
            to_fixed_point(1.0).unwrap(),
            U256::from(1_000_000_000_000_000_000u128)
        );
        assert_eq!(
            to_fixed_point(0.5).unwrap(),
            U256::from(500_000_000_000_000_000u128)
        );
        assert_eq!(to_fixed_point(0.0).unwrap(), U256::zero());
    }

    #[test]
    fn fixed_point_rejects_negative_and_non_finite() {
        assert_eq!(to_fixed_point(-1.0), Err(ChainError::InvalidAmount(-1.0)));
        assert!(to_fixed_point(f64::NAN).is_err());
        assert!(to_signed_fixed_point(f64::INFINITY).is_err());
    }

    #[test]
    fn signed_fixed_point_keeps_sign() {
        let down = to_signed_fixed_point(-2.0).unwrap();
        assert!(down.is_negative());
        assert_eq!(
            down.unsigned_abs(),
            U256::from(2_000_000_000_000_000_000u128)
        );
        assert!(to_signed_fixed_point(105.0).unwrap().is_positive());
    }
}
