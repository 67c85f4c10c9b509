//! Subgraph discovery
//!
//! Lists prediction contracts from the indexing subgraph. Pair, timeframe and
//! source live in the data NFT's key/value store: keys are keccak256 of the
//! field name, values are hex-encoded UTF-8.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ethers::types::Address;
use ethers::utils::keccak256;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use super::{FeedDiscovery, FeedFilters};
use crate::types::FeedMetadata;

const PAGE_SIZE: usize = 1000;

const PREDICT_CONTRACTS_QUERY: &str = r#"
query PredictContracts($first: Int!, $skip: Int!) {
  predictContracts(first: $first, skip: $skip) {
    id
    token {
      id
      name
      symbol
      nft {
        owner { id }
        nftData { key value }
      }
    }
    secondsPerEpoch
    secondsPerSubscription
    truevalSubmitTimeout
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<GraphData>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphData {
    predict_contracts: Vec<PredictContract>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictContract {
    id: String,
    token: Token,
    #[serde(default, deserialize_with = "flexible_u64")]
    seconds_per_epoch: u64,
    #[serde(default, deserialize_with = "flexible_u64")]
    seconds_per_subscription: u64,
    #[serde(default, deserialize_with = "flexible_u64")]
    trueval_submit_timeout: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Token {
    name: String,
    nft: Option<Nft>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Nft {
    owner: Owner,
    #[serde(default)]
    nft_data: Vec<NftDataEntry>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    id: String,
}

#[derive(Debug, Deserialize)]
struct NftDataEntry {
    key: String,
    value: String,
}

/// BigInt fields come back as strings, Int fields as numbers.
fn flexible_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("not a u64: {}", n))),
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|_| D::Error::custom(format!("not a u64: {}", s))),
        serde_json::Value::Null => Ok(0),
        other => Err(D::Error::custom(format!("unexpected value: {}", other))),
    }
}

fn data_key(field: &str) -> String {
    format!("0x{}", hex::encode(keccak256(field.as_bytes())))
}

fn decode_data_value(raw: &str) -> Option<String> {
    let bytes = hex::decode(raw.trim_start_matches("0x")).ok()?;
    String::from_utf8(bytes).ok()
}

impl Nft {
    fn field(&self, name: &str) -> Option<String> {
        let key = data_key(name);
        self.nft_data
            .iter()
            .find(|entry| entry.key.eq_ignore_ascii_case(&key))
            .and_then(|entry| decode_data_value(&entry.value))
    }
}

impl PredictContract {
    fn into_metadata(self) -> Result<FeedMetadata> {
        let address: Address = self
            .id
            .parse()
            .with_context(|| format!("Invalid contract id '{}'", self.id))?;
        let nft = self.token.nft.context("Contract has no data NFT")?;
        let owner: Address = nft
            .owner
            .id
            .parse()
            .with_context(|| format!("Invalid owner '{}'", nft.owner.id))?;
        let pair = nft.field("pair").context("Missing pair")?;
        let timeframe = nft.field("timeframe").context("Missing timeframe")?;
        let source = nft.field("source").context("Missing source")?;

        Ok(FeedMetadata {
            address,
            name: self.token.name,
            pair,
            source,
            timeframe,
            seconds_per_epoch: self.seconds_per_epoch,
            seconds_per_subscription: self.seconds_per_subscription,
            owner,
            trueval_submit_timeout: self.trueval_submit_timeout,
        })
    }
}

/// Discovery over the subgraph's GraphQL endpoint
pub struct SubgraphDiscovery {
    client: Client,
    url: String,
}

impl SubgraphDiscovery {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch_page(&self, skip: usize) -> Result<Vec<PredictContract>> {
        let body = serde_json::json!({
            "query": PREDICT_CONTRACTS_QUERY,
            "variables": { "first": PAGE_SIZE, "skip": skip },
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("Failed to query subgraph")?;

        if !response.status().is_success() {
            bail!("Subgraph returned error: {}", response.status());
        }

        let parsed: GraphResponse = response
            .json()
            .await
            .context("Failed to parse subgraph response")?;
        parse_page(parsed)
    }
}

fn parse_page(response: GraphResponse) -> Result<Vec<PredictContract>> {
    if !response.errors.is_empty() {
        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        bail!("Subgraph query failed: {}", messages.join("; "));
    }
    Ok(response
        .data
        .context("Subgraph response has no data")?
        .predict_contracts)
}

#[async_trait]
impl FeedDiscovery for SubgraphDiscovery {
    async fn discover(&self, filters: &FeedFilters) -> Result<BTreeMap<Address, FeedMetadata>> {
        let mut feeds = BTreeMap::new();
        let mut skip = 0;

        loop {
            let page = self.fetch_page(skip).await?;
            let page_len = page.len();

            for contract in page {
                let id = contract.id.clone();
                match contract.into_metadata() {
                    Ok(meta) if meta.seconds_per_epoch == 0 => {
                        warn!(contract = %id, "Skipping contract without secondsPerEpoch");
                    }
                    Ok(meta) if filters.matches(&meta) => {
                        feeds.insert(meta.address, meta);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(contract = %id, error = %e, "Skipping undecodable contract"),
                }
            }

            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        info!(url = %self.url, feeds = feeds.len(), "Subgraph discovery complete");
        Ok(feeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_value(s: &str) -> String {
        format!("0x{}", hex::encode(s.as_bytes()))
    }

    fn sample_response() -> serde_json::Value {
        serde_json::json!({
            "data": {
                "predictContracts": [{
                    "id": "0x00000000000000000000000000000000000000aa",
                    "token": {
                        "id": "0x00000000000000000000000000000000000000bb",
                        "name": "ETH-USDT",
                        "symbol": "ETH-USDT",
                        "nft": {
                            "owner": { "id": "0x00000000000000000000000000000000000000cc" },
                            "nftData": [
                                { "key": data_key("pair"), "value": hex_value("ETH/USDT") },
                                { "key": data_key("timeframe"), "value": hex_value("5m") },
                                { "key": data_key("source"), "value": hex_value("binance") }
                            ]
                        }
                    },
                    "secondsPerEpoch": "300",
                    "secondsPerSubscription": 86400,
                    "truevalSubmitTimeout": "100"
                }]
            }
        })
    }

    #[test]
    fn decodes_contract_metadata() {
        let response: GraphResponse = serde_json::from_value(sample_response()).unwrap();
        let contracts = parse_page(response).unwrap();
        assert_eq!(contracts.len(), 1);

        let meta = contracts.into_iter().next().unwrap().into_metadata().unwrap();
        assert_eq!(meta.address, Address::from_low_u64_be(0xaa));
        assert_eq!(meta.owner, Address::from_low_u64_be(0xcc));
        assert_eq!(meta.name, "ETH-USDT");
        assert_eq!(meta.pair, "ETH/USDT");
        assert_eq!(meta.timeframe, "5m");
        assert_eq!(meta.source, "binance");
        assert_eq!(meta.seconds_per_epoch, 300);
        assert_eq!(meta.seconds_per_subscription, 86_400);
        assert_eq!(meta.trueval_submit_timeout, 100);
    }

    #[test]
    fn missing_nft_field_is_an_error() {
        let mut value = sample_response();
        value["data"]["predictContracts"][0]["token"]["nft"]["nftData"] = serde_json::json!([]);
        let response: GraphResponse = serde_json::from_value(value).unwrap();
        let contract = parse_page(response).unwrap().into_iter().next().unwrap();
        assert!(contract.into_metadata().is_err());
    }

    #[test]
    fn graphql_errors_fail_the_page() {
        let response: GraphResponse = serde_json::from_value(serde_json::json!({
            "errors": [{ "message": "indexer down" }]
        }))
        .unwrap();
        let err = parse_page(response).unwrap_err();
        assert!(err.to_string().contains("indexer down"));
    }

    #[test]
    fn data_values_are_hex_utf8() {
        assert_eq!(decode_data_value(&hex_value("kraken")).as_deref(), Some("kraken"));
        assert_eq!(decode_data_value("0xzz"), None);
    }
}
