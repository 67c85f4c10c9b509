//! Kraken OHLC REST client
//!
//! Kraken names bitcoin `XBT`. The OHLC endpoint only serves the most recent
//! 720 rows, so old timestamps come back as "no data" rather than a wrong
//! price.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{first_open_at_or_after, CANDLE_SECS};
use crate::trueval::PriceSource;
use crate::types::TradingPair;

pub const KRAKEN_REST_URL: &str = "https://api.kraken.com";

#[derive(Debug, Deserialize)]
struct OhlcResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct KrakenSource {
    client: Client,
    base_url: String,
}

impl KrakenSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn ohlc_url(&self, symbol: &str, timestamp: u64) -> String {
        // `since` is exclusive
        format!(
            "{}/0/public/OHLC?pair={}&interval=1&since={}",
            self.base_url,
            symbol,
            timestamp.saturating_sub(CANDLE_SECS)
        )
    }
}

fn kraken_asset(asset: &str) -> &str {
    match asset {
        "BTC" => "XBT",
        other => other,
    }
}

/// Rows are `[time, "open", "high", "low", "close", "vwap", "volume", count]`
/// under the pair name; `last` sits next to them.
fn parse_ohlc(response: OhlcResponse) -> Result<Vec<(u64, f64)>> {
    if !response.error.is_empty() {
        bail!("Kraken API error: {}", response.error.join("; "));
    }
    let rows = response
        .result
        .into_iter()
        .filter(|(key, _)| key != "last")
        .filter_map(|(_, value)| match value {
            serde_json::Value::Array(rows) => Some(rows),
            _ => None,
        })
        .flatten()
        .filter_map(|row| {
            let row = row.as_array()?;
            let time = row.first()?.as_u64()?;
            let open: f64 = row.get(1)?.as_str()?.parse().ok()?;
            Some((time, open))
        })
        .collect();
    Ok(rows)
}

#[async_trait]
impl PriceSource for KrakenSource {
    fn symbol(&self, pair: &TradingPair) -> String {
        format!("{}{}", kraken_asset(&pair.base), kraken_asset(&pair.quote))
    }

    async fn fetch_price_at(&self, symbol: &str, timestamp: u64) -> Result<Option<f64>> {
        let url = self.ohlc_url(symbol, timestamp);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch OHLC from Kraken")?;

        if !response.status().is_success() {
            bail!("Kraken API returned error: {}", response.status());
        }

        let parsed: OhlcResponse = response
            .json()
            .await
            .context("Failed to parse Kraken OHLC response")?;

        Ok(first_open_at_or_after(parse_ohlc(parsed)?, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_btc_to_xbt() {
        let source = KrakenSource::new(KRAKEN_REST_URL, Duration::from_secs(5)).unwrap();
        let pair = TradingPair::parse("btc-usdt").unwrap();
        assert_eq!(source.symbol(&pair), "XBTUSDT");
        let pair = TradingPair::parse("ETH/USDT").unwrap();
        assert_eq!(source.symbol(&pair), "ETHUSDT");
    }

    #[test]
    fn parses_rows_and_ignores_last() {
        let raw = r#"{
            "error": [],
            "result": {
                "XXBTZUSD": [
                    [1692943200, "26000.1", "26010.0", "25990.0", "26005.0", "26001.0", "1.5", 12],
                    [1692943260, "26005.0", "26020.0", "26000.0", "26015.0", "26010.0", "2.0", 9]
                ],
                "last": 1692943260
            }
        }"#;
        let response: OhlcResponse = serde_json::from_str(raw).unwrap();
        let mut rows = parse_ohlc(response).unwrap();
        rows.sort_by_key(|(t, _)| *t);
        assert_eq!(rows, vec![(1_692_943_200, 26_000.1), (1_692_943_260, 26_005.0)]);
        assert_eq!(first_open_at_or_after(rows, 1_692_943_230), Some(26_005.0));
    }

    #[test]
    fn api_errors_surface() {
        let response: OhlcResponse =
            serde_json::from_str(r#"{"error":["EQuery:Unknown asset pair"]}"#).unwrap();
        assert!(parse_ohlc(response).is_err());
    }

    #[test]
    fn since_is_one_candle_early() {
        let source = KrakenSource::new("https://api.kraken.com", Duration::from_secs(5)).unwrap();
        assert_eq!(
            source.ohlc_url("XBTUSDT", 1_000),
            "https://api.kraken.com/0/public/OHLC?pair=XBTUSDT&interval=1&since=940"
        );
    }
}
