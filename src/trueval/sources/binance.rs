//! Binance klines REST client
//!
//! Looks up the open of the first 1m kline at or after a timestamp.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::first_open_at_or_after;
use crate::trueval::PriceSource;
use crate::types::TradingPair;

pub const BINANCE_REST_URL: &str = "https://api.binance.com";

#[derive(Debug, Clone)]
pub struct BinanceSource {
    client: Client,
    base_url: String,
}

impl BinanceSource {
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

    fn klines_url(&self, symbol: &str, timestamp: u64) -> String {
        format!(
            "{}/api/v3/klines?symbol={}&interval=1m&startTime={}&limit=1",
            self.base_url,
            symbol,
            timestamp * 1000
        )
    }
}

/// `[[open_time_ms, "open", "high", "low", "close", ...], ...]`
fn parse_klines(klines: Vec<Vec<serde_json::Value>>) -> Vec<(u64, f64)> {
    klines
        .into_iter()
        .filter_map(|kline| {
            let open_time = kline.first()?.as_u64()? / 1000;
            let open: f64 = kline.get(1)?.as_str()?.parse().ok()?;
            Some((open_time, open))
        })
        .collect()
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn symbol(&self, pair: &TradingPair) -> String {
        pair.concatenated()
    }

    async fn fetch_price_at(&self, symbol: &str, timestamp: u64) -> Result<Option<f64>> {
        let url = self.klines_url(symbol, timestamp);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch klines from Binance")?;

        if !response.status().is_success() {
            bail!("Binance API returned error: {}", response.status());
        }

        let klines: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse Binance klines response")?;

        Ok(first_open_at_or_after(parse_klines(klines), timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_klines_query_in_millis() {
        let source = BinanceSource::new("https://api.binance.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            source.klines_url("BTCUSDT", 1_692_943_200),
            "https://api.binance.com/api/v3/klines?symbol=BTCUSDT&interval=1m&startTime=1692943200000&limit=1"
        );
    }

    #[test]
    fn parses_kline_rows() {
        let raw = r#"[[1692943200000,"26000.5","26010.0","25990.0","26005.1","12.3",1692943259999]]"#;
        let klines: Vec<Vec<serde_json::Value>> = serde_json::from_str(raw).unwrap();
        assert_eq!(parse_klines(klines), vec![(1_692_943_200, 26_000.5)]);
    }

    #[test]
    fn symbol_is_concatenated() {
        let source = BinanceSource::new(BINANCE_REST_URL, Duration::from_secs(5)).unwrap();
        let pair = TradingPair::parse("eth/usdt").unwrap();
        assert_eq!(source.symbol(&pair), "ETHUSDT");
    }
}
