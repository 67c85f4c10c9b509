//! Trueval determination
//!
//! Compares the price at-or-after the start and end of a settled epoch. The
//! result says whether the price went up, or that it could not be decided.

pub mod sources;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::config::TruevalConfig;
use crate::types::{Feed, TradingPair, TruevalResult};
use sources::{BinanceSource, KrakenSource};

/// Historical price lookup for one exchange
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Exchange symbol for a normalized pair
    fn symbol(&self, pair: &TradingPair) -> String;

    /// First observed price at or after `timestamp` (unix seconds)
    async fn fetch_price_at(&self, symbol: &str, timestamp: u64) -> Result<Option<f64>>;
}

/// Price sources keyed by lowercase source name
#[derive(Default, Clone)]
pub struct PriceSources {
    sources: HashMap<String, Arc<dyn PriceSource>>,
}

impl PriceSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, name: &str, source: Arc<dyn PriceSource>) -> Self {
        self.sources.insert(name.to_lowercase(), source);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PriceSource>> {
        self.sources.get(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

pub struct TruevalDeterminer {
    sources: PriceSources,
}

impl TruevalDeterminer {
    pub fn new(sources: PriceSources) -> Self {
        Self { sources }
    }

    /// Binance and Kraken over REST
    pub fn from_config(cfg: &TruevalConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.timeout_secs);
        let sources = PriceSources::new()
            .with_source("binance", Arc::new(BinanceSource::new(&cfg.binance_url, timeout)?))
            .with_source("kraken", Arc::new(KrakenSource::new(&cfg.kraken_url, timeout)?));
        Ok(Self::new(sources))
    }

    /// Whether the price at `t1` is above the price at `t0`.
    ///
    /// Fails (outcome false, `is_failure` true) when the feed's source or pair
    /// is unusable or either price is missing. `t1` is not fetched once `t0`
    /// has failed.
    pub async fn determine(&self, feed: &Feed, t0: u64, t1: u64) -> TruevalResult {
        self.determine_pair(&feed.pair, &feed.source, t0, t1).await
    }

    /// Same as [`determine`](Self::determine) without a feed record.
    pub async fn determine_pair(&self, pair: &str, source: &str, t0: u64, t1: u64) -> TruevalResult {
        let Some(price_source) = self.sources.get(source) else {
            tracing::warn!(source = %source, known = ?self.sources.names(), "Unknown price source");
            return TruevalResult::failure();
        };
        let Some(trading_pair) = TradingPair::parse(pair) else {
            tracing::warn!(pair = %pair, "Unparseable pair");
            return TruevalResult::failure();
        };
        let symbol = price_source.symbol(&trading_pair);

        let Some(init) = fetch(price_source.as_ref(), &symbol, t0).await else {
            return TruevalResult::failure();
        };
        let Some(end) = fetch(price_source.as_ref(), &symbol, t1).await else {
            return TruevalResult::failure();
        };

        tracing::debug!(
            source = %source,
            symbol = %symbol,
            t0 = t0,
            t1 = t1,
            init = init,
            end = end,
            "Trueval prices"
        );
        TruevalResult::success(end > init)
    }
}

async fn fetch(source: &dyn PriceSource, symbol: &str, timestamp: u64) -> Option<f64> {
    match source.fetch_price_at(symbol, timestamp).await {
        Ok(Some(price)) => Some(price),
        Ok(None) => {
            tracing::warn!(symbol = %symbol, timestamp = timestamp, "No price data");
            None
        }
        Err(e) => {
            tracing::warn!(symbol = %symbol, timestamp = timestamp, error = %e, "Price fetch failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    fn feed(pair: &str, source: &str) -> Feed {
        let mut meta = fixtures::metadata(1, 60);
        meta.pair = pair.to_string();
        meta.source = source.to_string();
        Feed::new(meta).unwrap()
    }

    fn determiner(mock: MockPriceSource) -> TruevalDeterminer {
        TruevalDeterminer::new(PriceSources::new().with_source("kraken", Arc::new(mock)))
    }

    fn concatenating(mock: &mut MockPriceSource) {
        mock.expect_symbol().returning(|pair| pair.concatenated());
    }

    #[tokio::test]
    async fn price_up_is_true() {
        let mut mock = MockPriceSource::new();
        concatenating(&mut mock);
        mock.expect_fetch_price_at()
            .withf(|_, ts| *ts == 1)
            .times(1)
            .returning(|_, _| Ok(Some(100.0)));
        mock.expect_fetch_price_at()
            .withf(|_, ts| *ts == 2)
            .times(1)
            .returning(|_, _| Ok(Some(200.0)));

        let result = determiner(mock).determine(&feed("eth-usdt", "kraken"), 1, 2).await;
        assert_eq!(result, TruevalResult::success(true));
    }

    #[tokio::test]
    async fn price_flat_or_down_is_false() {
        let mut mock = MockPriceSource::new();
        concatenating(&mut mock);
        mock.expect_fetch_price_at()
            .returning(|_, ts| Ok(Some(if ts == 1 { 100.0 } else { 100.0 - ts as f64 + 2.0 })));

        let d = determiner(mock);
        assert_eq!(
            d.determine(&feed("eth-usdt", "kraken"), 1, 2).await,
            TruevalResult::success(false)
        );
        assert_eq!(
            d.determine(&feed("eth-usdt", "kraken"), 1, 5).await,
            TruevalResult::success(false)
        );
    }

    #[tokio::test]
    async fn empty_data_is_failure() {
        let mut mock = MockPriceSource::new();
        concatenating(&mut mock);
        mock.expect_fetch_price_at().returning(|_, _| Ok(None));

        let result = determiner(mock).determine(&feed("eth-usdt", "kraken"), 1, 2).await;
        assert_eq!(result, TruevalResult::failure());
        assert!(result.is_failure);
        assert!(!result.outcome);
    }

    #[tokio::test]
    async fn failed_end_price_is_failure() {
        let mut mock = MockPriceSource::new();
        concatenating(&mut mock);
        mock.expect_fetch_price_at()
            .withf(|_, ts| *ts == 1)
            .returning(|_, _| Ok(Some(100.0)));
        mock.expect_fetch_price_at()
            .withf(|_, ts| *ts == 2)
            .returning(|_, _| Err(anyhow::anyhow!("timeout")));

        let result = determiner(mock).determine(&feed("eth-usdt", "kraken"), 1, 2).await;
        assert_eq!(result, TruevalResult::failure());
    }

    #[tokio::test]
    async fn failed_start_price_stops_before_second_fetch() {
        let mut mock = MockPriceSource::new();
        concatenating(&mut mock);
        mock.expect_fetch_price_at()
            .withf(|_, ts| *ts == 1)
            .times(1)
            .returning(|_, _| Ok(None));
        mock.expect_fetch_price_at()
            .withf(|_, ts| *ts == 2)
            .times(0)
            .returning(|_, _| Ok(Some(200.0)));

        let result = determiner(mock).determine(&feed("eth-usdt", "kraken"), 1, 2).await;
        assert_eq!(result, TruevalResult::failure());
    }

    #[tokio::test]
    async fn pair_spellings_query_the_same_symbol() {
        for pair in ["BTC/USDT", "btc-usdt", "BTC-USDT", "btc/usdt"] {
            let mut mock = MockPriceSource::new();
            concatenating(&mut mock);
            mock.expect_fetch_price_at()
                .withf(|symbol, _| symbol == "BTCUSDT")
                .times(2)
                .returning(|_, ts| Ok(Some(ts as f64)));

            let result = determiner(mock).determine(&feed(pair, "Kraken"), 10, 20).await;
            assert_eq!(result, TruevalResult::success(true), "{}", pair);
        }
    }

    #[tokio::test]
    async fn unknown_source_is_failure() {
        let mut mock = MockPriceSource::new();
        mock.expect_symbol().times(0).returning(|pair| pair.concatenated());
        mock.expect_fetch_price_at().times(0);

        let result = determiner(mock).determine(&feed("eth-usdt", "coinbase"), 1, 2).await;
        assert_eq!(result, TruevalResult::failure());
    }
}
