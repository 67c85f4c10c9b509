//! Core types used throughout the agent
//!
//! Feeds, block snapshots, derived epoch state and the per-tick outcome values.

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::chain::ChainError;

/// Base/quote pair normalized to uppercase.
///
/// Accepts `BASE-QUOTE` or `BASE/QUOTE` in any case, so `"btc-usdt"`,
/// `"BTC/USDT"` and `"BTC-USDT"` all parse to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    /// Parse from string
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase().replace('-', "/");
        let (base, quote) = normalized.split_once('/')?;
        let (base, quote) = (base.trim(), quote.trim());
        if base.is_empty() || quote.is_empty() || quote.contains('/') {
            return None;
        }
        Some(Self {
            base: base.to_string(),
            quote: quote.to_string(),
        })
    }

    /// Symbol for CEX REST APIs (e.g., "BTCUSDT")
    pub fn concatenated(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Immutable feed record as returned by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMetadata {
    pub address: Address,
    pub name: String,
    pub pair: String,
    pub source: String,
    pub timeframe: String,
    pub seconds_per_epoch: u64,
    pub seconds_per_subscription: u64,
    pub owner: Address,
    pub trueval_submit_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("feed {0:#x} has seconds_per_epoch = 0")]
    ZeroEpochLength(Address),
}

/// A prediction feed together with its per-process submission state.
///
/// Owned by the [`FeedRegistry`](crate::registry::FeedRegistry); everything
/// else works on `&Feed` / `&mut Feed`.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub address: Address,
    pub name: String,
    pub pair: String,
    pub source: String,
    pub timeframe: String,
    pub seconds_per_epoch: u64,
    pub seconds_per_subscription: u64,
    pub owner: Address,
    pub trueval_submit_timeout: u64,
    last_submitted_epoch: Option<u64>,
    last_claimed_epoch: Option<u64>,
}

impl Feed {
    pub fn new(meta: FeedMetadata) -> Result<Self, FeedError> {
        if meta.seconds_per_epoch == 0 {
            return Err(FeedError::ZeroEpochLength(meta.address));
        }
        Ok(Self {
            address: meta.address,
            name: meta.name,
            pair: meta.pair,
            source: meta.source,
            timeframe: meta.timeframe,
            seconds_per_epoch: meta.seconds_per_epoch,
            seconds_per_subscription: meta.seconds_per_subscription,
            owner: meta.owner,
            trueval_submit_timeout: meta.trueval_submit_timeout,
            last_submitted_epoch: None,
            last_claimed_epoch: None,
        })
    }

    pub fn last_submitted_epoch(&self) -> Option<u64> {
        self.last_submitted_epoch
    }

    pub fn last_claimed_epoch(&self) -> Option<u64> {
        self.last_claimed_epoch
    }

    /// Record a successful submission. Never moves the marker backwards.
    pub fn record_submission(&mut self, epoch: u64) {
        if self.last_submitted_epoch.map_or(true, |last| epoch > last) {
            self.last_submitted_epoch = Some(epoch);
        }
    }

    /// Record that the payout claim for this epoch's tick has been attempted.
    pub fn record_claim_attempt(&mut self, epoch: u64) {
        if self.last_claimed_epoch.map_or(true, |last| epoch > last) {
            self.last_claimed_epoch = Some(epoch);
        }
    }

    /// Switch to a new epoch length, moving both markers to the epoch that
    /// holds the last second of the marked epoch. Zero is ignored.
    pub fn set_seconds_per_epoch(&mut self, seconds_per_epoch: u64) {
        if seconds_per_epoch == 0 || seconds_per_epoch == self.seconds_per_epoch {
            return;
        }
        let old = self.seconds_per_epoch;
        let rescale = |epoch: u64| {
            (epoch.saturating_add(1).saturating_mul(old) - 1) / seconds_per_epoch
        };
        self.last_submitted_epoch = self.last_submitted_epoch.map(rescale);
        self.last_claimed_epoch = self.last_claimed_epoch.map(rescale);
        self.seconds_per_epoch = seconds_per_epoch;
    }

    pub fn trading_pair(&self) -> Option<TradingPair> {
        TradingPair::parse(&self.pair)
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {} {})",
            self.name, self.pair, self.timeframe, self.source
        )
    }
}

/// Block head observed by the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub number: u64,
    /// Unix seconds
    pub timestamp: u64,
}

/// Epoch position of a feed at a given block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochState {
    pub epoch: u64,
    pub seconds_till_close: u64,
}

/// Predictor output for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionCandidate {
    pub value: Option<f64>,
    /// 0 - 100
    pub confidence: f64,
}

/// Mined (or at least broadcast) transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSummary {
    pub tx_hash: String,
    pub block: Option<u64>,
}

impl fmt::Display for TxSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block {
            Some(block) => write!(f, "{} @ {}", self.tx_hash, block),
            None => write!(f, "{} (pending)", self.tx_hash),
        }
    }
}

/// Why a submission was not attempted
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoPrediction,
    NonPositiveConfidence(f64),
    InvalidPrediction { value: f64, confidence: f64 },
    PredictorFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoPrediction => write!(f, "predictor returned no value"),
            SkipReason::NonPositiveConfidence(c) => {
                write!(f, "non-positive confidence {}", c)
            }
            SkipReason::InvalidPrediction { value, confidence } => {
                write!(f, "invalid prediction ({}, {})", value, confidence)
            }
            SkipReason::PredictorFailed(e) => write!(f, "predictor failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Submitted {
        target_timestamp: u64,
        stake: f64,
        tx: TxSummary,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        target_timestamp: u64,
        error: ChainError,
    },
}

impl SubmissionOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmissionOutcome::Submitted { .. })
    }
}

impl fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionOutcome::Submitted {
                target_timestamp,
                stake,
                tx,
            } => write!(
                f,
                "submitted for slot {} stake {:.6} tx {}",
                target_timestamp, stake, tx
            ),
            SubmissionOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            SubmissionOutcome::Failed {
                target_timestamp,
                error,
            } => write!(f, "submit for slot {} failed: {}", target_timestamp, error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayoutOutcome {
    Claimed { slot: u64, tx: TxSummary },
    Failed { slot: u64, error: ChainError },
    AlreadyAttempted { slot: u64 },
}

impl fmt::Display for PayoutOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutOutcome::Claimed { slot, tx } => {
                write!(f, "claimed slot {} tx {}", slot, tx)
            }
            PayoutOutcome::Failed { slot, error } => {
                write!(f, "claim for slot {} failed: {}", slot, error)
            }
            PayoutOutcome::AlreadyAttempted { slot } => {
                write!(f, "claim for slot {} already attempted", slot)
            }
        }
    }
}

/// Ground truth for a settled epoch.
///
/// When `is_failure` is set, `outcome` carries no information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruevalResult {
    pub outcome: bool,
    pub is_failure: bool,
}

impl TruevalResult {
    pub fn success(outcome: bool) -> Self {
        Self {
            outcome,
            is_failure: false,
        }
    }

    pub fn failure() -> Self {
        Self {
            outcome: false,
            is_failure: true,
        }
    }

    /// `None` on failure
    pub fn outcome(&self) -> Option<bool> {
        if self.is_failure {
            None
        } else {
            Some(self.outcome)
        }
    }
}

impl fmt::Display for TruevalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome() {
            Some(true) => write!(f, "UP"),
            Some(false) => write!(f, "DOWN"),
            None => write!(f, "FAILED"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_parsing_accepts_both_separators() {
        let expected = TradingPair {
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
        };
        for raw in ["BTC/USDT", "btc-usdt", "BTC-USDT", " btc/usdt "] {
            assert_eq!(TradingPair::parse(raw), Some(expected.clone()), "{}", raw);
        }
        assert_eq!(expected.concatenated(), "BTCUSDT");
    }

    #[test]
    fn pair_parsing_rejects_garbage() {
        assert_eq!(TradingPair::parse("BTCUSDT"), None);
        assert_eq!(TradingPair::parse("BTC/"), None);
        assert_eq!(TradingPair::parse("BTC/USDT/EUR"), None);
    }

    #[test]
    fn feed_rejects_zero_epoch_length() {
        assert!(Feed::new(fixtures::metadata(1, 0)).is_err());
    }

    #[test]
    fn submission_marker_is_monotonic() {
        let mut feed = fixtures::feed(1, 300);
        assert_eq!(feed.last_submitted_epoch(), None);
        feed.record_submission(10);
        feed.record_submission(7);
        assert_eq!(feed.last_submitted_epoch(), Some(10));
        feed.record_submission(11);
        assert_eq!(feed.last_submitted_epoch(), Some(11));
    }

    #[test]
    fn longer_epochs_pull_markers_back() {
        let mut feed = fixtures::feed(1, 300);
        feed.record_submission(1000);
        feed.record_claim_attempt(1000);
        feed.set_seconds_per_epoch(600);
        assert_eq!(feed.seconds_per_epoch, 600);
        assert_eq!(feed.last_submitted_epoch(), Some(500));
        assert_eq!(feed.last_claimed_epoch(), Some(500));
    }

    #[test]
    fn shorter_epochs_keep_the_submitted_window_closed() {
        let mut feed = fixtures::feed(1, 300);
        feed.record_submission(1000);
        feed.set_seconds_per_epoch(150);
        // Epoch 1000 at 300s ends inside epoch 2001 at 150s
        assert_eq!(feed.last_submitted_epoch(), Some(2001));
        assert_eq!(feed.last_claimed_epoch(), None);
    }

    #[test]
    fn zero_or_same_epoch_length_is_ignored() {
        let mut feed = fixtures::feed(1, 300);
        feed.record_submission(7);
        feed.set_seconds_per_epoch(0);
        feed.set_seconds_per_epoch(300);
        assert_eq!(feed.seconds_per_epoch, 300);
        assert_eq!(feed.last_submitted_epoch(), Some(7));
    }

    #[test]
    fn trueval_failure_hides_outcome() {
        assert_eq!(TruevalResult::failure().outcome(), None);
        assert_eq!(TruevalResult::success(true).outcome(), Some(true));
    }
}
