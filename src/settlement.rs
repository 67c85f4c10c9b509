//! Settlement executor
//!
//! Runs on an eligible tick: predict, size, submit for the slot two epochs
//! ahead, then claim the payout for the previous epoch's slot. The two chain
//! calls fail independently and neither failure leaves this function.

use std::fmt;
use std::sync::Arc;

use crate::chain::ChainClient;
use crate::epoch;
use crate::predictor::Predictor;
use crate::stake::{StakeDecision, StakeSizer};
use crate::types::{EpochState, Feed, PayoutOutcome, SkipReason, SubmissionOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct SettlementReport {
    pub epoch: u64,
    pub submission: SubmissionOutcome,
    pub payout: PayoutOutcome,
}

impl fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; {}", self.submission, self.payout)
    }
}

pub struct SettlementExecutor {
    chain: Arc<dyn ChainClient>,
    predictor: Arc<dyn Predictor>,
    sizer: StakeSizer,
    confidential: bool,
}

impl SettlementExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        predictor: Arc<dyn Predictor>,
        sizer: StakeSizer,
    ) -> Self {
        Self {
            chain,
            predictor,
            sizer,
            confidential: false,
        }
    }

    pub fn with_confidential(mut self, confidential: bool) -> Self {
        self.confidential = confidential;
        self
    }

    pub async fn execute(&self, feed: &mut Feed, state: &EpochState) -> SettlementReport {
        let submission = self.submit(feed, state).await;
        let payout = self.claim(feed, state).await;
        SettlementReport {
            epoch: state.epoch,
            submission,
            payout,
        }
    }

    async fn submit(&self, feed: &mut Feed, state: &EpochState) -> SubmissionOutcome {
        let target_timestamp = epoch::target_timestamp(state.epoch, feed.seconds_per_epoch);

        let candidate = match self.predictor.predict(feed, target_timestamp).await {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(feed = %feed.name, error = %e, "Predictor failed");
                return SubmissionOutcome::Skipped {
                    reason: SkipReason::PredictorFailed(e.to_string()),
                };
            }
        };

        let (value, stake) = match self.sizer.size(&candidate) {
            StakeDecision::Submit { value, stake } => (value, stake),
            StakeDecision::Skip(reason) => {
                tracing::info!(
                    feed = %feed.name,
                    epoch = state.epoch,
                    value = ?candidate.value,
                    confidence = candidate.confidence,
                    reason = %reason,
                    "Not submitting"
                );
                return SubmissionOutcome::Skipped { reason };
            }
        };

        tracing::info!(
            feed = %feed.name,
            address = %format!("{:#x}", feed.address),
            epoch = state.epoch,
            target_timestamp = target_timestamp,
            value = value,
            confidence = candidate.confidence,
            stake = stake,
            "Submitting prediction"
        );

        match self
            .chain
            .submit_prediction(
                feed.address,
                value,
                stake,
                target_timestamp,
                self.confidential,
            )
            .await
        {
            Ok(tx) => {
                feed.record_submission(state.epoch);
                SubmissionOutcome::Submitted {
                    target_timestamp,
                    stake,
                    tx,
                }
            }
            Err(error) => {
                tracing::error!(
                    feed = %feed.name,
                    epoch = state.epoch,
                    target_timestamp = target_timestamp,
                    error = %error,
                    "Submission failed"
                );
                SubmissionOutcome::Failed {
                    target_timestamp,
                    error,
                }
            }
        }
    }

    async fn claim(&self, feed: &mut Feed, state: &EpochState) -> PayoutOutcome {
        let slot = epoch::payout_slot(state.epoch, feed.seconds_per_epoch);
        if feed
            .last_claimed_epoch()
            .is_some_and(|last| last >= state.epoch)
        {
            return PayoutOutcome::AlreadyAttempted { slot };
        }
        feed.record_claim_attempt(state.epoch);

        match self
            .chain
            .claim_payout(feed.address, slot, self.confidential)
            .await
        {
            Ok(tx) => {
                tracing::info!(feed = %feed.name, slot = slot, tx = %tx, "Payout claimed");
                PayoutOutcome::Claimed { slot, tx }
            }
            Err(error) => {
                // Nothing to claim and already-claimed both land here.
                tracing::debug!(feed = %feed.name, slot = slot, error = %error, "Payout claim failed");
                PayoutOutcome::Failed { slot, error }
            }
        }
    }
}
