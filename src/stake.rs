//! Confidence-weighted stake sizing

use crate::types::{PredictionCandidate, SkipReason};

#[derive(Debug, Clone, PartialEq)]
pub enum StakeDecision {
    Submit { value: f64, stake: f64 },
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy)]
pub struct StakeSizer {
    base_stake: f64,
}

impl StakeSizer {
    pub fn new(base_stake: f64) -> Self {
        Self { base_stake }
    }

    pub fn base_stake(&self) -> f64 {
        self.base_stake
    }

    /// `base_stake * confidence / 100`, confidence clamped to 100
    pub fn stake_for(&self, confidence: f64) -> f64 {
        self.base_stake * confidence.clamp(0.0, 100.0) / 100.0
    }

    pub fn size(&self, candidate: &PredictionCandidate) -> StakeDecision {
        let Some(value) = candidate.value else {
            return StakeDecision::Skip(SkipReason::NoPrediction);
        };
        if !value.is_finite() || !candidate.confidence.is_finite() {
            return StakeDecision::Skip(SkipReason::InvalidPrediction {
                value,
                confidence: candidate.confidence,
            });
        }
        if candidate.confidence <= 0.0 {
            return StakeDecision::Skip(SkipReason::NonPositiveConfidence(
                candidate.confidence,
            ));
        }
        StakeDecision::Submit {
            value,
            stake: self.stake_for(candidate.confidence),
        }
    }
}
