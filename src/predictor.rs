//! Prediction seam
//!
//! The agent asks a `Predictor` for a value and a confidence for the slot two
//! epochs ahead. `RandomPredictor` is a placeholder that keeps the agent
//! runnable without a model.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;

use crate::types::{Feed, PredictionCandidate};

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, feed: &Feed, target_timestamp: u64) -> Result<PredictionCandidate>;
}

/// Uniform value in [0, 1) and confidence in [0, 100].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPredictor;

#[async_trait]
impl Predictor for RandomPredictor {
    async fn predict(&self, feed: &Feed, target_timestamp: u64) -> Result<PredictionCandidate> {
        let mut rng = rand::thread_rng();
        let candidate = PredictionCandidate {
            value: Some(rng.gen::<f64>()),
            confidence: rng.gen_range(0.0..=100.0),
        };
        tracing::debug!(
            feed = %feed.name,
            target_timestamp = target_timestamp,
            value = ?candidate.value,
            confidence = candidate.confidence,
            "Random prediction"
        );
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    #[tokio::test]
    async fn random_prediction_is_in_range() {
        let feed = fixtures::feed(1, 300);
        for _ in 0..50 {
            let c = RandomPredictor.predict(&feed, 3_600).await.unwrap();
            let value = c.value.unwrap();
            assert!((0.0..1.0).contains(&value));
            assert!((0.0..=100.0).contains(&c.confidence));
        }
    }
}
