//! Epoch position of a feed at a block

use crate::types::{BlockSnapshot, EpochState, Feed};

/// Epoch index and seconds until it closes, measured at the block's timestamp.
pub fn evaluate(feed: &Feed, block: &BlockSnapshot) -> EpochState {
    let spe = feed.seconds_per_epoch;
    let epoch = block.timestamp / spe;
    EpochState {
        epoch,
        seconds_till_close: epoch * spe + spe - block.timestamp,
    }
}

/// Timestamp the prediction made during `epoch` is for.
pub fn target_timestamp(epoch: u64, seconds_per_epoch: u64) -> u64 {
    (epoch + 2) * seconds_per_epoch
}

/// Slot whose payout is claimed during `epoch`. Saturates at 0.
pub fn payout_slot(epoch: u64, seconds_per_epoch: u64) -> u64 {
    epoch.saturating_sub(1) * seconds_per_epoch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    fn block(timestamp: u64) -> BlockSnapshot {
        BlockSnapshot {
            number: 1,
            timestamp,
        }
    }

    #[test]
    fn mid_epoch() {
        let feed = fixtures::feed(1, 300);
        let state = evaluate(&feed, &block(3_297));
        assert_eq!(state.epoch, 10);
        assert_eq!(state.seconds_till_close, 3);
    }

    #[test]
    fn exactly_on_boundary_starts_new_epoch() {
        let feed = fixtures::feed(1, 300);
        let state = evaluate(&feed, &block(3_300));
        assert_eq!(state.epoch, 11);
        assert_eq!(state.seconds_till_close, 300);
    }

    #[test]
    fn seconds_till_close_never_zero() {
        let feed = fixtures::feed(1, 60);
        for ts in 0..600 {
            let state = evaluate(&feed, &block(ts));
            assert!(state.seconds_till_close >= 1 && state.seconds_till_close <= 60);
        }
    }

    #[test]
    fn two_epoch_lead_and_previous_slot() {
        assert_eq!(target_timestamp(10, 300), 3_600);
        assert_eq!(payout_slot(10, 300), 2_700);
        assert_eq!(payout_slot(0, 300), 0);
    }
}
