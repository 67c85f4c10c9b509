//! Submission gate
//!
//! A feed may submit when its epoch is newer than the last one it submitted
//! for and the epoch closes within the window. The epoch index stays the same
//! for every tick inside an epoch, so once a submission lands the gate stays
//! closed until the next epoch.

use std::fmt;

use crate::types::{EpochState, Feed};

pub const DEFAULT_WINDOW_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Eligible,
    AlreadySubmitted { last: u64 },
    OutsideWindow { seconds_till_close: u64 },
}

impl GateDecision {
    pub fn is_eligible(&self) -> bool {
        matches!(self, GateDecision::Eligible)
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateDecision::Eligible => write!(f, "eligible"),
            GateDecision::AlreadySubmitted { last } => {
                write!(f, "already submitted for epoch {}", last)
            }
            GateDecision::OutsideWindow { seconds_till_close } => {
                write!(f, "waiting, {}s till close", seconds_till_close)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SubmissionGate {
    window_secs: u64,
}

impl Default for SubmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS)
    }
}

impl SubmissionGate {
    pub fn new(window_secs: u64) -> Self {
        Self { window_secs }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn evaluate(&self, feed: &Feed, state: &EpochState) -> GateDecision {
        if let Some(last) = feed.last_submitted_epoch() {
            if state.epoch <= last {
                return GateDecision::AlreadySubmitted { last };
            }
        }
        if state.seconds_till_close > self.window_secs {
            return GateDecision::OutsideWindow {
                seconds_till_close: state.seconds_till_close,
            };
        }
        GateDecision::Eligible
    }

    pub fn eligible(&self, feed: &Feed, state: &EpochState) -> bool {
        self.evaluate(feed, state).is_eligible()
    }
}
