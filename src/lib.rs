//! Predictoor Library
//!
//! Block-driven prediction submission for on-chain price feeds, plus trueval
//! determination for settled epochs.

pub mod agent;
pub mod chain;
pub mod config;
pub mod epoch;
pub mod gate;
pub mod logging;
pub mod predictor;
pub mod registry;
pub mod settlement;
pub mod stake;
pub mod trueval;
pub mod types;
