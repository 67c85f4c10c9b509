//! Block-driven agent loop
//!
//! One tick per new head. Every tick walks all registered feeds in address
//! order, sequentially; a feed's failures stay in that feed's report.

use anyhow::{Context, Result};
use ethers::types::Address;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, ChainError, ChainPoller};
use crate::epoch;
use crate::gate::{GateDecision, SubmissionGate};
use crate::registry::{FeedFilters, FeedRegistry};
use crate::settlement::{SettlementExecutor, SettlementReport};
use crate::types::{BlockSnapshot, EpochState, Feed};

/// What happened to one feed on one tick
#[derive(Debug, Clone, PartialEq)]
pub struct FeedTickReport {
    pub address: Address,
    pub state: EpochState,
    pub gate: GateDecision,
    /// Present only when the gate was open
    pub settlement: Option<SettlementReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub block: BlockSnapshot,
    pub feeds: Vec<FeedTickReport>,
}

impl TickReport {
    pub fn submitted(&self) -> usize {
        self.feeds
            .iter()
            .filter(|f| {
                f.settlement
                    .as_ref()
                    .is_some_and(|s| s.submission.is_submitted())
            })
            .count()
    }
}

pub struct Agent {
    chain: Arc<dyn ChainClient>,
    poller: ChainPoller,
    registry: FeedRegistry,
    filters: FeedFilters,
    gate: SubmissionGate,
    executor: SettlementExecutor,
    /// Feeds whose epoch length has been checked against their contract
    verified: HashSet<Address>,
}

impl Agent {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        poller: ChainPoller,
        registry: FeedRegistry,
        filters: FeedFilters,
        gate: SubmissionGate,
        executor: SettlementExecutor,
    ) -> Self {
        Self {
            chain,
            poller,
            registry,
            filters,
            gate,
            executor,
            verified: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &FeedRegistry {
        &self.registry
    }

    /// Run until a head fetch or the first discovery fails.
    pub async fn run(&mut self) -> Result<()> {
        info!(window_secs = self.gate.window_secs(), "Starting main loop");
        loop {
            self.step().await?;
        }
    }

    /// Wait for the next head and process it.
    pub async fn step(&mut self) -> Result<TickReport> {
        let block = self
            .poller
            .next_block(self.chain.as_ref())
            .await
            .context("Failed to fetch chain head")?;
        self.process_block(block).await
    }

    pub async fn process_block(&mut self, block: BlockSnapshot) -> Result<TickReport> {
        let feeds = self.registry.discover(&self.filters).await?;
        info!(
            block = block.number,
            timestamp = block.timestamp,
            feeds = feeds.len(),
            "Got new block"
        );

        let mut reports = Vec::with_capacity(feeds.len());
        for feed in feeds.values_mut() {
            if !self.verified.contains(&feed.address) {
                match verify_against_chain(self.chain.as_ref(), feed, &block).await {
                    Ok(()) => {
                        self.verified.insert(feed.address);
                    }
                    Err(e) => warn!(feed = %feed.name, error = %e, "Could not verify feed against chain"),
                }
            }

            let state = epoch::evaluate(feed, &block);
            let gate = self.gate.evaluate(feed, &state);

            let settlement = if gate.is_eligible() {
                let report = self.executor.execute(feed, &state).await;
                info!(
                    feed = %feed.name,
                    address = %format!("{:#x}", feed.address),
                    epoch = state.epoch,
                    seconds_till_close = state.seconds_till_close,
                    action = %report,
                    "Feed acted"
                );
                Some(report)
            } else {
                info!(
                    feed = %feed.name,
                    address = %format!("{:#x}", feed.address),
                    epoch = state.epoch,
                    seconds_till_close = state.seconds_till_close,
                    action = %gate,
                    "Feed idle"
                );
                None
            };

            reports.push(FeedTickReport {
                address: feed.address,
                state,
                gate,
                settlement,
            });
        }

        let report = TickReport {
            block,
            feeds: reports,
        };
        if self.registry.is_empty() {
            warn!(block = block.number, "No feeds registered");
        } else {
            debug!(
                block = block.number,
                feeds = self.registry.len(),
                submitted = report.submitted(),
                "Tick done"
            );
        }
        Ok(report)
    }
}

/// Adopt the contract's epoch length if discovery disagrees with it, and
/// report when the contract's epoch differs from the one derived locally.
///
/// A feed may already have submitted under the discovered length while
/// verification kept failing; its markers are rescaled with the length.
async fn verify_against_chain(
    chain: &dyn ChainClient,
    feed: &mut Feed,
    block: &BlockSnapshot,
) -> Result<(), ChainError> {
    let seconds_per_epoch = chain.get_seconds_per_epoch(feed.address).await?;
    if seconds_per_epoch > 0 && seconds_per_epoch != feed.seconds_per_epoch {
        warn!(
            feed = %feed.name,
            discovered = feed.seconds_per_epoch,
            contract = seconds_per_epoch,
            submitted = ?feed.last_submitted_epoch(),
            "Epoch length differs from discovery, using contract value"
        );
        feed.set_seconds_per_epoch(seconds_per_epoch);
    }

    let contract_epoch = chain.get_epoch(feed.address).await?;
    let derived = epoch::evaluate(feed, block).epoch;
    if contract_epoch != derived {
        warn!(
            feed = %feed.name,
            contract_epoch = contract_epoch,
            derived_epoch = derived,
            "Contract epoch differs from block-derived epoch"
        );
    }
    Ok(())
}
