//! Head poller
//!
//! Polls the head height and yields the newest block once. Heights that go by
//! while a tick is being processed are not backfilled.

use std::time::Duration;

use super::{ChainClient, ChainError};
use crate::types::BlockSnapshot;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ChainPoller {
    last_height: Option<u64>,
    interval: Duration,
}

impl Default for ChainPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ChainPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_height: None,
            interval,
        }
    }

    pub fn last_height(&self) -> Option<u64> {
        self.last_height
    }

    /// Wait for a head above the last one seen and return its snapshot.
    ///
    /// Errors are returned as-is; there is no local retry.
    pub async fn next_block<C>(&mut self, chain: &C) -> Result<BlockSnapshot, ChainError>
    where
        C: ChainClient + ?Sized,
    {
        loop {
            let head = chain.current_height().await?;
            match self.last_height {
                Some(last) if head <= last => {
                    tokio::time::sleep(self.interval).await;
                }
                last => {
                    if let Some(last) = last {
                        let skipped = head - last - 1;
                        if skipped > 0 {
                            tracing::debug!(
                                head = head,
                                last = last,
                                skipped = skipped,
                                "Heads skipped while busy"
                            );
                        }
                    }
                    self.last_height = Some(head);
                    return chain.get_block(head).await;
                }
            }
        }
    }
}
