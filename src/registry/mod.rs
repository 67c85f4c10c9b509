//! Feed registry
//!
//! Discovers the feeds of interest once and keeps them, with their
//! submission markers, for the life of the process. Re-discovery only happens
//! when the refresh policy asks for it.

mod subgraph;

pub use subgraph::SubgraphDiscovery;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::Address;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::types::{Feed, FeedMetadata, TradingPair};

/// Optional discovery filters; an empty list matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedFilters {
    pub pairs: Vec<String>,
    pub timeframes: Vec<String>,
    pub sources: Vec<String>,
    pub owners: Vec<String>,
}

impl FeedFilters {
    /// Build from comma-separated lists
    pub fn from_csv(
        pairs: Option<&str>,
        timeframes: Option<&str>,
        sources: Option<&str>,
        owners: Option<&str>,
    ) -> Self {
        fn split(raw: Option<&str>) -> Vec<String> {
            raw.map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
        }

        Self {
            pairs: split(pairs),
            timeframes: split(timeframes),
            sources: split(sources),
            owners: split(owners),
        }
    }

    pub fn matches(&self, meta: &FeedMetadata) -> bool {
        let pair_ok = self.pairs.is_empty() || {
            let feed_pair = TradingPair::parse(&meta.pair);
            self.pairs.iter().any(|wanted| match (&feed_pair, TradingPair::parse(wanted)) {
                (Some(have), Some(want)) => *have == want,
                _ => wanted.eq_ignore_ascii_case(&meta.pair),
            })
        };
        let timeframe_ok = self.timeframes.is_empty()
            || self
                .timeframes
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&meta.timeframe));
        let source_ok = self.sources.is_empty()
            || self
                .sources
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&meta.source));
        let owner_ok = self.owners.is_empty()
            || self.owners.iter().any(|o| {
                o.parse::<Address>()
                    .map(|owner| owner == meta.owner)
                    .unwrap_or(false)
            });
        pair_ok && timeframe_ok && source_ok && owner_ok
    }
}

/// Source of feed metadata
#[async_trait]
pub trait FeedDiscovery: Send + Sync {
    async fn discover(&self, filters: &FeedFilters) -> Result<BTreeMap<Address, FeedMetadata>>;
}

/// When a cached feed set counts as stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Discover once per process
    #[default]
    Never,
    Every(Duration),
}

impl RefreshPolicy {
    /// `0` means never
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            RefreshPolicy::Never
        } else {
            RefreshPolicy::Every(Duration::from_secs(secs))
        }
    }
}

pub struct FeedRegistry {
    discovery: Box<dyn FeedDiscovery>,
    policy: RefreshPolicy,
    /// Filters of the first discovery, reused on refresh
    filters: Option<FeedFilters>,
    feeds: BTreeMap<Address, Feed>,
    discovered_at: Option<Instant>,
}

impl FeedRegistry {
    pub fn new(discovery: Box<dyn FeedDiscovery>) -> Self {
        Self {
            discovery,
            policy: RefreshPolicy::Never,
            filters: None,
            feeds: BTreeMap::new(),
            discovered_at: None,
        }
    }

    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_populated(&self) -> bool {
        self.discovered_at.is_some()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&Feed> {
        self.feeds.get(address)
    }

    fn needs_refresh(&self) -> bool {
        match (self.discovered_at, self.policy) {
            (None, _) => true,
            (Some(_), RefreshPolicy::Never) => false,
            (Some(at), RefreshPolicy::Every(period)) => at.elapsed() >= period,
        }
    }

    /// Feeds of interest.
    ///
    /// The first call runs discovery with `filters`; later calls return the
    /// cached map whatever `filters` says. A failed first discovery is an
    /// error, a failed refresh keeps the cached map.
    pub async fn discover(&mut self, filters: &FeedFilters) -> Result<&mut BTreeMap<Address, Feed>> {
        if !self.needs_refresh() {
            return Ok(&mut self.feeds);
        }

        let filters = self.filters.get_or_insert_with(|| filters.clone()).clone();
        let first = !self.is_populated();

        match self.discovery.discover(&filters).await {
            Ok(found) => {
                let added = self.merge(found);
                self.discovered_at = Some(Instant::now());
                info!(
                    feeds = self.feeds.len(),
                    added = added,
                    refresh = !first,
                    "Feed registry populated"
                );
            }
            Err(e) if first => {
                self.filters = None;
                return Err(e).context("Initial feed discovery failed");
            }
            Err(e) => {
                warn!(error = %e, feeds = self.feeds.len(), "Feed refresh failed, keeping cached feeds");
                self.discovered_at = Some(Instant::now());
            }
        }

        Ok(&mut self.feeds)
    }

    /// Insert unseen feeds; known feeds keep their state.
    fn merge(&mut self, found: BTreeMap<Address, FeedMetadata>) -> usize {
        let mut added = 0;
        for (address, meta) in found {
            if self.feeds.contains_key(&address) {
                continue;
            }
            match Feed::new(meta) {
                Ok(feed) => {
                    debug!(feed = %feed, address = %format!("{:#x}", address), "Feed added");
                    self.feeds.insert(address, feed);
                    added += 1;
                }
                Err(e) => warn!(error = %e, "Ignoring feed"),
            }
        }
        added
    }
}
