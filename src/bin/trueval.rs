//! One-shot trueval lookup
//!
//! Usage: trueval <pair> <source> <t0> <t1>
//!
//! Timestamps are unix seconds or RFC 3339, e.g.
//! `trueval btc/usdt binance 2023-08-25T06:00:00Z 2023-08-25T06:05:00Z`

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use predictoor::config::AppConfig;
use predictoor::trueval::TruevalDeterminer;

fn parse_timestamp(raw: &str) -> Result<u64> {
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(secs);
    }
    let dt = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("'{}' is neither unix seconds nor RFC 3339", raw))?;
    u64::try_from(dt.timestamp()).with_context(|| format!("'{}' is before 1970", raw))
}

fn display(ts: u64) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AppConfig::load()?;
    predictoor::logging::init(&cfg.logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [pair, source, t0, t1] = args.as_slice() else {
        bail!("usage: trueval <pair> <source> <t0> <t1>");
    };
    let (t0, t1) = (parse_timestamp(t0)?, parse_timestamp(t1)?);
    if t1 <= t0 {
        bail!("t1 must be after t0");
    }

    let determiner = TruevalDeterminer::from_config(&cfg.trueval)?;
    let result = determiner.determine_pair(pair, source, t0, t1).await;

    info!(
        pair = %pair,
        source = %source,
        t0 = %display(t0),
        t1 = %display(t1),
        outcome = result.outcome,
        is_failure = result.is_failure,
        "Trueval determined"
    );
    println!("{} {} {} -> {}: {}", source, pair, display(t0), display(t1), result);

    if result.is_failure {
        std::process::exit(2);
    }
    Ok(())
}
