//! Exchange REST price sources (Binance, Kraken)

mod binance;
mod kraken;

pub use binance::{BinanceSource, BINANCE_REST_URL};
pub use kraken::{KrakenSource, KRAKEN_REST_URL};

/// Candle interval used for lookups, seconds
pub const CANDLE_SECS: u64 = 60;

/// A candle opening more than this long after the requested time does not
/// count as "at" that time.
pub const MAX_CANDLE_GAP_SECS: u64 = 5 * CANDLE_SECS;

/// Open price of the first candle at or after `timestamp`.
///
/// `candles` are `(open_time_secs, open)` pairs in any order.
pub(crate) fn first_open_at_or_after(
    candles: impl IntoIterator<Item = (u64, f64)>,
    timestamp: u64,
) -> Option<f64> {
    candles
        .into_iter()
        .filter(|(open_time, open)| *open_time >= timestamp && open.is_finite())
        .min_by_key(|(open_time, _)| *open_time)
        .filter(|(open_time, _)| open_time - timestamp <= MAX_CANDLE_GAP_SECS)
        .map(|(_, open)| open)
}
