//! OHLC candlestick record and window arithmetic

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tick;

/// One candlestick over `[open_time, close_time)`.
///
/// Mutable while open (owned by the aggregator), frozen once closed and
/// handed off to the sink and the broker. Invariants held at all times:
/// `low <= open,close <= high`, `volume >= 0`, `open_time < close_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Window start in Unix milliseconds, a multiple of the interval.
    pub open_time: i64,
    /// Always `open_time + interval`.
    pub close_time: i64,
}

impl Ohlc {
    /// Open a fresh window for `tick`, aligned down to the interval grid.
    pub fn open_window(tick: &Tick, interval_ms: i64) -> Self {
        let open_time = truncate_to_interval(tick.timestamp, interval_ms);
        Self {
            symbol: tick.symbol.clone(),
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.quantity,
            open_time,
            close_time: open_time + interval_ms,
        }
    }

    /// Fold a tick into the open window. `open` and `open_time` never change
    /// after construction.
    pub fn extend(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.volume += tick.quantity;
    }

    /// Whether `timestamp` falls past this window (half-open boundary: a tick
    /// exactly at `close_time` belongs to the next window).
    pub fn is_rollover(&self, timestamp: i64) -> bool {
        timestamp >= self.close_time
    }
}

impl fmt::Display for Ohlc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open_time = DateTime::<Utc>::from_timestamp_millis(self.open_time)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| self.open_time.to_string());
        write!(
            f,
            "{} o={} h={} l={} c={} v={} @ {}",
            self.symbol, self.open, self.high, self.low, self.close, self.volume, open_time
        )
    }
}

/// Truncate `timestamp` down to a multiple of `interval_ms` from the epoch.
pub fn truncate_to_interval(timestamp: i64, interval_ms: i64) -> i64 {
    timestamp - timestamp.rem_euclid(interval_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(price: f64, quantity: f64, timestamp: i64) -> Tick {
        Tick::new("BTCUSDT", price, quantity, timestamp)
    }

    #[test]
    fn test_truncate_to_interval() {
        assert_eq!(truncate_to_interval(0, 60_000), 0);
        assert_eq!(truncate_to_interval(59_999, 60_000), 0);
        assert_eq!(truncate_to_interval(60_000, 60_000), 60_000);
        assert_eq!(truncate_to_interval(61_500, 60_000), 60_000);
    }

    #[test]
    fn test_open_window_aligns_to_grid() {
        let candle = Ohlc::open_window(&tick(50_000.0, 1.0, 123_456), 60_000);
        assert_eq!(candle.open_time, 120_000);
        assert_eq!(candle.close_time, 180_000);
        assert_eq!(candle.open, 50_000.0);
        assert_eq!(candle.high, 50_000.0);
        assert_eq!(candle.low, 50_000.0);
        assert_eq!(candle.close, 50_000.0);
        assert_eq!(candle.volume, 1.0);
    }

    #[test]
    fn test_extend_updates_extremes_and_volume() {
        let mut candle = Ohlc::open_window(&tick(100.0, 1.0, 0), 60_000);
        candle.extend(&tick(150.0, 0.5, 10_000));
        candle.extend(&tick(80.0, 2.0, 20_000));

        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.high, 150.0);
        assert_eq!(candle.low, 80.0);
        assert_eq!(candle.close, 80.0);
        assert_eq!(candle.volume, 3.5);
        assert_eq!(candle.open_time, 0);
    }

    #[test]
    fn test_rollover_boundary_is_half_open() {
        let candle = Ohlc::open_window(&tick(100.0, 1.0, 0), 60_000);
        assert!(!candle.is_rollover(0));
        assert!(!candle.is_rollover(59_999));
        assert!(candle.is_rollover(60_000));
        assert!(candle.is_rollover(3_600_000));
    }
}
