//! Pipeline counters
//!
//! Recording only; wiring an exporter is the embedder's concern. Every
//! counter is cheap enough for the hot path.

/// Ticks parsed from the upstream feed.
pub const TICKS_RECEIVED: &str = "ohlc_ticks_received_total";
/// Ticks dropped at a full consumer queue.
pub const TICKS_DROPPED: &str = "ohlc_ticks_dropped_total";
/// Candlesticks dropped at a full subscriber queue.
pub const SUBSCRIBER_DROPPED: &str = "ohlc_subscriber_dropped_total";
/// Upstream reconnection sweeps started.
pub const FEED_RECONNECTS: &str = "ohlc_feed_reconnects_total";
/// Windows closed by a rollover tick.
pub const WINDOWS_CLOSED: &str = "ohlc_windows_closed_total";

pub fn record_tick_received(symbol: &str) {
    metrics::counter!(TICKS_RECEIVED, "symbol" => symbol.to_string()).increment(1);
}

pub fn record_tick_dropped(symbol: &str) {
    metrics::counter!(TICKS_DROPPED, "symbol" => symbol.to_string()).increment(1);
}

pub fn record_subscriber_drop(symbol: &str) {
    metrics::counter!(SUBSCRIBER_DROPPED, "symbol" => symbol.to_string()).increment(1);
}

pub fn record_feed_reconnect() {
    metrics::counter!(FEED_RECONNECTS).increment(1);
}

pub fn record_window_closed(symbol: &str) {
    metrics::counter!(WINDOWS_CLOSED, "symbol" => symbol.to_string()).increment(1);
}
