//! Per-symbol OHLC aggregation over wall-clock windows

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use crate::market_data::{Ohlc, Tick};
use crate::metrics;
use crate::sink::{Sink, StoreError};

/// Folds ticks into time-aligned candlestick windows, one open window per
/// symbol.
///
/// `process` must only be called from a single task: the pipeline consumer is
/// the sole writer of the window map. Windows close only when a later tick
/// arrives at or past `close_time`; there is no time-based flush, and idle
/// windows are never synthesized.
pub struct OhlcAggregator {
    interval_ms: i64,
    sink: Arc<dyn Sink>,
    windows: RwLock<HashMap<String, Ohlc>>,
}

impl OhlcAggregator {
    /// `interval` defines the window grid, aligned to the Unix epoch. Must be
    /// strictly positive.
    pub fn new(interval: Duration, sink: Arc<dyn Sink>) -> Self {
        assert!(!interval.is_zero(), "aggregation interval must be positive");
        Self {
            interval_ms: interval.as_millis() as i64,
            sink,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Persist the tick, then fold it into its symbol's window. Returns the
    /// previous window when this tick caused a rollover.
    ///
    /// A `store_tick` failure aborts processing of this tick before it touches
    /// any window; the error is the caller's to log. Ticks older than the open
    /// window fold into it as if they had arrived in order.
    pub async fn process(&self, tick: &Tick) -> Result<Option<Ohlc>, StoreError> {
        // Keep the window lock free of I/O: persist first.
        self.sink.store_tick(tick).await?;

        let mut windows = self.windows.write().await;
        match windows.get_mut(&tick.symbol) {
            None => {
                debug!("opening first window for {}", tick.symbol);
                windows.insert(
                    tick.symbol.clone(),
                    Ohlc::open_window(tick, self.interval_ms),
                );
                Ok(None)
            }
            Some(current) if current.is_rollover(tick.timestamp) => {
                let closed =
                    std::mem::replace(current, Ohlc::open_window(tick, self.interval_ms));
                metrics::record_window_closed(&closed.symbol);
                Ok(Some(closed))
            }
            Some(current) => {
                current.extend(tick);
                Ok(None)
            }
        }
    }

    /// Defensive copy of the open window for a symbol, for diagnostics.
    pub async fn current(&self, symbol: &str) -> Option<Ohlc> {
        self.windows.read().await.get(symbol).cloned()
    }
}
