//! In-memory sink for tests and local development

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Sink, StoreError};
use crate::market_data::{Ohlc, Tick};

/// Append-only sink that keeps everything in process memory.
#[derive(Default)]
pub struct MemorySink {
    ticks: Mutex<Vec<Tick>>,
    candles: Mutex<Vec<Ohlc>>,
    fail_ticks: AtomicBool,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `store_tick` calls fail, to exercise error paths.
    pub fn set_fail_ticks(&self, fail: bool) {
        self.fail_ticks.store(fail, Ordering::SeqCst);
    }

    pub async fn ticks(&self) -> Vec<Tick> {
        self.ticks.lock().await.clone()
    }

    pub async fn candles(&self) -> Vec<Ohlc> {
        self.candles.lock().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn store_tick(&self, tick: &Tick) -> Result<(), StoreError> {
        if self.fail_ticks.load(Ordering::SeqCst) {
            return Err(StoreError::Retriable("injected tick failure".to_string()));
        }
        self.ticks.lock().await.push(tick.clone());
        Ok(())
    }

    async fn store_ohlc(&self, ohlc: &Ohlc) -> Result<(), StoreError> {
        self.candles.lock().await.push(ohlc.clone());
        Ok(())
    }

    async fn query_range(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<Ohlc>, StoreError> {
        let mut rows: Vec<Ohlc> = self
            .candles
            .lock()
            .await
            .iter()
            .filter(|c| c.symbol == symbol && c.open_time >= start && c.close_time <= end)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.open_time);
        Ok(rows)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_range_filters_and_orders() {
        let sink = MemorySink::new();
        for (open_time, close_time) in [(120_000, 180_000), (0, 60_000), (60_000, 120_000)] {
            sink.store_ohlc(&Ohlc {
                symbol: "BTCUSDT".to_string(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
                open_time,
                close_time,
            })
            .await
            .unwrap();
        }
        sink.store_ohlc(&Ohlc {
            symbol: "ETHUSDT".to_string(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
            open_time: 0,
            close_time: 60_000,
        })
        .await
        .unwrap();

        let rows = sink.query_range("BTCUSDT", 0, 120_000).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].open_time, 0);
        assert_eq!(rows[1].open_time, 60_000);
    }

    #[tokio::test]
    async fn test_injected_tick_failure() {
        let sink = MemorySink::new();
        sink.set_fail_ticks(true);
        let tick = Tick::new("BTCUSDT", 1.0, 1.0, 0);
        assert!(sink.store_tick(&tick).await.unwrap_err().is_retriable());
        sink.set_fail_ticks(false);
        sink.store_tick(&tick).await.unwrap();
        assert_eq!(sink.ticks().await.len(), 1);
    }
}
