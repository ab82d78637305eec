//! Durable storage for raw ticks and closed candlesticks

pub mod memory;
pub mod postgres;

pub use memory::MemorySink;
pub use postgres::PostgresSink;

use async_trait::async_trait;

use crate::market_data::{Ohlc, Tick};

/// Append-only durable storage.
///
/// `store_tick` and `store_ohlc` are independent: a tick is not persisted
/// atomically with the candlestick it contributes to.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn store_tick(&self, tick: &Tick) -> Result<(), StoreError>;

    async fn store_ohlc(&self, ohlc: &Ohlc) -> Result<(), StoreError>;

    /// All candlesticks for `symbol` with `open_time >= start` and
    /// `close_time <= end`, ordered by `open_time` ascending. Offline use
    /// only; never called on the hot path.
    async fn query_range(&self, symbol: &str, start: i64, end: i64)
    -> Result<Vec<Ohlc>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

/// Error types for sink operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient I/O failure; the write may succeed if retried.
    #[error("transient storage error: {0}")]
    Retriable(String),
    /// Schema or configuration failure; retrying will not help.
    #[error("fatal storage error: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Retriable(_))
    }
}
