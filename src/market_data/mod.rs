//! Core market data records shared across the pipeline

mod ohlc;
mod tick;

pub use ohlc::Ohlc;
pub use tick::Tick;
