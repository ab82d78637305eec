//! Upstream exchange feed integration module
//!
//! Handles the WebSocket connection lifecycle, frame parsing, and tick
//! normalization for a Binance-compatible aggregate-trade stream.

pub mod client;
pub mod types;

// Re-export commonly used types
pub use client::{FeedClient, MarketFeed};
pub use types::*;
