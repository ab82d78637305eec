//! Normalized trade tick

use serde::{Deserialize, Serialize};

/// A single trade observation emitted by the ingest client.
///
/// Created once by the ingest client, consumed exactly once by the pipeline
/// consumer task, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    /// Traded quantity, always non-negative.
    pub quantity: f64,
    /// Event time in Unix milliseconds.
    pub timestamp: i64,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, price: f64, quantity: f64, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            quantity,
            timestamp,
        }
    }
}
