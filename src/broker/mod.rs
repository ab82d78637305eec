//! Subscriber registry and non-blocking candlestick fan-out

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::market_data::Ohlc;
use crate::metrics;

/// Delivery queue owned by one subscriber.
pub type OhlcSender = mpsc::Sender<Ohlc>;

/// Error types for broker operations
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("subscriber capacity exceeded ({max})")]
    CapacityExceeded { max: usize },
}

/// Delivers each published candlestick to every subscriber registered for its
/// symbol.
///
/// Publish takes the shared side of the registry lock and never blocks on a
/// queue: a full subscriber queue drops that candlestick for that subscriber
/// only. Subscribers drain their own queues and must unsubscribe before
/// closing them.
pub struct Broker {
    max_subscribers: usize,
    subscribers: RwLock<HashMap<String, Vec<OhlcSender>>>,
}

impl Broker {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            max_subscribers,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Append `queue` to the subscriber list for `symbol`. The same queue may
    /// be registered multiple times; entries are distinct.
    pub async fn subscribe(&self, symbol: &str, queue: OhlcSender) -> Result<(), BrokerError> {
        let mut subscribers = self.subscribers.write().await;
        let total: usize = subscribers.values().map(Vec::len).sum();
        if total >= self.max_subscribers {
            return Err(BrokerError::CapacityExceeded {
                max: self.max_subscribers,
            });
        }
        subscribers
            .entry(symbol.to_string())
            .or_default()
            .push(queue);
        debug!("subscribed to {} ({} total entries)", symbol, total + 1);
        Ok(())
    }

    /// Remove the first entry for `symbol` matching `queue` by channel
    /// identity.
    pub async fn unsubscribe(&self, symbol: &str, queue: &OhlcSender) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(entries) = subscribers.get_mut(symbol) {
            if let Some(position) = entries.iter().position(|q| q.same_channel(queue)) {
                entries.remove(position);
            }
            if entries.is_empty() {
                subscribers.remove(symbol);
            }
        }
    }

    /// Enqueue `ohlc` onto every subscriber queue for its symbol.
    /// Non-blocking: full queues drop this candlestick for that subscriber.
    pub async fn publish(&self, ohlc: &Ohlc) {
        let subscribers = self.subscribers.read().await;
        let Some(entries) = subscribers.get(&ohlc.symbol) else {
            return;
        };
        for queue in entries {
            if queue.try_send(ohlc.clone()).is_err() {
                metrics::record_subscriber_drop(&ohlc.symbol);
                debug!("subscriber queue full, dropping candlestick for {}", ohlc.symbol);
            }
        }
    }

    /// Number of registered subscription entries across all symbols.
    pub async fn subscription_count(&self) -> usize {
        self.subscribers.read().await.values().map(Vec::len).sum()
    }
}
