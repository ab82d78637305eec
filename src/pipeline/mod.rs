//! Pipeline coordinator
//!
//! Owns the tick queue and the single consumer task that drives aggregation
//! and fan-out, and glues the feed, aggregator, sink, and broker together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::aggregator::OhlcAggregator;
use crate::binance::MarketFeed;
use crate::broker::Broker;
use crate::market_data::Tick;
use crate::sink::Sink;

/// Wires feed -> aggregator -> (sink, broker).
///
/// The consumer task spawned by `start` is the sole caller of
/// `OhlcAggregator::process` and the sole hot-path caller of
/// `Broker::publish`, which makes the aggregator state single-writer by
/// construction.
pub struct Pipeline {
    feed: Arc<dyn MarketFeed>,
    aggregator: Arc<OhlcAggregator>,
    broker: Arc<Broker>,
    sink: Arc<dyn Sink>,
    symbols: Vec<String>,
    channel_size: usize,
    shutdown_deadline: Duration,
    shutdown_tx: watch::Sender<bool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Pipeline {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        aggregator: Arc<OhlcAggregator>,
        broker: Arc<Broker>,
        sink: Arc<dyn Sink>,
        symbols: Vec<String>,
        channel_size: usize,
        shutdown_deadline: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            feed,
            aggregator,
            broker,
            sink,
            symbols,
            channel_size,
            shutdown_deadline,
            shutdown_tx,
            consumer: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Connect the feed and launch the consumer task. Idempotent; all
    /// background tasks are running when this returns.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("pipeline already started");
            return Ok(());
        }

        let (tick_tx, tick_rx) = mpsc::channel::<Tick>(self.channel_size);
        for symbol in &self.symbols {
            self.feed.subscribe(symbol, tick_tx.clone()).await;
        }
        drop(tick_tx);

        self.feed.connect(self.symbols.clone()).await?;

        let aggregator = Arc::clone(&self.aggregator);
        let broker = Arc::clone(&self.broker);
        let sink = Arc::clone(&self.sink);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle =
            tokio::spawn(consume_loop(tick_rx, aggregator, broker, sink, shutdown_rx));
        *self.consumer.lock().await = Some(handle);

        info!("pipeline started for {} symbols", self.symbols.len());
        Ok(())
    }

    /// Signal cancellation, wait for the consumer to drain (bounded by the
    /// shutdown deadline), then close the feed and the sink, in that order.
    pub async fn stop(&self) {
        info!("stopping pipeline");
        self.shutdown_tx.send_replace(true);

        if let Some(handle) = self.consumer.lock().await.take() {
            let abort = handle.abort_handle();
            if timeout(self.shutdown_deadline, handle).await.is_err() {
                warn!("consumer did not drain within deadline, aborting");
                abort.abort();
            }
        }

        self.feed.close();
        if let Err(e) = self.sink.close().await {
            error!("error closing sink: {}", e);
        }
        info!("pipeline stopped");
    }
}

/// The single tick consumer: aggregate each tick, and on window rollover
/// persist the closed candlestick off the hot path and publish it.
async fn consume_loop(
    mut tick_rx: mpsc::Receiver<Tick>,
    aggregator: Arc<OhlcAggregator>,
    broker: Arc<Broker>,
    sink: Arc<dyn Sink>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                // Drain what is already queued, then stop.
                while let Ok(tick) = tick_rx.try_recv() {
                    handle_tick(tick, &aggregator, &broker, &sink).await;
                }
                break;
            }
            tick = tick_rx.recv() => match tick {
                Some(tick) => handle_tick(tick, &aggregator, &broker, &sink).await,
                None => break,
            }
        }
    }
    debug!("consumer task stopped");
}

async fn handle_tick(
    tick: Tick,
    aggregator: &Arc<OhlcAggregator>,
    broker: &Arc<Broker>,
    sink: &Arc<dyn Sink>,
) {
    match aggregator.process(&tick).await {
        Ok(Some(closed)) => {
            // Persistence must never stall fan-out; errors are logged only.
            let sink = Arc::clone(sink);
            let candle = closed.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.store_ohlc(&candle).await {
                    error!("failed to store candlestick {}: {}", candle, e);
                }
            });
            broker.publish(&closed).await;
        }
        Ok(None) => {}
        Err(e) => warn!("tick for {} dropped from aggregation: {}", tick.symbol, e),
    }
}
