//! Streaming RPC server module
//!
//! Exposes closed candlesticks to remote subscribers over a gRPC server
//! stream, bridging each call onto a broker subscription.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::broker::Broker;
use crate::market_data::Ohlc;
use crate::pb::ohlc_stream_server::{OhlcStream, OhlcStreamServer};
use crate::pb::{OhlcData, SubscribeRequest};

type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// gRPC service streaming closed candlesticks to callers.
pub struct OhlcStreamService {
    broker: Arc<Broker>,
    channel_size: usize,
    shutdown_rx: watch::Receiver<bool>,
}

impl OhlcStreamService {
    pub fn new(broker: Arc<Broker>, channel_size: usize, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            broker,
            channel_size,
            shutdown_rx,
        }
    }

    pub fn into_server(self) -> OhlcStreamServer<Self> {
        OhlcStreamServer::new(self)
    }
}

fn to_proto(ohlc: &Ohlc) -> OhlcData {
    OhlcData {
        symbol: ohlc.symbol.clone(),
        open: ohlc.open,
        high: ohlc.high,
        low: ohlc.low,
        close: ohlc.close,
        volume: ohlc.volume,
        open_time: ohlc.open_time,
        close_time: ohlc.close_time,
    }
}

#[tonic::async_trait]
impl OhlcStream for OhlcStreamService {
    type StreamOHLCStream = BoxedStream<OhlcData>;

    /// Subscribe the caller to each listed symbol for the life of the call.
    ///
    /// The stream only ends when the caller goes away or the server shuts
    /// down; slow callers lose candlesticks at the broker boundary instead of
    /// back-pressuring ingest.
    async fn stream_ohlc(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::StreamOHLCStream>, Status> {
        let symbols: Vec<String> = request
            .into_inner()
            .symbols
            .into_iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(Status::invalid_argument("at least one symbol is required"));
        }

        let (sub_tx, mut sub_rx) = mpsc::channel::<Ohlc>(self.channel_size);
        let mut registered: Vec<String> = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            if let Err(e) = self.broker.subscribe(symbol, sub_tx.clone()).await {
                for symbol in &registered {
                    self.broker.unsubscribe(symbol, &sub_tx).await;
                }
                return Err(Status::resource_exhausted(e.to_string()));
            }
            registered.push(symbol.clone());
        }
        info!("streaming candlesticks for {:?}", symbols);

        let (out_tx, out_rx) = mpsc::channel(self.channel_size);
        let broker = Arc::clone(&self.broker);
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::spawn(async move {
            while !*shutdown_rx.borrow() {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    candle = sub_rx.recv() => match candle {
                        Some(candle) => {
                            if out_tx.send(Ok(to_proto(&candle))).await.is_err() {
                                // Caller went away.
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
            for symbol in &symbols {
                broker.unsubscribe(symbol, &sub_tx).await;
            }
            debug!("delivery task for {:?} finished", symbols);
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(out_rx))))
    }
}
