//! End-to-end pipeline tests: local feed -> aggregation -> fan-out -> RPC stream

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tonic::Request;

use ohlc_service::aggregator::OhlcAggregator;
use ohlc_service::binance::FeedClient;
use ohlc_service::broker::Broker;
use ohlc_service::config::FeedConfig;
use ohlc_service::pb::SubscribeRequest;
use ohlc_service::pb::ohlc_stream_server::OhlcStream;
use ohlc_service::pipeline::Pipeline;
use ohlc_service::server::OhlcStreamService;
use ohlc_service::sink::{MemorySink, Sink};

// On the minute grid.
const T0: i64 = 1_700_000_040_000;

/// Serve one feed connection: ack, stream the events, stay up.
async fn serve_feed(listener: TcpListener, ticks: Vec<(f64, f64, i64)>) {
    let (stream, _) = listener.accept().await.expect("accept");
    let mut ws = accept_async(stream).await.expect("websocket handshake");

    let request = ws.next().await.expect("subscription frame").expect("frame");
    assert!(request.into_text().expect("text").contains("SUBSCRIBE"));
    ws.send(Message::Text(r#"{"result":null,"id":1}"#.to_string()))
        .await
        .expect("ack");

    for (price, quantity, trade_time) in ticks {
        let event = format!(
            r#"{{"e":"aggTrade","E":{trade_time},"s":"BTCUSDT","a":1,"p":"{price}","q":"{quantity}","T":{trade_time},"m":false}}"#
        );
        ws.send(Message::Text(event)).await.expect("send tick");
    }

    loop {
        match timeout(Duration::from_secs(10), ws.next()).await {
            Ok(Some(Ok(Message::Ping(payload)))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Ok(Some(Ok(_))) => {}
            _ => break,
        }
    }
}

#[tokio::test]
async fn test_ingest_to_stream_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_feed(
        listener,
        vec![
            (50_000.0, 1.0, T0),
            (50_100.0, 0.5, T0 + 10_000),
            // Crosses the window boundary and closes the first candle.
            (51_000.0, 0.1, T0 + 61_000),
        ],
    ));

    let sink = Arc::new(MemorySink::new());
    let aggregator = Arc::new(OhlcAggregator::new(
        Duration::from_secs(60),
        sink.clone() as Arc<dyn Sink>,
    ));
    let broker = Arc::new(Broker::new(16));
    let feed = Arc::new(FeedClient::new(FeedConfig {
        endpoints: vec![format!("ws://{}", addr)],
        max_retries: 2,
        backoff_base_ms: 50,
        dial_timeout_secs: 2,
        ping_interval_secs: 30,
        read_timeout_secs: 60,
    }));

    let pipeline = Pipeline::new(
        feed,
        aggregator,
        Arc::clone(&broker),
        sink.clone(),
        vec!["BTCUSDT".to_string()],
        64,
        Duration::from_secs(2),
    );

    // Register a remote subscriber before any candle closes.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = OhlcStreamService::new(Arc::clone(&broker), 16, shutdown_rx);
    let response = service
        .stream_ohlc(Request::new(SubscribeRequest {
            symbols: vec!["BTCUSDT".to_string()],
        }))
        .await
        .unwrap();
    let mut stream = response.into_inner();

    pipeline.start().await.unwrap();

    let candle = timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("closed candle on the stream")
        .unwrap()
        .unwrap();
    assert_eq!(candle.symbol, "BTCUSDT");
    assert_eq!(candle.open, 50_000.0);
    assert_eq!(candle.high, 50_100.0);
    assert_eq!(candle.low, 50_000.0);
    assert_eq!(candle.close, 50_100.0);
    assert_eq!(candle.volume, 1.5);
    assert_eq!(candle.open_time, T0);
    assert_eq!(candle.close_time, T0 + 60_000);

    // All three raw ticks were persisted, and the closed candle lands in the
    // sink off the hot path.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while sink.ticks().await.len() < 3 || sink.candles().await.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "sink never caught up");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stored = sink.query_range("BTCUSDT", T0, T0 + 60_000).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].volume, 1.5);

    // Shutdown: the pipeline stops cleanly, the sink is closed, and the
    // subscriber stream ends.
    pipeline.stop().await;
    assert!(sink.is_closed());

    shutdown_tx.send_replace(true);
    let end = timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream should end after shutdown");
    assert!(end.is_none());
}

#[tokio::test]
async fn test_stream_after_stop_gets_no_further_messages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_feed(
        listener,
        vec![(10.0, 1.0, T0), (20.0, 1.0, T0 + 60_000)],
    ));

    let sink = Arc::new(MemorySink::new());
    let aggregator = Arc::new(OhlcAggregator::new(
        Duration::from_secs(60),
        sink.clone() as Arc<dyn Sink>,
    ));
    let broker = Arc::new(Broker::new(16));
    let feed = Arc::new(FeedClient::new(FeedConfig {
        endpoints: vec![format!("ws://{}", addr)],
        max_retries: 1,
        backoff_base_ms: 50,
        dial_timeout_secs: 2,
        ping_interval_secs: 30,
        read_timeout_secs: 60,
    }));
    let pipeline = Pipeline::new(
        feed,
        aggregator,
        Arc::clone(&broker),
        sink.clone(),
        vec!["BTCUSDT".to_string()],
        64,
        Duration::from_secs(2),
    );

    pipeline.start().await.unwrap();

    // Wait until the rollover candle has been produced and persisted.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while sink.candles().await.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "no candle produced");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    pipeline.stop().await;
    assert!(sink.is_closed());

    // A publish after stop reaches nobody and nothing blocks.
    broker
        .publish(&sink.candles().await[0].clone())
        .await;
}
