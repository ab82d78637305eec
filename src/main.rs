use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use ohlc_service::aggregator::OhlcAggregator;
use ohlc_service::binance::FeedClient;
use ohlc_service::broker::Broker;
use ohlc_service::cli::Cli;
use ohlc_service::config::Config;
use ohlc_service::pipeline::Pipeline;
use ohlc_service::server::OhlcStreamService;
use ohlc_service::sink::{PostgresSink, Sink};
use ohlc_service::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let config_path = cli
        .config_file
        .clone()
        .unwrap_or_else(Config::profile_path);
    let mut config = Config::load_or_default(&config_path);
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    let _log_guard = init_logging(&config.log_level, config.log.file_path.as_deref())?;

    info!("OHLC service starting (config: {})", config_path);
    info!(
        "symbols: {:?}, interval: {}s, rpc: {}",
        config.symbols, config.interval_secs, config.server.addr
    );

    let sink: Arc<dyn Sink> = Arc::new(
        PostgresSink::connect(&config.database)
            .await
            .context("connecting durable sink")?,
    );
    let aggregator = Arc::new(OhlcAggregator::new(
        Duration::from_secs(config.interval_secs),
        Arc::clone(&sink),
    ));
    let broker = Arc::new(Broker::new(config.max_subscribers));
    let feed = Arc::new(FeedClient::new(config.feed.clone()));

    let pipeline = Pipeline::new(
        feed,
        aggregator,
        Arc::clone(&broker),
        Arc::clone(&sink),
        config.symbols.clone(),
        config.channel_size,
        Duration::from_secs(config.shutdown_deadline_secs),
    );
    pipeline.start().await.context("starting pipeline")?;

    let addr: std::net::SocketAddr = config
        .server
        .addr
        .parse()
        .with_context(|| format!("invalid rpc listen address: {}", config.server.addr))?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = OhlcStreamService::new(Arc::clone(&broker), config.channel_size, shutdown_rx);

    info!("serving candlestick stream on {}", addr);
    let server = tonic::transport::Server::builder()
        .add_service(service.into_server())
        .serve_with_shutdown(addr, async move {
            wait_for_signal().await;
            info!("shutdown signal received");
            // End the delivery tasks so graceful shutdown is not held open by
            // live streams.
            shutdown_tx.send_replace(true);
        });

    if let Err(e) = server.await {
        error!("rpc server error: {}", e);
    }

    pipeline.stop().await;
    info!("OHLC service stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
