//! OHLC Service Library
//!
//! Ingests a live trade stream for a configured set of symbols, folds it
//! into fixed-duration OHLC candlesticks, persists both ticks and closed
//! candlesticks, and fans each closed candlestick out to streaming RPC
//! subscribers.

pub mod aggregator;
pub mod binance;
pub mod broker;
pub mod cli;
pub mod config;
pub mod market_data;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod sink;

/// Generated protobuf/gRPC bindings.
pub mod pb {
    tonic::include_proto!("ohlc.v1");
}

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;

/// Initialize tracing subscriber for logging.
///
/// When `file_path` is set, log lines additionally roll daily into that file;
/// the returned guard must be held for the lifetime of the process.
pub fn init_logging(level: &str, file_path: Option<&str>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ohlc_service={}", level).into());
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match file_path {
        Some(path) => {
            let path = std::path::Path::new(path);
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "ohlc-service.log".to_string());
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}
