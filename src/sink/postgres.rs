//! PostgreSQL sink implementation

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use super::{Sink, StoreError};
use crate::config::DatabaseConfig;
use crate::market_data::{Ohlc, Tick};

/// Idempotent schema setup, applied on connect.
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS tick (
        symbol      TEXT NOT NULL,
        price       DOUBLE PRECISION NOT NULL,
        quantity    DOUBLE PRECISION NOT NULL,
        "timestamp" BIGINT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_tick_symbol_timestamp ON tick (symbol, "timestamp")"#,
    r#"CREATE TABLE IF NOT EXISTS ohlc (
        symbol     TEXT NOT NULL,
        open       DOUBLE PRECISION NOT NULL,
        high       DOUBLE PRECISION NOT NULL,
        low        DOUBLE PRECISION NOT NULL,
        close      DOUBLE PRECISION NOT NULL,
        volume     DOUBLE PRECISION NOT NULL,
        open_time  BIGINT NOT NULL,
        close_time BIGINT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_ohlc_symbol_open_time ON ohlc (symbol, open_time)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_ohlc_close_time ON ohlc (close_time)"#,
];

/// Append-only sink backed by a pooled PostgreSQL connection.
pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    /// Connect the pool and ensure the schema exists.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if config.url.is_empty() {
            return Err(StoreError::Fatal("database url is required".to_string()));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(classify)?;

        let sink = Self { pool };
        sink.ensure_schema().await?;
        info!("connected to postgres, schema ready");
        Ok(sink)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(classify)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for PostgresSink {
    async fn store_tick(&self, tick: &Tick) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO tick (symbol, price, quantity, "timestamp") VALUES ($1, $2, $3, $4)"#,
        )
        .bind(&tick.symbol)
        .bind(tick.price)
        .bind(tick.quantity)
        .bind(tick.timestamp)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn store_ohlc(&self, ohlc: &Ohlc) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ohlc (symbol, open, high, low, close, volume, open_time, close_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&ohlc.symbol)
        .bind(ohlc.open)
        .bind(ohlc.high)
        .bind(ohlc.low)
        .bind(ohlc.close)
        .bind(ohlc.volume)
        .bind(ohlc.open_time)
        .bind(ohlc.close_time)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        debug!("stored candlestick {}", ohlc);
        Ok(())
    }

    async fn query_range(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<Ohlc>, StoreError> {
        let rows = sqlx::query_as::<_, (String, f64, f64, f64, f64, f64, i64, i64)>(
            "SELECT symbol, open, high, low, close, volume, open_time, close_time \
             FROM ohlc WHERE symbol = $1 AND open_time >= $2 AND close_time <= $3 \
             ORDER BY open_time ASC",
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        Ok(rows
            .into_iter()
            .map(
                |(symbol, open, high, low, close, volume, open_time, close_time)| Ohlc {
                    symbol,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    open_time,
                    close_time,
                },
            )
            .collect())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Pool and I/O failures are worth retrying; schema, configuration, and
/// query failures are not.
fn classify(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Retriable(error.to_string()),
        sqlx::Error::Configuration(_) => StoreError::Fatal(error.to_string()),
        _ => StoreError::Fatal(error.to_string()),
    }
}
