//! Upstream feed wire types and error definitions

use serde::{Deserialize, Serialize};

use crate::market_data::Tick;

/// Subscription request sent after the connection is established.
#[derive(Debug, Serialize)]
pub struct SubscribeCommand {
    pub method: String,
    pub params: Vec<String>,
    pub id: u64,
}

impl SubscribeCommand {
    /// Build an aggregate-trade subscription for `symbols`.
    pub fn new(symbols: &[String], id: u64) -> Self {
        let params = symbols
            .iter()
            .map(|symbol| format!("{}@aggTrade", symbol.to_lowercase()))
            .collect();
        Self {
            method: "SUBSCRIBE".to_string(),
            params,
            id,
        }
    }
}

/// Aggregate-trade event from the upstream feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggTradeEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a", default)]
    pub agg_trade_id: u64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m", default)]
    pub is_buyer_maker: bool,
}

impl AggTradeEvent {
    /// Normalize the event into a [`Tick`], parsing the decimal-string fields.
    pub fn to_tick(&self) -> Result<Tick, FeedError> {
        let price = self
            .price
            .parse::<f64>()
            .map_err(|e| FeedError::Parse(format!("price {:?}: {}", self.price, e)))?;
        let quantity = self
            .quantity
            .parse::<f64>()
            .map_err(|e| FeedError::Parse(format!("quantity {:?}: {}", self.quantity, e)))?;
        Ok(Tick::new(self.symbol.clone(), price, quantity, self.trade_time))
    }
}

/// Disjoint shapes recognized in inbound text frames.
#[derive(Debug)]
pub enum Frame {
    /// Subscription acknowledgement (presence of a `result` member).
    Ack { id: Option<u64> },
    /// Upstream rejected a request (presence of an `error` member).
    Error { message: String },
    /// Aggregate-trade event.
    Trade(AggTradeEvent),
    /// Anything else; carries the event type tag for debug logging.
    Other(String),
}

/// Classify a text frame into one of the recognized shapes.
///
/// Only malformed JSON or a broken aggTrade payload produce an error; callers
/// log those and keep reading.
pub fn classify_frame(text: &str) -> Result<Frame, FeedError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FeedError::Parse(format!("invalid JSON: {}", e)))?;

    if let Some(error) = value.get("error") {
        if !error.is_null() {
            return Ok(Frame::Error {
                message: error.to_string(),
            });
        }
    }
    if value.get("result").is_some() {
        let id = value.get("id").and_then(|id| id.as_u64());
        return Ok(Frame::Ack { id });
    }
    match value.get("e").and_then(|e| e.as_str()) {
        Some("aggTrade") => {
            let event: AggTradeEvent = serde_json::from_value(value)
                .map_err(|e| FeedError::Parse(format!("aggTrade event: {}", e)))?;
            Ok(Frame::Trade(event))
        }
        Some(other) => Ok(Frame::Other(other.to_string())),
        None => Ok(Frame::Other("untagged".to_string())),
    }
}

/// Error types for feed operations
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("subscription rejected: {0}")]
    Subscription(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_command() {
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let command = SubscribeCommand::new(&symbols, 7);
        assert_eq!(command.method, "SUBSCRIBE");
        assert_eq!(command.params, vec!["btcusdt@aggTrade", "ethusdt@aggTrade"]);
        assert_eq!(command.id, 7);
    }

    #[test]
    fn test_classify_ack_frame() {
        let frame = classify_frame(r#"{"result":null,"id":3}"#).unwrap();
        match frame {
            Frame::Ack { id } => assert_eq!(id, Some(3)),
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_error_frame() {
        let frame =
            classify_frame(r#"{"error":{"code":2,"msg":"invalid stream"},"id":3}"#).unwrap();
        assert!(matches!(frame, Frame::Error { .. }));
    }

    #[test]
    fn test_classify_agg_trade_frame() {
        let text = r#"{"e":"aggTrade","E":1700000000100,"s":"BTCUSDT","a":42,"p":"50000.10","q":"0.250","T":1700000000050,"m":false}"#;
        let frame = classify_frame(text).unwrap();
        let Frame::Trade(event) = frame else {
            panic!("expected trade frame");
        };
        let tick = event.to_tick().unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, 50000.10);
        assert_eq!(tick.quantity, 0.250);
        assert_eq!(tick.timestamp, 1700000000050);
    }

    #[test]
    fn test_classify_other_event_type() {
        let text = r#"{"e":"kline","E":1,"s":"BTCUSDT"}"#;
        assert!(matches!(classify_frame(text).unwrap(), Frame::Other(kind) if kind == "kline"));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            classify_frame("not json"),
            Err(FeedError::Parse(_))
        ));
    }

    #[test]
    fn test_unparseable_price_is_parse_error() {
        let text = r#"{"e":"aggTrade","E":1,"s":"BTCUSDT","a":1,"p":"abc","q":"1.0","T":1,"m":false}"#;
        let Frame::Trade(event) = classify_frame(text).unwrap() else {
            panic!("expected trade frame");
        };
        assert!(matches!(event.to_tick(), Err(FeedError::Parse(_))));
    }
}
