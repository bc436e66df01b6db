//! WebSocket market-data feed for the Polymarket CLOB.
//!
//! Features:
//! - Fixed-delay reconnection
//! - Liveness timeout: silence longer than the heartbeat window forces a reconnect
//! - Pushes parsed [`BookUpdate`]s into an mpsc channel; never runs strategy logic

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::types::{BookDelta, BookUpdate, LevelChange, PriceLevel};
use crate::error::WsError;
use crate::metrics;
use crate::trading::Side;

/// Price level from WebSocket.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsLevel {
    /// Price as string.
    pub price: String,
    /// Size as string.
    pub size: String,
}

impl WsLevel {
    fn to_level(&self) -> Option<PriceLevel> {
        Some(PriceLevel::new(
            self.price.parse().ok()?,
            self.size.parse().ok()?,
        ))
    }
}

/// Price change from WebSocket.
#[derive(Debug, Clone, Deserialize)]
pub struct WsPriceChange {
    /// Asset ID (newer message shape carries it per change).
    pub asset_id: Option<String>,
    /// Price as string.
    pub price: String,
    /// Size as string.
    pub size: String,
    /// Side: "BUY" or "SELL".
    pub side: String,
}

impl WsPriceChange {
    fn to_change(&self) -> Option<LevelChange> {
        let side = self.side.parse::<Side>().ok()?;
        Some(LevelChange {
            side,
            price: self.price.parse::<Decimal>().ok()?,
            size: self.size.parse::<Decimal>().ok()?,
        })
    }
}

/// WebSocket event from Polymarket.
#[derive(Debug, Clone, Deserialize)]
pub struct WsEvent {
    /// Event type: "book" or "price_change".
    pub event_type: Option<String>,
    /// Asset ID.
    pub asset_id: Option<String>,
    /// Bid levels (for book events).
    #[serde(alias = "buys")]
    pub bids: Option<Vec<WsLevel>>,
    /// Ask levels (for book events).
    #[serde(alias = "sells")]
    pub asks: Option<Vec<WsLevel>>,
    /// Price changes (for price_change events).
    #[serde(alias = "changes")]
    pub price_changes: Option<Vec<WsPriceChange>>,
}

/// WebSocket subscription message.
#[derive(Debug, Serialize)]
struct SubscribeMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    assets_ids: &'a [String],
}

/// Parse one raw feed message into per-token updates.
///
/// Messages can be single objects or arrays. Unparseable input yields nothing.
pub fn parse_message(text: &str, received_at: OffsetDateTime) -> Vec<BookUpdate> {
    let events: Vec<WsEvent> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text).unwrap_or_default()
    } else {
        match serde_json::from_str(text) {
            Ok(event) => vec![event],
            Err(_) => Vec::new(),
        }
    };

    let mut updates = Vec::new();
    for event in events {
        match event.event_type.as_deref() {
            Some("book") => {
                let Some(token_id) = event.asset_id else { continue };
                let levels = |raw: Option<Vec<WsLevel>>| -> Vec<PriceLevel> {
                    raw.unwrap_or_default().iter().filter_map(WsLevel::to_level).collect()
                };
                updates.push(BookUpdate {
                    token_id,
                    delta: BookDelta::Snapshot {
                        bids: levels(event.bids),
                        asks: levels(event.asks),
                    },
                    received_at,
                });
            }
            Some("price_change") => {
                for change in event.price_changes.unwrap_or_default() {
                    let Some(token_id) = change.asset_id.clone().or_else(|| event.asset_id.clone())
                    else {
                        continue;
                    };
                    let Some(level) = change.to_change() else { continue };
                    // Consecutive changes for one token collapse into one update.
                    if let Some(BookUpdate {
                        token_id: last,
                        delta: BookDelta::Levels(v),
                        ..
                    }) = updates.last_mut()
                    {
                        if *last == token_id {
                            v.push(level);
                            continue;
                        }
                    }
                    updates.push(BookUpdate {
                        token_id,
                        delta: BookDelta::Levels(vec![level]),
                        received_at,
                    });
                }
            }
            _ => {}
        }
    }
    updates
}

/// Market-data feed with fixed-backoff reconnect.
#[derive(Debug, Clone)]
pub struct MarketFeed {
    ws_url: String,
    reconnect_delay: Duration,
    heartbeat_timeout: Duration,
}

impl MarketFeed {
    /// Create a new feed.
    pub fn new(ws_url: String, reconnect_delay: Duration, heartbeat_timeout: Duration) -> Self {
        Self {
            ws_url,
            reconnect_delay,
            heartbeat_timeout,
        }
    }

    /// Spawn the connection loop for `token_ids`; updates are sent to `tx`.
    ///
    /// The task ends when the receiving side is dropped or the handle is aborted.
    pub fn spawn(self, token_ids: Vec<String>, tx: mpsc::Sender<BookUpdate>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut attempt = 0u64;
            loop {
                match self.run_once(&token_ids, &tx).await {
                    Ok(()) => {
                        info!("Feed channel closed, stopping WebSocket");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, attempt, "WebSocket session ended");
                    }
                }
                attempt += 1;
                metrics::inc_ws_reconnects();
                tokio::time::sleep(self.reconnect_delay).await;
            }
        })
    }

    /// One connect/subscribe/read session. `Ok` only when the receiver is gone.
    async fn run_once(
        &self,
        token_ids: &[String],
        tx: &mpsc::Sender<BookUpdate>,
    ) -> Result<(), WsError> {
        let url = format!("{}/ws/market", self.ws_url.trim_end_matches('/'));
        info!(url = %url, assets = token_ids.len(), "Connecting to WebSocket");

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = SubscribeMessage {
            msg_type: "MARKET",
            assets_ids: token_ids,
        };
        let msg_json =
            serde_json::to_string(&subscribe).map_err(|e| WsError::SendFailed(e.to_string()))?;
        write
            .send(Message::Text(msg_json))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))?;

        loop {
            let next = tokio::time::timeout(self.heartbeat_timeout, read.next())
                .await
                .map_err(|_| WsError::HeartbeatTimeout(self.heartbeat_timeout.as_secs()))?;

            match next {
                Some(Ok(Message::Text(text))) => {
                    let start = Instant::now();
                    metrics::inc_ws_messages_received();
                    for update in parse_message(&text, OffsetDateTime::now_utc()) {
                        if tx.send(update).await.is_err() {
                            return Ok(());
                        }
                    }
                    metrics::record_ws_message_latency(start);
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(WsError::ConnectionClosed {
                        code: frame.as_ref().map(|f| u16::from(f.code)),
                        reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                    });
                }
                Some(Ok(_)) => debug!("Non-text frame"),
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    return Err(e.into());
                }
                None => {
                    return Err(WsError::ConnectionClosed {
                        code: None,
                        reason: "stream ended".to_string(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_book_snapshot() {
        let text = r#"{"event_type":"book","asset_id":"tok","bids":[{"price":"0.48","size":"100"}],"asks":[{"price":"0.50","size":"20"},{"price":"bad","size":"1"}]}"#;
        let updates = parse_message(text, OffsetDateTime::UNIX_EPOCH);

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].token_id, "tok");
        match &updates[0].delta {
            BookDelta::Snapshot { bids, asks } => {
                assert_eq!(bids[0], PriceLevel::new(dec!(0.48), dec!(100)));
                assert_eq!(asks.len(), 1);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn parses_price_changes_grouped_by_token() {
        let text = r#"[{"event_type":"price_change","price_changes":[
            {"asset_id":"a","price":"0.40","size":"10","side":"BUY"},
            {"asset_id":"a","price":"0.45","size":"0","side":"SELL"},
            {"asset_id":"b","price":"0.55","size":"7","side":"SELL"}
        ]}]"#;
        let updates = parse_message(text, OffsetDateTime::UNIX_EPOCH);

        assert_eq!(updates.len(), 2);
        match &updates[0].delta {
            BookDelta::Levels(changes) => {
                assert_eq!(changes.len(), 2);
                assert_eq!(changes[0].side, Side::Buy);
                assert_eq!(changes[1].size, dec!(0));
            }
            other => panic!("expected levels, got {other:?}"),
        }
        assert_eq!(updates[1].token_id, "b");
    }

    #[test]
    fn legacy_change_shape_uses_event_asset() {
        let text = r#"{"event_type":"price_change","asset_id":"x","changes":[{"price":"0.30","size":"5","side":"BUY"}]}"#;
        let updates = parse_message(text, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].token_id, "x");
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_message("PONG", OffsetDateTime::UNIX_EPOCH).is_empty());
        assert!(parse_message(r#"{"event_type":"tick_size_change"}"#, OffsetDateTime::UNIX_EPOCH).is_empty());
    }
}
