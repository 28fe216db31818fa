use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use url::Url;

use common::{OrderStatus, OrderUpdate, Result};

const MAINNET_WS_URL: &str = "wss://fstream.binance.com";
const TESTNET_WS_URL: &str = "wss://stream.binancefuture.com";

/// Binance futures user-data WebSocket stream.
///
/// Connects with a listen key, normalizes the venue's order frames into
/// [`OrderUpdate`] records, and publishes them on a broadcast channel.
/// Reconnects automatically with exponential backoff until shut down.
pub struct UserDataStream {
    listen_key: String,
    ws_base_url: String,
    update_tx: broadcast::Sender<OrderUpdate>,
}

enum StreamExit {
    Shutdown,
    Closed,
}

impl UserDataStream {
    pub fn new(
        listen_key: impl Into<String>,
        testnet: bool,
        update_tx: broadcast::Sender<OrderUpdate>,
    ) -> Self {
        let ws_base_url = if testnet { TESTNET_WS_URL } else { MAINNET_WS_URL };
        Self {
            listen_key: listen_key.into(),
            ws_base_url: ws_base_url.to_string(),
            update_tx,
        }
    }

    /// Subscribe to the normalized order-update broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderUpdate> {
        self.update_tx.subscribe()
    }

    /// Run the stream loop, reconnecting on failure, until the shutdown
    /// signal flips. Call this inside a `tokio::spawn`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        loop {
            if *shutdown.borrow() {
                info!("user-data stream stopped");
                return;
            }

            info!("Connecting to user-data stream");
            match self.connect_once(&mut shutdown).await {
                Ok(StreamExit::Shutdown) => {
                    info!("user-data stream stopped");
                    return;
                }
                Ok(StreamExit::Closed) => {
                    info!("user-data stream closed cleanly, reconnecting");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(error = %e, backoff = ?backoff, "user-data stream error, reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_once(&self, shutdown: &mut watch::Receiver<bool>) -> Result<StreamExit> {
        let url_str = format!("{}/ws/{}", self.ws_base_url, self.listen_key);
        let url = Url::parse(&url_str).map_err(|e| common::Error::WebSocket(e.to_string()))?;

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| common::Error::WebSocket(e.to_string()))?;

        let (_, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(StreamExit::Shutdown);
                    }
                }
                msg = read.next() => {
                    let Some(msg) = msg else {
                        return Ok(StreamExit::Closed);
                    };
                    let msg = msg.map_err(|e| common::Error::WebSocket(e.to_string()))?;

                    if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                        match parse_frame(&text) {
                            Ok(Some(StreamFrame::ListenKeyExpired {})) => {
                                warn!("listen key expired, stream will drop");
                            }
                            Ok(Some(frame)) => {
                                if let Some(update) = frame.normalize() {
                                    debug!(
                                        order_id = update.order_id,
                                        status = %update.status,
                                        "order update"
                                    );
                                    // Ignore send errors (no active receivers)
                                    let _ = self.update_tx.send(update);
                                }
                            }
                            Ok(None) => {} // frame type not relevant here
                            Err(e) => {
                                warn!(error = %e, "failed to parse user-data frame");
                            }
                        }
                    }
                }
            }
        }
    }
}

// ─── User-data frame normalization ───────────────────────────────────────────

/// The known user-data frame shapes, tagged by the `e` field.
///
/// Order events arrive either as the futures `ORDER_TRADE_UPDATE` or the
/// legacy `ORDER_UPDATE`, both with the same nested `o` payload; everything
/// downstream only ever sees the canonical [`OrderUpdate`] record.
#[derive(Debug, Deserialize)]
#[serde(tag = "e")]
enum StreamFrame {
    #[serde(rename = "ORDER_TRADE_UPDATE")]
    FuturesOrder {
        #[serde(rename = "E")]
        event_time: i64,
        #[serde(rename = "o")]
        order: RawOrder,
    },
    #[serde(rename = "ORDER_UPDATE")]
    LegacyOrder {
        #[serde(rename = "E")]
        event_time: i64,
        #[serde(rename = "o")]
        order: RawOrder,
    },
    #[serde(rename = "ACCOUNT_UPDATE")]
    Account {},
    #[serde(rename = "listenKeyExpired")]
    ListenKeyExpired {},
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "i")]
    order_id: i64,
    #[serde(rename = "X")]
    status: OrderStatus,
}

impl StreamFrame {
    /// Normalize into the canonical order-update record. Non-order frames
    /// normalize to nothing.
    fn normalize(self) -> Option<OrderUpdate> {
        match self {
            StreamFrame::FuturesOrder { event_time, order }
            | StreamFrame::LegacyOrder { event_time, order } => Some(OrderUpdate {
                symbol: order.symbol,
                order_id: order.order_id,
                status: order.status,
                timestamp: event_millis(event_time),
            }),
            StreamFrame::Account {} | StreamFrame::ListenKeyExpired {} => None,
        }
    }
}

/// Classify one raw frame. `Ok(None)` means a well-formed frame of a type
/// this listener does not care about.
fn parse_frame(text: &str) -> Result<Option<StreamFrame>> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    match value.get("e").and_then(|v| v.as_str()) {
        Some("ORDER_TRADE_UPDATE" | "ORDER_UPDATE" | "ACCOUNT_UPDATE" | "listenKeyExpired") => {
            Ok(Some(serde_json::from_value(value)?))
        }
        _ => Ok(None),
    }
}

fn event_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}
