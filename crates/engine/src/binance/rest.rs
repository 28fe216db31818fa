use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::Mutex;
use tracing::{debug, info};

use common::{Error, ExchangeClient, OrderAck, OrderRequest, Result};

const MAINNET_URL: &str = "https://fapi.binance.com";
const TESTNET_URL: &str = "https://testnet.binancefuture.com";

const ORDER_PATH: &str = "/fapi/v1/order";
const LISTEN_KEY_PATH: &str = "/fapi/v1/listenKey";

/// REST client for Binance USDT-M futures. Handles request signing, order
/// placement/cancellation, and listen-key management for the user-data
/// stream.
pub struct BinanceFuturesClient {
    http: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    recv_window: u64,
    /// Active listen key for the user-data stream.
    listen_key: Mutex<Option<String>>,
}

impl BinanceFuturesClient {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, testnet: bool) -> Self {
        let base_url = if testnet { TESTNET_URL } else { MAINNET_URL };
        Self {
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: base_url.to_string(),
            recv_window: 5000,
            listen_key: Mutex::new(None),
        }
    }

    /// Override the `recvWindow` sent with signed requests.
    pub fn with_recv_window(mut self, recv_window: u64) -> Self {
        self.recv_window = recv_window;
        self
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    fn sign(&self, query: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let query = format!("{params}&recvWindow={}&timestamp={ts}", self.recv_window);
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let body = self.signed_query(params);
        let url = format!("{}{path}", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(venue_error(status, &text));
        }
        Ok(text)
    }

    async fn signed_delete(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}?{}", self.base_url, self.signed_query(params));

        let resp = self
            .http
            .delete(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(venue_error(status, &text));
        }
        Ok(text)
    }

    // ─── Listen key management ───────────────────────────────────────────────

    /// Create a listen key for the user-data stream.
    pub async fn create_listen_key(&self) -> Result<String> {
        let url = format!("{}{LISTEN_KEY_PATH}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(venue_error(status, &text));
        }

        let body: ListenKeyResponse = serde_json::from_str(&text)?;
        *self.listen_key.lock().await = Some(body.listen_key.clone());
        info!("listen key created");
        Ok(body.listen_key)
    }

    /// Keepalive ping for the current listen key. The venue expires keys
    /// after 60 minutes without one.
    pub async fn keepalive_listen_key(&self) -> Result<()> {
        let key = self.listen_key.lock().await;
        let Some(ref listen_key) = *key else {
            return Err(Error::Other("no active listen key".into()));
        };

        let url = format!("{}{LISTEN_KEY_PATH}", self.base_url);
        let resp = self
            .http
            .put(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .query(&[("listenKey", listen_key.as_str())])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(venue_error(status, &text));
        }
        debug!("listen key keepalive sent");
        Ok(())
    }

    /// Close the current listen key. No-op if none is active.
    pub async fn close_listen_key(&self) -> Result<()> {
        let mut key = self.listen_key.lock().await;
        let Some(listen_key) = key.take() else {
            return Ok(());
        };

        let url = format!("{}{LISTEN_KEY_PATH}", self.base_url);
        let resp = self
            .http
            .delete(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .query(&[("listenKey", listen_key.as_str())])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(venue_error(status, &text));
        }
        info!("listen key closed");
        Ok(())
    }
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        request.validate()?;

        let mut params = format!(
            "symbol={}&side={}&type={}&quantity={}",
            request.symbol, request.side, request.order_type, request.quantity
        );
        if let Some(price) = request.price {
            params.push_str(&format!("&price={price}"));
        }
        if let Some(stop_price) = request.stop_price {
            params.push_str(&format!("&stopPrice={stop_price}"));
        }
        if let Some(tif) = request.time_in_force {
            params.push_str(&format!("&timeInForce={tif}"));
        }
        if request.reduce_only {
            params.push_str("&reduceOnly=true");
        }
        params.push_str(&format!("&newClientOrderId={}", request.client_order_id));
        params.push_str("&newOrderRespType=RESULT");

        info!(
            symbol = %request.symbol,
            side = %request.side,
            order_type = %request.order_type,
            quantity = request.quantity,
            "placing order"
        );
        let body = self.signed_post(ORDER_PATH, &params).await?;

        let resp: FuturesOrderResponse =
            serde_json::from_str(&body).map_err(|e| Error::Exchange(e.to_string()))?;
        let ack = resp.into_ack();
        info!(order_id = ack.order_id, status = %ack.status, "order accepted");
        Ok(ack)
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<OrderAck> {
        let params = format!("symbol={symbol}&orderId={order_id}");

        info!(symbol, order_id, "cancelling order");
        let body = self.signed_delete(ORDER_PATH, &params).await?;

        let resp: FuturesOrderResponse =
            serde_json::from_str(&body).map_err(|e| Error::Exchange(e.to_string()))?;
        let ack = resp.into_ack();
        info!(order_id = ack.order_id, status = %ack.status, "cancel accepted");
        Ok(ack)
    }
}

/// Map a non-2xx response to `Error::Exchange`, extracting the venue's
/// `{code, msg}` body when it parses.
fn venue_error(status: reqwest::StatusCode, body: &str) -> Error {
    #[derive(Deserialize)]
    struct VenueError {
        code: i64,
        msg: String,
    }

    match serde_json::from_str::<VenueError>(body) {
        Ok(e) => Error::Exchange(format!("{} (code {})", e.msg, e.code)),
        Err(_) => Error::Exchange(format!("HTTP {status}: {body}")),
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesOrderResponse {
    order_id: i64,
    client_order_id: String,
    symbol: String,
    side: common::OrderSide,
    #[serde(rename = "type")]
    order_type: common::OrderType,
    status: common::OrderStatus,
    price: String,
    #[serde(default)]
    avg_price: Option<String>,
    orig_qty: String,
    #[serde(default)]
    update_time: Option<i64>,
}

impl FuturesOrderResponse {
    fn into_ack(self) -> OrderAck {
        // Prefer the average fill price when the venue reports one.
        let price = self
            .avg_price
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| *p > 0.0)
            .or_else(|| self.price.parse::<f64>().ok())
            .unwrap_or(0.0);

        let timestamp = self
            .update_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        OrderAck {
            order_id: self.order_id,
            client_order_id: self.client_order_id,
            symbol: self.symbol,
            side: self.side,
            order_type: self.order_type,
            status: self.status,
            price,
            quantity: self.orig_qty.parse().unwrap_or(0.0),
            timestamp,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenKeyResponse {
    listen_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderSide, OrderStatus, OrderType};

    #[test]
    fn signature_matches_documented_example() {
        // Reference vector from the Binance API signing documentation.
        let client = BinanceFuturesClient::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A",
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
            false,
        );
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            client.sign(query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn order_response_parses_into_ack() {
        let body = r#"{
            "orderId": 8886774,
            "clientOrderId": "my-id",
            "symbol": "BTCUSDT",
            "side": "BUY",
            "type": "LIMIT",
            "status": "NEW",
            "price": "30000",
            "avgPrice": "0.00000",
            "origQty": "0.001",
            "updateTime": 1568879465651
        }"#;
        let resp: FuturesOrderResponse = serde_json::from_str(body).unwrap();
        let ack = resp.into_ack();
        assert_eq!(ack.order_id, 8886774);
        assert_eq!(ack.side, OrderSide::Buy);
        assert_eq!(ack.order_type, OrderType::Limit);
        assert_eq!(ack.status, OrderStatus::New);
        // avgPrice of zero falls back to the limit price
        assert!((ack.price - 30000.0).abs() < f64::EPSILON);
        assert!((ack.quantity - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn filled_response_prefers_average_price() {
        let body = r#"{
            "orderId": 1,
            "clientOrderId": "c",
            "symbol": "BTCUSDT",
            "side": "SELL",
            "type": "MARKET",
            "status": "FILLED",
            "price": "0",
            "avgPrice": "30123.45",
            "origQty": "0.5"
        }"#;
        let resp: FuturesOrderResponse = serde_json::from_str(body).unwrap();
        let ack = resp.into_ack();
        assert!((ack.price - 30123.45).abs() < 1e-9);
        assert_eq!(ack.status, OrderStatus::Filled);
    }
}
