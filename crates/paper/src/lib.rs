use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use common::{
    Error, ExchangeClient, OrderAck, OrderRequest, OrderSide, OrderStatus, OrderType, Result,
};

/// Simulated exchange client for paper trading and tests.
///
/// Requests go through the same validation as the live client. Market
/// orders fill at the latest known mark price (set via [`update_price`])
/// with configurable slippage; resting order types acknowledge as NEW. No
/// real orders are ever sent anywhere.
///
/// Every placement and cancel attempt is recorded, including duplicates
/// and injected failures, so tests can assert on call counts. Cancels of
/// unknown order ids still acknowledge; a real venue would reject them,
/// but the lenience keeps watcher tests focused on the calls made.
///
/// [`update_price`]: PaperClient::update_price
pub struct PaperClient {
    /// Successfully placed orders.
    orders: RwLock<Vec<OrderAck>>,
    /// Every placement attempt that reached the venue, in order.
    place_calls: RwLock<Vec<OrderRequest>>,
    /// Every cancel attempt, in order, by order id.
    cancel_calls: RwLock<Vec<i64>>,
    /// Latest known mark price per symbol.
    prices: RwLock<HashMap<String, f64>>,
    next_id: AtomicI64,
    /// Slippage in basis points applied to market fills.
    slippage_bps: f64,
    skip_places: AtomicUsize,
    fail_places: AtomicUsize,
    fail_cancels: AtomicUsize,
}

impl PaperClient {
    pub fn new() -> Self {
        Self::with_slippage(0.0)
    }

    pub fn with_slippage(slippage_bps: f64) -> Self {
        Self {
            orders: RwLock::new(Vec::new()),
            place_calls: RwLock::new(Vec::new()),
            cancel_calls: RwLock::new(Vec::new()),
            prices: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            slippage_bps,
            skip_places: AtomicUsize::new(0),
            fail_places: AtomicUsize::new(0),
            fail_cancels: AtomicUsize::new(0),
        }
    }

    /// Update the latest mark price for a symbol.
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Make the next `n` placement attempts fail with a venue error.
    pub fn fail_next_places(&self, n: usize) {
        self.fail_places.store(n, Ordering::SeqCst);
    }

    /// Let the next `successes` placements through, then fail the `n`
    /// after them.
    pub fn fail_places_after(&self, successes: usize, n: usize) {
        self.skip_places.store(successes, Ordering::SeqCst);
        self.fail_places.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` cancel attempts fail with a venue error.
    pub fn fail_next_cancels(&self, n: usize) {
        self.fail_cancels.store(n, Ordering::SeqCst);
    }

    /// Successfully placed orders, in placement order.
    pub async fn orders(&self) -> Vec<OrderAck> {
        self.orders.read().await.clone()
    }

    /// Every placement attempt, including failed ones.
    pub async fn place_calls(&self) -> Vec<OrderRequest> {
        self.place_calls.read().await.clone()
    }

    /// Every cancel attempt by order id, including failed ones.
    pub async fn cancel_calls(&self) -> Vec<i64> {
        self.cancel_calls.read().await.clone()
    }

    /// Consume one unit from a counter; true if there was one to take.
    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
    }
}

impl Default for PaperClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        request.validate()?;

        self.place_calls.write().await.push(request.clone());

        if !Self::take_one(&self.skip_places) && Self::take_one(&self.fail_places) {
            return Err(Error::Exchange("simulated venue rejection".into()));
        }

        let (status, price) = match request.order_type {
            OrderType::Market => {
                let mark = self.prices.read().await.get(&request.symbol).copied();
                let mark = mark.ok_or_else(|| {
                    Error::Exchange(format!(
                        "no mark price for '{}'; call update_price first",
                        request.symbol
                    ))
                })?;
                // Buys pay more, sells receive less.
                let fill = match request.side {
                    OrderSide::Buy => mark * (1.0 + self.slippage_bps / 10_000.0),
                    OrderSide::Sell => mark * (1.0 - self.slippage_bps / 10_000.0),
                };
                (OrderStatus::Filled, fill)
            }
            _ => {
                let resting = request.price.or(request.stop_price).unwrap_or(0.0);
                (OrderStatus::New, resting)
            }
        };

        let ack = OrderAck {
            order_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            status,
            price,
            quantity: request.quantity,
            timestamp: Utc::now(),
        };

        debug!(
            symbol = %ack.symbol,
            side = %ack.side,
            order_id = ack.order_id,
            price = ack.price,
            "paper order recorded"
        );
        self.orders.write().await.push(ack.clone());
        Ok(ack)
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<OrderAck> {
        self.cancel_calls.write().await.push(order_id);

        if Self::take_one(&self.fail_cancels) {
            return Err(Error::Exchange("simulated cancel failure".into()));
        }

        let orders = self.orders.read().await;
        let ack = match orders.iter().find(|o| o.order_id == order_id) {
            Some(order) => OrderAck {
                status: OrderStatus::Canceled,
                timestamp: Utc::now(),
                ..order.clone()
            },
            None => OrderAck {
                order_id,
                client_order_id: String::new(),
                symbol: symbol.to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                status: OrderStatus::Canceled,
                price: 0.0,
                quantity: 0.0,
                timestamp: Utc::now(),
            },
        };

        debug!(symbol, order_id, "paper cancel recorded");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TimeInForce;

    #[tokio::test]
    async fn market_buy_fill_applies_positive_slippage() {
        let client = PaperClient::with_slippage(10.0); // 10 bps
        client.update_price("BTCUSDT", 1000.0).await;

        let order = OrderRequest::market("BTCUSDT", OrderSide::Buy, 0.01);
        let ack = client.place_order(&order).await.unwrap();

        let expected = 1000.0 * (1.0 + 10.0 / 10_000.0);
        assert!(
            (ack.price - expected).abs() < 1e-6,
            "Buy fill price {}, expected {}",
            ack.price,
            expected
        );
        assert_eq!(ack.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn market_sell_fill_applies_negative_slippage() {
        let client = PaperClient::with_slippage(10.0);
        client.update_price("BTCUSDT", 1000.0).await;

        let order = OrderRequest::market("BTCUSDT", OrderSide::Sell, 0.01);
        let ack = client.place_order(&order).await.unwrap();

        let expected = 1000.0 * (1.0 - 10.0 / 10_000.0);
        assert!((ack.price - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn limit_order_acks_as_new_at_limit_price() {
        let client = PaperClient::new();
        let order = OrderRequest::limit("ETHUSDT", OrderSide::Buy, 1.0, 2500.0, TimeInForce::Gtc);
        let ack = client.place_order(&order).await.unwrap();

        assert_eq!(ack.status, OrderStatus::New);
        assert!((ack.price - 2500.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn invalid_request_rejected_before_recording() {
        let client = PaperClient::new();
        let order = OrderRequest::market("BTC", OrderSide::Buy, 0.01);

        assert!(matches!(
            client.place_order(&order).await,
            Err(Error::Validation(_))
        ));
        assert!(client.place_calls().await.is_empty());
    }

    #[tokio::test]
    async fn injected_placement_failure_is_still_recorded() {
        let client = PaperClient::new();
        client.update_price("BTCUSDT", 1000.0).await;
        client.fail_next_places(1);

        let order = OrderRequest::market("BTCUSDT", OrderSide::Buy, 0.01);
        assert!(client.place_order(&order).await.is_err());
        assert!(client.place_order(&order).await.is_ok());

        assert_eq!(client.place_calls().await.len(), 2);
        assert_eq!(client.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn order_ids_are_monotonic() {
        let client = PaperClient::new();
        client.update_price("BTCUSDT", 1000.0).await;

        let order = OrderRequest::market("BTCUSDT", OrderSide::Buy, 0.01);
        let first = client.place_order(&order).await.unwrap();
        let second = client.place_order(&order).await.unwrap();
        assert!(second.order_id > first.order_id);
    }

    #[tokio::test]
    async fn cancel_of_placed_order_echoes_its_fields() {
        let client = PaperClient::new();
        let order = OrderRequest::limit("ETHUSDT", OrderSide::Sell, 1.0, 2600.0, TimeInForce::Gtc);
        let placed = client.place_order(&order).await.unwrap();

        let ack = client.cancel_order("ETHUSDT", placed.order_id).await.unwrap();
        assert_eq!(ack.status, OrderStatus::Canceled);
        assert_eq!(ack.symbol, "ETHUSDT");
        assert_eq!(client.cancel_calls().await, vec![placed.order_id]);
    }
}
