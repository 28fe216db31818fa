use async_trait::async_trait;

use crate::{OrderAck, OrderRequest, Result};

/// Abstraction over the venue connection.
///
/// `BinanceFuturesClient` implements this for live trading.
/// `PaperClient` implements this for simulation and tests.
///
/// Implementations validate the request before touching the network and
/// surface venue rejections as `Error::Exchange`. No retry at this layer.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit an order and return the venue acknowledgement.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck>;

    /// Cancel a resting order by venue order id.
    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<OrderAck>;
}
