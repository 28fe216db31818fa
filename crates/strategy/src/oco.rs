use tracing::{error, info};

use common::{validate, ExchangeClient, OcoPair, OrderAck, OrderRequest, OrderSide, Result};

/// Parameters for a synthetic OCO exit pair.
#[derive(Debug, Clone)]
pub struct OcoSpec {
    pub symbol: String,
    /// Side of the entry position the pair protects. Both exit legs go on
    /// the opposite side.
    pub entry_side: OrderSide,
    pub quantity: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
}

/// Both legs of a freshly placed synthetic OCO pair.
#[derive(Debug, Clone)]
pub struct OcoOrders {
    pub take_profit: OrderAck,
    pub stop_loss: OrderAck,
}

impl OcoOrders {
    /// The identifier pair to hand to the watcher.
    pub fn pair(&self) -> OcoPair {
        OcoPair {
            symbol: self.take_profit.symbol.clone(),
            take_profit_id: self.take_profit.order_id,
            stop_loss_id: self.stop_loss.order_id,
        }
    }
}

/// Place a synthetic OCO pair. The futures API has no native OCO endpoint,
/// so this places a take-profit-market and a stop-market order on the exit
/// side; the watcher cancels the survivor once either leg goes terminal.
///
/// Placement errors propagate. If the stop-loss leg fails after the
/// take-profit leg was accepted, the accepted leg is left resting and its
/// id is logged for the operator.
pub async fn place_oco(client: &dyn ExchangeClient, spec: &OcoSpec) -> Result<OcoOrders> {
    validate::validate_symbol(&spec.symbol)?;
    validate::validate_quantity(spec.quantity)?;
    validate::validate_price("take-profit price", spec.take_profit_price)?;
    validate::validate_price("stop-loss price", spec.stop_loss_price)?;

    let exit_side = spec.entry_side.opposite();
    info!(
        symbol = %spec.symbol,
        exit_side = %exit_side,
        take_profit = spec.take_profit_price,
        stop_loss = spec.stop_loss_price,
        quantity = spec.quantity,
        "placing OCO pair"
    );

    let tp_request = OrderRequest::take_profit_market(
        spec.symbol.as_str(),
        exit_side,
        spec.quantity,
        spec.take_profit_price,
    );
    let take_profit = client.place_order(&tp_request).await?;
    info!(order_id = take_profit.order_id, "take-profit leg accepted");

    let sl_request = OrderRequest::stop_market(
        spec.symbol.as_str(),
        exit_side,
        spec.quantity,
        spec.stop_loss_price,
    );
    let stop_loss = match client.place_order(&sl_request).await {
        Ok(ack) => ack,
        Err(e) => {
            error!(
                take_profit_id = take_profit.order_id,
                error = %e,
                "stop-loss leg failed; take-profit leg left resting"
            );
            return Err(e);
        }
    };
    info!(order_id = stop_loss.order_id, "stop-loss leg accepted");

    Ok(OcoOrders { take_profit, stop_loss })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderType;
    use paper::PaperClient;

    fn spec() -> OcoSpec {
        OcoSpec {
            symbol: "BTCUSDT".into(),
            entry_side: OrderSide::Buy,
            quantity: 0.01,
            take_profit_price: 32000.0,
            stop_loss_price: 29000.0,
        }
    }

    #[tokio::test]
    async fn both_legs_placed_on_the_exit_side() {
        let client = PaperClient::new();
        let orders = place_oco(&client, &spec()).await.unwrap();

        assert_eq!(orders.take_profit.side, OrderSide::Sell);
        assert_eq!(orders.stop_loss.side, OrderSide::Sell);
        assert_eq!(orders.take_profit.order_type, OrderType::TakeProfitMarket);
        assert_eq!(orders.stop_loss.order_type, OrderType::StopMarket);
    }

    #[tokio::test]
    async fn pair_carries_both_leg_ids() {
        let client = PaperClient::new();
        let orders = place_oco(&client, &spec()).await.unwrap();

        let pair = orders.pair();
        assert_eq!(pair.symbol, "BTCUSDT");
        assert_eq!(pair.take_profit_id, orders.take_profit.order_id);
        assert_eq!(pair.stop_loss_id, orders.stop_loss.order_id);
        assert_ne!(pair.take_profit_id, pair.stop_loss_id);
    }

    #[tokio::test]
    async fn sell_entry_exits_with_buys() {
        let client = PaperClient::new();
        let mut short = spec();
        short.entry_side = OrderSide::Sell;
        short.take_profit_price = 29000.0;
        short.stop_loss_price = 32000.0;

        let orders = place_oco(&client, &short).await.unwrap();
        assert_eq!(orders.take_profit.side, OrderSide::Buy);
        assert_eq!(orders.stop_loss.side, OrderSide::Buy);
    }

    #[tokio::test]
    async fn first_leg_failure_propagates_with_nothing_placed() {
        let client = PaperClient::new();
        client.fail_next_places(1);

        assert!(place_oco(&client, &spec()).await.is_err());
        assert!(client.orders().await.is_empty());
    }

    #[tokio::test]
    async fn second_leg_failure_propagates_leaving_first_resting() {
        let client = PaperClient::new();
        client.fail_places_after(1, 1);

        assert!(place_oco(&client, &spec()).await.is_err());

        // The take-profit leg was accepted before the stop-loss leg failed
        // and is left resting; nothing rolls it back.
        let orders = client.orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_type, OrderType::TakeProfitMarket);
        assert_eq!(client.place_calls().await.len(), 2);
    }
}
