use tracing::{info, warn};

use common::{validate, ExchangeClient, OrderAck, OrderRequest, OrderSide, Result, TimeInForce};

/// Parameters for one grid ladder.
#[derive(Debug, Clone)]
pub struct GridSpec {
    pub symbol: String,
    pub lower: f64,
    pub upper: f64,
    /// Number of price levels, at least 2.
    pub levels: usize,
    /// Quantity per level, in base asset units.
    pub quantity: f64,
    pub time_in_force: TimeInForce,
}

/// The `levels` equally spaced prices across `[lower, upper]`, bounds
/// included. `levels` must be at least 2.
pub fn grid_prices(lower: f64, upper: f64, levels: usize) -> Vec<f64> {
    debug_assert!(levels >= 2);
    let step = (upper - lower) / (levels - 1) as f64;
    (0..levels).map(|i| lower + step * i as f64).collect()
}

/// Place a ladder of limit orders: the lower ⌊levels/2⌋ prices as BUYs, the
/// rest as SELLs. Per-order venue failures are logged and skipped; the
/// subset that succeeded is returned. Partial grids are not rolled back.
pub async fn create_grid(client: &dyn ExchangeClient, spec: &GridSpec) -> Result<Vec<OrderAck>> {
    validate::validate_symbol(&spec.symbol)?;
    validate::validate_grid_range(spec.lower, spec.upper, spec.levels)?;
    validate::validate_quantity(spec.quantity)?;

    let prices = grid_prices(spec.lower, spec.upper, spec.levels);
    info!(
        symbol = %spec.symbol,
        lower = spec.lower,
        upper = spec.upper,
        levels = spec.levels,
        quantity = spec.quantity,
        "creating grid"
    );

    let mut placed = Vec::new();
    for (i, &price) in prices.iter().enumerate() {
        let side = if i < spec.levels / 2 {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let request = OrderRequest::limit(
            spec.symbol.as_str(),
            side,
            spec.quantity,
            price,
            spec.time_in_force,
        );

        match client.place_order(&request).await {
            Ok(ack) => {
                info!(side = %side, price, order_id = ack.order_id, "grid order placed");
                placed.push(ack);
            }
            Err(e) => {
                warn!(side = %side, price, error = %e, "grid order failed, continuing");
            }
        }
    }

    info!(placed = placed.len(), levels = spec.levels, "grid created");
    Ok(placed)
}
