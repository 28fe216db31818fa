use std::time::Duration;

use tracing::{info, warn};

use common::{validate, ExchangeClient, OrderAck, OrderRequest, OrderSide, Result};

/// Parameters for one TWAP execution.
#[derive(Debug, Clone)]
pub struct TwapSpec {
    pub symbol: String,
    pub side: OrderSide,
    /// Total quantity to execute across all slices.
    pub total_quantity: f64,
    pub slices: usize,
    /// Pause between consecutive slices.
    pub interval: Duration,
}

/// Split `total_quantity` into equal market-order slices, one every
/// `interval`. Per-slice venue failures are logged and skipped; exactly
/// `slices` placements are attempted either way. A failed slice's quantity
/// is not redistributed.
pub async fn execute_twap(client: &dyn ExchangeClient, spec: &TwapSpec) -> Result<Vec<OrderAck>> {
    validate::validate_symbol(&spec.symbol)?;
    validate::validate_quantity(spec.total_quantity)?;
    validate::validate_slices(spec.slices)?;

    let slice_quantity = spec.total_quantity / spec.slices as f64;
    info!(
        symbol = %spec.symbol,
        side = %spec.side,
        total = spec.total_quantity,
        slices = spec.slices,
        interval = ?spec.interval,
        "starting TWAP"
    );

    let mut placed = Vec::new();
    for i in 0..spec.slices {
        let request = OrderRequest::market(spec.symbol.as_str(), spec.side, slice_quantity);
        match client.place_order(&request).await {
            Ok(ack) => {
                info!(
                    slice = i + 1,
                    quantity = slice_quantity,
                    order_id = ack.order_id,
                    "TWAP slice placed"
                );
                placed.push(ack);
            }
            Err(e) => {
                warn!(slice = i + 1, error = %e, "TWAP slice failed, skipping");
            }
        }

        if i + 1 < spec.slices {
            tokio::time::sleep(spec.interval).await;
        }
    }

    info!(placed = placed.len(), attempted = spec.slices, "TWAP finished");
    Ok(placed)
}
