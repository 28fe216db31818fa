//! Input validation. Everything here runs synchronously before any network
//! call and fails with [`Error::Validation`].

use crate::error::{Error, Result};
use crate::types::OrderSide;

/// Quote asset all supported pairs settle in.
pub const QUOTE_ASSET: &str = "USDT";

/// Shortest well-formed pair: a two-character base plus the quote.
pub const MIN_SYMBOL_LEN: usize = 6;

/// Reject malformed trading-pair symbols before they reach the venue.
///
/// A valid symbol is at least [`MIN_SYMBOL_LEN`] characters and ends in
/// [`QUOTE_ASSET`], e.g. `BTCUSDT`.
pub fn validate_symbol(symbol: &str) -> Result<()> {
    if symbol.len() < MIN_SYMBOL_LEN || !symbol.ends_with(QUOTE_ASSET) {
        return Err(Error::Validation(format!(
            "symbol '{symbol}' looks invalid; example valid symbol: BTCUSDT"
        )));
    }
    Ok(())
}

pub fn validate_quantity(quantity: f64) -> Result<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(Error::Validation(format!(
            "quantity must be a positive number, got {quantity}"
        )));
    }
    Ok(())
}

pub fn validate_price(label: &str, price: f64) -> Result<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::Validation(format!(
            "{label} must be a positive number, got {price}"
        )));
    }
    Ok(())
}

/// Stop-limit price ordering.
///
/// A BUY stop-limit triggers on a rise through the stop price, so its limit
/// price must sit below the trigger; a SELL stop-limit is the mirror image.
pub fn validate_stop_limit(side: OrderSide, stop_price: f64, limit_price: f64) -> Result<()> {
    match side {
        OrderSide::Buy if limit_price >= stop_price => Err(Error::Validation(format!(
            "for BUY stop-limit, limit price ({limit_price}) must be below stop price ({stop_price})"
        ))),
        OrderSide::Sell if limit_price <= stop_price => Err(Error::Validation(format!(
            "for SELL stop-limit, limit price ({limit_price}) must be above stop price ({stop_price})"
        ))),
        _ => Ok(()),
    }
}

/// Grid bounds: a strictly increasing range with at least two levels.
pub fn validate_grid_range(lower: f64, upper: f64, levels: usize) -> Result<()> {
    validate_price("lower bound", lower)?;
    validate_price("upper bound", upper)?;
    if lower >= upper {
        return Err(Error::Validation(format!(
            "grid lower bound ({lower}) must be below upper bound ({upper})"
        )));
    }
    if levels < 2 {
        return Err(Error::Validation(format!(
            "grid needs at least 2 levels, got {levels}"
        )));
    }
    Ok(())
}

pub fn validate_slices(slices: usize) -> Result<()> {
    if slices == 0 {
        return Err(Error::Validation("TWAP needs at least 1 slice".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_symbols() {
        assert!(validate_symbol("BTCUSDT").is_ok());
        assert!(validate_symbol("ETHUSDT").is_ok());
        assert!(validate_symbol("1000PEPEUSDT").is_ok());
    }

    #[test]
    fn rejects_short_or_wrong_quote_symbols() {
        assert!(validate_symbol("BTC").is_err());
        assert!(validate_symbol("USDT").is_err());
        assert!(validate_symbol("BTCUSD").is_err());
        assert!(validate_symbol("BTCBUSD").is_err());
        assert!(validate_symbol("").is_err());
    }

    #[test]
    fn rejects_non_positive_quantities() {
        assert!(validate_quantity(0.0).is_err());
        assert!(validate_quantity(-1.0).is_err());
        assert!(validate_quantity(f64::NAN).is_err());
        assert!(validate_quantity(f64::INFINITY).is_err());
        assert!(validate_quantity(0.001).is_ok());
    }

    #[test]
    fn buy_stop_limit_requires_limit_below_stop() {
        assert!(validate_stop_limit(OrderSide::Buy, 30000.0, 29900.0).is_ok());
        assert!(validate_stop_limit(OrderSide::Buy, 30000.0, 30000.0).is_err());
        assert!(validate_stop_limit(OrderSide::Buy, 30000.0, 30100.0).is_err());
    }

    #[test]
    fn sell_stop_limit_requires_limit_above_stop() {
        assert!(validate_stop_limit(OrderSide::Sell, 30000.0, 30100.0).is_ok());
        assert!(validate_stop_limit(OrderSide::Sell, 30000.0, 30000.0).is_err());
        assert!(validate_stop_limit(OrderSide::Sell, 30000.0, 29900.0).is_err());
    }

    #[test]
    fn grid_range_checks() {
        assert!(validate_grid_range(30000.0, 31000.0, 3).is_ok());
        assert!(validate_grid_range(31000.0, 30000.0, 3).is_err());
        assert!(validate_grid_range(30000.0, 30000.0, 3).is_err());
        assert!(validate_grid_range(30000.0, 31000.0, 1).is_err());
    }

    #[test]
    fn slice_count_checks() {
        assert!(validate_slices(0).is_err());
        assert!(validate_slices(1).is_ok());
    }
}
