use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::validate;

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The opposite side. A long entry exits with a SELL, and vice versa.
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(Error::Validation(format!(
                "side must be BUY or SELL, got '{other}'"
            ))),
        }
    }
}

/// Order type, in the venue's vocabulary.
///
/// `StopLimit` maps to the futures `STOP` type (stop trigger + limit price).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "MARKET")]
    Market,
    #[serde(rename = "LIMIT")]
    Limit,
    #[serde(rename = "STOP")]
    StopLimit,
    #[serde(rename = "STOP_MARKET")]
    StopMarket,
    #[serde(rename = "TAKE_PROFIT_MARKET")]
    TakeProfitMarket,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::StopLimit => write!(f, "STOP"),
            OrderType::StopMarket => write!(f, "STOP_MARKET"),
            OrderType::TakeProfitMarket => write!(f, "TAKE_PROFIT_MARKET"),
        }
    }
}

/// Time-in-force for resting orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good till canceled.
    #[default]
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
    /// Good till crossing (post-only).
    Gtx,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
            TimeInForce::Fok => write!(f, "FOK"),
            TimeInForce::Gtx => write!(f, "GTX"),
        }
    }
}

impl std::str::FromStr for TimeInForce {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GTC" => Ok(TimeInForce::Gtc),
            "IOC" => Ok(TimeInForce::Ioc),
            "FOK" => Ok(TimeInForce::Fok),
            "GTX" => Ok(TimeInForce::Gtx),
            other => Err(Error::Validation(format!(
                "time-in-force must be one of GTC, IOC, FOK, GTX, got '{other}'"
            ))),
        }
    }
}

/// Order status as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    /// Any status string this version does not know about.
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// True once no further state transition can occur for the order.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Expired => write!(f, "EXPIRED"),
            OrderStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// An order to be submitted to the venue. Built fresh per call, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    /// Limit price. Required for `Limit` and `StopLimit`.
    pub price: Option<f64>,
    /// Trigger price. Required for the stop/take-profit types.
    pub stop_price: Option<f64>,
    /// Only sent for resting order types.
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: bool,
    /// Client-side id echoed back by the venue.
    pub client_order_id: String,
}

impl OrderRequest {
    fn base(symbol: impl Into<String>, side: OrderSide, order_type: OrderType, quantity: f64) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            side,
            order_type,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            reduce_only: false,
            client_order_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self::base(symbol, side, OrderType::Market, quantity)
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        price: f64,
        time_in_force: TimeInForce,
    ) -> Self {
        let mut req = Self::base(symbol, side, OrderType::Limit, quantity);
        req.price = Some(price);
        req.time_in_force = Some(time_in_force);
        req
    }

    /// Stop-limit: rests until `stop_price` triggers, then works as a limit
    /// order at `limit_price`.
    pub fn stop_limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
        limit_price: f64,
    ) -> Self {
        let mut req = Self::base(symbol, side, OrderType::StopLimit, quantity);
        req.stop_price = Some(stop_price);
        req.price = Some(limit_price);
        req.time_in_force = Some(TimeInForce::Gtc);
        req
    }

    pub fn stop_market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Self {
        let mut req = Self::base(symbol, side, OrderType::StopMarket, quantity);
        req.stop_price = Some(stop_price);
        req
    }

    pub fn take_profit_market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Self {
        let mut req = Self::base(symbol, side, OrderType::TakeProfitMarket, quantity);
        req.stop_price = Some(stop_price);
        req
    }

    pub fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    /// Check every input invariant. Called by exchange clients before any
    /// network round trip; a failure here never reaches the wire.
    pub fn validate(&self) -> crate::Result<()> {
        validate::validate_symbol(&self.symbol)?;
        validate::validate_quantity(self.quantity)?;

        match self.order_type {
            OrderType::Market => {}
            OrderType::Limit => {
                let price = self
                    .price
                    .ok_or_else(|| Error::Validation("limit order requires a price".into()))?;
                validate::validate_price("price", price)?;
            }
            OrderType::StopLimit => {
                let stop = self.stop_price.ok_or_else(|| {
                    Error::Validation("stop-limit order requires a stop price".into())
                })?;
                let limit = self.price.ok_or_else(|| {
                    Error::Validation("stop-limit order requires a limit price".into())
                })?;
                validate::validate_price("stop price", stop)?;
                validate::validate_price("limit price", limit)?;
                validate::validate_stop_limit(self.side, stop, limit)?;
            }
            OrderType::StopMarket | OrderType::TakeProfitMarket => {
                let stop = self.stop_price.ok_or_else(|| {
                    Error::Validation(format!("{} order requires a stop price", self.order_type))
                })?;
                validate::validate_price("stop price", stop)?;
            }
        }
        Ok(())
    }
}

/// Venue acknowledgement of an order. Logged and handed back unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: i64,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Canonical order event, normalized from whichever frame shape the
/// user-data stream delivered it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub symbol: String,
    pub order_id: i64,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

/// The two legs of a synthetic OCO pair. Lives only in memory for the
/// lifetime of one watcher run; there is no persisted linkage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcoPair {
    pub symbol: String,
    pub take_profit_id: i64,
    pub stop_loss_id: i64,
}

impl OcoPair {
    /// The other leg, if `order_id` is one of the pair.
    pub fn sibling_of(&self, order_id: i64) -> Option<i64> {
        if order_id == self.take_profit_id {
            Some(self.stop_loss_id)
        } else if order_id == self.stop_loss_id {
            Some(self.take_profit_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("buy".parse::<OrderSide>().unwrap(), OrderSide::Buy);
        assert_eq!("SELL".parse::<OrderSide>().unwrap(), OrderSide::Sell);
        assert!("HOLD".parse::<OrderSide>().is_err());
    }

    #[test]
    fn side_opposite_flips() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
    }

    #[test]
    fn status_deserializes_unknown_variants() {
        let status: OrderStatus = serde_json::from_str("\"NEW_INSURANCE\"").unwrap();
        assert_eq!(status, OrderStatus::Unknown);
    }

    #[test]
    fn market_request_uppercases_symbol() {
        let req = OrderRequest::market("btcusdt", OrderSide::Buy, 0.001);
        assert_eq!(req.symbol, "BTCUSDT");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn limit_request_without_price_rejected() {
        let mut req = OrderRequest::limit("BTCUSDT", OrderSide::Buy, 0.001, 30000.0, TimeInForce::Gtc);
        req.price = None;
        assert!(req.validate().is_err());
    }

    #[test]
    fn sibling_lookup() {
        let pair = OcoPair {
            symbol: "BTCUSDT".into(),
            take_profit_id: 100,
            stop_loss_id: 200,
        };
        assert_eq!(pair.sibling_of(100), Some(200));
        assert_eq!(pair.sibling_of(200), Some(100));
        assert_eq!(pair.sibling_of(300), None);
    }
}
