//! Order types and creation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(to_string = "BUY", serialize = "buy")]
    Buy,
    /// Sell order.
    #[strum(to_string = "SELL", serialize = "sell")]
    Sell,
}

/// Order time-in-force.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Immediate-or-cancel: fill what's available, cancel rest.
    #[strum(to_string = "FAK", serialize = "fak", serialize = "IOC", serialize = "ioc")]
    FAK,
    /// Good-till-cancelled: stays on book until filled or cancelled.
    #[default]
    #[strum(to_string = "GTC", serialize = "gtc")]
    GTC,
}

/// Order parameters for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderParams {
    /// Token ID to trade.
    pub token_id: String,
    /// Order side (buy/sell).
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Order size.
    pub size: Decimal,
    /// Time-in-force.
    pub tif: TimeInForce,
}

impl OrderParams {
    /// Create a new buy order.
    pub fn buy(token_id: impl Into<String>, price: Decimal, size: Decimal) -> Self {
        Self {
            token_id: token_id.into(),
            side: Side::Buy,
            price,
            size,
            tif: TimeInForce::GTC,
        }
    }

    /// Set time-in-force.
    pub fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.tif = tif;
        self
    }

    /// Validate order parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_id.is_empty() {
            return Err("token_id is required".to_string());
        }
        if self.price <= Decimal::ZERO || self.price >= Decimal::ONE {
            return Err(format!("price {} must be inside (0, 1)", self.price));
        }
        if self.size <= Decimal::ZERO {
            return Err("size must be positive".to_string());
        }
        Ok(())
    }
}

/// Order produced by the gateway's `create_order`, ready to post.
///
/// The engine treats the signature material as opaque.
#[derive(Debug, Clone)]
pub struct SignedOrder {
    /// What was signed.
    pub params: OrderParams,
    /// Maker address.
    pub maker: String,
    /// Uniqueness nonce.
    pub salt: String,
    /// Expiration (unix seconds, as string).
    pub expiration: String,
    /// Hex signature.
    pub signature: String,
}

/// Result of posting an order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostOrderResponse {
    /// Accepted by the venue.
    #[serde(default)]
    pub success: bool,
    /// Order ID (various field names).
    #[serde(alias = "orderID", alias = "orderId", alias = "id")]
    pub order_id: Option<String>,
    /// Error message if any.
    #[serde(alias = "errorMsg", alias = "error")]
    pub error_msg: Option<String>,
}

impl PostOrderResponse {
    /// Accepted response with an order id.
    pub fn accepted(order_id: impl Into<String>) -> Self {
        Self {
            success: true,
            order_id: Some(order_id.into()),
            error_msg: None,
        }
    }

    /// Rejected response.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            error_msg: Some(reason.into()),
        }
    }
}

/// Order status from API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order is live on the book.
    #[strum(to_string = "live", serialize = "LIVE", serialize = "delayed", serialize = "DELAYED")]
    Live,
    /// Order is fully filled.
    #[strum(to_string = "filled", serialize = "FILLED", serialize = "matched", serialize = "MATCHED")]
    Filled,
    /// Order was cancelled.
    #[strum(to_string = "canceled", serialize = "cancelled", serialize = "CANCELED", serialize = "CANCELLED")]
    Canceled,
    /// Order was not matched (immediate order with nothing to take).
    #[strum(to_string = "unmatched", serialize = "UNMATCHED")]
    Unmatched,
    /// Order was rejected.
    #[strum(to_string = "rejected", serialize = "REJECTED")]
    Rejected,
    /// Order expired.
    #[strum(to_string = "expired", serialize = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (won't change).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Live)
    }
}

/// Order state summary as reported by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderState {
    /// Order ID.
    pub order_id: String,
    /// Current status, if the venue reported one we understand.
    pub status: Option<OrderStatus>,
    /// Cumulative filled size.
    pub filled_size: Decimal,
    /// Original size.
    pub original_size: Option<Decimal>,
}

impl OrderState {
    /// Whether order is in terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.map(|s| s.is_terminal()).unwrap_or(false)
    }
}
