//! Execution gateway abstraction and submission helpers.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use super::order::{
    OrderParams, OrderState, OrderStatus, PostOrderResponse, SignedOrder, TimeInForce,
};
use crate::error::TradingError;
use crate::metrics;
use crate::orderbook::BookSnapshot;

/// Venue order API consumed by the engine.
///
/// The engine never signs or custodies credentials itself; `create_order`
/// hands back an opaque signed order that `post_order` submits.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Build and sign an order.
    async fn create_order(&self, params: &OrderParams) -> Result<SignedOrder, TradingError>;

    /// Post a signed order with the given time-in-force.
    async fn post_order(
        &self,
        order: &SignedOrder,
        tif: TimeInForce,
    ) -> Result<PostOrderResponse, TradingError>;

    /// Current fill state of an order.
    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, TradingError>;

    /// Cancel a resting order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError>;

    /// Latest book seen by the engine. Only simulated venues care.
    fn observe_book(&self, _book: &BookSnapshot) {}
}

/// Create, post and unwrap the order id of a single order.
#[instrument(skip(gateway, params), fields(token = %params.token_id, tif = %params.tif))]
pub async fn submit_order(
    gateway: &dyn ExecutionGateway,
    params: &OrderParams,
) -> Result<String, TradingError> {
    params.validate().map_err(TradingError::InvalidParams)?;

    debug!(price = %params.price, size = %params.size, "Submitting order");
    let start = std::time::Instant::now();

    let signed = gateway.create_order(params).await?;
    let response = gateway.post_order(&signed, params.tif).await;
    metrics::record_order_latency(start);

    let response = response.inspect_err(|_| metrics::inc_orders_failed())?;
    if !response.success {
        metrics::inc_orders_failed();
        return Err(TradingError::OrderRejected {
            reason: response
                .error_msg
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "unspecified".to_string()),
        });
    }

    let order_id = response.order_id.filter(|id| !id.is_empty()).ok_or_else(|| {
        metrics::inc_orders_failed();
        TradingError::SubmissionFailed("No order ID in response".to_string())
    })?;

    metrics::inc_orders_submitted();
    info!(
        order_id = %order_id,
        token_id = %params.token_id,
        price = %params.price,
        size = %params.size,
        tif = %params.tif,
        "Order submitted"
    );

    Ok(order_id)
}

/// Cancel several orders, continuing past failures.
///
/// Returns the ids that could not be canceled.
pub async fn cancel_orders_best_effort(
    gateway: &dyn ExecutionGateway,
    order_ids: &[String],
) -> Vec<String> {
    let mut failed = Vec::new();
    for order_id in order_ids {
        if let Err(e) = gateway.cancel_order(order_id).await {
            warn!(order_id = %order_id, error = %e, "Cancel failed");
            failed.push(order_id.clone());
        }
    }
    failed
}

/// Parse a venue order-status payload, tolerating field-name variants.
pub fn parse_order_state(order_id: &str, json: &serde_json::Value) -> OrderState {
    let status = json
        .get("status")
        .or_else(|| json.get("orderStatus"))
        .or_else(|| json.get("order_status"))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<OrderStatus>().ok());

    let filled_size = parse_decimal_field(
        json,
        &["size_matched", "sizeMatched", "filled", "filledSize", "filled_size"],
    )
    .unwrap_or(Decimal::ZERO);
    let original_size = parse_decimal_field(json, &["original_size", "originalSize", "size"]);

    OrderState {
        order_id: order_id.to_string(),
        status,
        filled_size,
        original_size,
    }
}

/// Parse a decimal field from JSON, trying multiple field names.
pub fn parse_decimal_field(json: &serde_json::Value, keys: &[&str]) -> Option<Decimal> {
    for key in keys {
        if let Some(value) = json.get(*key) {
            if let Some(s) = value.as_str() {
                if let Ok(d) = s.parse::<Decimal>() {
                    return Some(d);
                }
            }
            if let Some(n) = value.as_f64() {
                if let Ok(d) = Decimal::try_from(n) {
                    return Some(d);
                }
            }
        }
    }
    None
}

/// Extract order ID from API response.
pub fn extract_order_id(result: &serde_json::Value) -> Option<String> {
    for key in ["orderID", "orderId", "order_id", "id"] {
        if let Some(id) = result.get(key).and_then(|v| v.as_str()) {
            return Some(id.to_string());
        }
    }

    for key in ["order", "data", "result"] {
        if let Some(nested) = result.get(key) {
            if let Some(id) = extract_order_id(nested) {
                return Some(id);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn extract_order_id_various_formats() {
        let json1 = serde_json::json!({"orderID": "abc123"});
        assert_eq!(extract_order_id(&json1), Some("abc123".to_string()));

        let json3 = serde_json::json!({"order": {"id": "ghi789"}});
        assert_eq!(extract_order_id(&json3), Some("ghi789".to_string()));

        let json4 = serde_json::json!({"error": "something"});
        assert_eq!(extract_order_id(&json4), None);
    }

    #[test]
    fn parse_decimal_field_works() {
        let json = serde_json::json!({
            "filled": "10.5",
            "remaining": 5.25,
        });

        assert_eq!(parse_decimal_field(&json, &["filled"]), Some(dec!(10.5)));
        assert_eq!(parse_decimal_field(&json, &["remaining"]), Some(dec!(5.25)));
        assert_eq!(parse_decimal_field(&json, &["missing"]), None);
    }

    #[test]
    fn parse_order_state_from_clob_shape() {
        let json = serde_json::json!({
            "id": "0x1",
            "status": "LIVE",
            "original_size": "10",
            "size_matched": "4"
        });
        let state = parse_order_state("0x1", &json);

        assert_eq!(state.status, Some(OrderStatus::Live));
        assert_eq!(state.filled_size, dec!(4));
        assert_eq!(state.original_size, Some(dec!(10)));
        assert!(!state.is_terminal());
    }

    #[test]
    fn parse_order_state_defaults_missing_fill_to_zero() {
        let state = parse_order_state("x", &serde_json::json!({"status": "weird"}));
        assert_eq!(state.status, None);
        assert_eq!(state.filled_size, Decimal::ZERO);
    }
}
