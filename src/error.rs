//! Unified error types for the arbitrage engine.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::market::Outcome;

/// Unified error type for the arbitrage engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Market-related error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Trading/order error.
    #[error("trading error: {0}")]
    Trading(#[from] TradingError),

    /// Settlement error.
    #[error("settlement error: {0}")]
    Settlement(#[from] SettlementError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Market discovery and data errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Failed to fetch market information.
    #[error("failed to fetch market {slug}: {reason}")]
    FetchFailed {
        /// The market slug that failed.
        slug: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Trading and order execution errors.
#[derive(Error, Debug)]
pub enum TradingError {
    /// Order submission failed.
    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    /// Only one leg of a paired submission was accepted.
    #[error("paired execution failed: only {accepted_leg} accepted")]
    PartialExecution {
        /// Which leg was accepted.
        accepted_leg: Outcome,
    },

    /// Failed to cancel order.
    #[error("failed to cancel order {order_id}: {reason}")]
    CancelFailed {
        /// Order ID that failed to cancel.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to get order status.
    #[error("failed to get order status for {order_id}: {reason}")]
    StatusFailed {
        /// Order ID.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Order id unknown to the gateway or lifecycle manager.
    #[error("unknown order {0}")]
    UnknownOrder(String),

    /// Cancellation refused by lifecycle policy.
    #[error("refusing to cancel order {order_id}: {reason}")]
    CancelRefused {
        /// Order ID.
        order_id: String,
        /// Why the policy refused.
        reason: String,
    },

    /// Invalid order or fill parameters.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// Signing error.
    #[error("signing error: {0}")]
    SigningError(String),

    /// Order rejected by the exchange.
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason from the exchange.
        reason: String,
    },

    /// Insufficient funds for the order.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Required amount.
        required: Decimal,
        /// Available amount.
        available: Decimal,
    },
}

/// Settlement and outcome resolution errors.
#[derive(Error, Debug)]
pub enum SettlementError {
    /// Outcome oracle could not be reached or returned garbage.
    #[error("oracle lookup failed for {slug}: {reason}")]
    OracleFailed {
        /// Instrument slug.
        slug: String,
        /// Reason for failure.
        reason: String,
    },

}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// No message within the liveness window.
    #[error("no websocket message for {0}s")]
    HeartbeatTimeout(u64),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
