//! Trading module for orders, exposure and resting-order lifecycle.
//!
//! This module handles:
//! - Order types and the execution gateway abstraction
//! - Per-instrument positions and the rebalance policy
//! - Resting order state machine and pairing timer

pub mod execution;
pub mod lifecycle;
pub mod order;
pub mod position;

pub use execution::{cancel_orders_best_effort, submit_order, ExecutionGateway};
pub use lifecycle::{
    CancelReason, FillDelta, LifecycleConfig, OrderLifecycleManager, PairingMode, RestingOrder,
    RestingState,
};
pub use order::{
    OrderParams, OrderState, OrderStatus, PostOrderResponse, Side, SignedOrder, TimeInForce,
};
pub use position::{CycleStats, LedgerConfig, Position, PositionLedger};
