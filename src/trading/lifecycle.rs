//! Resting (maker) order tracking: partial fills, cancellation policy, pairing timer.
//!
//! State per order:
//!
//! ```text
//! pending --fill--> partially_filled --fill--> filled
//!    |
//!    +--timeout / near expiry / shutdown--> canceled
//! partially_filled --near expiry / shutdown--> canceled
//! ```
//!
//! An order with any fill is never canceled on age alone.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::TradingError;
use crate::market::Outcome;
use crate::trading::Position;

/// Derived state of a resting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum RestingState {
    /// Nothing filled yet.
    Pending,
    /// Some but not all shares filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Removed from the book (by us or the venue).
    Canceled,
}

/// Why the engine cancels an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Pending past the order timeout.
    Timeout,
    /// Inside the pre-expiry window.
    NearExpiry,
    /// Process shutdown.
    Shutdown,
}

/// One maker order slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestingOrder {
    /// Venue order id.
    pub order_id: String,
    /// Side of the event this order buys.
    pub outcome: Outcome,
    /// Token bought.
    pub token_id: String,
    /// Limit price.
    pub price: Decimal,
    /// Total size.
    pub size: Decimal,
    /// Filled so far; never decreases, never exceeds `size`.
    pub filled: Decimal,
    /// Placement time.
    #[serde(skip)]
    pub created_at: OffsetDateTime,
    /// Opposite-side order placed together with this one.
    pub paired_with: Option<String>,
    closed: bool,
}

impl RestingOrder {
    /// New unfilled order.
    pub fn new(
        order_id: impl Into<String>,
        outcome: Outcome,
        token_id: impl Into<String>,
        price: Decimal,
        size: Decimal,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            outcome,
            token_id: token_id.into(),
            price,
            size,
            filled: Decimal::ZERO,
            created_at,
            paired_with: None,
            closed: false,
        }
    }

    /// Unfilled shares.
    pub fn remaining(&self) -> Decimal {
        self.size - self.filled
    }

    /// Current state.
    pub fn state(&self) -> RestingState {
        if self.filled >= self.size {
            RestingState::Filled
        } else if self.closed {
            RestingState::Canceled
        } else if self.filled.is_zero() {
            RestingState::Pending
        } else {
            RestingState::PartiallyFilled
        }
    }

    /// Still on the book.
    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            RestingState::Pending | RestingState::PartiallyFilled
        )
    }
}

/// Newly observed fill on a tracked order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillDelta {
    /// Order that filled.
    pub order_id: String,
    /// Side bought.
    pub outcome: Outcome,
    /// Shares filled since the last report.
    pub shares: Decimal,
    /// Limit price of the order.
    pub price: Decimal,
}

/// Which combined-cost limit applies to pairing fills right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMode {
    /// Sides are level; nothing to pair.
    Idle,
    /// Timer running; pairing must stay under the normal ceiling.
    Strict,
    /// Timer expired or event near expiry; pair at up to `limit`.
    Relaxed {
        /// Highest acceptable combined cost.
        limit: Decimal,
    },
}

/// Lifecycle policy settings.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Pending orders older than this are canceled; `None` disables.
    pub order_timeout: Option<Duration>,
    /// Seconds before expiry when every open order is canceled.
    pub expiry_cancel_secs: i64,
    /// How long to wait for a strict pairing fill.
    pub pairing_timeout: Duration,
    /// Allowed overpay above par once pairing is relaxed (0.05 = 5%).
    pub pairing_max_overpay: Decimal,
}

/// Tracks resting orders and the pairing timer for one instrument.
#[derive(Debug, Clone)]
pub struct OrderLifecycleManager {
    config: LifecycleConfig,
    orders: Vec<RestingOrder>,
    pairing_started: Option<OffsetDateTime>,
}

impl OrderLifecycleManager {
    /// Create an empty manager.
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            orders: Vec::new(),
            pairing_started: None,
        }
    }

    /// Start tracking a placed order.
    pub fn track(&mut self, order: RestingOrder) {
        debug!(
            order_id = %order.order_id,
            outcome = %order.outcome,
            price = %order.price,
            size = %order.size,
            "Tracking resting order"
        );
        self.orders.push(order);
    }

    /// Link two orders as each other's pair.
    pub fn link(&mut self, a: &str, b: &str) {
        for order in &mut self.orders {
            if order.order_id == a {
                order.paired_with = Some(b.to_string());
            } else if order.order_id == b {
                order.paired_with = Some(a.to_string());
            }
        }
    }

    /// Look up an order.
    pub fn get(&self, order_id: &str) -> Option<&RestingOrder> {
        self.orders.iter().find(|o| o.order_id == order_id)
    }

    fn get_mut(&mut self, order_id: &str) -> Result<&mut RestingOrder, TradingError> {
        self.orders
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| TradingError::UnknownOrder(order_id.to_string()))
    }

    /// All tracked orders, oldest first.
    pub fn orders(&self) -> &[RestingOrder] {
        &self.orders
    }

    /// Orders still on the book.
    pub fn open_orders(&self) -> impl Iterator<Item = &RestingOrder> {
        self.orders.iter().filter(|o| o.is_open())
    }

    /// Ids of orders still on the book.
    pub fn open_order_ids(&self) -> Vec<String> {
        self.open_orders().map(|o| o.order_id.clone()).collect()
    }

    /// Unfilled shares resting on `outcome`.
    pub fn open_size_on(&self, outcome: Outcome) -> Decimal {
        self.open_orders()
            .filter(|o| o.outcome == outcome)
            .map(|o| o.remaining())
            .sum()
    }

    /// Apply a cumulative fill report from the venue.
    ///
    /// Returns the newly filled shares, if any. Reports below the known fill
    /// are ignored; reports above the order size are clamped.
    pub fn apply_fill_total(
        &mut self,
        order_id: &str,
        reported_filled: Decimal,
    ) -> Result<Option<FillDelta>, TradingError> {
        let order = self.get_mut(order_id)?;
        let mut target = reported_filled;
        if target > order.size {
            warn!(
                order_id,
                reported = %reported_filled,
                size = %order.size,
                "Fill report exceeds order size, clamping"
            );
            target = order.size;
        }
        if target <= order.filled {
            return Ok(None);
        }
        let shares = target - order.filled;
        order.filled = target;
        Ok(Some(FillDelta {
            order_id: order.order_id.clone(),
            outcome: order.outcome,
            shares,
            price: order.price,
        }))
    }

    /// Apply an incremental fill of `shares`.
    pub fn apply_fill(
        &mut self,
        order_id: &str,
        shares: Decimal,
    ) -> Result<Option<FillDelta>, TradingError> {
        if shares <= Decimal::ZERO {
            return Err(TradingError::InvalidParams(format!(
                "fill size must be positive, got {shares}"
            )));
        }
        let filled = self.get_mut(order_id)?.filled;
        self.apply_fill_total(order_id, filled + shares)
    }

    /// The venue reports the order gone (canceled/expired) without our asking.
    pub fn mark_closed_by_venue(&mut self, order_id: &str) -> Result<(), TradingError> {
        let order = self.get_mut(order_id)?;
        if order.is_open() {
            info!(order_id, filled = %order.filled, "Order closed by venue");
            order.closed = true;
        }
        Ok(())
    }

    /// Check whether canceling `order_id` for `reason` is allowed.
    pub fn check_cancel(&self, order_id: &str, reason: CancelReason) -> Result<(), TradingError> {
        let order = self
            .get(order_id)
            .ok_or_else(|| TradingError::UnknownOrder(order_id.to_string()))?;
        if !order.is_open() {
            return Err(TradingError::CancelRefused {
                order_id: order_id.to_string(),
                reason: format!("order is {}", order.state()),
            });
        }
        if reason == CancelReason::Timeout && order.filled > Decimal::ZERO {
            return Err(TradingError::CancelRefused {
                order_id: order_id.to_string(),
                reason: format!("{} of {} already filled", order.filled, order.size),
            });
        }
        Ok(())
    }

    /// Record a cancellation the venue acknowledged.
    pub fn mark_canceled(&mut self, order_id: &str, reason: CancelReason) -> Result<(), TradingError> {
        self.check_cancel(order_id, reason)?;
        let order = self.get_mut(order_id)?;
        order.closed = true;
        info!(order_id, %reason, filled = %order.filled, "Resting order canceled");
        Ok(())
    }

    /// Pending (zero-fill) orders that have outlived the timeout.
    pub fn due_for_timeout(&self, now: OffsetDateTime) -> Vec<String> {
        let Some(timeout) = self.config.order_timeout else {
            return Vec::new();
        };
        self.orders
            .iter()
            .filter(|o| o.state() == RestingState::Pending && now - o.created_at >= timeout)
            .map(|o| o.order_id.clone())
            .collect()
    }

    /// Whether the event is inside the forced-cancellation window.
    pub fn is_near_expiry(&self, seconds_to_expiry: i64) -> bool {
        seconds_to_expiry <= self.config.expiry_cancel_secs
    }

    /// Every open order, partials included, once inside the expiry window.
    pub fn due_for_expiry(&self, seconds_to_expiry: i64) -> Vec<String> {
        if !self.is_near_expiry(seconds_to_expiry) {
            return Vec::new();
        }
        self.open_order_ids()
    }

    /// Start or clear the pairing timer from the current position.
    pub fn update_pairing(&mut self, position: &Position, now: OffsetDateTime) {
        let unequal = !position.imbalance().is_zero();
        match (unequal, self.pairing_started) {
            (true, None) => {
                debug!(imbalance = %position.imbalance(), "Pairing timer started");
                self.pairing_started = Some(now);
            }
            (false, Some(_)) => {
                debug!("Position level, pairing timer cleared");
                self.pairing_started = None;
            }
            _ => {}
        }
    }

    /// When the pairing timer started, if running.
    pub fn pairing_started(&self) -> Option<OffsetDateTime> {
        self.pairing_started
    }

    /// Pairing limit in force right now.
    pub fn pairing_mode(&self, now: OffsetDateTime, seconds_to_expiry: i64) -> PairingMode {
        let Some(started) = self.pairing_started else {
            return PairingMode::Idle;
        };
        if now - started >= self.config.pairing_timeout || self.is_near_expiry(seconds_to_expiry) {
            PairingMode::Relaxed {
                limit: Decimal::ONE + self.config.pairing_max_overpay,
            }
        } else {
            PairingMode::Strict
        }
    }
}
