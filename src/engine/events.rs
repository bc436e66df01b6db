//! Structured engine events and where they go.
//!
//! Delivery is fire-and-forget: a sink that cannot keep up drops events,
//! the engine never waits on it.

use std::fmt::Debug;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::arbitrage::PlacedOrder;
use crate::market::Outcome;
use crate::settlement::Settlement;
use crate::trading::{CancelReason, CycleStats};

/// Something worth telling an operator about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A new instrument is being traded.
    InstrumentAdmitted {
        /// Instrument slug.
        slug: String,
    },
    /// Orders were accepted by the venue.
    TradeExecuted {
        /// Instrument slug.
        slug: String,
        /// Decision branch.
        kind: String,
        /// Accepted orders.
        orders: Vec<PlacedOrder>,
    },
    /// New shares confirmed on an order.
    OrderFilled {
        /// Instrument slug.
        slug: String,
        /// Order id.
        order_id: String,
        /// Side bought.
        outcome: Outcome,
        /// Newly filled shares.
        shares: Decimal,
        /// Order price.
        price: Decimal,
    },
    /// A resting order was canceled by the engine.
    OrderCanceled {
        /// Instrument slug.
        slug: String,
        /// Order id.
        order_id: String,
        /// Why.
        reason: CancelReason,
    },
    /// Exposure drifted past the rebalance threshold.
    RebalanceTriggered {
        /// Instrument slug.
        slug: String,
        /// UP minus DOWN shares.
        imbalance: Decimal,
    },
    /// Event settled.
    Settled {
        /// Realised result.
        settlement: Settlement,
        /// Summary of the event's trading.
        #[serde(skip)]
        stats: CycleStats,
    },
}

/// Consumer of engine events.
pub trait NotificationSink: Debug + Send + Sync {
    /// Deliver an event. Must not block.
    fn notify(&self, event: &EngineEvent);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: &EngineEvent) {
        match event {
            EngineEvent::InstrumentAdmitted { slug } => info!(%slug, "Tracking instrument"),
            EngineEvent::TradeExecuted { slug, kind, orders } => {
                info!(%slug, %kind, orders = orders.len(), "Trade executed")
            }
            EngineEvent::OrderFilled {
                slug,
                order_id,
                outcome,
                shares,
                price,
            } => info!(%slug, %order_id, %outcome, %shares, %price, "Fill"),
            EngineEvent::OrderCanceled {
                slug,
                order_id,
                reason,
            } => debug!(%slug, %order_id, %reason, "Order canceled"),
            EngineEvent::RebalanceTriggered { slug, imbalance } => {
                warn!(%slug, %imbalance, "Rebalance triggered")
            }
            EngineEvent::Settled { settlement, stats } => info!(
                slug = %settlement.slug,
                winner = %settlement.winner,
                payout = %settlement.payout,
                profit = %settlement.profit,
                summary = %stats,
                "Event settled"
            ),
        }
    }
}

/// Forwards events to a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelSink {
    /// Sink plus the receiving end.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: &EngineEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            debug!(error = %e, "Notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::new(1);
        let event = EngineEvent::InstrumentAdmitted {
            slug: "a".to_string(),
        };
        sink.notify(&event);
        sink.notify(&event);

        assert_eq!(rx.try_recv().unwrap(), event);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = EngineEvent::RebalanceTriggered {
            slug: "a".to_string(),
            imbalance: dec!(-35),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "rebalance_triggered");
        assert_eq!(json["imbalance"], "-35");
    }
}
