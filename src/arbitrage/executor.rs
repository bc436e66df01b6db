//! Turns decisions and grid plans into gateway orders.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::decision::{Decision, DecisionKind, LegAction};
use super::grid::GridOrder;
use crate::engine::InstrumentState;
use crate::error::TradingError;
use crate::market::Outcome;
use crate::metrics;
use crate::trading::{submit_order, ExecutionGateway, OrderParams, RestingOrder, TimeInForce};

/// Order accepted by the venue during one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    /// Venue order id.
    pub order_id: String,
    /// Side bought.
    pub outcome: Outcome,
    /// Limit price.
    pub price: Decimal,
    /// Shares.
    pub size: Decimal,
    /// Immediate or resting.
    pub tif: TimeInForce,
}

/// Result of attempting to execute a decision or plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// At least one order was accepted.
    Placed {
        /// Branch that produced the orders.
        kind: DecisionKind,
        /// Accepted orders.
        orders: Vec<PlacedOrder>,
        /// Legs the venue refused.
        failed: usize,
    },
    /// Every leg was refused.
    AllFailed {
        /// Legs attempted.
        attempted: usize,
    },
    /// Nothing to place.
    Skipped,
    /// Another submission happened too recently.
    CooldownActive {
        /// Milliseconds until submissions are allowed again.
        remaining_ms: u64,
    },
}

impl ExecutionResult {
    /// Accepted orders, if any.
    pub fn placed(&self) -> &[PlacedOrder] {
        match self {
            ExecutionResult::Placed { orders, .. } => orders,
            _ => &[],
        }
    }
}

/// Executor statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    /// Trading decisions handed to the executor.
    pub decisions: u64,
    /// Executions with at least one accepted order.
    pub executions: u64,
    /// Orders accepted.
    pub orders_placed: u64,
    /// Orders refused or failed.
    pub orders_failed: u64,
    /// Executions held back by the cooldown.
    pub cooldown_skips: u64,
    /// Rebalance executions.
    pub rebalances: u64,
    /// Forced pairing executions.
    pub forced_pairings: u64,
}

/// Places orders and enforces the system-wide submission cooldown.
#[derive(Debug)]
pub struct ArbitrageExecutor {
    cooldown: Duration,
    last_submission: Option<OffsetDateTime>,
    stats: ExecutorStats,
}

impl ArbitrageExecutor {
    /// Create an executor with the given cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_submission: None,
            stats: ExecutorStats::default(),
        }
    }

    /// Time left before another submission is allowed.
    pub fn cooldown_remaining(&self, now: OffsetDateTime) -> Option<Duration> {
        let last = self.last_submission?;
        let elapsed = now - last;
        if elapsed >= self.cooldown {
            return None;
        }
        let elapsed = Duration::try_from(elapsed).unwrap_or_default();
        Some(self.cooldown.saturating_sub(elapsed))
    }

    /// Check if cooldown is active.
    pub fn is_cooldown_active(&self, now: OffsetDateTime) -> bool {
        self.cooldown_remaining(now).is_some()
    }

    /// Statistics so far.
    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    /// Place the orders of a reactive decision.
    ///
    /// Accepted orders are tracked in the instrument's lifecycle manager;
    /// fills are picked up by status polling.
    #[instrument(skip_all, fields(slug = %state.instrument.slug, kind = %decision.kind))]
    pub async fn execute(
        &mut self,
        gateway: &dyn ExecutionGateway,
        state: &mut InstrumentState,
        decision: &Decision,
        now: OffsetDateTime,
    ) -> ExecutionResult {
        if !decision.is_trade() {
            return ExecutionResult::Skipped;
        }
        self.stats.decisions += 1;

        if let Some(remaining) = self.cooldown_remaining(now) {
            self.stats.cooldown_skips += 1;
            return ExecutionResult::CooldownActive {
                remaining_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            };
        }
        self.last_submission = Some(now);

        match decision.kind {
            DecisionKind::Rebalance => {
                warn!(
                    imbalance = %state.position.imbalance(),
                    up = ?decision.up,
                    down = ?decision.down,
                    "Rebalancing under-weighted side regardless of ceiling"
                );
            }
            DecisionKind::ForcedPairing => {
                warn!(
                    pairing_started = ?state.lifecycle.pairing_started(),
                    up = ?decision.up,
                    down = ?decision.down,
                    "Pairing timer expired, accepting fill above ceiling"
                );
            }
            _ => info!(
                up = ?decision.up,
                down = ?decision.down,
                combined = ?decision.combined_price(),
                "Executing decision"
            ),
        }

        let up = leg_params(state, Outcome::Up, decision.up);
        let down = leg_params(state, Outcome::Down, decision.down);
        let attempted = usize::from(up.is_some()) + usize::from(down.is_some());

        let (up_result, down_result) = tokio::join!(
            submit_leg(gateway, up.as_ref()),
            submit_leg(gateway, down.as_ref()),
        );

        let mut orders = Vec::new();
        let mut failed = 0;
        for (outcome, params, result) in [
            (Outcome::Up, up, up_result),
            (Outcome::Down, down, down_result),
        ] {
            let (Some(params), Some(result)) = (params, result) else {
                continue;
            };
            match result {
                Ok(order_id) => {
                    state.lifecycle.track(RestingOrder::new(
                        order_id.clone(),
                        outcome,
                        params.token_id.clone(),
                        params.price,
                        params.size,
                        now,
                    ));
                    orders.push(PlacedOrder {
                        order_id,
                        outcome,
                        price: params.price,
                        size: params.size,
                        tif: params.tif,
                    });
                }
                Err(e) => {
                    error!(%outcome, error = %e, "Order leg failed");
                    failed += 1;
                }
            }
        }

        if let ([only], 1) = (orders.as_slice(), failed) {
            warn!(
                error = %TradingError::PartialExecution { accepted_leg: only.outcome },
                "Pair executed one leg only; exposure will be hedged"
            );
        }

        self.finish(state, decision.kind, orders, failed, attempted)
    }

    /// Place a grid ladder; both orders of a level are linked.
    #[instrument(skip_all, fields(slug = %state.instrument.slug, orders = plan.len()))]
    pub async fn execute_grid(
        &mut self,
        gateway: &dyn ExecutionGateway,
        state: &mut InstrumentState,
        plan: &[GridOrder],
        now: OffsetDateTime,
    ) -> ExecutionResult {
        if plan.is_empty() {
            return ExecutionResult::Skipped;
        }
        self.stats.decisions += 1;
        self.last_submission = Some(now);
        info!(levels = plan.len() / 2, "Placing grid ladder");

        let mut orders: Vec<(usize, PlacedOrder)> = Vec::with_capacity(plan.len());
        let mut failed = 0;
        for grid_order in plan {
            let params = OrderParams::buy(&grid_order.token_id, grid_order.price, grid_order.size)
                .with_tif(TimeInForce::GTC);
            match submit_order(gateway, &params).await {
                Ok(order_id) => {
                    state.lifecycle.track(RestingOrder::new(
                        order_id.clone(),
                        grid_order.outcome,
                        grid_order.token_id.clone(),
                        grid_order.price,
                        grid_order.size,
                        now,
                    ));
                    orders.push((
                        grid_order.level,
                        PlacedOrder {
                            order_id,
                            outcome: grid_order.outcome,
                            price: grid_order.price,
                            size: grid_order.size,
                            tif: TimeInForce::GTC,
                        },
                    ));
                }
                Err(e) => {
                    warn!(level = grid_order.level, outcome = %grid_order.outcome, error = %e, "Grid order failed");
                    failed += 1;
                }
            }
        }

        for (i, (level, a)) in orders.iter().enumerate() {
            if let Some((_, b)) = orders[i + 1..]
                .iter()
                .find(|(l, o)| l == level && o.outcome != a.outcome)
            {
                state.lifecycle.link(&a.order_id, &b.order_id);
            }
        }

        let orders = orders.into_iter().map(|(_, o)| o).collect();
        self.finish(state, DecisionKind::RestRest, orders, failed, plan.len())
    }

    fn finish(
        &mut self,
        state: &mut InstrumentState,
        kind: DecisionKind,
        orders: Vec<PlacedOrder>,
        failed: usize,
        attempted: usize,
    ) -> ExecutionResult {
        self.stats.orders_failed += failed as u64;
        if orders.is_empty() {
            return ExecutionResult::AllFailed { attempted };
        }

        if let [a, b] = orders.as_slice() {
            if a.tif == TimeInForce::GTC && b.tif == TimeInForce::GTC && a.outcome != b.outcome {
                state.lifecycle.link(&a.order_id, &b.order_id);
            }
        }

        self.stats.executions += 1;
        self.stats.orders_placed += orders.len() as u64;
        state.stats.orders_placed += orders.len() as u32;
        match kind {
            DecisionKind::Rebalance => {
                self.stats.rebalances += 1;
                state.stats.rebalances += 1;
                metrics::inc_rebalances();
            }
            DecisionKind::ForcedPairing => {
                self.stats.forced_pairings += 1;
                state.stats.forced_pairings += 1;
                metrics::inc_forced_pairings();
            }
            _ => {}
        }

        ExecutionResult::Placed {
            kind,
            orders,
            failed,
        }
    }
}

fn leg_params(state: &InstrumentState, outcome: Outcome, action: LegAction) -> Option<OrderParams> {
    let token = state.instrument.token_id(outcome);
    match action {
        LegAction::Take { price, size } => {
            Some(OrderParams::buy(token, price, size).with_tif(TimeInForce::FAK))
        }
        LegAction::Rest { price, size } => {
            Some(OrderParams::buy(token, price, size).with_tif(TimeInForce::GTC))
        }
        LegAction::Skip => None,
    }
}

async fn submit_leg(
    gateway: &dyn ExecutionGateway,
    params: Option<&OrderParams>,
) -> Option<Result<String, TradingError>> {
    match params {
        Some(params) => Some(submit_order(gateway, params).await),
        None => None,
    }
}
