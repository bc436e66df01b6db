//! The poll loop: one tick drains the feed, advances every instrument and
//! settles what has expired.
//!
//! Ticks never interleave; everything trade-affecting for one instrument
//! (status poll, fills, cancels, decision, submission) happens in sequence.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, trace, warn};

use super::events::{EngineEvent, NotificationSink};
use super::state::{InstrumentArena, InstrumentState, InstrumentSummary};
use crate::arbitrage::{
    ArbitrageExecutor, DecisionEngine, DecisionInput, DecisionKind, ExecutionResult,
    ExecutorStats, GridPlanner, SideQuote,
};
use crate::config::{Config, StrategyMode};
use crate::error::BotError;
use crate::market::{Instrument, Outcome};
use crate::metrics;
use crate::orderbook::{BookUpdate, MarketDataStore};
use crate::settlement::{LastMids, OutcomeOracle, Settlement, SettlementResolver};
use crate::trading::{
    cancel_orders_best_effort, CancelReason, ExecutionGateway, LifecycleConfig, PositionLedger,
};

/// External collaborators of the engine.
pub struct EngineDeps {
    /// Venue order API.
    pub gateway: Arc<dyn ExecutionGateway>,
    /// Winner lookup.
    pub oracle: Arc<dyn OutcomeOracle>,
    /// Event consumer.
    pub sink: Arc<dyn NotificationSink>,
    /// Book updates from the feed tasks.
    pub feed: mpsc::Receiver<BookUpdate>,
}

/// Snapshot published after every tick for the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStatus {
    /// Ticks run so far.
    pub ticks: u64,
    /// Strategy in use.
    pub mode: String,
    /// Live instruments.
    pub instruments: Vec<InstrumentSummary>,
    /// Executor counters.
    pub executor: ExecutorStats,
    /// Instruments settled since start.
    pub settled_total: usize,
    /// Recent settlements, newest last.
    pub settlements: Vec<Settlement>,
    /// Sum of settled profit.
    pub realized_profit: Decimal,
}

const RECENT_SETTLEMENTS: usize = 20;

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Execution attempts by instrument slug.
    pub executions: Vec<(String, ExecutionResult)>,
    /// Instruments settled this tick.
    pub settlements: Vec<Settlement>,
    /// Instruments whose processing failed.
    pub errors: usize,
}

/// Owns all engine state and drives it one tick at a time.
pub struct Engine {
    mode: StrategyMode,
    store: MarketDataStore,
    arena: InstrumentArena,
    decision: DecisionEngine,
    grid: GridPlanner,
    ledger: PositionLedger,
    executor: ArbitrageExecutor,
    resolver: SettlementResolver,
    lifecycle_config: LifecycleConfig,
    deps: EngineDeps,
    status: watch::Sender<EngineStatus>,
    ticks: u64,
    recent: Vec<Settlement>,
    realized_profit: Decimal,
}

impl Engine {
    /// Build an engine from configuration.
    pub fn new(config: &Config, deps: EngineDeps) -> Self {
        let (status, _) = watch::channel(EngineStatus::default());
        Self {
            mode: config.strategy_mode,
            store: MarketDataStore::new(config.book_freshness(), config.book_depth),
            arena: InstrumentArena::new(),
            decision: DecisionEngine::new(config.decision_config()),
            grid: GridPlanner::new(config.grid_config()),
            ledger: PositionLedger::new(config.ledger_config()),
            executor: ArbitrageExecutor::new(config.cooldown()),
            resolver: SettlementResolver::new(config.settlement_config()),
            lifecycle_config: config.lifecycle_config(),
            deps,
            status,
            ticks: 0,
            recent: Vec::new(),
            realized_profit: Decimal::ZERO,
        }
    }

    /// Receiver of the per-tick status.
    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    /// Live instruments.
    pub fn arena(&self) -> &InstrumentArena {
        &self.arena
    }

    /// Book store.
    pub fn store(&self) -> &MarketDataStore {
        &self.store
    }

    /// Executor counters.
    pub fn executor_stats(&self) -> &ExecutorStats {
        self.executor.stats()
    }

    /// Whether `slug` is live or already settled.
    pub fn knows(&self, slug: &str) -> bool {
        self.arena.contains(slug) || self.resolver.is_settled(slug)
    }

    /// Start trading `instrument`. Returns false when it is already known.
    pub fn admit(&mut self, instrument: Instrument) -> bool {
        if self.knows(&instrument.slug) {
            return false;
        }
        let slug = instrument.slug.clone();
        let admitted = self
            .arena
            .admit(InstrumentState::new(instrument, self.lifecycle_config.clone()));
        if admitted {
            self.deps
                .sink
                .notify(&EngineEvent::InstrumentAdmitted { slug });
        }
        admitted
    }

    /// Run one tick at `now`.
    #[instrument(skip(self), fields(tick = self.ticks + 1))]
    pub async fn tick(&mut self, now: OffsetDateTime) -> TickReport {
        let start = Instant::now();
        self.ticks += 1;
        let mut report = TickReport::default();

        self.drain_feed(now);

        for slug in self.arena.slugs() {
            let Some(mut state) = self.arena.remove(&slug) else {
                continue;
            };
            match self.process(&mut state, now).await {
                Ok(Some(result)) => report.executions.push((slug.clone(), result)),
                Ok(None) => {}
                Err(e) => {
                    error!(%slug, error = %e, "Instrument tick failed");
                    report.errors += 1;
                }
            }
            self.arena.admit(state);
        }

        report.settlements = self.settle_due(now).await;
        self.publish(now);
        metrics::record_tick_latency(start);
        report
    }

    /// Apply every queued book update; simulated venues see the new books.
    fn drain_feed(&mut self, now: OffsetDateTime) {
        let mut touched = BTreeSet::new();
        while let Ok(update) = self.deps.feed.try_recv() {
            touched.insert(update.token_id.clone());
            self.store.apply(update);
        }
        for token in touched {
            if let Some(book) = self.store.read(&token, now) {
                if book.is_inverted() {
                    debug!(%token, bid = ?book.best_bid(), ask = ?book.best_ask(), "Crossed book");
                }
                self.deps.gateway.observe_book(&book);
            }
        }
    }

    async fn process(
        &mut self,
        state: &mut InstrumentState,
        now: OffsetDateTime,
    ) -> Result<Option<ExecutionResult>, BotError> {
        self.sync_orders(state).await?;
        state.lifecycle.update_pairing(&state.position, now);
        self.cancel_due(state, now).await;

        if state.instrument.is_closed(now) {
            return Ok(None);
        }

        let result = match self.mode {
            StrategyMode::Reactive => self.run_reactive(state, now).await,
            StrategyMode::Grid => self.run_grid(state, now).await,
        };

        if let Some(ExecutionResult::Placed { kind, orders, .. }) = &result {
            self.deps.sink.notify(&EngineEvent::TradeExecuted {
                slug: state.instrument.slug.clone(),
                kind: kind.to_string(),
                orders: orders.clone(),
            });
            // immediate orders report their fills right away
            self.sync_orders(state).await?;
            state.lifecycle.update_pairing(&state.position, now);
        }
        Ok(result)
    }

    /// Poll every open order and book new fills.
    async fn sync_orders(&self, state: &mut InstrumentState) -> Result<(), BotError> {
        for order_id in state.lifecycle.open_order_ids() {
            let status = match self.deps.gateway.get_order_status(&order_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(%order_id, error = %e, "Status poll failed");
                    continue;
                }
            };

            if let Some(fill) = state
                .lifecycle
                .apply_fill_total(&order_id, status.filled_size)?
            {
                self.ledger.record_fill(
                    &mut state.position,
                    &mut state.stats,
                    fill.outcome,
                    fill.shares,
                    fill.price,
                )?;
                metrics::inc_orders_filled();
                self.deps.sink.notify(&EngineEvent::OrderFilled {
                    slug: state.instrument.slug.clone(),
                    order_id: fill.order_id,
                    outcome: fill.outcome,
                    shares: fill.shares,
                    price: fill.price,
                });
            }

            if status.is_terminal() {
                state.lifecycle.mark_closed_by_venue(&order_id)?;
            }
        }
        Ok(())
    }

    /// Timeout and near-expiry cancellations.
    async fn cancel_due(&self, state: &mut InstrumentState, now: OffsetDateTime) {
        let secs = state.instrument.seconds_to_expiry(now);
        let (reason, due) = if state.lifecycle.is_near_expiry(secs) {
            (CancelReason::NearExpiry, state.lifecycle.due_for_expiry(secs))
        } else {
            (CancelReason::Timeout, state.lifecycle.due_for_timeout(now))
        };
        if due.is_empty() {
            return;
        }
        if reason == CancelReason::NearExpiry {
            warn!(
                slug = %state.instrument.slug,
                orders = due.len(),
                seconds_to_expiry = secs,
                "Canceling open orders before expiry"
            );
        }

        for order_id in due {
            if let Err(e) = state.lifecycle.check_cancel(&order_id, reason) {
                debug!(%order_id, error = %e, "Cancel skipped");
                continue;
            }
            if let Err(e) = self.deps.gateway.cancel_order(&order_id).await {
                warn!(%order_id, error = %e, "Cancel failed, will retry");
                continue;
            }
            if state.lifecycle.mark_canceled(&order_id, reason).is_ok() {
                state.stats.orders_canceled += 1;
                metrics::inc_orders_canceled();
                self.deps.sink.notify(&EngineEvent::OrderCanceled {
                    slug: state.instrument.slug.clone(),
                    order_id,
                    reason,
                });
            }
        }
    }

    async fn run_reactive(
        &mut self,
        state: &mut InstrumentState,
        now: OffsetDateTime,
    ) -> Option<ExecutionResult> {
        let instrument = &state.instrument;
        let secs = instrument.seconds_to_expiry(now);
        let quote = |outcome: Outcome| {
            self.store
                .read(instrument.token_id(outcome), now)
                .map(|book| SideQuote::from_snapshot(&book))
                .unwrap_or_default()
        };

        let input = DecisionInput {
            up: quote(Outcome::Up),
            down: quote(Outcome::Down),
            position: &state.position,
            resting_up: state.lifecycle.open_size_on(Outcome::Up),
            resting_down: state.lifecycle.open_size_on(Outcome::Down),
            pairing: state.lifecycle.pairing_mode(now, secs),
            near_expiry: state.lifecycle.is_near_expiry(secs),
            force_rebalance: self
                .ledger
                .needs_rebalance(&state.position, instrument.timeframe),
        };
        let decision = self.decision.decide(&input);
        metrics::inc_decisions(&decision.kind.to_string());

        if !decision.is_trade() {
            trace!(slug = %instrument.slug, kind = ?decision.kind, "No trade");
            return None;
        }

        let result = self
            .executor
            .execute(self.deps.gateway.as_ref(), state, &decision, now)
            .await;
        if decision.kind == DecisionKind::Rebalance && !result.placed().is_empty() {
            self.deps.sink.notify(&EngineEvent::RebalanceTriggered {
                slug: state.instrument.slug.clone(),
                imbalance: state.position.imbalance(),
            });
        }
        Some(result)
    }

    async fn run_grid(
        &mut self,
        state: &mut InstrumentState,
        now: OffsetDateTime,
    ) -> Option<ExecutionResult> {
        let secs = state.instrument.seconds_to_expiry(now);
        if state.grid_placed || state.lifecycle.is_near_expiry(secs) {
            return None;
        }
        let plan = self.grid.plan(&state.instrument);
        let result = self
            .executor
            .execute_grid(self.deps.gateway.as_ref(), state, &plan, now)
            .await;
        state.grid_placed = true;
        metrics::inc_decisions("grid");
        Some(result)
    }

    /// Settle every due instrument the oracle (or fallback) can resolve.
    async fn settle_due(&mut self, now: OffsetDateTime) -> Vec<Settlement> {
        let mut settled = Vec::new();
        for slug in self.arena.slugs() {
            let Some(state) = self.arena.get(&slug) else {
                continue;
            };
            if !self.resolver.is_due(&state.instrument, now) {
                continue;
            }
            let mids = LastMids {
                up: self.store.last_mid(&state.instrument.up_token_id),
                down: self.store.last_mid(&state.instrument.down_token_id),
            };
            let resolved = self
                .resolver
                .resolve(
                    &state.instrument,
                    &state.position,
                    mids,
                    self.deps.oracle.as_ref(),
                    now,
                )
                .await;

            match resolved {
                Ok(Some(settlement)) => {
                    if let Some(state) = self.arena.remove(&slug) {
                        self.store.remove(&state.instrument.up_token_id);
                        self.store.remove(&state.instrument.down_token_id);
                        info!(%slug, summary = %state.stats, "Cycle summary");
                        self.deps.sink.notify(&EngineEvent::Settled {
                            settlement: settlement.clone(),
                            stats: state.stats,
                        });
                    }
                    self.realized_profit += settlement.profit;
                    self.recent.push(settlement.clone());
                    if self.recent.len() > RECENT_SETTLEMENTS {
                        self.recent.remove(0);
                    }
                    settled.push(settlement);
                }
                Ok(None) => {}
                Err(e) => warn!(%slug, error = %e, "Settlement failed"),
            }
        }
        settled
    }

    fn publish(&self, now: OffsetDateTime) {
        let mut instruments: Vec<InstrumentSummary> =
            self.arena.iter().map(|s| s.summary(now)).collect();
        instruments.sort_by(|a, b| a.slug.cmp(&b.slug));
        self.status.send_replace(EngineStatus {
            ticks: self.ticks,
            mode: self.mode.to_string(),
            instruments,
            executor: self.executor.stats().clone(),
            settled_total: self.resolver.settled_count(),
            settlements: self.recent.clone(),
            realized_profit: self.realized_profit,
        });
    }

    /// Cancel every open order, swallowing failures. Returns how many were canceled.
    pub async fn shutdown(&mut self) -> usize {
        let mut canceled = 0;
        for slug in self.arena.slugs() {
            let Some(state) = self.arena.get_mut(&slug) else {
                continue;
            };
            let open = state.lifecycle.open_order_ids();
            if open.is_empty() {
                continue;
            }
            let failed = cancel_orders_best_effort(self.deps.gateway.as_ref(), &open).await;
            for order_id in open.iter().filter(|id| !failed.contains(id)) {
                if state
                    .lifecycle
                    .mark_canceled(order_id, CancelReason::Shutdown)
                    .is_ok()
                {
                    canceled += 1;
                }
            }
            info!(%slug, canceled, failed = failed.len(), "Shutdown cancellations");
        }
        canceled
    }
}
