//! End-to-end engine tests against the paper exchange.
//!
//! Every test drives the engine with explicit timestamps and a
//! deterministic fill model, so nothing here touches the network.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tower::ServiceExt;

use updown_arb::api::{create_router, AppState};
use updown_arb::arbitrage::{
    BookTouch, DecisionKind, ExecutionResult, FillSimulator, NeverFill, TakerOnly,
};
use updown_arb::config::{Config, StrategyMode};
use updown_arb::engine::{ChannelSink, Engine, EngineDeps, EngineEvent};
use updown_arb::market::{Instrument, Outcome, PaperExchange, StaticOracle, Timeframe};
use updown_arb::orderbook::{BookDelta, BookUpdate, PriceLevel};
use updown_arb::trading::{CancelReason, ExecutionGateway, OrderStatus, RestingState};

const START: i64 = 1_700_000_100;
const SLUG: &str = "btc-updown-15m-1700000100";

fn at(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(START + secs).unwrap()
}

fn instrument() -> Instrument {
    Instrument {
        slug: SLUG.to_string(),
        condition_id: "0xcond".to_string(),
        up_token_id: "up".to_string(),
        down_token_id: "down".to_string(),
        asset: "btc".to_string(),
        timeframe: Timeframe::FifteenMin,
        start_timestamp: START,
        end_timestamp: START + 900,
    }
}

fn config() -> Config {
    Config {
        cooldown_ms: 0,
        ..Config::default()
    }
}

struct Harness {
    engine: Engine,
    exchange: Arc<PaperExchange>,
    oracle: Arc<StaticOracle>,
    feed: mpsc::Sender<BookUpdate>,
    events: mpsc::Receiver<EngineEvent>,
}

impl Harness {
    fn new(config: Config, simulator: Arc<dyn FillSimulator>) -> Self {
        let exchange = Arc::new(PaperExchange::new(dec!(1000), simulator));
        let oracle = Arc::new(StaticOracle::new());
        let (sink, events) = ChannelSink::new(256);
        let (feed, feed_rx) = mpsc::channel(64);
        let mut engine = Engine::new(
            &config,
            EngineDeps {
                gateway: exchange.clone(),
                oracle: oracle.clone(),
                sink: Arc::new(sink),
                feed: feed_rx,
            },
        );
        assert!(engine.admit(instrument()));
        Self {
            engine,
            exchange,
            oracle,
            feed,
            events,
        }
    }

    /// Push a one-level book for each side.
    fn books(&self, up: (Decimal, Decimal), down: (Decimal, Decimal), secs: i64) {
        for (token, (bid, ask)) in [("up", up), ("down", down)] {
            self.feed
                .try_send(BookUpdate {
                    token_id: token.to_string(),
                    delta: BookDelta::Snapshot {
                        bids: vec![PriceLevel::new(bid, dec!(100))],
                        asks: vec![PriceLevel::new(ask, dec!(100))],
                    },
                    received_at: at(secs),
                })
                .unwrap();
        }
    }

    /// Id of the first order posted on `token`.
    fn order_on(&self, token: &str) -> String {
        self.exchange
            .order_ids()
            .into_iter()
            .find(|id| self.exchange.order_params(id).unwrap().token_id == token)
            .unwrap()
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn position(&self) -> updown_arb::trading::Position {
        self.engine.arena().get(SLUG).unwrap().position.clone()
    }
}

/// Rest both sides at 0.45 / 0.51 (asks too expensive to take).
async fn rest_both(h: &mut Harness, secs: i64) {
    h.books((dec!(0.44), dec!(0.50)), (dec!(0.50), dec!(0.60)), secs);
    let report = h.engine.tick(at(secs)).await;
    match &report.executions[..] {
        [(_, ExecutionResult::Placed { kind, orders, .. })] => {
            assert_eq!(*kind, DecisionKind::RestRest);
            assert_eq!(orders.len(), 2);
        }
        other => panic!("expected rest+rest, got {other:?}"),
    }
}

#[tokio::test]
async fn take_take_under_ceiling_fills_both_legs() {
    let mut h = Harness::new(config(), Arc::new(BookTouch));
    h.books((dec!(0.38), dec!(0.40)), (dec!(0.48), dec!(0.50)), 10);

    let report = h.engine.tick(at(10)).await;

    match &report.executions[..] {
        [(slug, ExecutionResult::Placed { kind, orders, failed })] => {
            assert_eq!(slug, SLUG);
            assert_eq!(*kind, DecisionKind::TakeTake);
            assert_eq!(orders.len(), 2);
            assert_eq!(*failed, 0);
        }
        other => panic!("expected take+take, got {other:?}"),
    }
    let pos = h.position();
    assert_eq!(pos.up_shares, dec!(10));
    assert_eq!(pos.down_shares, dec!(10));
    assert_eq!(pos.up_cost, dec!(4.00));
    assert_eq!(pos.down_cost, dec!(5.00));
    assert_eq!(h.exchange.cash(), dec!(991.00));

    let fills = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::OrderFilled { .. }))
        .count();
    assert_eq!(fills, 2);
}

#[tokio::test]
async fn held_side_is_hedged_under_the_ceiling() {
    let mut h = Harness::new(
        Config {
            rebalance_min_imbalance: dec!(50),
            ..config()
        },
        Arc::new(TakerOnly),
    );
    rest_both(&mut h, 10).await;
    let up = h.order_on("up");
    let down = h.order_on("down");
    h.exchange.fill_order(&up, dec!(10)).unwrap();

    // the unfilled DOWN order times out, then DOWN is bought at its ask
    h.books((dec!(0.44), dec!(0.50)), (dec!(0.48), dec!(0.50)), 41);
    let report = h.engine.tick(at(41)).await;

    let state = h.engine.arena().get(SLUG).unwrap();
    assert_eq!(
        state.lifecycle.get(&down).unwrap().state(),
        RestingState::Canceled
    );
    match &report.executions[..] {
        [(_, ExecutionResult::Placed { kind, orders, .. })] => {
            assert_eq!(*kind, DecisionKind::Hedge);
            assert_eq!(orders[0].outcome, Outcome::Down);
            assert_eq!(orders[0].price, dec!(0.50));
        }
        other => panic!("expected hedge, got {other:?}"),
    }
    let pos = h.position();
    assert_eq!(pos.up_shares, dec!(10));
    assert_eq!(pos.down_shares, dec!(10));
    assert_eq!(pos.combined_average_cost(), Some(dec!(0.95)));
}

#[tokio::test]
async fn large_imbalance_forces_rebalance_above_ceiling() {
    let mut h = Harness::new(
        Config {
            order_size: dec!(40),
            ..config()
        },
        Arc::new(TakerOnly),
    );
    rest_both(&mut h, 10).await;
    let up = h.order_on("up");
    h.exchange.fill_order(&up, dec!(35)).unwrap();
    h.drain_events();

    // 0.45 held + 0.70 ask is far above the ceiling
    h.books((dec!(0.44), dec!(0.50)), (dec!(0.50), dec!(0.70)), 12);
    let report = h.engine.tick(at(12)).await;

    match &report.executions[..] {
        [(_, ExecutionResult::Placed { kind, orders, .. })] => {
            assert_eq!(*kind, DecisionKind::Rebalance);
            assert_eq!(orders[0].outcome, Outcome::Down);
            assert_eq!(orders[0].price, dec!(0.70));
            assert_eq!(orders[0].size, dec!(35));
        }
        other => panic!("expected rebalance, got {other:?}"),
    }
    let pos = h.position();
    assert_eq!(pos.imbalance(), Decimal::ZERO);
    assert_eq!(h.engine.arena().get(SLUG).unwrap().stats.rebalances, 1);
    assert_eq!(h.engine.executor_stats().rebalances, 1);

    let triggered: Vec<Decimal> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::RebalanceTriggered { imbalance, .. } => Some(imbalance),
            _ => None,
        })
        .collect();
    assert_eq!(triggered, vec![dec!(35)]);
}

#[tokio::test]
async fn partially_filled_order_survives_timeout() {
    let mut h = Harness::new(config(), Arc::new(TakerOnly));
    rest_both(&mut h, 10).await;
    let up = h.order_on("up");
    let down = h.order_on("down");
    h.exchange.fill_order(&up, dec!(4)).unwrap();
    h.drain_events();

    h.books((dec!(0.44), dec!(0.50)), (dec!(0.50), dec!(0.60)), 45);
    let report = h.engine.tick(at(45)).await;
    assert!(report.executions.is_empty());

    let state = h.engine.arena().get(SLUG).unwrap();
    assert_eq!(
        state.lifecycle.get(&up).unwrap().state(),
        RestingState::PartiallyFilled
    );
    assert_eq!(
        state.lifecycle.get(&down).unwrap().state(),
        RestingState::Canceled
    );
    assert_eq!(
        h.exchange.get_order_status(&up).await.unwrap().status,
        Some(OrderStatus::Live)
    );
    assert_eq!(h.position().up_shares, dec!(4));

    let canceled: Vec<(String, CancelReason)> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::OrderCanceled {
                order_id, reason, ..
            } => Some((order_id, reason)),
            _ => None,
        })
        .collect();
    assert_eq!(canceled, vec![(down, CancelReason::Timeout)]);
}

#[tokio::test]
async fn near_expiry_cancels_everything_and_stops_new_pairs() {
    let mut h = Harness::new(config(), Arc::new(TakerOnly));
    rest_both(&mut h, 10).await;
    let up = h.order_on("up");
    h.exchange.fill_order(&up, dec!(4)).unwrap();

    // 60s before the close; cheap asks would otherwise be taken
    h.books((dec!(0.38), dec!(0.40)), (dec!(0.48), dec!(0.50)), 840);
    let report = h.engine.tick(at(840)).await;

    assert!(report.executions.is_empty());
    assert_eq!(h.exchange.open_order_count(), 0);
    let state = h.engine.arena().get(SLUG).unwrap();
    assert_eq!(state.lifecycle.open_orders().count(), 0);
    assert_eq!(state.stats.orders_canceled, 2);
}

#[tokio::test]
async fn settles_with_oracle_answer_once() {
    let mut h = Harness::new(config(), Arc::new(BookTouch));
    h.books((dec!(0.38), dec!(0.40)), (dec!(0.48), dec!(0.50)), 10);
    h.engine.tick(at(10)).await;

    // inside the settlement buffer nothing happens
    h.oracle.set(SLUG, Outcome::Up);
    assert!(h.engine.tick(at(960)).await.settlements.is_empty());

    let report = h.engine.tick(at(1020)).await;
    let [settlement] = &report.settlements[..] else {
        panic!("expected one settlement, got {:?}", report.settlements);
    };
    assert_eq!(settlement.winner, Outcome::Up);
    assert!(!settlement.fallback);
    assert_eq!(settlement.payout, dec!(10));
    assert_eq!(settlement.total_cost, dec!(9.00));
    assert_eq!(settlement.profit, dec!(1.00));

    assert!(h.engine.arena().is_empty());
    assert!(h.engine.knows(SLUG));
    assert!(!h.engine.admit(instrument()));
    assert!(h.engine.tick(at(1030)).await.settlements.is_empty());

    let settled = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::Settled { .. }))
        .count();
    assert_eq!(settled, 1);

    let status = h.engine.subscribe_status().borrow().clone();
    assert_eq!(status.realized_profit, dec!(1.00));
    assert_eq!(status.settlements.len(), 1);
    assert_eq!(status.settled_total, 1);
}

#[tokio::test]
async fn silent_oracle_falls_back_in_dry_run() {
    let mut h = Harness::new(config(), Arc::new(BookTouch));
    h.books((dec!(0.38), dec!(0.40)), (dec!(0.48), dec!(0.50)), 10);
    h.engine.tick(at(10)).await;

    assert!(h.engine.tick(at(1020)).await.settlements.is_empty());
    assert!(h.engine.tick(at(1310)).await.settlements.is_empty());

    // end + buffer + grace; last mids 0.39 vs 0.49 pick DOWN
    let report = h.engine.tick(at(1320)).await;
    let [settlement] = &report.settlements[..] else {
        panic!("expected fallback settlement, got {:?}", report.settlements);
    };
    assert!(settlement.fallback);
    assert_eq!(settlement.winner, Outcome::Down);
    assert_eq!(settlement.profit, dec!(1.00));
}

#[tokio::test]
async fn silent_oracle_stays_pending_when_live() {
    let mut h = Harness::new(
        Config {
            dry_run: false,
            ..config()
        },
        Arc::new(BookTouch),
    );
    h.books((dec!(0.38), dec!(0.40)), (dec!(0.48), dec!(0.50)), 10);
    h.engine.tick(at(10)).await;

    assert!(h.engine.tick(at(5000)).await.settlements.is_empty());
    assert_eq!(h.engine.arena().len(), 1);

    h.oracle.set(SLUG, Outcome::Down);
    assert_eq!(h.engine.tick(at(5001)).await.settlements.len(), 1);
}

#[tokio::test]
async fn shutdown_cancels_resting_orders() {
    let mut h = Harness::new(config(), Arc::new(NeverFill));
    rest_both(&mut h, 10).await;
    assert_eq!(h.exchange.open_order_count(), 2);

    assert_eq!(h.engine.shutdown().await, 2);
    assert_eq!(h.exchange.open_order_count(), 0);
    assert_eq!(
        h.engine
            .arena()
            .get(SLUG)
            .unwrap()
            .lifecycle
            .open_orders()
            .count(),
        0
    );
}

#[tokio::test]
async fn grid_ladder_is_placed_once_and_never_times_out() {
    let mut h = Harness::new(
        Config {
            strategy_mode: StrategyMode::Grid,
            ..config()
        },
        Arc::new(NeverFill),
    );

    let report = h.engine.tick(at(10)).await;
    match &report.executions[..] {
        [(_, ExecutionResult::Placed { orders, failed, .. })] => {
            // 0.10..=0.90 in 0.05 steps, both sides
            assert_eq!(orders.len(), 34);
            assert_eq!(*failed, 0);
        }
        other => panic!("expected grid placement, got {other:?}"),
    }

    let report = h.engine.tick(at(300)).await;
    assert!(report.executions.is_empty());
    assert_eq!(h.exchange.open_order_count(), 34);
}

#[tokio::test]
async fn venue_outage_is_reported_not_fatal() {
    let mut h = Harness::new(config(), Arc::new(BookTouch));
    h.exchange.set_reject_posts(true);
    h.books((dec!(0.38), dec!(0.40)), (dec!(0.48), dec!(0.50)), 10);

    let report = h.engine.tick(at(10)).await;
    assert!(matches!(
        report.executions[..],
        [(_, ExecutionResult::AllFailed { attempted: 2 })]
    ));
    assert_eq!(report.errors, 0);
    assert!(h.position().is_flat());
}

#[tokio::test]
async fn status_endpoint_reflects_engine() {
    let mut h = Harness::new(config(), Arc::new(BookTouch));
    let state = AppState::new(h.engine.subscribe_status(), true);
    h.books((dec!(0.38), dec!(0.40)), (dec!(0.48), dec!(0.50)), 10);
    h.engine.tick(at(10)).await;

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri("/api/v1/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["mode"], "paper");
    assert_eq!(json["engine"]["ticks"], 1);
    assert_eq!(json["engine"]["instruments"][0]["slug"], SLUG);
    assert_eq!(json["engine"]["instruments"][0]["imbalance"], "0");
}

/// Looks up the live BTC 15m event on the public Gamma API.
#[tokio::test]
#[ignore = "requires network access"]
async fn discovers_live_btc_event() {
    use updown_arb::market::{GammaDiscovery, MarketDiscovery, GAMMA_API_URL};

    let discovery = GammaDiscovery::new(reqwest::Client::new(), GAMMA_API_URL);
    let now = OffsetDateTime::now_utc();
    let found = discovery
        .discover("btc", Timeframe::FifteenMin, now)
        .await
        .unwrap();

    let Some(instrument) = found else {
        println!("Skipping: no open BTC 15m event");
        return;
    };
    assert!(instrument.slug.starts_with("btc-updown-15m-"));
    assert_ne!(instrument.up_token_id, instrument.down_token_id);
    assert!(!instrument.is_closed(now));
}
