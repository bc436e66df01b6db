//! In-memory venue for dry runs and tests.
//!
//! `PaperExchange` implements the execution gateway without network access.
//! Fills come from an injected [`FillSimulator`]; books are mirrored from the
//! engine through [`ExecutionGateway::observe_book`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::discovery::MarketDiscovery;
use super::types::{Instrument, Outcome, Timeframe};
use crate::arbitrage::simulator::{FillRequest, FillSimulator};
use crate::error::{MarketError, SettlementError, TradingError};
use crate::orderbook::BookSnapshot;
use crate::settlement::OutcomeOracle;
use crate::trading::{
    ExecutionGateway, OrderParams, OrderState, OrderStatus, PostOrderResponse, SignedOrder,
    TimeInForce,
};

#[derive(Debug, Clone)]
struct PaperOrder {
    params: OrderParams,
    filled: Decimal,
    status: OrderStatus,
}

impl PaperOrder {
    fn remaining(&self) -> Decimal {
        self.params.size - self.filled
    }
}

/// Simulated venue with a cash balance.
#[derive(Debug)]
pub struct PaperExchange {
    simulator: Arc<dyn FillSimulator>,
    orders: DashMap<String, PaperOrder>,
    books: DashMap<String, BookSnapshot>,
    cash: Mutex<Decimal>,
    next_id: AtomicU64,
    reject_posts: AtomicBool,
}

impl PaperExchange {
    /// Create an exchange with `balance` cash and the given fill model.
    pub fn new(balance: Decimal, simulator: Arc<dyn FillSimulator>) -> Self {
        Self {
            simulator,
            orders: DashMap::new(),
            books: DashMap::new(),
            cash: Mutex::new(balance),
            next_id: AtomicU64::new(1),
            reject_posts: AtomicBool::new(false),
        }
    }

    /// Cash left after fills.
    pub fn cash(&self) -> Decimal {
        *self.cash.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Orders still live.
    pub fn open_order_count(&self) -> usize {
        self.orders
            .iter()
            .filter(|o| o.status == OrderStatus::Live)
            .count()
    }

    /// Ids of every order ever posted, oldest first.
    pub fn order_ids(&self) -> Vec<String> {
        let mut ids: Vec<(u64, String)> = self
            .orders
            .iter()
            .filter_map(|o| {
                let n = o.key().strip_prefix("paper-")?.parse().ok()?;
                Some((n, o.key().clone()))
            })
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Parameters of a posted order.
    pub fn order_params(&self, order_id: &str) -> Option<OrderParams> {
        self.orders.get(order_id).map(|o| o.params.clone())
    }

    /// Make every following post fail (venue outage).
    pub fn set_reject_posts(&self, reject: bool) {
        self.reject_posts.store(reject, Ordering::SeqCst);
    }

    /// Fill `shares` of a live order by hand.
    pub fn fill_order(&self, order_id: &str, shares: Decimal) -> Result<Decimal, TradingError> {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| TradingError::UnknownOrder(order_id.to_string()))?;
        if order.status != OrderStatus::Live {
            return Err(TradingError::InvalidParams(format!(
                "order {order_id} is {}",
                order.status
            )));
        }
        Ok(self.apply_fill(order_id, &mut order, shares))
    }

    fn apply_fill(&self, order_id: &str, order: &mut PaperOrder, shares: Decimal) -> Decimal {
        let shares = shares.min(order.remaining());
        if shares <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        order.filled += shares;
        if order.remaining().is_zero() {
            order.status = OrderStatus::Filled;
        }
        *self.cash.lock().unwrap_or_else(PoisonError::into_inner) -= shares * order.params.price;
        debug!(
            order_id,
            %shares,
            price = %order.params.price,
            filled = %order.filled,
            "Paper fill"
        );
        shares
    }
}

#[async_trait]
impl ExecutionGateway for PaperExchange {
    async fn create_order(&self, params: &OrderParams) -> Result<SignedOrder, TradingError> {
        params.validate().map_err(TradingError::InvalidParams)?;
        Ok(SignedOrder {
            params: params.clone(),
            maker: "paper".to_string(),
            salt: self.next_id.load(Ordering::SeqCst).to_string(),
            expiration: "0".to_string(),
            signature: String::new(),
        })
    }

    async fn post_order(
        &self,
        order: &SignedOrder,
        tif: TimeInForce,
    ) -> Result<PostOrderResponse, TradingError> {
        if self.reject_posts.load(Ordering::SeqCst) {
            return Ok(PostOrderResponse::rejected("paper venue rejecting orders"));
        }

        let params = &order.params;
        let required = params.price * params.size;
        let available = self.cash();
        if available < required {
            return Err(TradingError::InsufficientFunds { required, available });
        }

        let order_id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut paper = PaperOrder {
            params: OrderParams { tif, ..params.clone() },
            filled: Decimal::ZERO,
            status: OrderStatus::Live,
        };

        let request = FillRequest {
            price: params.price,
            remaining: params.size,
            tif,
        };
        let book = self.books.get(&params.token_id).map(|b| b.value().clone());
        let shares = self.simulator.fill(&request, book.as_ref());
        self.apply_fill(&order_id, &mut paper, shares);

        if tif == TimeInForce::FAK && paper.status == OrderStatus::Live {
            paper.status = if paper.filled.is_zero() {
                OrderStatus::Unmatched
            } else {
                OrderStatus::Canceled
            };
        }

        debug!(order_id = %order_id, %tif, status = %paper.status, filled = %paper.filled, "Paper order posted");
        self.orders.insert(order_id.clone(), paper);
        Ok(PostOrderResponse::accepted(order_id))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, TradingError> {
        let order = self
            .orders
            .get(order_id)
            .ok_or_else(|| TradingError::UnknownOrder(order_id.to_string()))?;
        Ok(OrderState {
            order_id: order_id.to_string(),
            status: Some(order.status),
            filled_size: order.filled,
            original_size: Some(order.params.size),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError> {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| TradingError::UnknownOrder(order_id.to_string()))?;
        if order.status != OrderStatus::Live {
            return Err(TradingError::CancelFailed {
                order_id: order_id.to_string(),
                reason: format!("order is {}", order.status),
            });
        }
        order.status = OrderStatus::Canceled;
        Ok(())
    }

    fn observe_book(&self, book: &BookSnapshot) {
        let changed = self
            .books
            .get(&book.token_id)
            .map_or(true, |prev| *prev != *book);
        if !changed {
            return;
        }
        self.books.insert(book.token_id.clone(), book.clone());

        for mut entry in self.orders.iter_mut() {
            let id = entry.key().clone();
            let order = entry.value_mut();
            if order.status != OrderStatus::Live || order.params.token_id != book.token_id {
                continue;
            }
            let request = FillRequest {
                price: order.params.price,
                remaining: order.remaining(),
                tif: order.params.tif,
            };
            let shares = self.simulator.fill(&request, Some(book));
            self.apply_fill(&id, order, shares);
        }
    }
}

/// Oracle with answers set by hand.
#[derive(Debug, Default)]
pub struct StaticOracle {
    answers: DashMap<String, Outcome>,
    failing: AtomicBool,
}

impl StaticOracle {
    /// Create an oracle with no answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the winner of `slug`.
    pub fn set(&self, slug: impl Into<String>, winner: Outcome) {
        let slug = slug.into();
        info!(slug = %slug, %winner, "Static oracle answer set");
        self.answers.insert(slug, winner);
    }

    /// Make every lookup fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl OutcomeOracle for StaticOracle {
    async fn resolve(&self, instrument: &Instrument) -> Result<Option<Outcome>, SettlementError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SettlementError::OracleFailed {
                slug: instrument.slug.clone(),
                reason: "static oracle set to fail".to_string(),
            });
        }
        Ok(self.answers.get(&instrument.slug).map(|w| *w.value()))
    }
}

/// Discovery over a fixed instrument list.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    instruments: Mutex<Vec<Instrument>>,
}

impl StaticDiscovery {
    /// Create discovery over `instruments`.
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self {
            instruments: Mutex::new(instruments),
        }
    }

    /// Add another instrument.
    pub fn push(&self, instrument: Instrument) {
        self.instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(instrument);
    }
}

#[async_trait]
impl MarketDiscovery for StaticDiscovery {
    async fn discover(
        &self,
        asset: &str,
        timeframe: Timeframe,
        now: OffsetDateTime,
    ) -> Result<Option<Instrument>, MarketError> {
        let ts = now.unix_timestamp();
        Ok(self
            .instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|i| {
                i.asset == asset
                    && i.timeframe == timeframe
                    && i.start_timestamp <= ts
                    && ts < i.end_timestamp
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::simulator::{AlwaysFill, BookTouch, NeverFill};
    use crate::orderbook::PriceLevel;
    use crate::trading::submit_order;
    use rust_decimal_macros::dec;
    use smallvec::smallvec;

    fn book(token: &str, ask: Decimal, size: Decimal, secs: i64) -> BookSnapshot {
        BookSnapshot {
            token_id: token.to_string(),
            bids: smallvec![PriceLevel::new(ask - dec!(0.02), dec!(100))],
            asks: smallvec![PriceLevel::new(ask, size)],
            updated_at: OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap(),
        }
    }

    #[tokio::test]
    async fn immediate_order_fills_against_book() {
        let ex = PaperExchange::new(dec!(100), Arc::new(BookTouch));
        ex.observe_book(&book("up", dec!(0.40), dec!(6), 0));

        let params = OrderParams::buy("up", dec!(0.40), dec!(10)).with_tif(TimeInForce::FAK);
        let id = submit_order(&ex, &params).await.unwrap();
        let state = ex.get_order_status(&id).await.unwrap();

        assert_eq!(state.filled_size, dec!(6));
        assert_eq!(state.status, Some(OrderStatus::Canceled));
        assert_eq!(ex.cash(), dec!(97.60));
    }

    #[tokio::test]
    async fn unmatched_immediate_order() {
        let ex = PaperExchange::new(dec!(100), Arc::new(NeverFill));
        let params = OrderParams::buy("up", dec!(0.40), dec!(10)).with_tif(TimeInForce::FAK);
        let id = submit_order(&ex, &params).await.unwrap();
        let state = ex.get_order_status(&id).await.unwrap();
        assert_eq!(state.status, Some(OrderStatus::Unmatched));
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn resting_order_fills_when_ask_drops() {
        let ex = PaperExchange::new(dec!(100), Arc::new(BookTouch));
        ex.observe_book(&book("down", dec!(0.55), dec!(50), 0));

        let id = submit_order(&ex, &OrderParams::buy("down", dec!(0.50), dec!(10)))
            .await
            .unwrap();
        assert_eq!(ex.get_order_status(&id).await.unwrap().filled_size, dec!(0));

        ex.observe_book(&book("down", dec!(0.50), dec!(4), 1));
        let state = ex.get_order_status(&id).await.unwrap();
        assert_eq!(state.filled_size, dec!(4));
        assert_eq!(state.status, Some(OrderStatus::Live));

        // same book again does not fill twice
        ex.observe_book(&book("down", dec!(0.50), dec!(4), 1));
        assert_eq!(ex.get_order_status(&id).await.unwrap().filled_size, dec!(4));
    }

    #[tokio::test]
    async fn cancel_only_live_orders() {
        let ex = PaperExchange::new(dec!(100), Arc::new(NeverFill));
        let id = submit_order(&ex, &OrderParams::buy("up", dec!(0.45), dec!(10)))
            .await
            .unwrap();

        ex.cancel_order(&id).await.unwrap();
        assert!(matches!(
            ex.cancel_order(&id).await,
            Err(TradingError::CancelFailed { .. })
        ));
        assert!(matches!(
            ex.cancel_order("nope").await,
            Err(TradingError::UnknownOrder(_))
        ));
        assert_eq!(ex.open_order_count(), 0);
    }

    #[tokio::test]
    async fn insufficient_cash_and_outage_are_rejected() {
        let ex = PaperExchange::new(dec!(3), Arc::new(AlwaysFill));
        let err = submit_order(&ex, &OrderParams::buy("up", dec!(0.45), dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::InsufficientFunds { .. }));

        ex.set_reject_posts(true);
        let err = submit_order(&ex, &OrderParams::buy("up", dec!(0.10), dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::OrderRejected { .. }));
    }

    #[tokio::test]
    async fn manual_fills() {
        let ex = PaperExchange::new(dec!(100), Arc::new(NeverFill));
        let id = submit_order(&ex, &OrderParams::buy("up", dec!(0.45), dec!(10)))
            .await
            .unwrap();
        assert_eq!(ex.fill_order(&id, dec!(4)).unwrap(), dec!(4));
        assert_eq!(ex.fill_order(&id, dec!(40)).unwrap(), dec!(6));
        assert!(ex.fill_order(&id, dec!(1)).is_err());
        assert_eq!(ex.order_ids(), vec![id]);
    }

    #[tokio::test]
    async fn static_oracle_and_discovery() {
        let instrument = Instrument {
            slug: "btc-updown-15m-1700000100".to_string(),
            condition_id: "0xc".to_string(),
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
            asset: "btc".to_string(),
            timeframe: Timeframe::FifteenMin,
            start_timestamp: 1_700_000_100,
            end_timestamp: 1_700_001_000,
        };
        let oracle = StaticOracle::new();
        assert_eq!(oracle.resolve(&instrument).await.unwrap(), None);
        oracle.set(&instrument.slug, Outcome::Down);
        assert_eq!(oracle.resolve(&instrument).await.unwrap(), Some(Outcome::Down));
        oracle.set_failing(true);
        assert!(oracle.resolve(&instrument).await.is_err());

        let discovery = StaticDiscovery::new(vec![instrument.clone()]);
        let inside = OffsetDateTime::from_unix_timestamp(1_700_000_500).unwrap();
        let after = OffsetDateTime::from_unix_timestamp(1_700_001_000).unwrap();
        assert_eq!(
            discovery.discover("btc", Timeframe::FifteenMin, inside).await.unwrap(),
            Some(instrument)
        );
        assert_eq!(discovery.discover("btc", Timeframe::FifteenMin, after).await.unwrap(), None);
        assert_eq!(discovery.discover("eth", Timeframe::FifteenMin, inside).await.unwrap(), None);
    }
}
