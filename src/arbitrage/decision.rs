//! Reactive decision logic: book quotes + exposure in, per-side action out.
//!
//! Priority order:
//! 1. rebalance when the imbalance exceeds the maximum (ceiling ignored)
//! 2. hedge the lagging side against the held side's average cost
//! 3. take both asks when their sum is under the ceiling
//! 4. cheap side: take it and rest the other side, or skip both
//! 5. rest both sides just above the best bids
//!
//! Nothing here mutates state.

use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;

use crate::market::Outcome;
use crate::orderbook::BookSnapshot;
use crate::trading::{PairingMode, Position};
use crate::utils::{ceil_to_tick, round_to_tick};

/// Inclusive per-side price bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBounds {
    /// Lowest acceptable price.
    pub min: Decimal,
    /// Highest acceptable price.
    pub max: Decimal,
}

impl PriceBounds {
    /// Whether `price` lies within the bounds.
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.min && price <= self.max
    }
}

/// Decision parameters.
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Combined-cost ceiling for new pairs.
    pub cost_ceiling: Decimal,
    /// Ask below which a side counts as cheap.
    pub cheap_price_threshold: Decimal,
    /// Added to the best bid to get a resting price.
    pub rest_price_offset: Decimal,
    /// Minimum resting price in a take+rest.
    pub rest_price_floor: Decimal,
    /// UP price bounds.
    pub up_bounds: PriceBounds,
    /// DOWN price bounds.
    pub down_bounds: PriceBounds,
    /// Venue price increment.
    pub tick_size: Decimal,
    /// Target shares per leg.
    pub order_size: Decimal,
    /// Venue minimum order size.
    pub min_order_size: Decimal,
    /// Cap for hedge and rebalance legs.
    pub max_order_size: Decimal,
    /// Cap on shares held plus resting per side.
    pub max_shares_per_side: Decimal,
    /// Imbalance that forces a rebalance.
    pub max_imbalance_shares: Decimal,
}

impl DecisionConfig {
    fn bounds(&self, side: Outcome) -> PriceBounds {
        match side {
            Outcome::Up => self.up_bounds,
            Outcome::Down => self.down_bounds,
        }
    }
}

/// Top of book for one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideQuote {
    /// Best bid price.
    pub best_bid: Option<Decimal>,
    /// Best ask price.
    pub best_ask: Option<Decimal>,
    /// Size at the best ask.
    pub ask_size: Decimal,
}

impl SideQuote {
    /// Quote from a fresh snapshot.
    pub fn from_snapshot(book: &BookSnapshot) -> Self {
        Self {
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            ask_size: book.ask_size(),
        }
    }
}

/// Everything one decision looks at.
#[derive(Debug, Clone)]
pub struct DecisionInput<'a> {
    /// UP book.
    pub up: SideQuote,
    /// DOWN book.
    pub down: SideQuote,
    /// Confirmed exposure.
    pub position: &'a Position,
    /// Unfilled shares already resting on UP.
    pub resting_up: Decimal,
    /// Unfilled shares already resting on DOWN.
    pub resting_down: Decimal,
    /// Pairing timer state.
    pub pairing: PairingMode,
    /// Inside the pre-expiry window: no new pairs, only risk reduction.
    pub near_expiry: bool,
    /// Ledger ratio check asks for a rebalance.
    pub force_rebalance: bool,
}

impl DecisionInput<'_> {
    fn quote(&self, side: Outcome) -> &SideQuote {
        match side {
            Outcome::Up => &self.up,
            Outcome::Down => &self.down,
        }
    }

    fn resting(&self, side: Outcome) -> Decimal {
        match side {
            Outcome::Up => self.resting_up,
            Outcome::Down => self.resting_down,
        }
    }
}

/// What to do on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LegAction {
    /// Cross the spread now (immediate-or-cancel).
    Take {
        /// Limit price.
        price: Decimal,
        /// Shares.
        size: Decimal,
    },
    /// Rest a limit order (good-till-canceled).
    Rest {
        /// Limit price.
        price: Decimal,
        /// Shares.
        size: Decimal,
    },
    /// Do nothing.
    Skip,
}

impl LegAction {
    /// Limit price, if any.
    pub fn price(&self) -> Option<Decimal> {
        match self {
            LegAction::Take { price, .. } | LegAction::Rest { price, .. } => Some(*price),
            LegAction::Skip => None,
        }
    }

    /// Shares, if any.
    pub fn size(&self) -> Option<Decimal> {
        match self {
            LegAction::Take { size, .. } | LegAction::Rest { size, .. } => Some(*size),
            LegAction::Skip => None,
        }
    }

    /// True unless `Skip`.
    pub fn is_active(&self) -> bool {
        !matches!(self, LegAction::Skip)
    }
}

/// Why nothing was traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// Required side of the book is empty.
    NoBook,
    /// Inside the pre-expiry window.
    NearExpiry,
    /// Combined price not under the ceiling.
    AboveCeiling,
    /// Only one leg would fit.
    LoneLeg,
    /// A resting price fell outside the configured bounds.
    OutOfBounds,
    /// Orders already resting where this would place more.
    AlreadyResting,
    /// Per-side exposure cap reached.
    ExposureCap,
    /// Size below the venue minimum.
    BelowMinimum,
    /// No tick left between the bid and the ask to rest on.
    SpreadTooTight,
}

/// Which branch produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum DecisionKind {
    /// Both asks taken.
    TakeTake,
    /// Cheap side taken, other side rested.
    TakeRest,
    /// Both sides rested above the bid.
    RestRest,
    /// Lagging side bought under the ceiling.
    Hedge,
    /// Lagging side bought above the ceiling after the pairing timer expired.
    ForcedPairing,
    /// Short side bought regardless of price.
    Rebalance,
    /// Nothing to do.
    Skip(SkipReason),
}

/// Result of one decision pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Branch taken.
    pub kind: DecisionKind,
    /// UP leg.
    pub up: LegAction,
    /// DOWN leg.
    pub down: LegAction,
}

impl Decision {
    fn skip(reason: SkipReason) -> Self {
        Self {
            kind: DecisionKind::Skip(reason),
            up: LegAction::Skip,
            down: LegAction::Skip,
        }
    }

    fn single(kind: DecisionKind, side: Outcome, action: LegAction) -> Self {
        let (up, down) = match side {
            Outcome::Up => (action, LegAction::Skip),
            Outcome::Down => (LegAction::Skip, action),
        };
        Self { kind, up, down }
    }

    fn pair(kind: DecisionKind, up: LegAction, down: LegAction) -> Self {
        Self { kind, up, down }
    }

    /// Action for a side.
    pub fn leg(&self, side: Outcome) -> LegAction {
        match side {
            Outcome::Up => self.up,
            Outcome::Down => self.down,
        }
    }

    /// True when at least one order should be placed.
    pub fn is_trade(&self) -> bool {
        self.up.is_active() || self.down.is_active()
    }

    /// Rebalance and forced pairing may exceed the ceiling.
    pub fn is_escalation(&self) -> bool {
        matches!(
            self.kind,
            DecisionKind::Rebalance | DecisionKind::ForcedPairing
        )
    }

    /// Sum of both leg prices for two-legged decisions.
    pub fn combined_price(&self) -> Option<Decimal> {
        Some(self.up.price()? + self.down.price()?)
    }
}

/// Pure decision function over [`DecisionConfig`].
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    /// Create an engine.
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    /// Parameters in use.
    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    fn tick(&self, price: Decimal) -> Decimal {
        round_to_tick(price, self.config.tick_size)
    }

    /// Limit that still crosses `ask`.
    fn take_price(&self, ask: Decimal) -> Decimal {
        ceil_to_tick(ask, self.config.tick_size)
    }

    /// Resting price above the bid and below the ask. `None` when the book
    /// has no bid or the spread leaves no tick between them.
    fn rest_price(&self, quote: &SideQuote) -> Option<Decimal> {
        let bid = quote.best_bid?;
        let mut price = self.tick(bid + self.config.rest_price_offset);
        if let Some(ask) = quote.best_ask {
            let below_ask = self.take_price(ask) - self.config.tick_size;
            price = price.min(below_ask);
        }
        (price > bid && price > Decimal::ZERO).then_some(price)
    }

    /// Decide what to do on both sides.
    pub fn decide(&self, input: &DecisionInput<'_>) -> Decision {
        let c = &self.config;
        let imbalance = input.position.imbalance();

        if imbalance.abs() > c.max_imbalance_shares
            || (input.force_rebalance && !imbalance.is_zero())
        {
            return self.rebalance(input);
        }

        if !imbalance.is_zero() {
            if let Some(hedge) = self.hedge(input) {
                return hedge;
            }
        }

        if input.near_expiry {
            return Decision::skip(SkipReason::NearExpiry);
        }

        let ask_up = input.up.best_ask.map(|a| self.take_price(a));
        let ask_down = input.down.best_ask.map(|a| self.take_price(a));

        if let (Some(ask_up), Some(ask_down)) = (ask_up, ask_down) {
            if ask_up + ask_down < c.cost_ceiling {
                let size = c.order_size.min(input.up.ask_size).min(input.down.ask_size);
                if size >= c.min_order_size
                    && c.up_bounds.contains(ask_up)
                    && c.down_bounds.contains(ask_down)
                {
                    if let Some(skip) = self.exposure_check(input, size) {
                        return skip;
                    }
                    return Decision::pair(
                        DecisionKind::TakeTake,
                        LegAction::Take { price: ask_up, size },
                        LegAction::Take { price: ask_down, size },
                    );
                }
            }
        }

        // the other side only needs a bid to rest against
        let cheap_up = ask_up.filter(|a| *a < c.cheap_price_threshold);
        let cheap_down = ask_down.filter(|a| *a < c.cheap_price_threshold);
        let cheap = match (cheap_up, cheap_down) {
            (Some(up), Some(down)) if down < up => Some(Outcome::Down),
            (Some(_), _) => Some(Outcome::Up),
            (None, Some(_)) => Some(Outcome::Down),
            (None, None) => None,
        };

        match cheap {
            Some(side) => self.take_rest(input, side),
            None => self.rest_rest(input),
        }
    }

    fn rebalance(&self, input: &DecisionInput<'_>) -> Decision {
        let c = &self.config;
        let Some(short) = input.position.under_weighted() else {
            return Decision::skip(SkipReason::AboveCeiling);
        };
        let size = input.position.imbalance().abs().min(c.max_order_size);
        if size < c.min_order_size {
            return Decision::skip(SkipReason::BelowMinimum);
        }
        let quote = input.quote(short);
        if let Some(ask) = quote.best_ask {
            let price = self.take_price(ask);
            return Decision::single(DecisionKind::Rebalance, short, LegAction::Take { price, size });
        }
        if input.resting(short) > Decimal::ZERO {
            return Decision::skip(SkipReason::AlreadyResting);
        }
        match self.rest_price(quote) {
            Some(price) => {
                Decision::single(DecisionKind::Rebalance, short, LegAction::Rest { price, size })
            }
            None => Decision::skip(SkipReason::NoBook),
        }
    }

    /// Buy the lagging side when it pairs under the ceiling, or above it
    /// once the pairing timer has relaxed. `None` lets the normal steps run.
    fn hedge(&self, input: &DecisionInput<'_>) -> Option<Decision> {
        let c = &self.config;
        let lag = input.position.under_weighted()?;
        let held_avg = input.position.average_cost(lag.opposite());
        let need = input.position.imbalance().abs() - input.resting(lag);
        let size = need.min(c.max_order_size);
        if size < c.min_order_size {
            return None;
        }
        let quote = input.quote(lag);
        let bounds = c.bounds(lag);

        if let Some(ask) = quote.best_ask.map(|a| self.take_price(a)) {
            let take_size = size.min(quote.ask_size);
            if take_size >= c.min_order_size && bounds.contains(ask) {
                if held_avg + ask < c.cost_ceiling {
                    return Some(Decision::single(
                        DecisionKind::Hedge,
                        lag,
                        LegAction::Take { price: ask, size: take_size },
                    ));
                }
                if let PairingMode::Relaxed { limit } = input.pairing {
                    if held_avg + ask <= limit {
                        return Some(Decision::single(
                            DecisionKind::ForcedPairing,
                            lag,
                            LegAction::Take { price: ask, size: take_size },
                        ));
                    }
                }
            }
        }

        if input.near_expiry || input.resting(lag) > Decimal::ZERO {
            return None;
        }
        let rest = self.rest_price(quote)?;
        (held_avg + rest < c.cost_ceiling && bounds.contains(rest)).then(|| {
            Decision::single(DecisionKind::Hedge, lag, LegAction::Rest { price: rest, size })
        })
    }

    fn take_rest(&self, input: &DecisionInput<'_>, cheap: Outcome) -> Decision {
        let c = &self.config;
        let other = cheap.opposite();
        let cheap_quote = input.quote(cheap);
        let other_quote = input.quote(other);

        let Some(cheap_ask) = cheap_quote.best_ask.map(|a| self.take_price(a)) else {
            return Decision::skip(SkipReason::NoBook);
        };
        if !c.bounds(cheap).contains(cheap_ask) {
            return Decision::skip(SkipReason::OutOfBounds);
        }
        let Some(rest) = self.rest_price(other_quote) else {
            return Decision::skip(SkipReason::LoneLeg);
        };
        if rest < c.rest_price_floor || !c.bounds(other).contains(rest) {
            return Decision::skip(SkipReason::LoneLeg);
        }
        if cheap_ask + rest >= c.cost_ceiling {
            return Decision::skip(SkipReason::LoneLeg);
        }
        if input.resting(other) > Decimal::ZERO {
            return Decision::skip(SkipReason::AlreadyResting);
        }

        let size = c.order_size.min(cheap_quote.ask_size);
        if size < c.min_order_size {
            return Decision::skip(SkipReason::BelowMinimum);
        }
        if let Some(skip) = self.exposure_check(input, size) {
            return skip;
        }

        let take = LegAction::Take { price: cheap_ask, size };
        let rest = LegAction::Rest { price: rest, size };
        match cheap {
            Outcome::Up => Decision::pair(DecisionKind::TakeRest, take, rest),
            Outcome::Down => Decision::pair(DecisionKind::TakeRest, rest, take),
        }
    }

    fn rest_rest(&self, input: &DecisionInput<'_>) -> Decision {
        let c = &self.config;
        if input.resting_up > Decimal::ZERO || input.resting_down > Decimal::ZERO {
            return Decision::skip(SkipReason::AlreadyResting);
        }
        if input.up.best_bid.is_none() || input.down.best_bid.is_none() {
            return Decision::skip(SkipReason::NoBook);
        }
        let (Some(up), Some(down)) = (self.rest_price(&input.up), self.rest_price(&input.down))
        else {
            return Decision::skip(SkipReason::SpreadTooTight);
        };
        if up + down >= c.cost_ceiling {
            return Decision::skip(SkipReason::AboveCeiling);
        }
        if !c.up_bounds.contains(up) || !c.down_bounds.contains(down) {
            return Decision::skip(SkipReason::OutOfBounds);
        }
        let size = c.order_size;
        if size < c.min_order_size {
            return Decision::skip(SkipReason::BelowMinimum);
        }
        if let Some(skip) = self.exposure_check(input, size) {
            return skip;
        }
        Decision::pair(
            DecisionKind::RestRest,
            LegAction::Rest { price: up, size },
            LegAction::Rest { price: down, size },
        )
    }

    /// Skip when adding `size` to both sides would exceed the per-side cap.
    fn exposure_check(&self, input: &DecisionInput<'_>, size: Decimal) -> Option<Decision> {
        for side in Outcome::BOTH {
            let committed = input.position.shares(side) + input.resting(side) + size;
            if committed > self.config.max_shares_per_side {
                return Some(Decision::skip(SkipReason::ExposureCap));
            }
        }
        None
    }
}
