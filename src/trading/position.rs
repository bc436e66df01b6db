//! Per-instrument exposure and the rebalance policy.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::error::TradingError;
use crate::market::{Outcome, Timeframe};

/// Accumulated confirmed fills for one instrument.
///
/// Shares and costs only ever grow; the entry is dropped at settlement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    /// UP shares held.
    pub up_shares: Decimal,
    /// Total paid for UP shares.
    pub up_cost: Decimal,
    /// DOWN shares held.
    pub down_shares: Decimal,
    /// Total paid for DOWN shares.
    pub down_cost: Decimal,
}

impl Position {
    /// Add a confirmed fill.
    pub fn record_fill(
        &mut self,
        side: Outcome,
        shares: Decimal,
        price: Decimal,
    ) -> Result<(), TradingError> {
        if shares <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(TradingError::InvalidParams(format!(
                "fill must be positive: {shares} @ {price}"
            )));
        }
        let (held, cost) = match side {
            Outcome::Up => (&mut self.up_shares, &mut self.up_cost),
            Outcome::Down => (&mut self.down_shares, &mut self.down_cost),
        };
        *held += shares;
        *cost += shares * price;
        Ok(())
    }

    /// Shares held on a side.
    pub fn shares(&self, side: Outcome) -> Decimal {
        match side {
            Outcome::Up => self.up_shares,
            Outcome::Down => self.down_shares,
        }
    }

    /// Amount paid on a side.
    pub fn cost(&self, side: Outcome) -> Decimal {
        match side {
            Outcome::Up => self.up_cost,
            Outcome::Down => self.down_cost,
        }
    }

    /// Weighted-average price paid on a side; zero with no shares.
    pub fn average_cost(&self, side: Outcome) -> Decimal {
        let shares = self.shares(side);
        if shares.is_zero() {
            Decimal::ZERO
        } else {
            self.cost(side) / shares
        }
    }

    /// `up_shares - down_shares`.
    pub fn imbalance(&self) -> Decimal {
        self.up_shares - self.down_shares
    }

    /// Side holding fewer shares, if the two differ.
    pub fn under_weighted(&self) -> Option<Outcome> {
        match self.up_shares.cmp(&self.down_shares) {
            std::cmp::Ordering::Less => Some(Outcome::Up),
            std::cmp::Ordering::Greater => Some(Outcome::Down),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Shares on both sides.
    pub fn total_shares(&self) -> Decimal {
        self.up_shares + self.down_shares
    }

    /// Everything paid so far.
    pub fn total_cost(&self) -> Decimal {
        self.up_cost + self.down_cost
    }

    /// Fully hedged share pairs.
    pub fn hedged_pairs(&self) -> Decimal {
        self.up_shares.min(self.down_shares)
    }

    /// Sum of both sides' average prices, when both are held.
    pub fn combined_average_cost(&self) -> Option<Decimal> {
        if self.up_shares.is_zero() || self.down_shares.is_zero() {
            return None;
        }
        Some(self.average_cost(Outcome::Up) + self.average_cost(Outcome::Down))
    }

    /// Redemption value if `winner` wins.
    pub fn payout_if(&self, winner: Outcome) -> Decimal {
        self.shares(winner)
    }

    /// True before any fill.
    pub fn is_flat(&self) -> bool {
        self.total_shares().is_zero()
    }
}

/// Ephemeral per-event counters for logging and the cycle summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Fills recorded on UP.
    pub up_fills: u32,
    /// Fills recorded on DOWN.
    pub down_fills: u32,
    /// UP shares bought this cycle.
    pub up_shares: Decimal,
    /// DOWN shares bought this cycle.
    pub down_shares: Decimal,
    /// UP spend this cycle.
    pub up_cost: Decimal,
    /// DOWN spend this cycle.
    pub down_cost: Decimal,
    /// Orders accepted by the venue.
    pub orders_placed: u32,
    /// Orders canceled by the engine.
    pub orders_canceled: u32,
    /// Rebalance escalations.
    pub rebalances: u32,
    /// Pairing fills accepted above the normal ceiling.
    pub forced_pairings: u32,
}

impl CycleStats {
    fn record_fill(&mut self, side: Outcome, shares: Decimal, price: Decimal) {
        match side {
            Outcome::Up => {
                self.up_fills += 1;
                self.up_shares += shares;
                self.up_cost += shares * price;
            }
            Outcome::Down => {
                self.down_fills += 1;
                self.down_shares += shares;
                self.down_cost += shares * price;
            }
        }
    }
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let avg = |cost: Decimal, shares: Decimal| {
            if shares.is_zero() {
                Decimal::ZERO
            } else {
                (cost / shares).round_dp(4)
            }
        };
        write!(
            f,
            "UP {} fills {} sh ${} (avg {}) | DOWN {} fills {} sh ${} (avg {}) | orders {} placed {} canceled | {} rebalances, {} forced pairings",
            self.up_fills,
            self.up_shares,
            self.up_cost.round_dp(4),
            avg(self.up_cost, self.up_shares),
            self.down_fills,
            self.down_shares,
            self.down_cost.round_dp(4),
            avg(self.down_cost, self.down_shares),
            self.orders_placed,
            self.orders_canceled,
            self.rebalances,
            self.forced_pairings,
        )
    }
}

/// Rebalance policy settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// `|imbalance| / total` threshold for 5m/15m events.
    pub imbalance_ratio_fast: Decimal,
    /// Threshold for 1h/4h/daily events.
    pub imbalance_ratio_slow: Decimal,
    /// Absolute imbalance below which the ratio is ignored.
    pub min_imbalance: Decimal,
}

/// Applies fills to positions and decides when exposure has drifted too far.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    config: LedgerConfig,
}

impl PositionLedger {
    /// Create a ledger with the given policy.
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }

    /// Record a confirmed fill on the position and cycle counters.
    pub fn record_fill(
        &self,
        position: &mut Position,
        stats: &mut CycleStats,
        side: Outcome,
        shares: Decimal,
        price: Decimal,
    ) -> Result<(), TradingError> {
        position.record_fill(side, shares, price)?;
        stats.record_fill(side, shares, price);
        debug!(
            %side,
            %shares,
            %price,
            imbalance = %position.imbalance(),
            total_cost = %position.total_cost(),
            "Fill recorded"
        );
        Ok(())
    }

    /// Ratio threshold for a timeframe.
    pub fn max_imbalance_ratio(&self, timeframe: Timeframe) -> Decimal {
        if timeframe.is_fast() {
            self.config.imbalance_ratio_fast
        } else {
            self.config.imbalance_ratio_slow
        }
    }

    /// True when `|imbalance| / total_shares` exceeds the timeframe's ratio.
    pub fn needs_rebalance(&self, position: &Position, timeframe: Timeframe) -> bool {
        let total = position.total_shares();
        if total.is_zero() {
            return false;
        }
        let imbalance = position.imbalance().abs();
        if imbalance < self.config.min_imbalance {
            return false;
        }
        imbalance / total > self.max_imbalance_ratio(timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ledger() -> PositionLedger {
        PositionLedger::new(LedgerConfig {
            imbalance_ratio_fast: dec!(0.20),
            imbalance_ratio_slow: dec!(0.30),
            min_imbalance: dec!(10),
        })
    }

    #[test]
    fn paired_fills_produce_exact_costs() {
        let mut pos = Position::default();
        let mut stats = CycleStats::default();
        let l = ledger();

        l.record_fill(&mut pos, &mut stats, Outcome::Up, dec!(10), dec!(0.40)).unwrap();
        l.record_fill(&mut pos, &mut stats, Outcome::Down, dec!(10), dec!(0.50)).unwrap();

        assert_eq!(pos.up_shares, dec!(10));
        assert_eq!(pos.down_shares, dec!(10));
        assert_eq!(pos.up_cost, dec!(4.00));
        assert_eq!(pos.down_cost, dec!(5.00));
        assert_eq!(pos.combined_average_cost(), Some(dec!(0.90)));
        assert_eq!(stats.up_fills, 1);
    }

    #[test]
    fn average_cost_is_cost_over_shares() {
        let mut pos = Position::default();
        assert_eq!(pos.average_cost(Outcome::Up), Decimal::ZERO);

        pos.record_fill(Outcome::Up, dec!(3), dec!(0.41)).unwrap();
        pos.record_fill(Outcome::Up, dec!(7), dec!(0.47)).unwrap();
        assert_eq!(pos.average_cost(Outcome::Up), pos.up_cost / pos.up_shares);
        assert_eq!(pos.average_cost(Outcome::Up), dec!(0.452));
        assert_eq!(pos.average_cost(Outcome::Down), Decimal::ZERO);
    }

    #[test]
    fn rejected_fill_leaves_position_untouched() {
        let mut pos = Position::default();
        pos.record_fill(Outcome::Down, dec!(5), dec!(0.5)).unwrap();
        let before = pos.clone();

        assert!(pos.record_fill(Outcome::Down, dec!(0), dec!(0.5)).is_err());
        assert!(pos.record_fill(Outcome::Up, dec!(5), dec!(-0.1)).is_err());
        assert_eq!(pos, before);
    }

    #[test]
    fn imbalance_and_under_weighted_side() {
        let mut pos = Position::default();
        assert_eq!(pos.under_weighted(), None);
        pos.record_fill(Outcome::Up, dec!(35), dec!(0.4)).unwrap();
        assert_eq!(pos.imbalance(), dec!(35));
        assert_eq!(pos.under_weighted(), Some(Outcome::Down));
        assert_eq!(pos.hedged_pairs(), dec!(0));
    }

    #[test]
    fn needs_rebalance_uses_timeframe_ratio() {
        let l = ledger();
        let mut pos = Position::default();
        pos.record_fill(Outcome::Up, dec!(60), dec!(0.5)).unwrap();
        pos.record_fill(Outcome::Down, dec!(40), dec!(0.5)).unwrap();

        // 20 / 100 = 0.20: not above the fast ratio
        assert!(!l.needs_rebalance(&pos, Timeframe::FifteenMin));

        pos.record_fill(Outcome::Up, dec!(10), dec!(0.5)).unwrap();
        // 30 / 110 > 0.20 but < 0.30
        assert!(l.needs_rebalance(&pos, Timeframe::FiveMin));
        assert!(!l.needs_rebalance(&pos, Timeframe::OneHour));
    }

    #[test]
    fn small_imbalances_never_rebalance() {
        let l = ledger();
        let mut pos = Position::default();
        pos.record_fill(Outcome::Up, dec!(5), dec!(0.5)).unwrap();
        assert!(!l.needs_rebalance(&pos, Timeframe::FiveMin));
        assert!(!l.needs_rebalance(&Position::default(), Timeframe::FiveMin));
    }

    #[test]
    fn cycle_summary_renders() {
        let mut stats = CycleStats::default();
        stats.record_fill(Outcome::Up, dec!(10), dec!(0.40));
        stats.rebalances = 1;
        let text = stats.to_string();
        assert!(text.contains("UP 1 fills 10 sh"));
        assert!(text.contains("1 rebalances"));
    }
}
