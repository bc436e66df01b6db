//! Ladder planner for grid mode.
//!
//! Every UP level `p` between `low` and `high` is paired with a DOWN order at
//! `ceiling - p`, so any pair of fills on the same level costs the ceiling.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::decision::PriceBounds;
use crate::market::{Instrument, Outcome};
use crate::utils::round_to_tick;

/// Ladder parameters.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Lowest UP level.
    pub low: Decimal,
    /// Highest UP level.
    pub high: Decimal,
    /// Distance between levels.
    pub step: Decimal,
    /// Shares per order.
    pub order_size: Decimal,
    /// Combined price of each paired level.
    pub cost_ceiling: Decimal,
    /// Venue price increment.
    pub tick_size: Decimal,
    /// Valid UP prices.
    pub up_bounds: PriceBounds,
    /// Valid DOWN prices.
    pub down_bounds: PriceBounds,
}

/// One planned resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridOrder {
    /// Ladder rung; the UP and DOWN orders of a rung share it.
    pub level: usize,
    /// Side bought.
    pub outcome: Outcome,
    /// Token bought.
    pub token_id: String,
    /// Limit price.
    pub price: Decimal,
    /// Shares.
    pub size: Decimal,
}

/// Builds the full ladder for an instrument.
#[derive(Debug, Clone)]
pub struct GridPlanner {
    config: GridConfig,
}

impl GridPlanner {
    /// Create a planner.
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    /// UP/DOWN price pairs of the ladder, low to high.
    pub fn levels(&self) -> Vec<(Decimal, Decimal)> {
        let c = &self.config;
        let mut levels = Vec::new();
        if c.step <= Decimal::ZERO || c.low > c.high {
            return levels;
        }

        let mut raw = c.low;
        while raw <= c.high {
            let up = round_to_tick(raw, c.tick_size);
            let down = round_to_tick(c.cost_ceiling - up, c.tick_size);
            raw += c.step;

            if !c.up_bounds.contains(up) || !c.down_bounds.contains(down) {
                debug!(%up, %down, "Grid level outside bounds, skipped");
                continue;
            }
            if levels.last().is_some_and(|(prev, _)| *prev == up) {
                continue;
            }
            levels.push((up, down));
        }
        levels
    }

    /// Orders to place for `instrument`, UP then DOWN for each level.
    pub fn plan(&self, instrument: &Instrument) -> Vec<GridOrder> {
        self.levels()
            .into_iter()
            .enumerate()
            .flat_map(|(level, (up, down))| {
                [(Outcome::Up, up), (Outcome::Down, down)].map(|(outcome, price)| GridOrder {
                    level,
                    outcome,
                    token_id: instrument.token_id(outcome).to_string(),
                    price,
                    size: self.config.order_size,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Timeframe;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn config() -> GridConfig {
        GridConfig {
            low: dec!(0.10),
            high: dec!(0.90),
            step: dec!(0.05),
            order_size: dec!(5),
            cost_ceiling: dec!(0.98),
            tick_size: dec!(0.01),
            up_bounds: PriceBounds { min: dec!(0.05), max: dec!(0.95) },
            down_bounds: PriceBounds { min: dec!(0.05), max: dec!(0.95) },
        }
    }

    fn instrument() -> Instrument {
        Instrument {
            slug: "btc-updown-15m-1700000100".to_string(),
            condition_id: "0xcond".to_string(),
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
            asset: "btc".to_string(),
            timeframe: Timeframe::FifteenMin,
            start_timestamp: 1_700_000_100,
            end_timestamp: 1_700_001_000,
        }
    }

    #[test]
    fn every_level_pairs_to_the_ceiling() {
        let levels = GridPlanner::new(config()).levels();
        assert_eq!(levels.len(), 17);
        assert_eq!(levels[0], (dec!(0.10), dec!(0.88)));
        assert_eq!(levels[16], (dec!(0.90), dec!(0.08)));
        for (up, down) in &levels {
            assert_eq!(*up + *down, dec!(0.98));
        }
    }

    #[test]
    fn out_of_bound_levels_are_skipped() {
        let mut cfg = config();
        cfg.down_bounds = PriceBounds { min: dec!(0.20), max: dec!(0.80) };
        let levels = GridPlanner::new(cfg).levels();
        // down = 0.98 - up within [0.20, 0.80] -> up in [0.18, 0.78]
        assert_eq!(levels.first(), Some(&(dec!(0.20), dec!(0.78))));
        assert_eq!(levels.last(), Some(&(dec!(0.75), dec!(0.23))));
    }

    #[test]
    fn plan_tags_both_sides_with_the_level() {
        let mut cfg = config();
        cfg.low = dec!(0.40);
        cfg.high = dec!(0.45);
        let orders = GridPlanner::new(cfg).plan(&instrument());

        assert_eq!(
            orders,
            vec![
                GridOrder { level: 0, outcome: Outcome::Up, token_id: "up".into(), price: dec!(0.40), size: dec!(5) },
                GridOrder { level: 0, outcome: Outcome::Down, token_id: "down".into(), price: dec!(0.58), size: dec!(5) },
                GridOrder { level: 1, outcome: Outcome::Up, token_id: "up".into(), price: dec!(0.45), size: dec!(5) },
                GridOrder { level: 1, outcome: Outcome::Down, token_id: "down".into(), price: dec!(0.53), size: dec!(5) },
            ]
        );
    }

    #[test]
    fn degenerate_ladders_are_empty() {
        let mut cfg = config();
        cfg.step = Decimal::ZERO;
        assert!(GridPlanner::new(cfg).levels().is_empty());

        let mut cfg = config();
        cfg.low = dec!(0.9);
        cfg.high = dec!(0.1);
        assert!(GridPlanner::new(cfg).levels().is_empty());
    }
}
