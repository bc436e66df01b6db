//! Level aggregation and depth helpers.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::types::{Levels, PriceLevel};

/// Sum sizes of levels sharing a price; non-positive sizes are dropped.
pub fn aggregate_levels(levels: &[PriceLevel]) -> BTreeMap<Decimal, Decimal> {
    let mut map = BTreeMap::new();
    for level in levels {
        if level.size > Decimal::ZERO {
            *map.entry(level.price).or_insert(Decimal::ZERO) += level.size;
        }
    }
    map
}

/// Best `depth` bids, highest price first.
pub fn top_bids(bids: &BTreeMap<Decimal, Decimal>, depth: usize) -> Levels {
    bids.iter()
        .rev()
        .take(depth)
        .map(|(p, s)| PriceLevel::new(*p, *s))
        .collect()
}

/// Best `depth` asks, lowest price first.
pub fn top_asks(asks: &BTreeMap<Decimal, Decimal>, depth: usize) -> Levels {
    asks.iter()
        .take(depth)
        .map(|(p, s)| PriceLevel::new(*p, *s))
        .collect()
}

/// Ask liquidity at or below `limit` (what a buy at `limit` could match).
pub fn cumulative_depth_up_to(asks: &[PriceLevel], limit: Decimal) -> Decimal {
    asks.iter()
        .filter(|l| l.price <= limit)
        .map(|l| l.size)
        .sum()
}

/// Mid of the best bid and ask; a one-sided book uses the side it has.
pub fn mid_price(best_bid: Option<Decimal>, best_ask: Option<Decimal>) -> Option<Decimal> {
    match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
        (Some(bid), None) => Some(bid),
        (None, Some(ask)) => Some(ask),
        (None, None) => None,
    }
}
