//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use time::OffsetDateTime;

use crate::trading::Side;

/// Reference depth kept per side.
pub const DEFAULT_DEPTH: usize = 10;

/// Inline storage for the bounded level lists of a snapshot.
pub type Levels = SmallVec<[PriceLevel; DEFAULT_DEPTH]>;

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Point-in-time view of one outcome token's book.
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    /// Token ID this book represents.
    pub token_id: String,
    /// Bid levels sorted by price descending.
    pub bids: Levels,
    /// Ask levels sorted by price ascending.
    pub asks: Levels,
    /// When this book was last updated.
    pub updated_at: OffsetDateTime,
}

impl BookSnapshot {
    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get size available at best bid.
    pub fn bid_size(&self) -> Decimal {
        self.bids.first().map(|l| l.size).unwrap_or(Decimal::ZERO)
    }

    /// Get size available at best ask.
    pub fn ask_size(&self) -> Decimal {
        self.asks.first().map(|l| l.size).unwrap_or(Decimal::ZERO)
    }

    /// Get the spread between best bid and ask.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Check if the book is inverted (best_ask < best_bid).
    pub fn is_inverted(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask < bid,
            _ => false,
        }
    }
}

/// Single incremental level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    /// BUY changes bids, SELL changes asks.
    pub side: Side,
    /// Price of the level.
    pub price: Decimal,
    /// New absolute size at the price; zero removes the level.
    pub size: Decimal,
}

/// Content of one feed message for a token.
#[derive(Debug, Clone, PartialEq)]
pub enum BookDelta {
    /// Full book replacing whatever was held.
    Snapshot {
        /// Raw bid levels, any order, duplicates allowed.
        bids: Vec<PriceLevel>,
        /// Raw ask levels, any order, duplicates allowed.
        asks: Vec<PriceLevel>,
    },
    /// Incremental price-level changes.
    Levels(Vec<LevelChange>),
}

/// Book update pushed from the feed to the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct BookUpdate {
    /// Asset (token) ID that was updated.
    pub token_id: String,
    /// What changed.
    pub delta: BookDelta,
    /// Local receive time.
    pub received_at: OffsetDateTime,
}
