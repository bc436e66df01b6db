//! Freshest per-token book state, owned by the poll loop.
//!
//! The feed never touches this directly: it sends [`BookUpdate`]s over a
//! channel and the loop applies them with [`MarketDataStore::apply`] at the
//! start of every tick.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::trace;

use super::aggregator::{aggregate_levels, mid_price, top_asks, top_bids};
use super::types::{BookDelta, BookSnapshot, BookUpdate, DEFAULT_DEPTH};
use crate::trading::Side;

/// Reference freshness window.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct TokenBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    updated_at: OffsetDateTime,
}

impl TokenBook {
    fn empty(at: OffsetDateTime) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            updated_at: at,
        }
    }
}

/// Per-token order books with staleness detection.
#[derive(Debug)]
pub struct MarketDataStore {
    books: HashMap<String, TokenBook>,
    last_mid: HashMap<String, Decimal>,
    freshness: Duration,
    depth: usize,
}

impl Default for MarketDataStore {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS, DEFAULT_DEPTH)
    }
}

impl MarketDataStore {
    /// Create a store with the given freshness window and per-side depth.
    pub fn new(freshness: Duration, depth: usize) -> Self {
        Self {
            books: HashMap::new(),
            last_mid: HashMap::new(),
            freshness,
            depth: depth.max(1),
        }
    }

    /// Merge a snapshot or incremental change for `token_id`.
    ///
    /// Snapshots replace the book. Level changes set the absolute size at
    /// a price (zero removes it); they are applied onto an empty book when
    /// no snapshot has been seen yet.
    pub fn update(&mut self, token_id: &str, delta: BookDelta, at: OffsetDateTime) {
        let book = self
            .books
            .entry(token_id.to_string())
            .or_insert_with(|| TokenBook::empty(at));

        match delta {
            BookDelta::Snapshot { bids, asks } => {
                book.bids = aggregate_levels(&bids);
                book.asks = aggregate_levels(&asks);
            }
            BookDelta::Levels(changes) => {
                for change in changes {
                    let side = match change.side {
                        Side::Buy => &mut book.bids,
                        Side::Sell => &mut book.asks,
                    };
                    if change.size <= Decimal::ZERO {
                        side.remove(&change.price);
                    } else {
                        side.insert(change.price, change.size);
                    }
                }
            }
        }
        book.updated_at = at;

        let best_bid = book.bids.keys().next_back().copied();
        let best_ask = book.asks.keys().next().copied();
        if let Some(mid) = mid_price(best_bid, best_ask) {
            self.last_mid.insert(token_id.to_string(), mid);
        }
        trace!(token_id, ?best_bid, ?best_ask, "book updated");
    }

    /// Apply an update received from the feed channel.
    pub fn apply(&mut self, update: BookUpdate) {
        self.update(&update.token_id, update.delta, update.received_at);
    }

    /// Current snapshot, or `None` when unknown or older than the freshness window.
    pub fn read(&self, token_id: &str, now: OffsetDateTime) -> Option<BookSnapshot> {
        let book = self.books.get(token_id)?;
        if now - book.updated_at > self.freshness {
            return None;
        }
        Some(BookSnapshot {
            token_id: token_id.to_string(),
            bids: top_bids(&book.bids, self.depth),
            asks: top_asks(&book.asks, self.depth),
            updated_at: book.updated_at,
        })
    }

    /// Last mid price seen for a token, even if the book has gone stale.
    pub fn last_mid(&self, token_id: &str) -> Option<Decimal> {
        self.last_mid.get(token_id).copied()
    }

    /// Forget a token once its instrument is gone.
    pub fn remove(&mut self, token_id: &str) {
        self.books.remove(token_id);
        self.last_mid.remove(token_id);
    }

    /// Number of tokens with any book state.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// True when no token has been seen.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
