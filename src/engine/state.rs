//! Per-instrument state, owned by the engine.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;

use crate::market::Instrument;
use crate::trading::{CycleStats, LifecycleConfig, OrderLifecycleManager, Position};

/// Everything the engine tracks for one instrument.
#[derive(Debug, Clone)]
pub struct InstrumentState {
    /// The event itself.
    pub instrument: Instrument,
    /// Confirmed exposure.
    pub position: Position,
    /// Resting orders and pairing timer.
    pub lifecycle: OrderLifecycleManager,
    /// Counters for the end-of-event summary.
    pub stats: CycleStats,
    /// Grid ladder already placed.
    pub grid_placed: bool,
}

impl InstrumentState {
    /// Fresh state for a newly admitted instrument.
    pub fn new(instrument: Instrument, lifecycle: LifecycleConfig) -> Self {
        Self {
            instrument,
            position: Position::default(),
            lifecycle: OrderLifecycleManager::new(lifecycle),
            stats: CycleStats::default(),
            grid_placed: false,
        }
    }

    /// Read-only view for the status endpoint.
    pub fn summary(&self, now: OffsetDateTime) -> InstrumentSummary {
        InstrumentSummary {
            slug: self.instrument.slug.clone(),
            time_remaining: self.instrument.time_remaining_str(now),
            position: self.position.clone(),
            imbalance: self.position.imbalance().to_string(),
            hedged_pairs: self.position.hedged_pairs().to_string(),
            open_orders: self.lifecycle.open_orders().count(),
            pairing: self.lifecycle.pairing_started().is_some(),
        }
    }
}

/// Status snapshot of one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentSummary {
    /// Instrument slug.
    pub slug: String,
    /// Time until expiry.
    pub time_remaining: String,
    /// Confirmed exposure.
    pub position: Position,
    /// UP minus DOWN shares.
    pub imbalance: String,
    /// Shares held on both sides.
    pub hedged_pairs: String,
    /// Orders still on the book.
    pub open_orders: usize,
    /// Pairing timer running.
    pub pairing: bool,
}

/// All live instruments keyed by slug.
#[derive(Debug, Default)]
pub struct InstrumentArena {
    states: HashMap<String, InstrumentState>,
}

impl InstrumentArena {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `state`. Returns false if the slug is already tracked.
    pub fn admit(&mut self, state: InstrumentState) -> bool {
        let slug = state.instrument.slug.clone();
        if self.states.contains_key(&slug) {
            return false;
        }
        self.states.insert(slug, state);
        true
    }

    /// Whether `slug` is tracked.
    pub fn contains(&self, slug: &str) -> bool {
        self.states.contains_key(slug)
    }

    /// State for `slug`.
    pub fn get(&self, slug: &str) -> Option<&InstrumentState> {
        self.states.get(slug)
    }

    /// Mutable state for `slug`.
    pub fn get_mut(&mut self, slug: &str) -> Option<&mut InstrumentState> {
        self.states.get_mut(slug)
    }

    /// Stop tracking `slug`.
    pub fn remove(&mut self, slug: &str) -> Option<InstrumentState> {
        self.states.remove(slug)
    }

    /// Tracked slugs, sorted for a stable processing order.
    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.states.keys().cloned().collect();
        slugs.sort();
        slugs
    }

    /// Iterate all states.
    pub fn iter(&self) -> impl Iterator<Item = &InstrumentState> {
        self.states.values()
    }

    /// Number of tracked instruments.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Slug of the instrument trading `token_id`.
    pub fn slug_for_token(&self, token_id: &str) -> Option<&str> {
        self.states
            .values()
            .find(|s| s.instrument.outcome_of(token_id).is_some())
            .map(|s| s.instrument.slug.as_str())
    }
}
