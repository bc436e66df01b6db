//! Market module for timed Up/Down events.
//!
//! This module handles:
//! - Instrument, outcome and timeframe types
//! - Market discovery (finding the open event of a series)
//! - Polymarket REST client (live gateway and oracle)
//! - Paper exchange, static oracle and static discovery for dry runs and tests

pub mod client;
pub mod discovery;
pub mod mock;
pub mod types;

pub use client::PolymarketClient;
pub use discovery::{next_slug, window_slug, GammaDiscovery, MarketDiscovery, GAMMA_API_URL};
pub use mock::{PaperExchange, StaticDiscovery, StaticOracle};
pub use types::{GammaMarket, Instrument, Outcome, Timeframe};
