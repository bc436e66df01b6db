//! Up/Down binary-outcome arbitrage engine for Polymarket timed events.
//!
//! Every timed event (e.g. "BTC up or down in the next 15 minutes") has two
//! outcome tokens, exactly one of which redeems at $1.00. Holding equal
//! shares of both sides bought for a combined price under $1.00 locks in the
//! difference:
//!
//! ```text
//! UP bought at:    $0.47
//! DOWN bought at:  $0.50
//! ─────────────────────
//! Combined:        $0.97 < $0.98 ceiling
//! Payout:          $1.00 per pair, whichever side wins
//! ```
//!
//! The engine buys both legs (taking asks or resting bids), keeps the two
//! sides level, and settles each event once the winner is published.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Instruments, discovery, REST client and paper exchange
//! - [`orderbook`]: Book types, the market data store and the feed
//! - [`arbitrage`]: Decision engine, grid planner and executor
//! - [`trading`]: Orders, positions and resting-order lifecycle
//! - [`settlement`]: Outcome resolution and payout
//! - [`engine`]: Per-instrument state and the poll loop
//! - [`api`]: HTTP API for health/status/metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;
pub mod metrics;
pub mod orderbook;
pub mod settlement;
pub mod signing;
pub mod trading;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
