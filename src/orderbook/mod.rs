//! Order book module for managing market data.
//!
//! This module handles:
//! - Order book types and data structures
//! - Level aggregation and reachable depth
//! - The per-token store read by the poll loop
//! - WebSocket feed pushing updates into the store's channel

pub mod aggregator;
pub mod store;
pub mod types;
pub mod websocket;

pub use aggregator::{cumulative_depth_up_to, mid_price};
pub use store::MarketDataStore;
pub use types::{BookDelta, BookSnapshot, BookUpdate, LevelChange, PriceLevel};
pub use websocket::MarketFeed;
