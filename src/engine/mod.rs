//! Engine module: per-instrument state and the driving poll loop.
//!
//! This module handles:
//! - The `InstrumentState` aggregate and the arena holding it
//! - Structured events for notification sinks
//! - The tick loop tying market data, decisions, orders and settlement together

pub mod events;
pub mod runner;
pub mod state;

pub use events::{ChannelSink, EngineEvent, LogSink, NotificationSink};
pub use runner::{Engine, EngineDeps, EngineStatus, TickReport};
pub use state::{InstrumentArena, InstrumentState, InstrumentSummary};
