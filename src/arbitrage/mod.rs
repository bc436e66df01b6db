//! Arbitrage module: deciding, planning and executing trades.
//!
//! This module handles:
//! - The reactive per-tick decision engine
//! - The grid ladder planner
//! - Deterministic fill simulators for the paper exchange
//! - Turning decisions into gateway orders under a cooldown

pub mod decision;
pub mod executor;
pub mod grid;
pub mod simulator;

pub use decision::{
    Decision, DecisionConfig, DecisionEngine, DecisionInput, DecisionKind, LegAction, PriceBounds,
    SideQuote, SkipReason,
};
pub use executor::{ArbitrageExecutor, ExecutionResult, ExecutorStats, PlacedOrder};
pub use grid::{GridConfig, GridOrder, GridPlanner};
pub use simulator::{AlwaysFill, BookTouch, FillRequest, FillSimulator, NeverFill, TakerOnly};
