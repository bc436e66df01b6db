//! Fill models for the paper exchange.
//!
//! All models are deterministic so dry runs and tests replay identically.

use std::fmt::Debug;

use rust_decimal::Decimal;

use crate::orderbook::{cumulative_depth_up_to, BookSnapshot};
use crate::trading::TimeInForce;

/// Buy order asking to be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillRequest {
    /// Limit price.
    pub price: Decimal,
    /// Unfilled shares.
    pub remaining: Decimal,
    /// Immediate or resting.
    pub tif: TimeInForce,
}

/// Decides how many shares of a simulated order fill against a book.
pub trait FillSimulator: Debug + Send + Sync {
    /// Shares filled now, between zero and `request.remaining`.
    fn fill(&self, request: &FillRequest, book: Option<&BookSnapshot>) -> Decimal;
}

/// Buys fill against displayed asks at or below the limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookTouch;

impl FillSimulator for BookTouch {
    fn fill(&self, request: &FillRequest, book: Option<&BookSnapshot>) -> Decimal {
        let Some(book) = book else {
            return Decimal::ZERO;
        };
        cumulative_depth_up_to(&book.asks, request.price)
            .min(request.remaining)
            .max(Decimal::ZERO)
    }
}

/// Every order fills completely as soon as it is posted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFill;

impl FillSimulator for AlwaysFill {
    fn fill(&self, request: &FillRequest, _book: Option<&BookSnapshot>) -> Decimal {
        request.remaining
    }
}

/// Nothing ever fills; fills are injected by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFill;

impl FillSimulator for NeverFill {
    fn fill(&self, _request: &FillRequest, _book: Option<&BookSnapshot>) -> Decimal {
        Decimal::ZERO
    }
}

/// Immediate orders fill completely, resting orders never do.
#[derive(Debug, Clone, Copy, Default)]
pub struct TakerOnly;

impl FillSimulator for TakerOnly {
    fn fill(&self, request: &FillRequest, _book: Option<&BookSnapshot>) -> Decimal {
        match request.tif {
            TimeInForce::FAK => request.remaining,
            TimeInForce::GTC => Decimal::ZERO,
        }
    }
}
