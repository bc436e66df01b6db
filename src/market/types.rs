//! Instrument types for timed Up/Down prediction events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::error::MarketError;

/// Outcome side of a binary Up/Down event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Price ends above the open (YES token).
    #[strum(to_string = "up", serialize = "yes", serialize = "UP", serialize = "YES")]
    #[default]
    Up,
    /// Price ends below the open (NO token).
    #[strum(to_string = "down", serialize = "no", serialize = "DOWN", serialize = "NO")]
    Down,
}

impl Outcome {
    /// Both outcomes, Up first.
    pub const BOTH: [Outcome; 2] = [Outcome::Up, Outcome::Down];

    /// Get the opposite outcome.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Up => Outcome::Down,
            Outcome::Down => Outcome::Up,
        }
    }
}

/// Event window length bucket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum Timeframe {
    #[strum(serialize = "5m")]
    #[serde(rename = "5m")]
    FiveMin,
    #[strum(serialize = "15m")]
    #[serde(rename = "15m")]
    FifteenMin,
    #[strum(serialize = "1h")]
    #[serde(rename = "1h")]
    OneHour,
    #[strum(serialize = "4h")]
    #[serde(rename = "4h")]
    FourHour,
    #[strum(serialize = "daily")]
    #[serde(rename = "daily")]
    Daily,
}

impl Timeframe {
    /// All timeframes, shortest first.
    pub const ALL: [Timeframe; 5] = [
        Timeframe::FiveMin,
        Timeframe::FifteenMin,
        Timeframe::OneHour,
        Timeframe::FourHour,
        Timeframe::Daily,
    ];

    /// Window length in seconds.
    pub fn window_seconds(&self) -> i64 {
        match self {
            Timeframe::FiveMin => 300,
            Timeframe::FifteenMin => 900,
            Timeframe::OneHour => 3_600,
            Timeframe::FourHour => 14_400,
            Timeframe::Daily => 86_400,
        }
    }

    /// Short events rebalance on a tighter imbalance ratio.
    pub fn is_fast(&self) -> bool {
        matches!(self, Timeframe::FiveMin | Timeframe::FifteenMin)
    }

    /// Start of the window containing `unix_ts`.
    pub fn window_start(&self, unix_ts: i64) -> i64 {
        let w = self.window_seconds();
        unix_ts.div_euclid(w) * w
    }
}

/// One timed Up/Down event. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instrument {
    /// Unique event key (e.g., "btc-updown-15m-1765301400").
    pub slug: String,
    /// Venue condition/market identifier.
    pub condition_id: String,
    /// UP (YES) token ID for CLOB.
    pub up_token_id: String,
    /// DOWN (NO) token ID for CLOB.
    pub down_token_id: String,
    /// Asset symbol, lowercase.
    pub asset: String,
    /// Window bucket.
    pub timeframe: Timeframe,
    /// Unix timestamp when the window opened.
    pub start_timestamp: i64,
    /// Unix timestamp when the window closes.
    pub end_timestamp: i64,
}

impl Instrument {
    /// Get the token ID for a given outcome.
    pub fn token_id(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Up => &self.up_token_id,
            Outcome::Down => &self.down_token_id,
        }
    }

    /// Which outcome a token belongs to, if any.
    pub fn outcome_of(&self, token_id: &str) -> Option<Outcome> {
        if token_id == self.up_token_id {
            Some(Outcome::Up)
        } else if token_id == self.down_token_id {
            Some(Outcome::Down)
        } else {
            None
        }
    }

    /// Seconds until the window closes; negative once expired.
    pub fn seconds_to_expiry(&self, now: OffsetDateTime) -> i64 {
        self.end_timestamp - now.unix_timestamp()
    }

    /// Check if the window is closed.
    pub fn is_closed(&self, now: OffsetDateTime) -> bool {
        self.seconds_to_expiry(now) <= 0
    }

    /// Format remaining time as "Xm Ys" string.
    pub fn time_remaining_str(&self, now: OffsetDateTime) -> String {
        let remaining = self.seconds_to_expiry(now);
        if remaining <= 0 {
            return "CLOSED".to_string();
        }
        format!("{}m {}s", remaining / 60, remaining % 60)
    }
}

/// Parsed market data from the Gamma API.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    /// Market slug.
    pub slug: Option<String>,
    /// Condition id.
    #[serde(rename = "conditionId")]
    pub condition_id: Option<String>,
    /// Market ID.
    pub id: Option<String>,
    /// CLOB token IDs; the API returns these JSON-encoded inside a string.
    #[serde(rename = "clobTokenIds")]
    pub clob_token_ids: Option<String>,
    /// Whether market is closed.
    pub closed: Option<bool>,
    /// Resolved outcome prices, JSON-encoded (e.g. `["1","0"]`).
    #[serde(rename = "outcomePrices")]
    pub outcome_prices: Option<String>,
    /// UMA resolution status.
    #[serde(rename = "umaResolutionStatus")]
    pub uma_resolution_status: Option<String>,
}

impl GammaMarket {
    /// UP and DOWN token ids, in that order.
    pub fn token_ids(&self) -> Result<(String, String), MarketError> {
        let raw = self
            .clob_token_ids
            .as_deref()
            .ok_or_else(|| MarketError::ParseError("No clobTokenIds".to_string()))?;
        let ids: Vec<String> = serde_json::from_str(raw)
            .map_err(|e| MarketError::ParseError(format!("bad clobTokenIds: {e}")))?;
        match <[String; 2]>::try_from(ids) {
            Ok([up, down]) => Ok((up, down)),
            Err(ids) => Err(MarketError::ParseError(format!(
                "Expected 2 token IDs, got {}",
                ids.len()
            ))),
        }
    }

    /// Winning side once the market is closed and prices are final.
    pub fn winner(&self) -> Option<Outcome> {
        if self.closed != Some(true) {
            return None;
        }
        let prices: Vec<String> = serde_json::from_str(self.outcome_prices.as_deref()?).ok()?;
        let prices: Vec<Decimal> = prices.iter().filter_map(|p| p.parse().ok()).collect();
        match prices.as_slice() {
            [up, down] if *up == Decimal::ONE && down.is_zero() => Some(Outcome::Up),
            [up, down] if up.is_zero() && *down == Decimal::ONE => Some(Outcome::Down),
            _ => None,
        }
    }

    /// Build an instrument for the window starting at `start_timestamp`.
    pub fn into_instrument(
        self,
        asset: &str,
        timeframe: Timeframe,
        start_timestamp: i64,
    ) -> Result<Instrument, MarketError> {
        let (up_token_id, down_token_id) = self.token_ids()?;
        let slug = self
            .slug
            .ok_or_else(|| MarketError::ParseError("market without slug".to_string()))?;
        Ok(Instrument {
            condition_id: self.condition_id.or(self.id).unwrap_or_default(),
            slug,
            up_token_id,
            down_token_id,
            asset: asset.to_lowercase(),
            timeframe,
            start_timestamp,
            end_timestamp: start_timestamp + timeframe.window_seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn instrument() -> Instrument {
        Instrument {
            slug: "btc-updown-15m-900".to_string(),
            condition_id: "cond".to_string(),
            up_token_id: "up-token".to_string(),
            down_token_id: "down-token".to_string(),
            asset: "btc".to_string(),
            timeframe: Timeframe::FifteenMin,
            start_timestamp: 900,
            end_timestamp: 1800,
        }
    }

    #[test]
    fn outcome_opposite_works() {
        assert_eq!(Outcome::Up.opposite(), Outcome::Down);
        assert_eq!(Outcome::Down.opposite(), Outcome::Up);
    }

    #[test]
    fn outcome_from_string_works() {
        assert_eq!(Outcome::from_str("up").unwrap(), Outcome::Up);
        assert_eq!(Outcome::from_str("NO").unwrap(), Outcome::Down);
        assert_eq!(Outcome::Up.to_string(), "up");
    }

    #[test]
    fn timeframe_labels_and_windows() {
        assert_eq!(Timeframe::from_str("4h").unwrap(), Timeframe::FourHour);
        assert_eq!(Timeframe::FifteenMin.to_string(), "15m");
        assert_eq!(Timeframe::FifteenMin.window_start(1_765_301_999), 1_765_301_400);
        assert!(Timeframe::FiveMin.is_fast());
        assert!(!Timeframe::Daily.is_fast());
    }

    #[test]
    fn instrument_token_lookup() {
        let inst = instrument();
        assert_eq!(inst.token_id(Outcome::Down), "down-token");
        assert_eq!(inst.outcome_of("up-token"), Some(Outcome::Up));
        assert_eq!(inst.outcome_of("other"), None);
    }

    fn gamma(closed: bool, prices: &str) -> GammaMarket {
        GammaMarket {
            slug: Some("btc-updown-15m-900".to_string()),
            condition_id: Some("0xcond".to_string()),
            id: Some("42".to_string()),
            clob_token_ids: Some(r#"["111","222"]"#.to_string()),
            closed: Some(closed),
            outcome_prices: Some(prices.to_string()),
            uma_resolution_status: None,
        }
    }

    #[test]
    fn gamma_market_to_instrument() {
        let inst = gamma(false, r#"["0.5","0.5"]"#)
            .into_instrument("BTC", Timeframe::FifteenMin, 900)
            .unwrap();
        assert_eq!(inst.up_token_id, "111");
        assert_eq!(inst.down_token_id, "222");
        assert_eq!(inst.asset, "btc");
        assert_eq!(inst.end_timestamp, 1800);
        assert_eq!(inst.condition_id, "0xcond");

        let mut bad = gamma(false, "[]");
        bad.clob_token_ids = Some(r#"["only"]"#.to_string());
        assert!(bad.token_ids().is_err());
    }

    #[test]
    fn gamma_winner_needs_closed_final_prices() {
        assert_eq!(gamma(true, r#"["1","0"]"#).winner(), Some(Outcome::Up));
        assert_eq!(gamma(true, r#"["0","1"]"#).winner(), Some(Outcome::Down));
        assert_eq!(gamma(false, r#"["1","0"]"#).winner(), None);
        assert_eq!(gamma(true, r#"["0.6","0.4"]"#).winner(), None);
    }

    #[test]
    fn instrument_expiry_math() {
        let inst = instrument();
        let now = OffsetDateTime::from_unix_timestamp(1_700).unwrap();
        assert_eq!(inst.seconds_to_expiry(now), 100);
        assert_eq!(inst.time_remaining_str(now), "1m 40s");
        assert!(!inst.is_closed(now));
        let later = OffsetDateTime::from_unix_timestamp(1_800).unwrap();
        assert!(inst.is_closed(later));
    }
}
