//! Settlement of expired instruments.
//!
//! An instrument becomes due `settlement_buffer_secs` after expiry. The
//! winner comes from an [`OutcomeOracle`]; in dry-run mode a configured
//! fallback is used once the oracle has been silent past the grace period.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::error::SettlementError;
use crate::market::{Instrument, Outcome};
use crate::trading::Position;

/// Authoritative source of a finished event's winning side.
#[async_trait]
pub trait OutcomeOracle: Send + Sync {
    /// Winner, or `None` while the result is not published.
    async fn resolve(&self, instrument: &Instrument) -> Result<Option<Outcome>, SettlementError>;
}

/// Winner to assume when the oracle stays silent in dry-run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OracleFallback {
    /// Never guess.
    None,
    /// Side with the higher last mid price.
    LastPrice,
    /// Always Up.
    Up,
    /// Always Down.
    Down,
}

/// Settlement timing and fallback policy.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Seconds after expiry before the oracle is asked.
    pub buffer_secs: i64,
    /// Further seconds of oracle silence before falling back.
    pub grace_secs: i64,
    /// Whether fallbacks are permitted at all.
    pub dry_run: bool,
    /// Fallback policy.
    pub fallback: OracleFallback,
    /// Seconds between "still pending" warnings.
    pub pending_warn_secs: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            buffer_secs: 120,
            grace_secs: 300,
            dry_run: true,
            fallback: OracleFallback::LastPrice,
            pending_warn_secs: 60,
        }
    }
}

/// Realised result of one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    /// Instrument slug.
    pub slug: String,
    /// Winning side.
    pub winner: Outcome,
    /// Whether the winner came from the fallback.
    pub fallback: bool,
    /// Winning shares redeemed at 1.
    pub payout: Decimal,
    /// Everything spent on both sides.
    pub total_cost: Decimal,
    /// `payout - total_cost`.
    pub profit: Decimal,
}

impl Settlement {
    /// Compute the settlement of `position` given the winner.
    pub fn compute(slug: &str, position: &Position, winner: Outcome, fallback: bool) -> Self {
        let payout = position.payout_if(winner);
        let total_cost = position.total_cost();
        Self {
            slug: slug.to_string(),
            winner,
            fallback,
            payout,
            total_cost,
            profit: payout - total_cost,
        }
    }
}

/// Last known mid prices, used by the `last_price` fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastMids {
    /// Up token mid.
    pub up: Option<Decimal>,
    /// Down token mid.
    pub down: Option<Decimal>,
}

/// Resolves due instruments exactly once.
#[derive(Debug)]
pub struct SettlementResolver {
    config: SettlementConfig,
    settled: HashSet<String>,
    last_warned: HashMap<String, OffsetDateTime>,
}

impl SettlementResolver {
    /// Create a resolver.
    pub fn new(config: SettlementConfig) -> Self {
        Self {
            config,
            settled: HashSet::new(),
            last_warned: HashMap::new(),
        }
    }

    /// Whether expiry plus buffer has passed.
    pub fn is_due(&self, instrument: &Instrument, now: OffsetDateTime) -> bool {
        now.unix_timestamp() >= instrument.end_timestamp + self.config.buffer_secs
    }

    /// Whether `slug` has already been settled.
    pub fn is_settled(&self, slug: &str) -> bool {
        self.settled.contains(slug)
    }

    /// Number of settled instruments.
    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }

    /// Try to settle `instrument`.
    ///
    /// Returns `Ok(None)` when not yet due, still waiting on the oracle, or
    /// already settled.
    #[instrument(skip_all, fields(slug = %instrument.slug))]
    pub async fn resolve(
        &mut self,
        instrument: &Instrument,
        position: &Position,
        mids: LastMids,
        oracle: &dyn OutcomeOracle,
        now: OffsetDateTime,
    ) -> Result<Option<Settlement>, SettlementError> {
        if self.is_settled(&instrument.slug) || !self.is_due(instrument, now) {
            return Ok(None);
        }

        let answer = match oracle.resolve(instrument).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Oracle lookup failed, will retry");
                None
            }
        };

        let (winner, fallback) = match answer {
            Some(winner) => (winner, false),
            None => match self.fallback_winner(instrument, mids, now) {
                Some(winner) => {
                    warn!(
                        %winner,
                        policy = %self.config.fallback,
                        "Oracle silent past grace period, settling with fallback"
                    );
                    (winner, true)
                }
                None => {
                    self.warn_pending(instrument, now);
                    return Ok(None);
                }
            },
        };

        let settlement = Settlement::compute(&instrument.slug, position, winner, fallback);
        self.settled.insert(instrument.slug.clone());
        self.last_warned.remove(&instrument.slug);
        crate::metrics::inc_settlements();
        info!(
            winner = %settlement.winner,
            payout = %settlement.payout,
            total_cost = %settlement.total_cost,
            profit = %settlement.profit,
            "Instrument settled"
        );
        Ok(Some(settlement))
    }

    fn fallback_winner(
        &self,
        instrument: &Instrument,
        mids: LastMids,
        now: OffsetDateTime,
    ) -> Option<Outcome> {
        let deadline = instrument.end_timestamp + self.config.buffer_secs + self.config.grace_secs;
        if !self.config.dry_run || now.unix_timestamp() < deadline {
            return None;
        }
        match self.config.fallback {
            OracleFallback::None => None,
            OracleFallback::Up => Some(Outcome::Up),
            OracleFallback::Down => Some(Outcome::Down),
            OracleFallback::LastPrice => match (mids.up, mids.down) {
                (Some(up), Some(down)) if down > up => Some(Outcome::Down),
                (Some(_), _) => Some(Outcome::Up),
                (None, Some(_)) => Some(Outcome::Down),
                (None, None) => None,
            },
        }
    }

    fn warn_pending(&mut self, instrument: &Instrument, now: OffsetDateTime) {
        let overdue = now.unix_timestamp() - instrument.end_timestamp;
        let due = match self.last_warned.get(&instrument.slug) {
            Some(last) => (now - *last).whole_seconds() >= self.config.pending_warn_secs,
            None => overdue >= self.config.buffer_secs + self.config.grace_secs,
        };
        if due {
            warn!(overdue_secs = overdue, "Outcome still unknown, settlement pending");
            self.last_warned.insert(instrument.slug.clone(), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{StaticOracle, Timeframe};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const END: i64 = 1_700_000_900;

    fn instrument() -> Instrument {
        Instrument {
            slug: "btc-updown-15m-1700000000".to_string(),
            condition_id: "c".to_string(),
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
            asset: "btc".to_string(),
            timeframe: Timeframe::FifteenMin,
            start_timestamp: END - 900,
            end_timestamp: END,
        }
    }

    fn at(offset: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(END + offset).unwrap()
    }

    fn position() -> Position {
        Position {
            up_shares: dec!(100),
            up_cost: dec!(47),
            down_shares: dec!(80),
            down_cost: dec!(47),
        }
    }

    fn resolver(dry_run: bool, fallback: OracleFallback) -> SettlementResolver {
        SettlementResolver::new(SettlementConfig {
            dry_run,
            fallback,
            ..SettlementConfig::default()
        })
    }

    #[tokio::test]
    async fn up_win_pays_up_shares() {
        let oracle = StaticOracle::new();
        oracle.set(&instrument().slug, Outcome::Up);
        let mut r = resolver(false, OracleFallback::None);

        let s = r
            .resolve(&instrument(), &position(), LastMids::default(), &oracle, at(120))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            s,
            Settlement {
                slug: instrument().slug,
                winner: Outcome::Up,
                fallback: false,
                payout: dec!(100),
                total_cost: dec!(94),
                profit: dec!(6),
            }
        );
    }

    #[tokio::test]
    async fn waits_for_buffer() {
        let oracle = StaticOracle::new();
        oracle.set(&instrument().slug, Outcome::Down);
        let mut r = resolver(false, OracleFallback::None);

        assert!(!r.is_due(&instrument(), at(119)));
        let s = r
            .resolve(&instrument(), &position(), LastMids::default(), &oracle, at(119))
            .await
            .unwrap();
        assert!(s.is_none());
        assert!(!r.is_settled(&instrument().slug));
    }

    #[tokio::test]
    async fn second_resolve_is_noop() {
        let oracle = StaticOracle::new();
        oracle.set(&instrument().slug, Outcome::Down);
        let mut r = resolver(false, OracleFallback::None);

        let first = r
            .resolve(&instrument(), &position(), LastMids::default(), &oracle, at(200))
            .await
            .unwrap();
        assert_eq!(first.map(|s| s.payout), Some(dec!(80)));

        let second = r
            .resolve(&instrument(), &position(), LastMids::default(), &oracle, at(201))
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(r.settled_count(), 1);
    }

    #[tokio::test]
    async fn live_mode_stays_pending_on_silence() {
        let oracle = StaticOracle::new();
        let mut r = resolver(false, OracleFallback::LastPrice);
        let mids = LastMids {
            up: Some(dec!(0.9)),
            down: Some(dec!(0.1)),
        };

        let s = r
            .resolve(&instrument(), &position(), mids, &oracle, at(10_000))
            .await
            .unwrap();
        assert!(s.is_none());
    }

    #[tokio::test]
    async fn dry_run_falls_back_after_grace() {
        let oracle = StaticOracle::new();
        let mut r = resolver(true, OracleFallback::LastPrice);
        let mids = LastMids {
            up: Some(dec!(0.2)),
            down: Some(dec!(0.8)),
        };

        let early = r
            .resolve(&instrument(), &position(), mids, &oracle, at(419))
            .await
            .unwrap();
        assert!(early.is_none());

        let s = r
            .resolve(&instrument(), &position(), mids, &oracle, at(420))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.winner, Outcome::Down);
        assert!(s.fallback);
        assert_eq!(s.profit, dec!(-14));
    }

    #[tokio::test]
    async fn oracle_errors_count_as_silence() {
        let oracle = StaticOracle::new();
        oracle.set(&instrument().slug, Outcome::Up);
        oracle.set_failing(true);
        let mut r = resolver(true, OracleFallback::Down);

        let pending = r
            .resolve(&instrument(), &position(), LastMids::default(), &oracle, at(130))
            .await
            .unwrap();
        assert!(pending.is_none());

        let s = r
            .resolve(&instrument(), &position(), LastMids::default(), &oracle, at(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.winner, Outcome::Down);
    }

    #[test]
    fn last_price_needs_some_mid() {
        let r = resolver(true, OracleFallback::LastPrice);
        assert_eq!(r.fallback_winner(&instrument(), LastMids::default(), at(1000)), None);
        let up_only = LastMids {
            up: Some(dec!(0.4)),
            down: None,
        };
        assert_eq!(
            r.fallback_winner(&instrument(), up_only, at(1000)),
            Some(Outcome::Up)
        );
    }

    #[test]
    fn fallback_parses_from_config_strings() {
        assert_eq!("last_price".parse::<OracleFallback>().unwrap(), OracleFallback::LastPrice);
        assert_eq!(OracleFallback::None.to_string(), "none");
    }
}
