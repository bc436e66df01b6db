//! Instrument discovery for timed Up/Down series.
//!
//! Window slugs are computed as `{asset}-updown-{timeframe}-{window_start}`
//! and looked up on the Gamma API; a listing scan is the fallback.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::types::{GammaMarket, Instrument, Timeframe};
use crate::error::MarketError;

/// Gamma API base URL.
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

static SLUG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9]+)-updown-(5m|15m|1h|4h|daily)-(\d+)$").expect("valid regex")
});

/// Resolves the currently open instrument of a series.
#[async_trait]
pub trait MarketDiscovery: Send + Sync {
    /// Open instrument for `asset`/`timeframe` at `now`, if any.
    async fn discover(
        &self,
        asset: &str,
        timeframe: Timeframe,
        now: OffsetDateTime,
    ) -> Result<Option<Instrument>, MarketError>;
}

/// Slug of the window containing `unix_ts`.
pub fn window_slug(asset: &str, timeframe: Timeframe, unix_ts: i64) -> String {
    format!(
        "{}-updown-{}-{}",
        asset.to_lowercase(),
        timeframe,
        timeframe.window_start(unix_ts)
    )
}

/// Split a window slug into asset, timeframe and window start.
pub fn parse_slug(slug: &str) -> Option<(String, Timeframe, i64)> {
    let captures = SLUG_PATTERN.captures(slug)?;
    let asset = captures.get(1)?.as_str().to_string();
    let timeframe = captures.get(2)?.as_str().parse().ok()?;
    let start = captures.get(3)?.as_str().parse().ok()?;
    Some((asset, timeframe, start))
}

/// Slug of the window following `slug`.
pub fn next_slug(slug: &str) -> Result<String, MarketError> {
    let (asset, timeframe, start) = parse_slug(slug).ok_or_else(|| {
        MarketError::ParseError(format!("Slug not in expected format: {}", slug))
    })?;
    Ok(window_slug(
        &asset,
        timeframe,
        start + timeframe.window_seconds(),
    ))
}

/// Discovery backed by the Gamma markets API.
#[derive(Debug, Clone)]
pub struct GammaDiscovery {
    http: reqwest::Client,
    base_url: String,
}

impl GammaDiscovery {
    /// Create discovery against `base_url`.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch one market by slug.
    #[instrument(skip(self))]
    pub async fn fetch_by_slug(&self, slug: &str) -> Result<Option<GammaMarket>, MarketError> {
        let response = self
            .http
            .get(format!("{}/markets", self.base_url))
            .query(&[("slug", slug)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                slug: slug.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let markets: Vec<GammaMarket> = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse Gamma API response: {}", e))
        })?;
        Ok(markets.into_iter().find(|m| m.slug.as_deref() == Some(slug)))
    }

    /// Scan open markets for the earliest still-open window of the series.
    async fn scan_open(
        &self,
        asset: &str,
        timeframe: Timeframe,
        now: i64,
    ) -> Result<Option<(i64, GammaMarket)>, MarketError> {
        let response = self
            .http
            .get(format!("{}/markets", self.base_url))
            .query(&[("closed", "false"), ("limit", "500")])
            .send()
            .await?;

        let markets: Vec<GammaMarket> = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse Gamma API response: {}", e))
        })?;

        Ok(earliest_open(markets, asset, timeframe, now))
    }
}

/// Earliest market of the series whose window is open at `now`.
fn earliest_open(
    markets: Vec<GammaMarket>,
    asset: &str,
    timeframe: Timeframe,
    now: i64,
) -> Option<(i64, GammaMarket)> {
    markets
        .into_iter()
        .filter_map(|m| {
            let (a, tf, start) = parse_slug(m.slug.as_deref()?)?;
            let open = start <= now && now < start + tf.window_seconds();
            (a == asset && tf == timeframe && open).then_some((start, m))
        })
        .min_by_key(|(start, _)| *start)
}

#[async_trait]
impl MarketDiscovery for GammaDiscovery {
    #[instrument(skip(self))]
    async fn discover(
        &self,
        asset: &str,
        timeframe: Timeframe,
        now: OffsetDateTime,
    ) -> Result<Option<Instrument>, MarketError> {
        let ts = now.unix_timestamp();
        let slug = window_slug(asset, timeframe, ts);
        let start = timeframe.window_start(ts);

        match self.fetch_by_slug(&slug).await {
            Ok(Some(market)) if market.closed != Some(true) => {
                info!(slug = %slug, "Found market via computed slug");
                return market.into_instrument(asset, timeframe, start).map(Some);
            }
            Ok(_) => debug!(slug = %slug, "Computed slug not open"),
            Err(e) => debug!(slug = %slug, error = %e, "Computed slug lookup failed"),
        }

        match self.scan_open(&asset.to_lowercase(), timeframe, ts).await? {
            Some((start, market)) => {
                info!(slug = ?market.slug, "Found market via Gamma listing");
                market.into_instrument(asset, timeframe, start).map(Some)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_slug_rounds_to_window_start() {
        assert_eq!(
            window_slug("BTC", Timeframe::FifteenMin, 1_765_301_999),
            "btc-updown-15m-1765301400"
        );
        assert_eq!(
            window_slug("eth", Timeframe::FiveMin, 1_765_301_999),
            "eth-updown-5m-1765301700"
        );
    }

    #[test]
    fn next_slug_increments_by_window() {
        assert_eq!(
            next_slug("btc-updown-15m-1765301400").unwrap(),
            "btc-updown-15m-1765302300"
        );
        assert_eq!(
            next_slug("sol-updown-4h-1765296000").unwrap(),
            "sol-updown-4h-1765310400"
        );
        assert!(next_slug("will-it-rain").is_err());
    }

    #[test]
    fn parse_slug_extracts_parts() {
        assert_eq!(
            parse_slug("xrp-updown-1h-1765299600"),
            Some(("xrp".to_string(), Timeframe::OneHour, 1_765_299_600))
        );
        assert_eq!(parse_slug("btc-updown-2m-1"), None);
    }

    #[test]
    fn earliest_open_filters_series_and_window() {
        let market = |slug: &str| GammaMarket {
            slug: Some(slug.to_string()),
            condition_id: None,
            id: None,
            clob_token_ids: Some(r#"["a","b"]"#.to_string()),
            closed: Some(false),
            outcome_prices: None,
            uma_resolution_status: None,
        };
        let markets = vec![
            market("btc-updown-15m-1765302300"),
            market("btc-updown-15m-1765301400"),
            market("eth-updown-15m-1765301400"),
            market("btc-updown-5m-1765301400"),
            market("btc-updown-15m-1765300500"),
        ];

        let (start, m) =
            earliest_open(markets, "btc", Timeframe::FifteenMin, 1_765_301_500).unwrap();
        assert_eq!(start, 1_765_301_400);
        assert_eq!(m.slug.as_deref(), Some("btc-updown-15m-1765301400"));
    }

    #[tokio::test]
    #[ignore = "hits the live Gamma API"]
    async fn live_discovery_finds_btc_15m() {
        let discovery = GammaDiscovery::new(reqwest::Client::new(), GAMMA_API_URL);
        let found = discovery
            .discover("btc", Timeframe::FifteenMin, OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(found.is_some());
    }
}
