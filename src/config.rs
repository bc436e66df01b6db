//! Application configuration loaded from environment variables.
//!
//! Every option has a default; an empty environment yields a working
//! dry-run configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::arbitrage::{DecisionConfig, GridConfig, PriceBounds};
use crate::market::Timeframe;
use crate::settlement::{OracleFallback, SettlementConfig};
use crate::trading::{LedgerConfig, LifecycleConfig};

/// Which strategy drives order placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StrategyMode {
    /// Per-tick decision engine.
    Reactive,
    /// Ladder placed once per event.
    Grid,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Polymarket Credentials ===
    /// Wallet private key (hex, starts with 0x). Live mode only.
    #[serde(default)]
    pub polymarket_private_key: Option<String>,

    /// Optional pre-generated API key.
    #[serde(default)]
    pub polymarket_api_key: Option<String>,

    /// Optional API secret.
    #[serde(default)]
    pub polymarket_api_secret: Option<String>,

    /// Optional API passphrase.
    #[serde(default)]
    pub polymarket_api_passphrase: Option<String>,

    /// Signature type: 0=EOA, 1=proxy, 2=Gnosis Safe.
    #[serde(default)]
    pub polymarket_signature_type: u8,

    /// Proxy wallet address.
    #[serde(default)]
    pub polymarket_funder: Option<String>,

    // === Operation Modes ===
    /// Simulation mode (paper exchange, no real orders).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Strategy selector.
    #[serde(default = "default_strategy_mode")]
    pub strategy_mode: StrategyMode,

    /// Comma separated assets, e.g. `btc,eth`.
    #[serde(default = "default_assets")]
    pub assets: String,

    /// Trade 5 minute events.
    #[serde(default)]
    pub enable_5m: bool,

    /// Trade 15 minute events.
    #[serde(default = "default_true")]
    pub enable_15m: bool,

    /// Trade hourly events.
    #[serde(default)]
    pub enable_1h: bool,

    /// Trade 4 hour events.
    #[serde(default)]
    pub enable_4h: bool,

    /// Trade daily events.
    #[serde(default)]
    pub enable_daily: bool,

    /// Starting balance for simulation.
    #[serde(default = "default_sim_balance")]
    pub sim_balance: Decimal,

    // === Pricing ===
    /// Combined-cost ceiling for new pairs.
    #[serde(default = "default_cost_ceiling")]
    pub cost_ceiling: Decimal,

    /// Ask below which a side counts as cheap.
    #[serde(default = "default_cheap_price_threshold")]
    pub cheap_price_threshold: Decimal,

    /// Added to the best bid for a resting price.
    #[serde(default = "default_tick")]
    pub rest_price_offset: Decimal,

    /// Minimum resting price in a take+rest.
    #[serde(default = "default_min_price")]
    pub rest_price_floor: Decimal,

    /// Lowest UP price.
    #[serde(default = "default_min_price")]
    pub up_min_price: Decimal,

    /// Highest UP price.
    #[serde(default = "default_max_price")]
    pub up_max_price: Decimal,

    /// Lowest DOWN price.
    #[serde(default = "default_min_price")]
    pub down_min_price: Decimal,

    /// Highest DOWN price.
    #[serde(default = "default_max_price")]
    pub down_max_price: Decimal,

    /// Venue price increment.
    #[serde(default = "default_tick")]
    pub tick_size: Decimal,

    // === Sizing ===
    /// Target shares per leg.
    #[serde(default = "default_order_size")]
    pub order_size: Decimal,

    /// Venue minimum order size.
    #[serde(default = "default_min_order_size")]
    pub min_order_size: Decimal,

    /// Cap for hedge and rebalance legs.
    #[serde(default = "default_max_order_size")]
    pub max_order_size: Decimal,

    /// Shares held plus resting allowed per side per event.
    #[serde(default = "default_max_shares_per_side")]
    pub max_shares_per_side: Decimal,

    // === Rebalancing ===
    /// Absolute imbalance that forces a rebalance.
    #[serde(default = "default_max_imbalance_shares")]
    pub max_imbalance_shares: Decimal,

    /// Imbalance ratio threshold for 5m/15m events.
    #[serde(default = "default_imbalance_ratio_fast")]
    pub imbalance_ratio_fast: Decimal,

    /// Imbalance ratio threshold for longer events.
    #[serde(default = "default_imbalance_ratio_slow")]
    pub imbalance_ratio_slow: Decimal,

    /// Ratio check ignored below this absolute imbalance.
    #[serde(default = "default_rebalance_min_imbalance")]
    pub rebalance_min_imbalance: Decimal,

    // === Timing ===
    /// Driver tick in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum milliseconds between trade submissions.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Pending resting order timeout.
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,

    /// Seconds before expiry when every open order is canceled.
    #[serde(default = "default_expiry_cancel_secs")]
    pub expiry_cancel_secs: i64,

    /// Pairing timer length.
    #[serde(default = "default_pairing_timeout_secs")]
    pub pairing_timeout_secs: u64,

    /// Relaxed pairing ceiling is `1 + pairing_max_overpay`.
    #[serde(default = "default_pairing_max_overpay")]
    pub pairing_max_overpay: Decimal,

    /// Books older than this are ignored.
    #[serde(default = "default_book_stale_secs")]
    pub book_stale_secs: u64,

    /// Levels kept per book side.
    #[serde(default = "default_book_depth")]
    pub book_depth: usize,

    // === Settlement ===
    /// Wait after expiry before asking the oracle.
    #[serde(default = "default_settlement_buffer_secs")]
    pub settlement_buffer_secs: i64,

    /// Extra oracle wait before the dry-run fallback.
    #[serde(default = "default_oracle_grace_secs")]
    pub oracle_grace_secs: i64,

    /// Dry-run fallback when the oracle stays silent.
    #[serde(default = "default_oracle_fallback")]
    pub oracle_fallback: OracleFallback,

    // === Grid ===
    /// Lowest UP level.
    #[serde(default = "default_grid_low")]
    pub grid_low: Decimal,

    /// Highest UP level.
    #[serde(default = "default_grid_high")]
    pub grid_high: Decimal,

    /// Level spacing.
    #[serde(default = "default_grid_step")]
    pub grid_step: Decimal,

    /// Shares per grid order.
    #[serde(default = "default_min_order_size")]
    pub grid_order_size: Decimal,

    // === Endpoints ===
    /// WebSocket base URL.
    #[serde(default = "default_ws_url")]
    pub polymarket_ws_url: String,

    /// CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub polymarket_clob_url: String,

    /// Gamma API base URL.
    #[serde(default = "default_gamma_url")]
    pub polymarket_gamma_url: String,

    /// Fixed reconnect backoff.
    #[serde(default = "default_ws_reconnect_delay_secs")]
    pub ws_reconnect_delay_secs: u64,

    /// Forced reconnect after this much silence.
    #[serde(default = "default_ws_heartbeat_timeout_secs")]
    pub ws_heartbeat_timeout_secs: u64,

    /// REST request timeout.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Idle REST connections kept per host.
    #[serde(default = "default_http_pool_size")]
    pub http_pool_size: usize,

    /// How often new events are looked up.
    #[serde(default = "default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_strategy_mode() -> StrategyMode {
    StrategyMode::Reactive
}

fn default_assets() -> String {
    "btc".to_string()
}

fn default_sim_balance() -> Decimal {
    Decimal::new(1000, 0) // $1000
}

fn default_cost_ceiling() -> Decimal {
    Decimal::new(98, 2) // 0.98
}

fn default_cheap_price_threshold() -> Decimal {
    Decimal::new(35, 2) // 0.35
}

fn default_tick() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_min_price() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_max_price() -> Decimal {
    Decimal::new(95, 2) // 0.95
}

fn default_order_size() -> Decimal {
    Decimal::new(10, 0)
}

fn default_min_order_size() -> Decimal {
    Decimal::new(5, 0)
}

fn default_max_order_size() -> Decimal {
    Decimal::new(100, 0)
}

fn default_max_shares_per_side() -> Decimal {
    Decimal::new(500, 0)
}

fn default_max_imbalance_shares() -> Decimal {
    Decimal::new(30, 0)
}

fn default_imbalance_ratio_fast() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

fn default_imbalance_ratio_slow() -> Decimal {
    Decimal::new(30, 2) // 0.30
}

fn default_rebalance_min_imbalance() -> Decimal {
    Decimal::new(10, 0)
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_cooldown_ms() -> u64 {
    1000
}

fn default_order_timeout_secs() -> u64 {
    30
}

fn default_expiry_cancel_secs() -> i64 {
    90
}

fn default_pairing_timeout_secs() -> u64 {
    60
}

fn default_pairing_max_overpay() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_book_stale_secs() -> u64 {
    10
}

fn default_book_depth() -> usize {
    10
}

fn default_settlement_buffer_secs() -> i64 {
    120
}

fn default_oracle_grace_secs() -> i64 {
    300
}

fn default_oracle_fallback() -> OracleFallback {
    OracleFallback::LastPrice
}

fn default_grid_low() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_grid_high() -> Decimal {
    Decimal::new(90, 2) // 0.90
}

fn default_grid_step() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_gamma_url() -> String {
    crate::market::GAMMA_API_URL.to_string()
}

fn default_ws_reconnect_delay_secs() -> u64 {
    5
}

fn default_ws_heartbeat_timeout_secs() -> u64 {
    30
}

fn default_http_timeout_ms() -> u64 {
    2000
}

fn default_http_pool_size() -> usize {
    10
}

fn default_discovery_interval_secs() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            polymarket_private_key: None,
            polymarket_api_key: None,
            polymarket_api_secret: None,
            polymarket_api_passphrase: None,
            polymarket_signature_type: 0,
            polymarket_funder: None,
            dry_run: true,
            strategy_mode: default_strategy_mode(),
            assets: default_assets(),
            enable_5m: false,
            enable_15m: true,
            enable_1h: false,
            enable_4h: false,
            enable_daily: false,
            sim_balance: default_sim_balance(),
            cost_ceiling: default_cost_ceiling(),
            cheap_price_threshold: default_cheap_price_threshold(),
            rest_price_offset: default_tick(),
            rest_price_floor: default_min_price(),
            up_min_price: default_min_price(),
            up_max_price: default_max_price(),
            down_min_price: default_min_price(),
            down_max_price: default_max_price(),
            tick_size: default_tick(),
            order_size: default_order_size(),
            min_order_size: default_min_order_size(),
            max_order_size: default_max_order_size(),
            max_shares_per_side: default_max_shares_per_side(),
            max_imbalance_shares: default_max_imbalance_shares(),
            imbalance_ratio_fast: default_imbalance_ratio_fast(),
            imbalance_ratio_slow: default_imbalance_ratio_slow(),
            rebalance_min_imbalance: default_rebalance_min_imbalance(),
            poll_interval_ms: default_poll_interval_ms(),
            cooldown_ms: default_cooldown_ms(),
            order_timeout_secs: default_order_timeout_secs(),
            expiry_cancel_secs: default_expiry_cancel_secs(),
            pairing_timeout_secs: default_pairing_timeout_secs(),
            pairing_max_overpay: default_pairing_max_overpay(),
            book_stale_secs: default_book_stale_secs(),
            book_depth: default_book_depth(),
            settlement_buffer_secs: default_settlement_buffer_secs(),
            oracle_grace_secs: default_oracle_grace_secs(),
            oracle_fallback: default_oracle_fallback(),
            grid_low: default_grid_low(),
            grid_high: default_grid_high(),
            grid_step: default_grid_step(),
            grid_order_size: default_min_order_size(),
            polymarket_ws_url: default_ws_url(),
            polymarket_clob_url: default_clob_url(),
            polymarket_gamma_url: default_gamma_url(),
            ws_reconnect_delay_secs: default_ws_reconnect_delay_secs(),
            ws_heartbeat_timeout_secs: default_ws_heartbeat_timeout_secs(),
            http_timeout_ms: default_http_timeout_ms(),
            http_pool_size: default_http_pool_size(),
            discovery_interval_secs: default_discovery_interval_secs(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check numeric settings for consistency.
    pub fn validate(&self) -> Result<(), String> {
        let unit = |name: &str, v: Decimal| {
            if v > Decimal::ZERO && v < Decimal::ONE {
                Ok(())
            } else {
                Err(format!("{name} must be between 0 and 1, got {v}"))
            }
        };
        unit("COST_CEILING", self.cost_ceiling)?;
        unit("TICK_SIZE", self.tick_size)?;
        unit("GRID_STEP", self.grid_step)?;
        for (name, min, max) in [
            ("UP", self.up_min_price, self.up_max_price),
            ("DOWN", self.down_min_price, self.down_max_price),
        ] {
            unit(&format!("{name}_MIN_PRICE"), min)?;
            unit(&format!("{name}_MAX_PRICE"), max)?;
            if min > max {
                return Err(format!("{name}_MIN_PRICE must not exceed {name}_MAX_PRICE"));
            }
        }
        if self.grid_low > self.grid_high {
            return Err("GRID_LOW must not exceed GRID_HIGH".to_string());
        }
        if self.min_order_size <= Decimal::ZERO {
            return Err("MIN_ORDER_SIZE must be positive".to_string());
        }
        if self.order_size < self.min_order_size {
            return Err(format!(
                "ORDER_SIZE {} is below MIN_ORDER_SIZE {}",
                self.order_size, self.min_order_size
            ));
        }
        if self.max_order_size < self.order_size {
            return Err("MAX_ORDER_SIZE must be at least ORDER_SIZE".to_string());
        }
        if self.grid_order_size < self.min_order_size {
            return Err("GRID_ORDER_SIZE is below MIN_ORDER_SIZE".to_string());
        }
        if self.max_imbalance_shares <= Decimal::ZERO {
            return Err("MAX_IMBALANCE_SHARES must be positive".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("POLL_INTERVAL_MS must be positive".to_string());
        }
        if self.asset_list().is_empty() {
            return Err("ASSETS must name at least one asset".to_string());
        }
        if self.timeframes().is_empty() {
            return Err("at least one ENABLE_<timeframe> flag must be set".to_string());
        }
        Ok(())
    }

    /// Credential checks for live trading.
    pub fn validate_live(&self) -> Result<(), String> {
        self.validate()?;
        if self.dry_run {
            return Ok(());
        }
        let key = self
            .polymarket_private_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| "POLYMARKET_PRIVATE_KEY is required for live trading".to_string())?;
        if !key.starts_with("0x") {
            return Err("POLYMARKET_PRIVATE_KEY must start with 0x".to_string());
        }
        if self.polymarket_signature_type != 0 && self.polymarket_funder.is_none() {
            return Err("POLYMARKET_FUNDER is required for proxy wallets".to_string());
        }
        Ok(())
    }

    /// Lowercased asset symbols.
    pub fn asset_list(&self) -> Vec<String> {
        self.assets
            .split(',')
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect()
    }

    /// Enabled timeframes, shortest first.
    pub fn timeframes(&self) -> Vec<Timeframe> {
        Timeframe::ALL
            .into_iter()
            .filter(|tf| match tf {
                Timeframe::FiveMin => self.enable_5m,
                Timeframe::FifteenMin => self.enable_15m,
                Timeframe::OneHour => self.enable_1h,
                Timeframe::FourHour => self.enable_4h,
                Timeframe::Daily => self.enable_daily,
            })
            .collect()
    }

    fn up_bounds(&self) -> PriceBounds {
        PriceBounds {
            min: self.up_min_price,
            max: self.up_max_price,
        }
    }

    fn down_bounds(&self) -> PriceBounds {
        PriceBounds {
            min: self.down_min_price,
            max: self.down_max_price,
        }
    }

    /// Decision engine parameters.
    pub fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            cost_ceiling: self.cost_ceiling,
            cheap_price_threshold: self.cheap_price_threshold,
            rest_price_offset: self.rest_price_offset,
            rest_price_floor: self.rest_price_floor,
            up_bounds: self.up_bounds(),
            down_bounds: self.down_bounds(),
            tick_size: self.tick_size,
            order_size: self.order_size,
            min_order_size: self.min_order_size,
            max_order_size: self.max_order_size,
            max_shares_per_side: self.max_shares_per_side,
            max_imbalance_shares: self.max_imbalance_shares,
        }
    }

    /// Lifecycle policy; grid ladders never time out.
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            order_timeout: match self.strategy_mode {
                StrategyMode::Reactive => Some(Duration::from_secs(self.order_timeout_secs)),
                StrategyMode::Grid => None,
            },
            expiry_cancel_secs: self.expiry_cancel_secs,
            pairing_timeout: Duration::from_secs(self.pairing_timeout_secs),
            pairing_max_overpay: self.pairing_max_overpay,
        }
    }

    /// Rebalance policy.
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            imbalance_ratio_fast: self.imbalance_ratio_fast,
            imbalance_ratio_slow: self.imbalance_ratio_slow,
            min_imbalance: self.rebalance_min_imbalance,
        }
    }

    /// Grid ladder parameters.
    pub fn grid_config(&self) -> GridConfig {
        GridConfig {
            low: self.grid_low,
            high: self.grid_high,
            step: self.grid_step,
            order_size: self.grid_order_size,
            cost_ceiling: self.cost_ceiling,
            tick_size: self.tick_size,
            up_bounds: self.up_bounds(),
            down_bounds: self.down_bounds(),
        }
    }

    /// Settlement timing and fallback.
    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            buffer_secs: self.settlement_buffer_secs,
            grace_secs: self.oracle_grace_secs,
            dry_run: self.dry_run,
            fallback: self.oracle_fallback,
            ..SettlementConfig::default()
        }
    }

    /// Driver tick.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// System-wide submission cooldown.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Book freshness window.
    pub fn book_freshness(&self) -> Duration {
        Duration::from_secs(self.book_stale_secs)
    }
}
