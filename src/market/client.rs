//! Polymarket REST client: live execution gateway, book snapshots, outcome oracle.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::types::{GammaMarket, Instrument, Outcome};
use crate::config::Config;
use crate::error::{BotError, MarketError, SettlementError, TradingError};
use crate::orderbook::aggregator::{aggregate_levels, top_asks, top_bids};
use crate::orderbook::{BookSnapshot, PriceLevel};
use crate::settlement::OutcomeOracle;
use crate::signing;
use crate::trading::execution::parse_order_state;
use crate::trading::{
    ExecutionGateway, OrderParams, OrderState, PostOrderResponse, SignedOrder, TimeInForce,
};

/// Polymarket CLOB + Gamma client.
#[derive(Debug, Clone)]
pub struct PolymarketClient {
    http: reqwest::Client,
    clob_url: String,
    gamma_url: String,
    private_key: String,
    signature_type: u8,
    funder: Option<String>,
    book_depth: usize,
}

/// Order book response from the CLOB API.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookResponse {
    /// Bid levels.
    pub bids: Option<Vec<OrderLevel>>,
    /// Ask levels.
    pub asks: Option<Vec<OrderLevel>>,
    /// Asset ID.
    pub asset_id: Option<String>,
}

/// Single price level in an API book.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderLevel {
    /// Price at this level.
    pub price: String,
    /// Size available at this level.
    pub size: String,
}

impl PolymarketClient {
    /// Create a client with the configured HTTP tuning.
    pub fn new(config: &Config) -> Result<Self, BotError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_millis(500))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(config.http_pool_size)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            clob_url: config.polymarket_clob_url.trim_end_matches('/').to_string(),
            gamma_url: config.polymarket_gamma_url.trim_end_matches('/').to_string(),
            private_key: config.polymarket_private_key.clone().unwrap_or_default(),
            signature_type: config.polymarket_signature_type,
            funder: config.polymarket_funder.clone(),
            book_depth: config.book_depth,
        })
    }

    /// HTTP client, shared with discovery.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// CLOB base URL.
    pub fn clob_url(&self) -> &str {
        &self.clob_url
    }

    /// Maker address: the funder for proxy wallets, else the key's address.
    pub fn maker_address(&self) -> Result<String, TradingError> {
        match &self.funder {
            Some(funder) if self.signature_type != 0 => Ok(funder.clone()),
            _ => signing::address_from_private_key(&self.private_key),
        }
    }

    /// Current book for a token.
    #[instrument(skip(self), fields(token_id = %token_id))]
    pub async fn get_order_book(&self, token_id: &str) -> Result<BookSnapshot, MarketError> {
        let response = self
            .http
            .get(format!("{}/book", self.clob_url))
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                slug: token_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let book: OrderBookResponse = response
            .json()
            .await
            .map_err(|e| MarketError::ParseError(format!("Failed to parse order book: {}", e)))?;

        Ok(convert_order_book(
            token_id,
            book,
            self.book_depth,
            OffsetDateTime::now_utc(),
        ))
    }

    async fn authed(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, TradingError> {
        let headers =
            signing::generate_auth_headers(&self.private_key, OffsetDateTime::now_utc()).await?;
        Ok(headers
            .into_iter()
            .fold(request, |req, (key, value)| req.header(key, value)))
    }
}

/// Convert an API book into a depth-limited snapshot.
pub fn convert_order_book(
    token_id: &str,
    response: OrderBookResponse,
    depth: usize,
    at: OffsetDateTime,
) -> BookSnapshot {
    let parse = |levels: Option<Vec<OrderLevel>>| -> Vec<PriceLevel> {
        levels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|l| Some(PriceLevel::new(l.price.parse().ok()?, l.size.parse().ok()?)))
            .collect()
    };

    BookSnapshot {
        token_id: token_id.to_string(),
        bids: top_bids(&aggregate_levels(&parse(response.bids)), depth),
        asks: top_asks(&aggregate_levels(&parse(response.asks)), depth),
        updated_at: at,
    }
}

/// JSON body of a CLOB order post.
pub fn order_body(order: &SignedOrder, tif: TimeInForce, owner: &str) -> serde_json::Value {
    let p = &order.params;
    serde_json::json!({
        "order": {
            "salt": order.salt,
            "maker": order.maker,
            "signer": order.maker,
            "tokenId": p.token_id,
            "price": p.price.normalize().to_string(),
            "size": p.size.normalize().to_string(),
            "side": p.side.to_string(),
            "expiration": order.expiration,
            "signature": order.signature,
        },
        "owner": owner,
        "orderType": tif.to_string(),
    })
}

#[async_trait]
impl ExecutionGateway for PolymarketClient {
    async fn create_order(&self, params: &OrderParams) -> Result<SignedOrder, TradingError> {
        params.validate().map_err(TradingError::InvalidParams)?;
        let maker = self.maker_address()?;
        let salt = OffsetDateTime::now_utc().unix_timestamp_nanos().to_string();
        let expiration = "0".to_string();
        let signature =
            signing::sign_order(&self.private_key, params, &maker, &salt, &expiration).await?;
        Ok(SignedOrder {
            params: params.clone(),
            maker,
            salt,
            expiration,
            signature,
        })
    }

    #[instrument(skip(self, order), fields(token = %order.params.token_id))]
    async fn post_order(
        &self,
        order: &SignedOrder,
        tif: TimeInForce,
    ) -> Result<PostOrderResponse, TradingError> {
        let owner = signing::address_from_private_key(&self.private_key)?;
        let request = self
            .http
            .post(format!("{}/order", self.clob_url))
            .json(&order_body(order, tif, &owner));
        let response = self
            .authed(request)
            .await?
            .send()
            .await
            .map_err(|e| TradingError::SubmissionFailed(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TradingError::SubmissionFailed(format!(
                "HTTP {} - {}",
                status, body
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| TradingError::SubmissionFailed(format!("bad post response: {e}")))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, TradingError> {
        let request = self
            .http
            .get(format!("{}/data/order/{}", self.clob_url, order_id));
        let response = self
            .authed(request)
            .await?
            .send()
            .await
            .map_err(|e| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        let json: serde_json::Value =
            response.json().await.map_err(|e| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(parse_order_state(order_id, &json))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError> {
        let request = self
            .http
            .delete(format!("{}/order", self.clob_url))
            .json(&serde_json::json!({ "orderID": order_id }));
        let response = self
            .authed(request)
            .await?
            .send()
            .await
            .map_err(|e| TradingError::CancelFailed {
                order_id: order_id.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(TradingError::CancelFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        debug!(order_id, "Cancel acknowledged");
        Ok(())
    }
}

#[async_trait]
impl OutcomeOracle for PolymarketClient {
    async fn resolve(&self, instrument: &Instrument) -> Result<Option<Outcome>, SettlementError> {
        let failed = |reason: String| SettlementError::OracleFailed {
            slug: instrument.slug.clone(),
            reason,
        };
        let response = self
            .http
            .get(format!("{}/markets", self.gamma_url))
            .query(&[("slug", instrument.slug.as_str())])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }
        let markets: Vec<GammaMarket> =
            response.json().await.map_err(|e| failed(e.to_string()))?;

        let winner = markets
            .iter()
            .find(|m| m.slug.as_deref() == Some(instrument.slug.as_str()))
            .and_then(GammaMarket::winner);
        if winner.is_none() {
            debug!(slug = %instrument.slug, "Outcome not published yet");
        }
        Ok(winner)
    }
}

/// Decimal price from a level string; zero for garbage.
pub fn parse_price(s: &str) -> Decimal {
    s.parse().unwrap_or_else(|_| {
        warn!(value = s, "Unparseable price");
        Decimal::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn config() -> Config {
        Config {
            polymarket_private_key: Some(KEY.to_string()),
            polymarket_clob_url: "https://clob.polymarket.com/".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn client_creation_trims_urls() {
        let client = PolymarketClient::new(&config()).unwrap();
        assert_eq!(client.clob_url(), "https://clob.polymarket.com");
        let addr = client.maker_address().unwrap();
        assert_eq!(addr.len(), 42);
    }

    #[test]
    fn proxy_wallets_use_funder_as_maker() {
        let cfg = Config {
            polymarket_signature_type: 1,
            polymarket_funder: Some("0xfunder".to_string()),
            ..config()
        };
        let client = PolymarketClient::new(&cfg).unwrap();
        assert_eq!(client.maker_address().unwrap(), "0xfunder");
    }

    #[test]
    fn api_book_is_aggregated_and_sorted() {
        let json = serde_json::json!({
            "asset_id": "tok",
            "bids": [{"price": "0.44", "size": "5"}, {"price": "0.46", "size": "3"}, {"price": "0.46", "size": "2"}],
            "asks": [{"price": "0.52", "size": "7"}, {"price": "0.50", "size": "1"}, {"price": "bad", "size": "1"}]
        });
        let response: OrderBookResponse = serde_json::from_value(json).unwrap();
        let book = convert_order_book("tok", response, 10, OffsetDateTime::UNIX_EPOCH);

        assert_eq!(book.best_bid(), Some(dec!(0.46)));
        assert_eq!(book.bid_size(), dec!(5));
        assert_eq!(book.best_ask(), Some(dec!(0.50)));
        assert_eq!(book.asks.len(), 2);
    }

    #[test]
    fn order_body_shape() {
        let order = SignedOrder {
            params: OrderParams::buy("tok", dec!(0.450), dec!(10)),
            maker: "0xm".to_string(),
            salt: "1".to_string(),
            expiration: "0".to_string(),
            signature: "0xsig".to_string(),
        };
        let body = order_body(&order, TimeInForce::FAK, "0xo");
        assert_eq!(body["orderType"], "FAK");
        assert_eq!(body["order"]["price"], "0.45");
        assert_eq!(body["order"]["side"], "BUY");
        assert_eq!(body["owner"], "0xo");
    }

    #[test]
    fn garbage_prices_parse_to_zero() {
        assert_eq!(parse_price("0.51"), dec!(0.51));
        assert_eq!(parse_price("x"), Decimal::ZERO);
    }
}
