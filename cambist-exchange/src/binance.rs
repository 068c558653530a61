use crate::{opened_now, parse_f64, with_redirect_retry, Exchange};
use cambist_data::{format_coin, Candle, CurrencyTick, LotSize, LotSizeHolder, MarketOrder, Side};
use cambist_instrument::{CandleInterval, Currency, ExchangeId, Market};
use cambist_integration::{
    canonical_query, client::HttpParser, signer, Credentials, ExchangeError, RestClient,
};
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

const API_URL: &str = "https://api.binance.com";
const RECV_WINDOW: &str = "5000";

/// Binance adapter over the spot v3 REST API.
///
/// Signed endpoints append a millisecond `timestamp` taken from the venue's own
/// server clock plus a `signature` — the HMAC-SHA256 hex digest of the canonical
/// query string — and carry the API key in the `X-MBX-APIKEY` header.
pub struct Binance {
    client: RestClient,
    credentials: Credentials,
    api_url: String,
}

impl Binance {
    /// Constructs a new [`Binance`] adapter against the production endpoint.
    pub fn new() -> Result<Self, ExchangeError> {
        Self::with_url(API_URL.to_owned())
    }

    /// Constructs a [`Binance`] adapter against an alternative endpoint (tests).
    pub fn with_url(api_url: String) -> Result<Self, ExchangeError> {
        Ok(Self {
            client: RestClient::new()?,
            credentials: Credentials::default(),
            api_url,
        })
    }

    /// Millisecond timestamp for signed requests, from the venue's server clock.
    fn server_time(&self) -> Result<i64, ExchangeError> {
        let (status, payload) = self
            .client
            .get(&format!("{}/api/v3/time", self.api_url), &[], &[])?;
        let time: ServerTime = self.parse(status, &payload)?;
        Ok(time.server_time)
    }

    fn signed_query(&self, query: &[(&str, String)]) -> Result<String, ExchangeError> {
        let mut pairs: Vec<(&str, String)> = query.to_vec();
        pairs.push(("recvWindow", RECV_WINDOW.to_owned()));
        pairs.push(("timestamp", self.server_time()?.to_string()));

        let canonical = canonical_query(&pairs)?;
        let signature = signer::sign_sha256_hex(&self.credentials.secret_key, &canonical)?;
        Ok(format!("{canonical}&signature={signature}"))
    }

    fn auth_header(&self) -> Vec<(&'static str, String)> {
        vec![("X-MBX-APIKEY", self.credentials.api_key.clone())]
    }

    fn signed_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}?{}", self.api_url, path, self.signed_query(query)?);
        let (status, payload) = self.client.get(&url, &[], &self.auth_header())?;
        self.parse(status, &payload)
    }

    fn place(
        &self,
        market: Market,
        side: Side,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError> {
        let side_token = match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let query = self.signed_query(&[
            ("symbol", market.symbol(ExchangeId::Binance)),
            ("side", side_token.to_owned()),
            ("type", "LIMIT".to_owned()),
            ("timeInForce", "GTC".to_owned()),
            ("quantity", format_coin(quantity)),
            ("price", format_coin(rate)),
        ])?;

        let url = format!("{}/api/v3/order?{}", self.api_url, query);
        let (status, payload) = self.client.post_form(&url, String::new(), &self.auth_header())?;
        let placed: PlacedOrder = self.parse(status, &payload)?;

        debug!(order_id = placed.order_id, %market, %side, "binance order placed");
        Ok(MarketOrder {
            db_id: 0,
            uuid: placed.order_id.to_string(),
            base: market.base,
            traded: market.traded,
            side,
            exchange: ExchangeId::Binance,
            quantity,
            price: rate,
            opened_at: opened_now(),
            canceled: false,
        })
    }
}

impl HttpParser for Binance {
    type ApiError = ApiError;

    fn parse_api_error(&self, _status: StatusCode, error: Self::ApiError) -> ExchangeError {
        match error.code {
            // -1121 "Invalid symbol", -1100 "Illegal characters found in parameter"
            -1121 | -1100 => ExchangeError::InvalidPair,
            // -2013 "Order does not exist"
            -2013 => ExchangeError::NoData,
            // -2010 covers NEW_ORDER_REJECTED, including the insufficient balance case
            _ => ExchangeError::from_venue_message(error.msg),
        }
    }
}

impl Exchange for Binance {
    fn id(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    fn get_ticker(&self, market: Market) -> Result<CurrencyTick, ExchangeError> {
        let (status, payload) = self.client.get(
            &format!("{}/api/v3/ticker/bookTicker", self.api_url),
            &[("symbol", market.symbol(ExchangeId::Binance))],
            &[],
        )?;
        let ticker: BookTicker = self.parse(status, &payload)?;
        Ok(CurrencyTick::new(
            parse_f64(&ticker.bid_price)?,
            parse_f64(&ticker.ask_price)?,
            market.base,
            market.traded,
        ))
    }

    fn get_candles(
        &self,
        market: Market,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let wire = interval.wire(ExchangeId::Binance).map_err(|_| {
            ExchangeError::StockExchange(format!("unsupported binance interval: {interval}"))
        })?;

        let klines: Vec<Kline> = with_redirect_retry(
            &format!("{}/api/v3/klines", self.api_url),
            |url| {
                let (status, payload) = self.client.get(
                    url,
                    &[
                        ("symbol", market.symbol(ExchangeId::Binance)),
                        ("interval", wire.to_owned()),
                    ],
                    &[],
                )?;
                self.parse(status, &payload)
            },
        )?;

        // Binance serves klines oldest-first already; normalise defensively anyway.
        let mut candles = klines
            .into_iter()
            .map(Kline::into_candle)
            .collect::<Result<Vec<_>, _>>()?;
        candles.sort_by_key(|candle| candle.time);
        Ok(candles)
    }

    fn get_balance(&self, currency: Currency) -> Result<f64, ExchangeError> {
        let account: Account = self.signed_get("/api/v3/account", &[])?;
        account
            .balances
            .into_iter()
            .find(|balance| balance.asset == currency.as_str())
            .map_or(Ok(0.0), |balance| parse_f64(&balance.free))
    }

    fn get_account_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let orders: Vec<OrderStatus> = self.signed_get(
            "/api/v3/openOrders",
            &[("symbol", market.symbol(ExchangeId::Binance))],
        )?;
        orders
            .into_iter()
            .map(|order| order.into_market_order(market))
            .collect()
    }

    fn get_market_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let (status, payload) = self.client.get(
            &format!("{}/api/v3/depth", self.api_url),
            &[("symbol", market.symbol(ExchangeId::Binance))],
            &[],
        )?;
        let depth: Depth = self.parse(status, &payload)?;

        let to_order = |entry: &(String, String), side: Side| -> Result<MarketOrder, ExchangeError> {
            Ok(MarketOrder {
                side,
                base: market.base,
                traded: market.traded,
                exchange: ExchangeId::Binance,
                price: parse_f64(&entry.0)?,
                quantity: parse_f64(&entry.1)?,
                ..MarketOrder::default()
            })
        };

        depth
            .bids
            .iter()
            .map(|entry| to_order(entry, Side::Buy))
            .chain(depth.asks.iter().map(|entry| to_order(entry, Side::Sell)))
            .collect()
    }

    fn get_account_order(
        &self,
        market: Market,
        uuid: &str,
    ) -> Result<MarketOrder, ExchangeError> {
        let order: OrderStatus = self.signed_get(
            "/api/v3/order",
            &[
                ("symbol", market.symbol(ExchangeId::Binance)),
                ("orderId", uuid.to_owned()),
            ],
        )?;
        order.into_market_order(market)
    }

    fn place_buy(
        &self,
        market: Market,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError> {
        self.place(market, Side::Buy, quantity, rate)
    }

    fn place_sell(
        &self,
        market: Market,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError> {
        self.place(market, Side::Sell, quantity, rate)
    }

    fn cancel(&self, market: Market, uuid: &str) -> Result<bool, ExchangeError> {
        let query = self.signed_query(&[
            ("symbol", market.symbol(ExchangeId::Binance)),
            ("orderId", uuid.to_owned()),
        ])?;
        let url = format!("{}/api/v3/order?{}", self.api_url, query);
        let (status, payload) = self.client.delete(&url, &[], &self.auth_header())?;

        match self.parse::<CanceledOrder>(status, &payload) {
            Ok(_) => Ok(true),
            // -2011 CANCEL_REJECTED: the order already left the book.
            Err(ExchangeError::NoData) => Ok(false),
            Err(ExchangeError::StockExchange(message)) if message.contains("Unknown order") => {
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    fn get_lot_sizes(&self) -> Result<LotSizeHolder, ExchangeError> {
        let (status, payload) = self.client.get(
            &format!("{}/api/v3/exchangeInfo", self.api_url),
            &[],
            &[],
        )?;
        let info: ExchangeInfo = self.parse(status, &payload)?;

        let mut holder = LotSizeHolder::empty();
        for symbol in info.symbols {
            // Symbols outside the currency catalog are simply not tradeable here.
            let Ok(market) = Market::parse_symbol(ExchangeId::Binance, &symbol.symbol) else {
                continue;
            };
            let Some(filter) = symbol
                .filters
                .iter()
                .find(|filter| filter.filter_type == "LOT_SIZE")
            else {
                continue;
            };
            let (Some(min), Some(max), Some(step)) =
                (&filter.min_qty, &filter.max_qty, &filter.step_size)
            else {
                continue;
            };
            holder.insert(
                market,
                LotSize::new(parse_f64(min)?, parse_f64(max)?, parse_f64(step)?),
            );
        }
        Ok(holder)
    }
}

/// Binance error payload, eg/ `{"code":-1121,"msg":"Invalid symbol."}`.
#[derive(Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

#[derive(Deserialize)]
struct ServerTime {
    #[serde(rename = "serverTime")]
    server_time: i64,
}

#[derive(Deserialize)]
struct BookTicker {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

/// One kline row: `[open_time, open, high, low, close, volume, close_time, ...]`.
/// Trailing fields vary by API revision, so rows decode as loose JSON values.
#[derive(Deserialize)]
struct Kline(Vec<serde_json::Value>);

impl Kline {
    fn into_candle(self) -> Result<Candle, ExchangeError> {
        let field_str = |index: usize| -> Result<f64, ExchangeError> {
            self.0
                .get(index)
                .and_then(|value| value.as_str())
                .ok_or_else(|| {
                    ExchangeError::Transport(format!("kline field {index} missing"))
                })
                .and_then(parse_f64)
        };
        let open_time = self
            .0
            .first()
            .and_then(|value| value.as_i64())
            .ok_or_else(|| ExchangeError::Transport("kline open time missing".to_owned()))?;

        Ok(Candle {
            time: Utc
                .timestamp_millis_opt(open_time)
                .single()
                .unwrap_or_default(),
            open: field_str(1)?,
            high: field_str(2)?,
            low: field_str(3)?,
            close: field_str(4)?,
            volume: field_str(5)?,
        })
    }
}

#[derive(Deserialize)]
struct Account {
    balances: Vec<AssetBalance>,
}

#[derive(Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
}

#[derive(Deserialize)]
struct PlacedOrder {
    #[serde(rename = "orderId")]
    order_id: i64,
}

#[derive(Deserialize)]
struct CanceledOrder {
    #[serde(rename = "orderId")]
    #[allow(dead_code)]
    order_id: i64,
}

#[derive(Deserialize)]
struct OrderStatus {
    #[serde(rename = "orderId")]
    order_id: i64,
    price: String,
    #[serde(rename = "origQty")]
    orig_qty: String,
    side: String,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    status: String,
}

impl OrderStatus {
    fn into_market_order(self, market: Market) -> Result<MarketOrder, ExchangeError> {
        let side = match self.side.as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            other => {
                return Err(ExchangeError::StockExchange(format!(
                    "unrecognised binance side: {other}"
                )))
            }
        };

        Ok(MarketOrder {
            db_id: 0,
            uuid: self.order_id.to_string(),
            base: market.base,
            traded: market.traded,
            side,
            exchange: ExchangeId::Binance,
            quantity: parse_f64(&self.orig_qty)?,
            price: parse_f64(&self.price)?,
            opened_at: Utc
                .timestamp_millis_opt(self.time)
                .single()
                .unwrap_or_default(),
            canceled: matches!(self.status.as_str(), "CANCELED" | "PENDING_CANCEL" | "EXPIRED"),
        })
    }
}

#[derive(Deserialize)]
struct Depth {
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<Filter>,
}

#[derive(Deserialize)]
struct Filter {
    #[serde(rename = "filterType")]
    filter_type: String,
    #[serde(rename = "minQty")]
    min_qty: Option<String>,
    #[serde(rename = "maxQty")]
    max_qty: Option<String>,
    #[serde(rename = "stepSize")]
    step_size: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(server: &mockito::Server) -> Binance {
        let mut binance = Binance::with_url(server.url()).unwrap();
        binance.set_credentials(Credentials::new("api-key", "secret"));
        binance
    }

    fn mock_server_time(server: &mut mockito::Server) {
        server
            .mock("GET", "/api/v3/time")
            .with_body(r#"{"serverTime":1499827319559}"#)
            .create();
    }

    #[test]
    fn ticker_parses_string_prices() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/v3/ticker/bookTicker")
            .match_query(mockito::Matcher::UrlEncoded("symbol".into(), "LTCBTC".into()))
            .with_body(r#"{"symbol":"LTCBTC","bidPrice":"0.00630000","bidQty":"5","askPrice":"0.00650000","askQty":"9"}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let tick = adapter(&server).get_ticker(market).unwrap();

        assert_eq!(tick.bid, 0.0063);
        assert_eq!(tick.ask, 0.0065);
    }

    #[test]
    fn klines_normalise_to_candles() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"[[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"]]"#,
            )
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let candles = adapter(&server)
            .get_candles(market, CandleInterval::OneHour)
            .unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open, 0.0163479);
        assert_eq!(candles[0].close, 0.015771);
        assert_eq!(candles[0].time.timestamp(), 1_499_040_000);
    }

    #[test]
    fn invalid_symbol_maps_to_invalid_pair() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/v3/ticker/bookTicker")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        assert_eq!(
            adapter(&server).get_ticker(market).unwrap_err(),
            ExchangeError::InvalidPair
        );
    }

    #[test]
    fn insufficient_balance_maps_on_placement() {
        let mut server = mockito::Server::new();
        mock_server_time(&mut server);
        server
            .mock("POST", "/api/v3/order")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-2010,"msg":"Account has insufficient balance for requested action."}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        assert_eq!(
            adapter(&server).place_buy(market, 1.0, 0.006).unwrap_err(),
            ExchangeError::InsufficientFunds
        );
    }

    #[test]
    fn placement_signs_query_and_returns_order() {
        let mut server = mockito::Server::new();
        mock_server_time(&mut server);
        server
            .mock("POST", "/api/v3/order")
            .match_query(mockito::Matcher::Regex("signature=[0-9a-f]{64}".into()))
            .with_body(r#"{"symbol":"LTCBTC","orderId":28,"transactTime":1507725176595}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let order = adapter(&server).place_buy(market, 1.0, 0.0063).unwrap();

        assert_eq!(order.uuid, "28");
        assert_eq!(order.exchange, ExchangeId::Binance);
    }

    #[test]
    fn unknown_order_cancel_is_denied_not_an_error() {
        let mut server = mockito::Server::new();
        mock_server_time(&mut server);
        server
            .mock("DELETE", "/api/v3/order")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-2011,"msg":"Unknown order sent."}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        assert_eq!(adapter(&server).cancel(market, "28"), Ok(false));
    }

    #[test]
    fn lot_sizes_come_from_exchange_info_filters() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/v3/exchangeInfo")
            .with_body(
                r#"{"symbols":[
                    {"symbol":"LTCBTC","filters":[{"filterType":"LOT_SIZE","minQty":"0.01000000","maxQty":"100000.00000000","stepSize":"0.01000000"}]},
                    {"symbol":"WEIRDPAIR","filters":[]}
                ]}"#,
            )
            .create();

        let holder = adapter(&server).get_lot_sizes().unwrap();
        let market = Market::new(Currency::Btc, Currency::Ltc);

        let lot = holder.get(&market).unwrap();
        assert_eq!(lot.min_qty, 0.01);
        assert_eq!(lot.step_size, 0.01);
    }
}
