use crate::{opened_now, parse_f64, with_redirect_retry, Exchange};
use cambist_data::{
    format_coin_with_precision, Candle, CurrencyTick, LotSizeHolder, MarketOrder, Side,
};
use cambist_instrument::{CandleInterval, Currency, ExchangeId, Market};
use cambist_integration::{canonical_query, signer, Credentials, ExchangeError, RestClient};
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

const API_URL: &str = "https://api.huobi.pro";

/// Candles requested from the kline endpoint per call.
const KLINE_WINDOW: &str = "300";

/// Wire precision fallback when the symbols endpoint does not list the pair.
const DEFAULT_PRECISION: usize = 8;

/// Huobi adapter over the spot v1 REST API and the public market endpoints.
///
/// Signed endpoints carry `AccessKeyId`, `SignatureMethod=HmacSHA256`,
/// `SignatureVersion=2` and a `Timestamp` from the venue's server clock in the query
/// string, plus a `Signature` — the base64 HMAC-SHA256 digest of
/// `"METHOD\nhost\npath\nsorted-query"`. Quantities & rates are formatted with the
/// per-pair precision the symbols endpoint reports.
pub struct Huobi {
    client: RestClient,
    credentials: Credentials,
    api_url: String,
}

impl Huobi {
    /// Constructs a new [`Huobi`] adapter against the production endpoint.
    pub fn new() -> Result<Self, ExchangeError> {
        Self::with_url(API_URL.to_owned())
    }

    /// Constructs a [`Huobi`] adapter against an alternative endpoint (tests).
    pub fn with_url(api_url: String) -> Result<Self, ExchangeError> {
        Ok(Self {
            client: RestClient::new()?,
            credentials: Credentials::default(),
            api_url,
        })
    }

    fn host(&self) -> Result<String, ExchangeError> {
        let url = Url::parse(&self.api_url)
            .map_err(|err| ExchangeError::Transport(format!("api url parse: {err}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| ExchangeError::Transport("api url missing host".to_owned()))?;
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        })
    }

    /// Signing timestamp from the venue's server clock, formatted as the UTC
    /// `YYYY-MM-DDThh:mm:ss` string the signature dialect expects.
    fn server_timestamp(&self) -> Result<String, ExchangeError> {
        let (_, payload) = self
            .client
            .get(&format!("{}/v1/common/timestamp", self.api_url), &[], &[])?;
        let millis: i64 = unwrap_data(&payload)?;
        let time = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default();
        Ok(time.format("%Y-%m-%dT%H:%M:%S").to_string())
    }

    fn signed_query(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, ExchangeError> {
        let mut pairs: Vec<(&str, String)> = vec![
            ("AccessKeyId", self.credentials.api_key.clone()),
            ("SignatureMethod", "HmacSHA256".to_owned()),
            ("SignatureVersion", "2".to_owned()),
            ("Timestamp", self.server_timestamp()?),
        ];
        pairs.extend(query.iter().map(|(name, value)| (*name, value.clone())));
        pairs.sort_by(|left, right| left.0.cmp(right.0));

        let sorted_query = canonical_query(&pairs)?;
        let canonical = format!("{method}\n{}\n{path}\n{sorted_query}", self.host()?);
        let signature = signer::sign_sha256_base64(&self.credentials.secret_key, &canonical)?;

        let mut with_signature: Vec<(&str, String)> = pairs;
        with_signature.push(("Signature", signature));
        canonical_query(&with_signature)
    }

    fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!(
            "{}{}?{}",
            self.api_url,
            path,
            self.signed_query("GET", path, query)?
        );
        let (_, payload) = self.client.get(&url, &[], &[])?;
        unwrap_data(&payload)
    }

    fn signed_post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: String,
    ) -> Result<T, ExchangeError> {
        let url = format!(
            "{}{}?{}",
            self.api_url,
            path,
            self.signed_query("POST", path, &[])?
        );
        let (_, payload) = self.client.post_json(&url, body, &[])?;
        unwrap_data(&payload)
    }

    fn public<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        take: fn(HuobiEnvelope<T>) -> Option<T>,
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.api_url, path);
        with_redirect_retry(&url, |url| {
            let (_, payload) = self.client.get(url, query, &[])?;
            let envelope: HuobiEnvelope<T> = serde_json::from_slice(payload.as_slice())?;
            envelope.into_result(take)
        })
    }

    /// The spot account id, required by order placement.
    fn spot_account_id(&self) -> Result<i64, ExchangeError> {
        let accounts: Vec<Account> = self.signed_get("/v1/account/accounts", &[])?;
        accounts
            .into_iter()
            .find(|account| account.kind == "spot")
            .map(|account| account.id)
            .ok_or_else(|| ExchangeError::StockExchange("no spot account".to_owned()))
    }

    /// Per-pair amount & price precision from the symbols endpoint.
    fn pair_precision(&self, market: Market) -> Result<(usize, usize), ExchangeError> {
        let symbol = market.symbol(ExchangeId::Huobi);
        let symbols: Vec<SymbolInfo> = self.public(
            "/v1/common/symbols",
            &[],
            |envelope| envelope.data,
        )?;
        Ok(symbols
            .into_iter()
            .find(|info| info.symbol == symbol)
            .map(|info| (info.amount_precision, info.price_precision))
            .unwrap_or((DEFAULT_PRECISION, DEFAULT_PRECISION)))
    }

    fn place(
        &self,
        market: Market,
        side: Side,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError> {
        let account_id = self.spot_account_id()?;
        let (amount_precision, price_precision) = self.pair_precision(market)?;
        let order_type = match side {
            Side::Buy => "buy-limit",
            Side::Sell => "sell-limit",
        };

        let body = serde_json::json!({
            "account-id": account_id.to_string(),
            "symbol": market.symbol(ExchangeId::Huobi),
            "type": order_type,
            "amount": format_coin_with_precision(quantity, amount_precision),
            "price": format_coin_with_precision(rate, price_precision),
        })
        .to_string();

        let order_id: String = self.signed_post("/v1/order/orders/place", body)?;

        debug!(%order_id, %market, %side, "huobi order placed");
        Ok(MarketOrder {
            db_id: 0,
            uuid: order_id,
            base: market.base,
            traded: market.traded,
            side,
            exchange: ExchangeId::Huobi,
            quantity,
            price: rate,
            opened_at: opened_now(),
            canceled: false,
        })
    }
}

impl Exchange for Huobi {
    fn id(&self) -> ExchangeId {
        ExchangeId::Huobi
    }

    fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    fn get_ticker(&self, market: Market) -> Result<CurrencyTick, ExchangeError> {
        let tick: MergedTick = self.public(
            "/market/detail/merged",
            &[("symbol", market.symbol(ExchangeId::Huobi))],
            |envelope| envelope.tick,
        )?;

        let bid = tick.bid.first().copied().unwrap_or(0.0);
        let ask = tick.ask.first().copied().unwrap_or(0.0);
        Ok(CurrencyTick::new(bid, ask, market.base, market.traded))
    }

    fn get_candles(
        &self,
        market: Market,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let wire = interval.wire(ExchangeId::Huobi).map_err(|_| {
            ExchangeError::StockExchange(format!("unsupported huobi interval: {interval}"))
        })?;
        let klines: Vec<Kline> = self.public(
            "/market/history/kline",
            &[
                ("symbol", market.symbol(ExchangeId::Huobi)),
                ("period", wire.to_owned()),
                ("size", KLINE_WINDOW.to_owned()),
            ],
            |envelope| envelope.data,
        )?;

        // Huobi serves klines newest-first; normalise to newest-last.
        let mut candles = klines.into_iter().map(Kline::into_candle).collect::<Vec<_>>();
        candles.sort_by_key(|candle| candle.time);
        Ok(candles)
    }

    fn get_balance(&self, currency: Currency) -> Result<f64, ExchangeError> {
        let account_id = self.spot_account_id()?;
        let balance: AccountBalance =
            self.signed_get(&format!("/v1/account/accounts/{account_id}/balance"), &[])?;

        let wanted = currency.as_str().to_ascii_lowercase();
        balance
            .list
            .into_iter()
            .find(|entry| entry.currency == wanted && entry.kind == "trade")
            // Huobi is strict: a currency it never lists is an error, not zero.
            .ok_or_else(|| {
                ExchangeError::StockExchange(format!("currency not listed: {currency}"))
            })
            .and_then(|entry| parse_f64(&entry.balance))
    }

    fn get_account_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let orders: Vec<OpenOrder> = self.signed_get(
            "/v1/order/openOrders",
            &[("symbol", market.symbol(ExchangeId::Huobi))],
        )?;
        orders
            .into_iter()
            .map(|order| order.into_market_order(market))
            .collect()
    }

    fn get_market_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let depth: DepthTick = self.public(
            "/market/depth",
            &[
                ("symbol", market.symbol(ExchangeId::Huobi)),
                ("type", "step0".to_owned()),
            ],
            |envelope| envelope.tick,
        )?;

        let to_order = |entry: &[f64; 2], side: Side| MarketOrder {
            side,
            base: market.base,
            traded: market.traded,
            exchange: ExchangeId::Huobi,
            price: entry[0],
            quantity: entry[1],
            ..MarketOrder::default()
        };

        Ok(depth
            .bids
            .iter()
            .map(|entry| to_order(entry, Side::Buy))
            .chain(depth.asks.iter().map(|entry| to_order(entry, Side::Sell)))
            .collect())
    }

    fn get_account_order(
        &self,
        market: Market,
        uuid: &str,
    ) -> Result<MarketOrder, ExchangeError> {
        let order: OpenOrder = self.signed_get(&format!("/v1/order/orders/{uuid}"), &[])?;
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

    fn cancel(&self, _market: Market, uuid: &str) -> Result<bool, ExchangeError> {
        match self.signed_post::<String>(
            &format!("/v1/order/orders/{uuid}/submitcancel"),
            String::new(),
        ) {
            Ok(_) => Ok(true),
            // The order already left the book; a denial rather than a failure.
            Err(ExchangeError::StockExchange(message))
                if message.contains("order-orderstate-error") =>
            {
                Ok(false)
            }
            Err(ExchangeError::NoData) => Ok(false),
            Err(error) => Err(error),
        }
    }

    fn get_lot_sizes(&self) -> Result<LotSizeHolder, ExchangeError> {
        Ok(LotSizeHolder::empty())
    }
}

/// Huobi payloads carry `status` plus either `data` or `tick`, with `err-code` &
/// `err-msg` on failure.
#[derive(Deserialize)]
struct HuobiEnvelope<T> {
    #[serde(default)]
    status: String,
    data: Option<T>,
    tick: Option<T>,
    #[serde(rename = "err-code", default)]
    err_code: String,
    #[serde(rename = "err-msg", default)]
    err_msg: String,
}

impl<T> HuobiEnvelope<T> {
    fn into_result(self, take: fn(HuobiEnvelope<T>) -> Option<T>) -> Result<T, ExchangeError> {
        if self.status == "ok" {
            return take(self).ok_or(ExchangeError::NoData);
        }
        Err(map_huobi_error(self.err_code, self.err_msg))
    }
}

fn unwrap_data<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ExchangeError> {
    let envelope: HuobiEnvelope<T> = serde_json::from_slice(payload)?;
    envelope.into_result(|envelope| envelope.data)
}

fn map_huobi_error(code: String, message: String) -> ExchangeError {
    if code.contains("symbol") {
        ExchangeError::InvalidPair
    } else if code.contains("insufficient") {
        ExchangeError::InsufficientFunds
    } else if code.contains("record-invalid") || code.contains("base-record") {
        ExchangeError::NoData
    } else if message.is_empty() {
        ExchangeError::StockExchange(code)
    } else {
        ExchangeError::StockExchange(format!("{code}: {message}"))
    }
}

#[derive(Deserialize)]
struct Account {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct AccountBalance {
    list: Vec<BalanceEntry>,
}

#[derive(Deserialize)]
struct BalanceEntry {
    currency: String,
    #[serde(rename = "type")]
    kind: String,
    balance: String,
}

#[derive(Deserialize)]
struct MergedTick {
    #[serde(default)]
    bid: Vec<f64>,
    #[serde(default)]
    ask: Vec<f64>,
}

#[derive(Deserialize)]
struct Kline {
    id: i64,
    open: f64,
    close: f64,
    low: f64,
    high: f64,
    vol: f64,
}

impl Kline {
    fn into_candle(self) -> Candle {
        Candle {
            time: Utc.timestamp_opt(self.id, 0).single().unwrap_or_default(),
            open: self.open,
            close: self.close,
            low: self.low,
            high: self.high,
            volume: self.vol,
        }
    }
}

#[derive(Deserialize)]
struct DepthTick {
    #[serde(default)]
    bids: Vec<[f64; 2]>,
    #[serde(default)]
    asks: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
struct SymbolInfo {
    symbol: String,
    #[serde(rename = "amount-precision")]
    amount_precision: usize,
    #[serde(rename = "price-precision")]
    price_precision: usize,
}

#[derive(Deserialize)]
struct OpenOrder {
    id: i64,
    price: String,
    amount: String,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(rename = "created-at", default)]
    created_at: i64,
    #[serde(default)]
    state: String,
}

impl OpenOrder {
    fn into_market_order(self, market: Market) -> Result<MarketOrder, ExchangeError> {
        let side = if self.order_type.starts_with("buy") {
            Side::Buy
        } else if self.order_type.starts_with("sell") {
            Side::Sell
        } else {
            return Err(ExchangeError::StockExchange(format!(
                "unrecognised huobi order type: {}",
                self.order_type
            )));
        };

        Ok(MarketOrder {
            db_id: 0,
            uuid: self.id.to_string(),
            base: market.base,
            traded: market.traded,
            side,
            exchange: ExchangeId::Huobi,
            quantity: parse_f64(&self.amount)?,
            price: parse_f64(&self.price)?,
            opened_at: Utc
                .timestamp_millis_opt(self.created_at)
                .single()
                .unwrap_or_default(),
            canceled: matches!(self.state.as_str(), "canceled" | "partial-canceled"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(server: &mockito::Server) -> Huobi {
        let mut huobi = Huobi::with_url(server.url()).unwrap();
        huobi.set_credentials(Credentials::new("api-key", "secret"));
        huobi
    }

    fn mock_server_time(server: &mut mockito::Server) {
        server
            .mock("GET", "/v1/common/timestamp")
            .with_body(r#"{"status":"ok","data":1629715504949}"#)
            .create();
    }

    fn mock_accounts(server: &mut mockito::Server) {
        server
            .mock("GET", "/v1/account/accounts")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"status":"ok","data":[{"id":100009,"type":"spot","state":"working"}]}"#)
            .create();
    }

    #[test]
    fn merged_ticker_reads_best_bid_and_ask() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/market/detail/merged")
            .match_query(mockito::Matcher::UrlEncoded("symbol".into(), "ltcbtc".into()))
            .with_body(
                r#"{"status":"ok","ch":"market.ltcbtc.detail.merged","tick":{"bid":[0.0063,100.0],"ask":[0.0065,80.0]}}"#,
            )
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let tick = adapter(&server).get_ticker(market).unwrap();

        assert_eq!(tick.bid, 0.0063);
        assert_eq!(tick.ask, 0.0065);
    }

    #[test]
    fn klines_are_reversed_to_newest_last() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/market/history/kline")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{"status":"ok","data":[
                    {"id":1629770100,"open":2.0,"close":2.2,"low":1.9,"high":2.3,"vol":50.0,"amount":20.0,"count":10},
                    {"id":1629770040,"open":1.9,"close":2.0,"low":1.8,"high":2.1,"vol":40.0,"amount":18.0,"count":8}
                ]}"#,
            )
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let candles = adapter(&server)
            .get_candles(market, CandleInterval::OneMin)
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert!(candles[0].time < candles[1].time);
        assert_eq!(candles[1].close, 2.2);
    }

    #[test]
    fn strict_balance_errors_for_unlisted_currency() {
        let mut server = mockito::Server::new();
        mock_server_time(&mut server);
        mock_accounts(&mut server);
        server
            .mock("GET", "/v1/account/accounts/100009/balance")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{"status":"ok","data":{"id":100009,"type":"spot","list":[
                    {"currency":"usdt","type":"trade","balance":"500.0"},
                    {"currency":"usdt","type":"frozen","balance":"1.0"}
                ]}}"#,
            )
            .create();

        assert_eq!(adapter(&server).get_balance(Currency::Usdt).unwrap(), 500.0);
        assert!(matches!(
            adapter(&server).get_balance(Currency::Ltc),
            Err(ExchangeError::StockExchange(_))
        ));
    }

    #[test]
    fn symbol_error_code_maps_to_invalid_pair() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/market/detail/merged")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"status":"error","err-code":"base-symbol-error","err-msg":"invalid symbol"}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        assert_eq!(
            adapter(&server).get_ticker(market).unwrap_err(),
            ExchangeError::InvalidPair
        );
    }

    #[test]
    fn non_symbol_error_code_maps_to_stock_exchange() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/market/detail/merged")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"status":"error","err-code":"invalid-parameter","err-msg":"bad request"}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let error = adapter(&server).get_ticker(market).unwrap_err();
        assert!(matches!(error, ExchangeError::StockExchange(_)));
    }

    #[test]
    fn placement_formats_with_pair_precision() {
        let mut server = mockito::Server::new();
        mock_server_time(&mut server);
        mock_accounts(&mut server);
        server
            .mock("GET", "/v1/common/symbols")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{"status":"ok","data":[{"symbol":"ltcbtc","base-currency":"ltc","quote-currency":"btc","amount-precision":4,"price-precision":6}]}"#,
            )
            .create();
        let place = server
            .mock("POST", "/v1/order/orders/place")
            .match_query(mockito::Matcher::Any)
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"amount":"1.4500","price":"0.006500"}"#.to_owned(),
            ))
            .with_body(r#"{"status":"ok","data":"59378"}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let order = adapter(&server).place_buy(market, 1.45, 0.0065).unwrap();

        place.assert();
        assert_eq!(order.uuid, "59378");
        assert_eq!(order.exchange, ExchangeId::Huobi);
    }

    #[test]
    fn cancel_of_closed_order_is_denied_not_an_error() {
        let mut server = mockito::Server::new();
        mock_server_time(&mut server);
        server
            .mock("POST", "/v1/order/orders/59378/submitcancel")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{"status":"error","err-code":"order-orderstate-error","err-msg":"the order state is error"}"#,
            )
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        assert_eq!(adapter(&server).cancel(market, "59378"), Ok(false));
    }
}
