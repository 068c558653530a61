use crate::{opened_now, with_redirect_retry, Exchange};
use cambist_data::{format_coin, Candle, CurrencyTick, LotSizeHolder, MarketOrder, Side};
use cambist_instrument::{CandleInterval, Currency, ExchangeId, Market};
use cambist_integration::{
    canonical_query, local_timestamp_millis, signer, Credentials, ExchangeError, RestClient,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

const API_URL: &str = "https://api.bittrex.com/api/v1.1";
const CANDLES_API_URL: &str = "https://global.bittrex.com/Api/v2.0/pub/market";

/// Bittrex adapter over the v1.1 trading API and the v2.0 public candle endpoint.
///
/// Authenticated endpoints carry `apikey` & `nonce` in the query string and an
/// `apisign` header holding the HMAC-SHA512 hex digest of the complete request URL.
pub struct Bittrex {
    client: RestClient,
    credentials: Credentials,
    api_url: String,
    candles_url: String,
}

impl Bittrex {
    /// Constructs a new [`Bittrex`] adapter against the production endpoints.
    pub fn new() -> Result<Self, ExchangeError> {
        Ok(Self {
            client: RestClient::new()?,
            credentials: Credentials::default(),
            api_url: API_URL.to_owned(),
            candles_url: CANDLES_API_URL.to_owned(),
        })
    }

    /// Constructs a [`Bittrex`] adapter against an alternative endpoint (tests).
    pub fn with_urls(api_url: String, candles_url: String) -> Result<Self, ExchangeError> {
        Ok(Self {
            client: RestClient::new()?,
            credentials: Credentials::default(),
            api_url,
            candles_url,
        })
    }

    fn public(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, ExchangeError> {
        let url = format!("{}/{}", self.api_url, path);
        let (_, payload) = self.client.get(&url, query, &[])?;
        Ok(payload)
    }

    /// Signed GET: the signature covers the exact URL sent, so the query string is
    /// canonicalised once and reused.
    fn signed(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, ExchangeError> {
        let mut pairs: Vec<(&str, String)> = vec![
            ("apikey", self.credentials.api_key.clone()),
            ("nonce", local_timestamp_millis().to_string()),
        ];
        pairs.extend(query.iter().map(|(name, value)| (*name, value.clone())));

        let url = format!("{}/{}?{}", self.api_url, path, canonical_query(&pairs)?);
        let apisign = signer::sign_sha512_hex(&self.credentials.secret_key, &url)?;
        let (_, payload) = self.client.get(&url, &[], &[("apisign", apisign)])?;
        Ok(payload)
    }

    fn place(
        &self,
        market: Market,
        side: Side,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError> {
        let path = match side {
            Side::Buy => "market/buylimit",
            Side::Sell => "market/selllimit",
        };
        let payload = self.signed(
            path,
            &[
                ("market", market.symbol(ExchangeId::Bittrex)),
                ("quantity", format_coin(quantity)),
                ("rate", format_coin(rate)),
            ],
        )?;
        let placed: PlacedOrder = unwrap_envelope(&payload)?;

        debug!(uuid = %placed.uuid, %market, %side, "bittrex order placed");
        Ok(MarketOrder {
            db_id: 0,
            uuid: placed.uuid,
            base: market.base,
            traded: market.traded,
            side,
            exchange: ExchangeId::Bittrex,
            quantity,
            price: rate,
            opened_at: opened_now(),
            canceled: false,
        })
    }
}

impl Exchange for Bittrex {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bittrex
    }

    fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    fn get_ticker(&self, market: Market) -> Result<CurrencyTick, ExchangeError> {
        let payload = self.public(
            "public/getticker",
            &[("market", market.symbol(ExchangeId::Bittrex))],
        )?;
        let ticker: Ticker = unwrap_envelope(&payload)?;
        Ok(CurrencyTick::new(
            ticker.bid,
            ticker.ask,
            market.base,
            market.traded,
        ))
    }

    fn get_candles(
        &self,
        market: Market,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let tick_interval = interval.wire(ExchangeId::Bittrex).map_err(|_| {
            ExchangeError::StockExchange(format!("unsupported bittrex interval: {interval}"))
        })?;
        let url = format!("{}/GetTicks", self.candles_url);

        let payload = with_redirect_retry(&url, |url| {
            let (_, payload) = self.client.get(
                url,
                &[
                    ("marketName", market.symbol(ExchangeId::Bittrex)),
                    ("tickInterval", tick_interval.to_owned()),
                ],
                &[],
            )?;
            Ok(payload)
        })?;

        let ticks: Vec<Tick> = unwrap_envelope(&payload)?;
        let mut candles = ticks
            .into_iter()
            .map(Tick::into_candle)
            .collect::<Result<Vec<_>, _>>()?;
        candles.sort_by_key(|candle| candle.time);
        Ok(candles)
    }

    fn get_balance(&self, currency: Currency) -> Result<f64, ExchangeError> {
        let payload = self.signed(
            "account/getbalance",
            &[("currency", currency.as_str().to_owned())],
        )?;
        // A never-touched balance comes back as a null result.
        match unwrap_envelope::<Balance>(&payload) {
            Ok(balance) => Ok(balance.available.unwrap_or(0.0)),
            Err(ExchangeError::NoData) => Ok(0.0),
            Err(error) => Err(error),
        }
    }

    fn get_account_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let payload = self.signed(
            "market/getopenorders",
            &[("market", market.symbol(ExchangeId::Bittrex))],
        )?;
        let orders: Vec<OpenOrder> = unwrap_envelope(&payload)?;
        orders
            .into_iter()
            .map(|order| order.into_market_order(market))
            .collect()
    }

    fn get_market_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let payload = self.public(
            "public/getorderbook",
            &[
                ("market", market.symbol(ExchangeId::Bittrex)),
                ("type", "both".to_owned()),
            ],
        )?;
        let book: OrderBook = unwrap_envelope(&payload)?;

        let to_order = |entry: &BookEntry, side: Side| MarketOrder {
            side,
            base: market.base,
            traded: market.traded,
            exchange: ExchangeId::Bittrex,
            quantity: entry.quantity,
            price: entry.rate,
            ..MarketOrder::default()
        };

        Ok(book
            .buy
            .iter()
            .map(|entry| to_order(entry, Side::Buy))
            .chain(book.sell.iter().map(|entry| to_order(entry, Side::Sell)))
            .collect())
    }

    fn get_account_order(
        &self,
        market: Market,
        uuid: &str,
    ) -> Result<MarketOrder, ExchangeError> {
        let payload = self.signed("account/getorder", &[("uuid", uuid.to_owned())])?;
        let order: AccountOrder = unwrap_envelope(&payload)?;
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
        let payload = self.signed("market/cancel", &[("uuid", uuid.to_owned())])?;
        // Successful cancels come back with a null result, so only the envelope's
        // success flag matters here.
        match ensure_success(&payload) {
            Ok(()) => Ok(true),
            // An already-closed order is a venue denial, not a failure of the call.
            Err(ExchangeError::StockExchange(message))
                if message == "ORDER_NOT_OPEN" || message == "UUID_INVALID" =>
            {
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    fn get_lot_sizes(&self) -> Result<LotSizeHolder, ExchangeError> {
        Ok(LotSizeHolder::empty())
    }
}

/// Every Bittrex payload arrives wrapped in `{success, message, result}`.
#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: String,
    result: Option<T>,
}

fn unwrap_envelope<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, ExchangeError> {
    let envelope: Envelope<T> = serde_json::from_slice(payload)?;
    if !envelope.success {
        return Err(map_bittrex_message(&envelope.message));
    }
    envelope.result.ok_or(ExchangeError::NoData)
}

fn ensure_success(payload: &[u8]) -> Result<(), ExchangeError> {
    let envelope: Envelope<serde_json::Value> = serde_json::from_slice(payload)?;
    if !envelope.success {
        return Err(map_bittrex_message(&envelope.message));
    }
    Ok(())
}

fn map_bittrex_message(message: &str) -> ExchangeError {
    match message {
        "INVALID_MARKET" | "INVALID_CURRENCY" => ExchangeError::InvalidPair,
        other => ExchangeError::from_venue_message(other),
    }
}

#[derive(Deserialize)]
struct Ticker {
    #[serde(rename = "Bid")]
    bid: f64,
    #[serde(rename = "Ask")]
    ask: f64,
}

#[derive(Deserialize)]
struct Tick {
    #[serde(rename = "O")]
    open: f64,
    #[serde(rename = "C")]
    close: f64,
    #[serde(rename = "L")]
    low: f64,
    #[serde(rename = "H")]
    high: f64,
    #[serde(rename = "V")]
    volume: f64,
    #[serde(rename = "T")]
    time: String,
}

impl Tick {
    fn into_candle(self) -> Result<Candle, ExchangeError> {
        let time = parse_bittrex_time(&self.time)?;
        Ok(Candle {
            time,
            open: self.open,
            close: self.close,
            low: self.low,
            high: self.high,
            volume: self.volume,
        })
    }
}

#[derive(Deserialize)]
struct Balance {
    #[serde(rename = "Available")]
    available: Option<f64>,
}

#[derive(Deserialize)]
struct PlacedOrder {
    uuid: String,
}

#[derive(Deserialize)]
struct OpenOrder {
    #[serde(rename = "OrderUuid")]
    uuid: String,
    #[serde(rename = "OrderType")]
    order_type: String,
    #[serde(rename = "Quantity")]
    quantity: f64,
    #[serde(rename = "Limit")]
    limit: f64,
    #[serde(rename = "Opened")]
    opened: String,
}

impl OpenOrder {
    fn into_market_order(self, market: Market) -> Result<MarketOrder, ExchangeError> {
        Ok(MarketOrder {
            db_id: 0,
            uuid: self.uuid,
            base: market.base,
            traded: market.traded,
            side: parse_order_type(&self.order_type)?,
            exchange: ExchangeId::Bittrex,
            quantity: self.quantity,
            price: self.limit,
            opened_at: parse_bittrex_time(&self.opened)?,
            canceled: false,
        })
    }
}

#[derive(Deserialize)]
struct AccountOrder {
    #[serde(rename = "OrderUuid")]
    uuid: String,
    #[serde(rename = "Type")]
    order_type: String,
    #[serde(rename = "Quantity")]
    quantity: f64,
    #[serde(rename = "Limit")]
    limit: f64,
    #[serde(rename = "Opened")]
    opened: String,
    #[serde(rename = "CancelInitiated")]
    cancel_initiated: bool,
}

impl AccountOrder {
    fn into_market_order(self, market: Market) -> Result<MarketOrder, ExchangeError> {
        Ok(MarketOrder {
            db_id: 0,
            uuid: self.uuid,
            base: market.base,
            traded: market.traded,
            side: parse_order_type(&self.order_type)?,
            exchange: ExchangeId::Bittrex,
            quantity: self.quantity,
            price: self.limit,
            opened_at: parse_bittrex_time(&self.opened)?,
            canceled: self.cancel_initiated,
        })
    }
}

#[derive(Deserialize)]
struct OrderBook {
    #[serde(default)]
    buy: Vec<BookEntry>,
    #[serde(default)]
    sell: Vec<BookEntry>,
}

#[derive(Deserialize)]
struct BookEntry {
    #[serde(rename = "Quantity")]
    quantity: f64,
    #[serde(rename = "Rate")]
    rate: f64,
}

fn parse_order_type(order_type: &str) -> Result<Side, ExchangeError> {
    match order_type {
        "LIMIT_BUY" | "BUY" => Ok(Side::Buy),
        "LIMIT_SELL" | "SELL" => Ok(Side::Sell),
        other => Err(ExchangeError::StockExchange(format!(
            "unrecognised bittrex order type: {other}"
        ))),
    }
}

/// Bittrex timestamps are ISO-8601 without an offset, optionally with fractional
/// seconds, and always UTC.
fn parse_bittrex_time(value: &str) -> Result<DateTime<Utc>, ExchangeError> {
    let trimmed = value.split('.').next().unwrap_or(value);
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|err| ExchangeError::Transport(format!("bittrex time parse: {err}")))
}
