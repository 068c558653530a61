use crate::{opened_now, parse_f64, with_redirect_retry, Exchange};
use cambist_data::{format_coin, Candle, CurrencyTick, LotSizeHolder, MarketOrder, Side};
use cambist_instrument::market::kraken_alias;
use cambist_instrument::{CandleInterval, Currency, ExchangeId, Market};
use cambist_integration::{
    canonical_query, local_timestamp_millis, signer, Credentials, ExchangeError, RestClient,
};
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const API_URL: &str = "https://api.kraken.com";

/// Kraken adapter over the v0 REST API.
///
/// Private endpoints POST an urlencoded body led by a millisecond `nonce`, with the
/// `API-Sign` header carrying HMAC-SHA512(base64-decoded secret,
/// path + SHA256(nonce + body)) base64 encoded.
pub struct Kraken {
    client: RestClient,
    credentials: Credentials,
    api_url: String,
}

impl Kraken {
    /// Constructs a new [`Kraken`] adapter against the production endpoint.
    pub fn new() -> Result<Self, ExchangeError> {
        Self::with_url(API_URL.to_owned())
    }

    /// Constructs a [`Kraken`] adapter against an alternative endpoint (tests).
    pub fn with_url(api_url: String) -> Result<Self, ExchangeError> {
        Ok(Self {
            client: RestClient::new()?,
            credentials: Credentials::default(),
            api_url,
        })
    }

    fn public<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}/0/public/{}", self.api_url, method);
        with_redirect_retry(&url, |url| {
            let (_, payload) = self.client.get(url, query, &[])?;
            unwrap_envelope(&payload)
        })
    }

    fn private<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let path = format!("/0/private/{method}");
        let nonce = local_timestamp_millis().to_string();

        let mut pairs: Vec<(&str, String)> = vec![("nonce", nonce.clone())];
        pairs.extend(query.iter().map(|(name, value)| (*name, value.clone())));
        let body = canonical_query(&pairs)?;

        let signature = signer::sign_kraken(&self.credentials.secret_key, &path, &nonce, &body)?;
        let headers = [
            ("API-Key", self.credentials.api_key.clone()),
            ("API-Sign", signature),
        ];

        let url = format!("{}{}", self.api_url, path);
        let (_, payload) = self.client.post_form(&url, body, &headers)?;
        unwrap_envelope(&payload)
    }

    fn place(
        &self,
        market: Market,
        side: Side,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError> {
        let placed: PlacedOrder = self.private(
            "AddOrder",
            &[
                ("pair", market.symbol(ExchangeId::Kraken)),
                ("type", side.as_str().to_owned()),
                ("ordertype", "limit".to_owned()),
                ("price", format_coin(rate)),
                ("volume", format_coin(quantity)),
            ],
        )?;
        let uuid = placed
            .txid
            .into_iter()
            .next()
            .ok_or(ExchangeError::NoData)?;

        debug!(%uuid, %market, %side, "kraken order placed");
        Ok(MarketOrder {
            db_id: 0,
            uuid,
            base: market.base,
            traded: market.traded,
            side,
            exchange: ExchangeId::Kraken,
            quantity,
            price: rate,
            opened_at: opened_now(),
            canceled: false,
        })
    }
}

impl Exchange for Kraken {
    fn id(&self) -> ExchangeId {
        ExchangeId::Kraken
    }

    fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    fn get_ticker(&self, market: Market) -> Result<CurrencyTick, ExchangeError> {
        let result: HashMap<String, Ticker> = self.public(
            "Ticker",
            &[("pair", market.symbol(ExchangeId::Kraken))],
        )?;
        let ticker = result.into_values().next().ok_or(ExchangeError::NoData)?;

        let bid = ticker.bid.first().map(String::as_str).unwrap_or("0");
        let ask = ticker.ask.first().map(String::as_str).unwrap_or("0");
        Ok(CurrencyTick::new(
            parse_f64(bid)?,
            parse_f64(ask)?,
            market.base,
            market.traded,
        ))
    }

    fn get_candles(
        &self,
        market: Market,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let wire = interval.wire(ExchangeId::Kraken).map_err(|_| {
            ExchangeError::StockExchange(format!("unsupported kraken interval: {interval}"))
        })?;
        let result: HashMap<String, serde_json::Value> = self.public(
            "OHLC",
            &[
                ("pair", market.symbol(ExchangeId::Kraken)),
                ("interval", wire.to_owned()),
            ],
        )?;

        // The result map holds the pair rows plus a scalar "last" cursor.
        let rows = result
            .into_iter()
            .find(|(key, _)| key.as_str() != "last")
            .map(|(_, value)| value)
            .ok_or(ExchangeError::NoData)?;
        let rows: Vec<OhlcRow> = serde_json::from_value(rows)?;

        let mut candles = rows
            .into_iter()
            .map(OhlcRow::into_candle)
            .collect::<Result<Vec<_>, _>>()?;
        candles.sort_by_key(|candle| candle.time);
        Ok(candles)
    }

    fn get_balance(&self, currency: Currency) -> Result<f64, ExchangeError> {
        let balances: HashMap<String, String> = self.private("Balance", &[])?;
        balances
            .get(kraken_alias(currency))
            .map_or(Ok(0.0), |amount| parse_f64(amount))
    }

    fn get_account_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let result: OpenOrders = self.private("OpenOrders", &[])?;
        result
            .open
            .into_iter()
            .filter(|(_, order)| order.descr.pair_matches(market))
            .map(|(txid, order)| order.into_market_order(txid, market))
            .collect()
    }

    fn get_market_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let result: HashMap<String, Depth> = self.public(
            "Depth",
            &[("pair", market.symbol(ExchangeId::Kraken))],
        )?;
        let depth = result.into_values().next().ok_or(ExchangeError::NoData)?;

        let to_order = |entry: &DepthEntry, side: Side| -> Result<MarketOrder, ExchangeError> {
            Ok(MarketOrder {
                side,
                base: market.base,
                traded: market.traded,
                exchange: ExchangeId::Kraken,
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
        let result: HashMap<String, OpenOrder> =
            self.private("QueryOrders", &[("txid", uuid.to_owned())])?;
        let (txid, order) = result.into_iter().next().ok_or(ExchangeError::NoData)?;
        order.into_market_order(txid, market)
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
        match self.private::<Canceled>("CancelOrder", &[("txid", uuid.to_owned())]) {
            Ok(canceled) => Ok(canceled.count > 0),
            Err(ExchangeError::NoData) => Ok(false),
            Err(ExchangeError::StockExchange(message)) if message.contains("Unknown order") => {
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    fn get_lot_sizes(&self) -> Result<LotSizeHolder, ExchangeError> {
        Ok(LotSizeHolder::empty())
    }
}

/// Every Kraken payload arrives wrapped in `{error: [..], result: ..}`.
#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

fn unwrap_envelope<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ExchangeError> {
    let envelope: Envelope<T> = serde_json::from_slice(payload)?;
    if let Some(message) = envelope.error.into_iter().next() {
        return Err(map_kraken_error(message));
    }
    envelope.result.ok_or(ExchangeError::NoData)
}

fn map_kraken_error(message: String) -> ExchangeError {
    if message.contains("Unknown asset pair") {
        ExchangeError::InvalidPair
    } else if message.contains("Unknown order") || message.contains("Invalid order") {
        ExchangeError::NoData
    } else {
        ExchangeError::from_venue_message(message)
    }
}

#[derive(Deserialize)]
struct Ticker {
    #[serde(rename = "b", default)]
    bid: Vec<String>,
    #[serde(rename = "a", default)]
    ask: Vec<String>,
}

/// One OHLC row: `[time, open, high, low, close, vwap, volume, count]`.
#[derive(Deserialize)]
struct OhlcRow(
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    serde_json::Value,
);

impl OhlcRow {
    fn into_candle(self) -> Result<Candle, ExchangeError> {
        Ok(Candle {
            time: Utc.timestamp_opt(self.0, 0).single().unwrap_or_default(),
            open: parse_f64(&self.1)?,
            high: parse_f64(&self.2)?,
            low: parse_f64(&self.3)?,
            close: parse_f64(&self.4)?,
            volume: parse_f64(&self.6)?,
        })
    }
}

#[derive(Deserialize)]
struct OpenOrders {
    #[serde(default)]
    open: HashMap<String, OpenOrder>,
}

#[derive(Deserialize)]
struct OpenOrder {
    descr: OrderDescription,
    vol: String,
    #[serde(default)]
    opentm: f64,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct OrderDescription {
    pair: String,
    #[serde(rename = "type")]
    side: String,
    price: String,
}

impl OrderDescription {
    /// Kraken reports the pair as its altname (aliases trimmed of the X/Z prefix),
    /// so match against both spellings of the requested market.
    fn pair_matches(&self, market: Market) -> bool {
        let full = market.symbol(ExchangeId::Kraken);
        let altname = format!(
            "{}{}",
            trim_alias(kraken_alias(market.traded)),
            trim_alias(kraken_alias(market.base))
        );
        self.pair.eq_ignore_ascii_case(&full) || self.pair.eq_ignore_ascii_case(&altname)
    }
}

fn trim_alias(alias: &str) -> &str {
    match alias.len() {
        4 if alias.starts_with('X') || alias.starts_with('Z') => &alias[1..],
        _ => alias,
    }
}

impl OpenOrder {
    fn into_market_order(self, txid: String, market: Market) -> Result<MarketOrder, ExchangeError> {
        let side = match self.descr.side.as_str() {
            "buy" => Side::Buy,
            "sell" => Side::Sell,
            other => {
                return Err(ExchangeError::StockExchange(format!(
                    "unrecognised kraken order type: {other}"
                )))
            }
        };

        Ok(MarketOrder {
            db_id: 0,
            uuid: txid,
            base: market.base,
            traded: market.traded,
            side,
            exchange: ExchangeId::Kraken,
            quantity: parse_f64(&self.vol)?,
            price: parse_f64(&self.descr.price)?,
            opened_at: Utc
                .timestamp_opt(self.opentm as i64, 0)
                .single()
                .unwrap_or_default(),
            canceled: self.status == "canceled",
        })
    }
}

#[derive(Deserialize)]
struct Depth {
    #[serde(default)]
    bids: Vec<DepthEntry>,
    #[serde(default)]
    asks: Vec<DepthEntry>,
}

#[derive(Deserialize)]
struct DepthEntry(String, String, serde_json::Value);

#[derive(Deserialize)]
struct PlacedOrder {
    txid: Vec<String>,
}

#[derive(Deserialize)]
struct Canceled {
    count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(server: &mockito::Server) -> Kraken {
        let mut kraken = Kraken::with_url(server.url()).unwrap();
        // Base64 secret, as issued by the venue.
        kraken.set_credentials(Credentials::new("api-key", "c2VjcmV0LWtleQ=="));
        kraken
    }

    #[test]
    fn ticker_reads_first_bid_and_ask_entries() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/0/public/Ticker")
            .match_query(mockito::Matcher::UrlEncoded("pair".into(), "XXBTZUSD".into()))
            .with_body(
                r#"{"error":[],"result":{"XXBTZUSD":{"a":["52609.60000","1","1.000"],"b":["52609.50000","1","1.000"],"c":["52609.50000","0.0001"]}}}"#,
            )
            .create();

        let market = Market::new(Currency::Usd, Currency::Btc);
        let tick = adapter(&server).get_ticker(market).unwrap();

        assert_eq!(tick.bid, 52609.5);
        assert_eq!(tick.ask, 52609.6);
    }

    #[test]
    fn ohlc_rows_normalise_to_candles_skipping_last_cursor() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/0/public/OHLC")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{"error":[],"result":{"XXBTZUSD":[
                    [1688671200,"30306.1","30306.2","30305.7","30305.7","30306.1","3.39243896",23],
                    [1688671140,"30302.8","30306.2","30302.8","30306.2","30304.7","0.00475100",2
                ]],"last":1688672160}}"#,
            )
            .create();

        let market = Market::new(Currency::Usd, Currency::Btc);
        let candles = adapter(&server)
            .get_candles(market, CandleInterval::OneMin)
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert!(candles[0].time < candles[1].time);
        assert_eq!(candles[1].close, 30305.7);
        assert_eq!(candles[1].volume, 3.39243896);
    }

    #[test]
    fn unknown_asset_pair_maps_to_invalid_pair() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/0/public/Ticker")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"error":["EQuery:Unknown asset pair"]}"#)
            .create();

        let market = Market::new(Currency::Usd, Currency::Btc);
        assert_eq!(
            adapter(&server).get_ticker(market).unwrap_err(),
            ExchangeError::InvalidPair
        );
    }

    #[test]
    fn balance_defaults_to_zero_for_absent_assets() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/0/private/Balance")
            .with_body(r#"{"error":[],"result":{"ZUSD":"171288.6158"}}"#)
            .create();

        assert_eq!(adapter(&server).get_balance(Currency::Usd).unwrap(), 171288.6158);
        assert_eq!(adapter(&server).get_balance(Currency::Ltc).unwrap(), 0.0);
    }

    #[test]
    fn open_orders_filter_by_altname_pair() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/0/private/OpenOrders")
            .with_body(
                r#"{"error":[],"result":{"open":{
                    "OQCLML-BW3P3-BUCMWZ":{"descr":{"pair":"XBTUSD","type":"buy","price":"30010.0"},"vol":"1.25","opentm":1688666559.8974,"status":"open"},
                    "OB5VMB-B4U2U-DK2WRW":{"descr":{"pair":"XRPUSD","type":"buy","price":"0.5"},"vol":"100","opentm":1688666559.1,"status":"open"}
                }}}"#,
            )
            .create();

        let market = Market::new(Currency::Usd, Currency::Btc);
        let orders = adapter(&server).get_account_open_orders(market).unwrap();

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].uuid, "OQCLML-BW3P3-BUCMWZ");
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].price, 30010.0);
    }

    #[test]
    fn placement_returns_first_txid() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/0/private/AddOrder")
            .with_body(
                r#"{"error":[],"result":{"descr":{"order":"buy 1.25 XBTUSD @ limit 30010.0"},"txid":["OUF4EM-FRGI2-MQMWZD"]}}"#,
            )
            .create();

        let market = Market::new(Currency::Usd, Currency::Btc);
        let order = adapter(&server).place_buy(market, 1.25, 30010.0).unwrap();

        assert_eq!(order.uuid, "OUF4EM-FRGI2-MQMWZD");
        assert_eq!(order.exchange, ExchangeId::Kraken);
    }

    #[test]
    fn insufficient_funds_maps_on_placement() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/0/private/AddOrder")
            .with_body(r#"{"error":["EOrder:Insufficient funds"]}"#)
            .create();

        let market = Market::new(Currency::Usd, Currency::Btc);
        assert_eq!(
            adapter(&server).place_buy(market, 1.25, 30010.0).unwrap_err(),
            ExchangeError::InsufficientFunds
        );
    }

    #[test]
    fn cancel_counts_as_denied_when_order_unknown() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/0/private/CancelOrder")
            .with_body(r#"{"error":["EOrder:Unknown order"]}"#)
            .create();

        let market = Market::new(Currency::Usd, Currency::Btc);
        assert_eq!(adapter(&server).cancel(market, "OUF4EM"), Ok(false));
    }
}
