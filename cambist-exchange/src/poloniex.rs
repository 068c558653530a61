use crate::{opened_now, parse_f64, with_redirect_retry, Exchange};
use cambist_data::{format_coin, Candle, CurrencyTick, LotSizeHolder, MarketOrder, Side};
use cambist_instrument::{CandleInterval, Currency, ExchangeId, Market};
use cambist_integration::{
    canonical_query, local_timestamp_millis, signer, Credentials, ExchangeError, RestClient,
};
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const API_URL: &str = "https://poloniex.com";

/// Number of candles requested from the chart-data endpoint per call.
const CHART_WINDOW: i64 = 300;

/// Poloniex adapter over the legacy public & tradingApi endpoints.
///
/// Private endpoints POST an urlencoded body led by `command` & `nonce`, with `Key`
/// and `Sign` headers — the latter the HMAC-SHA512 hex digest of the body.
pub struct Poloniex {
    client: RestClient,
    credentials: Credentials,
    api_url: String,
}

impl Poloniex {
    /// Constructs a new [`Poloniex`] adapter against the production endpoint.
    pub fn new() -> Result<Self, ExchangeError> {
        Self::with_url(API_URL.to_owned())
    }

    /// Constructs a [`Poloniex`] adapter against an alternative endpoint (tests).
    pub fn with_url(api_url: String) -> Result<Self, ExchangeError> {
        Ok(Self {
            client: RestClient::new()?,
            credentials: Credentials::default(),
            api_url,
        })
    }

    fn public<T: DeserializeOwned>(&self, query: &[(&str, String)]) -> Result<T, ExchangeError> {
        let url = format!("{}/public", self.api_url);
        with_redirect_retry(&url, |url| {
            let (_, payload) = self.client.get(url, query, &[])?;
            unwrap_payload(&payload)
        })
    }

    fn private<T: DeserializeOwned>(
        &self,
        command: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let mut pairs: Vec<(&str, String)> = vec![
            ("command", command.to_owned()),
            ("nonce", local_timestamp_millis().to_string()),
        ];
        pairs.extend(query.iter().map(|(name, value)| (*name, value.clone())));
        let body = canonical_query(&pairs)?;

        let signature = signer::sign_sha512_hex(&self.credentials.secret_key, &body)?;
        let headers = [
            ("Key", self.credentials.api_key.clone()),
            ("Sign", signature),
        ];

        let url = format!("{}/tradingApi", self.api_url);
        let (_, payload) = self.client.post_form(&url, body, &headers)?;
        unwrap_payload(&payload)
    }

    fn place(
        &self,
        market: Market,
        side: Side,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError> {
        let placed: PlacedOrder = self.private(
            side.as_str(),
            &[
                ("currencyPair", market.symbol(ExchangeId::Poloniex)),
                ("rate", format_coin(rate)),
                ("amount", format_coin(quantity)),
            ],
        )?;

        debug!(order_number = %placed.order_number, %market, %side, "poloniex order placed");
        Ok(MarketOrder {
            db_id: 0,
            uuid: placed.order_number,
            base: market.base,
            traded: market.traded,
            side,
            exchange: ExchangeId::Poloniex,
            quantity,
            price: rate,
            opened_at: opened_now(),
            canceled: false,
        })
    }
}

impl Exchange for Poloniex {
    fn id(&self) -> ExchangeId {
        ExchangeId::Poloniex
    }

    fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    fn get_ticker(&self, market: Market) -> Result<CurrencyTick, ExchangeError> {
        let tickers: HashMap<String, Ticker> =
            self.public(&[("command", "returnTicker".to_owned())])?;
        let ticker = tickers
            .get(&market.symbol(ExchangeId::Poloniex))
            .ok_or(ExchangeError::InvalidPair)?;

        Ok(CurrencyTick::new(
            parse_f64(&ticker.highest_bid)?,
            parse_f64(&ticker.lowest_ask)?,
            market.base,
            market.traded,
        ))
    }

    fn get_candles(
        &self,
        market: Market,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let wire = interval.wire(ExchangeId::Poloniex).map_err(|_| {
            ExchangeError::StockExchange(format!("unsupported poloniex interval: {interval}"))
        })?;
        let period_secs = wire.parse::<i64>().unwrap_or(300);
        let end = Utc::now().timestamp();
        let start = end - period_secs * CHART_WINDOW;

        let rows: Vec<ChartRow> = self.public(&[
            ("command", "returnChartData".to_owned()),
            ("currencyPair", market.symbol(ExchangeId::Poloniex)),
            ("period", wire.to_owned()),
            ("start", start.to_string()),
            ("end", end.to_string()),
        ])?;

        let mut candles = rows.into_iter().map(ChartRow::into_candle).collect::<Vec<_>>();
        candles.sort_by_key(|candle| candle.time);
        Ok(candles)
    }

    fn get_balance(&self, currency: Currency) -> Result<f64, ExchangeError> {
        let balances: HashMap<String, String> = self.private("returnBalances", &[])?;
        balances
            .get(currency.as_str())
            .map_or(Ok(0.0), |amount| parse_f64(amount))
    }

    fn get_account_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let orders: Vec<OpenOrder> = self.private(
            "returnOpenOrders",
            &[("currencyPair", market.symbol(ExchangeId::Poloniex))],
        )?;
        orders
            .into_iter()
            .map(|order| order.into_market_order(market))
            .collect()
    }

    fn get_market_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError> {
        let book: OrderBook = self.public(&[
            ("command", "returnOrderBook".to_owned()),
            ("currencyPair", market.symbol(ExchangeId::Poloniex)),
            ("depth", "50".to_owned()),
        ])?;

        let to_order = |entry: &(String, f64), side: Side| -> Result<MarketOrder, ExchangeError> {
            Ok(MarketOrder {
                side,
                base: market.base,
                traded: market.traded,
                exchange: ExchangeId::Poloniex,
                price: parse_f64(&entry.0)?,
                quantity: entry.1,
                ..MarketOrder::default()
            })
        };

        book.bids
            .iter()
            .map(|entry| to_order(entry, Side::Buy))
            .chain(book.asks.iter().map(|entry| to_order(entry, Side::Sell)))
            .collect()
    }

    fn get_account_order(
        &self,
        market: Market,
        uuid: &str,
    ) -> Result<MarketOrder, ExchangeError> {
        let status: OrderStatus = self.private(
            "returnOrderStatus",
            &[("orderNumber", uuid.to_owned())],
        )?;
        if status.success == 0 {
            return Err(ExchangeError::NoData);
        }
        let entry = status
            .result
            .into_iter()
            .find(|(key, _)| key.as_str() != "error")
            .map(|(_, value)| value)
            .ok_or(ExchangeError::NoData)?;
        let order: OrderStatusEntry = serde_json::from_value(entry)?;
        order.into_market_order(uuid.to_owned(), market)
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
        match self.private::<CancelResult>("cancelOrder", &[("orderNumber", uuid.to_owned())]) {
            Ok(result) => Ok(result.success == 1),
            Err(ExchangeError::StockExchange(message))
                if message.contains("not found") || message.contains("you do not own") =>
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

/// Poloniex has no envelope; errors arrive as `{"error": "..."}` with HTTP 200.
fn unwrap_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ExchangeError> {
    #[derive(Deserialize)]
    struct VenueError {
        error: String,
    }

    if let Ok(VenueError { error }) = serde_json::from_slice::<VenueError>(payload) {
        return Err(map_poloniex_error(error));
    }
    Ok(serde_json::from_slice(payload)?)
}

fn map_poloniex_error(message: String) -> ExchangeError {
    if message.contains("Invalid currency pair") {
        ExchangeError::InvalidPair
    } else if message.contains("Invalid order number") {
        ExchangeError::NoData
    } else {
        ExchangeError::from_venue_message(message)
    }
}

#[derive(Deserialize)]
struct Ticker {
    #[serde(rename = "highestBid")]
    highest_bid: String,
    #[serde(rename = "lowestAsk")]
    lowest_ask: String,
}

/// Chart rows arrive with plain JSON numbers, unlike the string-typed trading API.
#[derive(Deserialize)]
struct ChartRow {
    date: i64,
    open: f64,
    close: f64,
    low: f64,
    high: f64,
    volume: f64,
}

impl ChartRow {
    fn into_candle(self) -> Candle {
        Candle {
            time: Utc.timestamp_opt(self.date, 0).single().unwrap_or_default(),
            open: self.open,
            close: self.close,
            low: self.low,
            high: self.high,
            volume: self.volume,
        }
    }
}

#[derive(Deserialize)]
struct PlacedOrder {
    #[serde(rename = "orderNumber")]
    order_number: String,
}

#[derive(Deserialize)]
struct OpenOrder {
    #[serde(rename = "orderNumber")]
    order_number: String,
    #[serde(rename = "type")]
    side: String,
    rate: String,
    amount: String,
    #[serde(default)]
    date: String,
}

impl OpenOrder {
    fn into_market_order(self, market: Market) -> Result<MarketOrder, ExchangeError> {
        build_order(
            self.order_number,
            market,
            &self.side,
            &self.rate,
            &self.amount,
            &self.date,
            false,
        )
    }
}

#[derive(Deserialize)]
struct OrderStatus {
    #[serde(default)]
    success: i64,
    #[serde(default)]
    result: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct OrderStatusEntry {
    #[serde(rename = "type")]
    side: String,
    rate: String,
    amount: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    status: String,
}

impl OrderStatusEntry {
    fn into_market_order(self, uuid: String, market: Market) -> Result<MarketOrder, ExchangeError> {
        build_order(
            uuid,
            market,
            &self.side,
            &self.rate,
            &self.amount,
            &self.date,
            self.status == "Canceled",
        )
    }
}

fn build_order(
    uuid: String,
    market: Market,
    side: &str,
    rate: &str,
    amount: &str,
    date: &str,
    canceled: bool,
) -> Result<MarketOrder, ExchangeError> {
    let side = match side {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        other => {
            return Err(ExchangeError::StockExchange(format!(
                "unrecognised poloniex order type: {other}"
            )))
        }
    };

    let opened_at = NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or_default();

    Ok(MarketOrder {
        db_id: 0,
        uuid,
        base: market.base,
        traded: market.traded,
        side,
        exchange: ExchangeId::Poloniex,
        quantity: parse_f64(amount)?,
        price: parse_f64(rate)?,
        opened_at,
        canceled,
    })
}

#[derive(Deserialize)]
struct OrderBook {
    #[serde(default)]
    bids: Vec<(String, f64)>,
    #[serde(default)]
    asks: Vec<(String, f64)>,
}

#[derive(Deserialize)]
struct CancelResult {
    #[serde(default)]
    success: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(server: &mockito::Server) -> Poloniex {
        let mut poloniex = Poloniex::with_url(server.url()).unwrap();
        poloniex.set_credentials(Credentials::new("api-key", "secret"));
        poloniex
    }

    #[test]
    fn ticker_selects_requested_pair_from_map() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/public")
            .match_query(mockito::Matcher::UrlEncoded(
                "command".into(),
                "returnTicker".into(),
            ))
            .with_body(
                r#"{"BTC_LTC":{"highestBid":"0.00630000","lowestAsk":"0.00650000","last":"0.0064"},
                    "BTC_ETH":{"highestBid":"0.03","lowestAsk":"0.031","last":"0.03"}}"#,
            )
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let tick = adapter(&server).get_ticker(market).unwrap();

        assert_eq!(tick.bid, 0.0063);
        assert_eq!(tick.ask, 0.0065);
    }

    #[test]
    fn absent_pair_maps_to_invalid_pair() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/public")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"BTC_ETH":{"highestBid":"0.03","lowestAsk":"0.031"}}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        assert_eq!(
            adapter(&server).get_ticker(market).unwrap_err(),
            ExchangeError::InvalidPair
        );
    }

    #[test]
    fn chart_data_normalises_to_candles() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/public")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"[{"date":1405699200,"high":0.0045,"low":0.0040,"open":0.0041,"close":0.0044,"volume":10.5,"quoteVolume":2500.0}]"#,
            )
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let candles = adapter(&server)
            .get_candles(market, CandleInterval::FiveMin)
            .unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 0.0044);
        assert_eq!(candles[0].time.timestamp(), 1_405_699_200);
    }

    #[test]
    fn balance_reads_from_currency_map() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/tradingApi")
            .with_body(r#"{"BTC":"0.59098578","LTC":"3.31117268"}"#)
            .create();

        assert_eq!(adapter(&server).get_balance(Currency::Btc).unwrap(), 0.59098578);
        assert_eq!(adapter(&server).get_balance(Currency::Eth).unwrap(), 0.0);
    }

    #[test]
    fn open_orders_normalise_sides_and_dates() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/tradingApi")
            .with_body(
                r#"[{"orderNumber":"120466","type":"sell","rate":"0.025","amount":"100","total":"2.5","date":"2014-10-18 23:03:21"}]"#,
            )
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let orders = adapter(&server).get_account_open_orders(market).unwrap();

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Sell);
        assert_eq!(orders[0].quantity, 100.0);
        assert_eq!(orders[0].opened_at.timestamp(), 1_413_673_401);
    }

    #[test]
    fn placement_returns_order_number() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/tradingApi")
            .with_body(r#"{"orderNumber":"31226040","resultingTrades":[]}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        let order = adapter(&server).place_buy(market, 1.0, 0.006).unwrap();

        assert_eq!(order.uuid, "31226040");
        assert_eq!(order.exchange, ExchangeId::Poloniex);
    }

    #[test]
    fn venue_error_surfaces_on_placement() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/tradingApi")
            .with_body(r#"{"error":"Not enough BTC. Insufficient funds."}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        assert_eq!(
            adapter(&server).place_buy(market, 1.0, 0.006).unwrap_err(),
            ExchangeError::InsufficientFunds
        );
    }

    #[test]
    fn cancel_success_flag_drives_result() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/tradingApi")
            .with_body(r#"{"success":1,"amount":"1.0","message":"Order #120466 canceled."}"#)
            .create();

        let market = Market::new(Currency::Btc, Currency::Ltc);
        assert_eq!(adapter(&server).cancel(market, "120466"), Ok(true));
    }
}
