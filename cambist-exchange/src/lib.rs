//! # Cambist-Exchange
//! The Exchange capability: a common blocking trait over the REST surface of each
//! supported venue (Bittrex, Binance, Kraken, Poloniex, Huobi), plus one adapter per
//! venue that hides the venue's wire shapes, signing dialect and timestamp policy.
//!
//! Adapters normalise every response into the `cambist-data` record types and
//! surface exactly the `cambist-integration` [`ExchangeError`] kinds; the trading
//! engine never sees venue-specific JSON.
//!
//! Every operation is synchronous & blocking from the caller's perspective: the
//! engine runs one worker thread per configuration and treats each call as a
//! suspension point that may take multiple seconds.

use cambist_data::{Candle, CurrencyTick, LotSizeHolder, MarketOrder};
use cambist_instrument::{CandleInterval, Currency, ExchangeId, Market};
use cambist_integration::{Credentials, ExchangeError};

pub mod binance;
pub mod bittrex;
pub mod huobi;
pub mod kraken;
pub mod poloniex;

pub use binance::Binance;
pub use bittrex::Bittrex;
pub use huobi::Huobi;
pub use kraken::Kraken;
pub use poloniex::Poloniex;

/// Abstract interface over one exchange venue.
///
/// Implementations are stateless except for the [`Credentials`] handed over before a
/// worker starts. Venue-specific policies (signing, server-time lookups, certificate
/// quirks) are encoded inside the adapter and are not visible beyond the
/// [`ExchangeError`] kinds.
pub trait Exchange: Send {
    /// The venue this adapter talks to.
    fn id(&self) -> ExchangeId;

    /// Install API credentials. Idempotent.
    fn set_credentials(&mut self, credentials: Credentials);

    /// Best bid/ask for `market`.
    fn get_ticker(&self, market: Market) -> Result<CurrencyTick, ExchangeError>;

    /// Candle series for `market` over `interval`, normalised newest-last.
    fn get_candles(
        &self,
        market: Market,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Available balance for `currency`; 0 for known currencies with no position.
    fn get_balance(&self, currency: Currency) -> Result<f64, ExchangeError>;

    /// The caller's open orders on `market`.
    fn get_account_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError>;

    /// The venue's order book for `market`, normalised into pseudo orders. Display
    /// only — never an input to trading decisions.
    fn get_market_open_orders(&self, market: Market) -> Result<Vec<MarketOrder>, ExchangeError>;

    /// Inspect one of the caller's orders by venue uuid.
    /// [`ExchangeError::NoData`] when the venue has no record of it.
    fn get_account_order(&self, market: Market, uuid: &str)
        -> Result<MarketOrder, ExchangeError>;

    /// Place a limit BUY of `quantity` at `rate`.
    fn place_buy(
        &self,
        market: Market,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError>;

    /// Place a limit SELL of `quantity` at `rate`.
    fn place_sell(
        &self,
        market: Market,
        quantity: f64,
        rate: f64,
    ) -> Result<MarketOrder, ExchangeError>;

    /// Best-effort cancellation. `Ok(false)` means the venue declined for a
    /// non-exceptional reason; `Err` means the call itself did not complete.
    fn cancel(&self, market: Market, uuid: &str) -> Result<bool, ExchangeError>;

    /// Per-market quantity filters. Venues without filters return an empty holder
    /// and callers skip rounding.
    fn get_lot_sizes(&self) -> Result<LotSizeHolder, ExchangeError>;
}

/// Placement timestamp policy: local UTC now at second granularity, uniformly across
/// venues. Signed-request timestamps are a separate concern and use the venue's
/// server time where it mandates one.
pub(crate) fn opened_now() -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    let now = chrono::Utc::now().timestamp();
    chrono::Utc
        .timestamp_opt(now, 0)
        .single()
        .unwrap_or_default()
}

/// Decimal fields arrive as JSON strings on most venues.
pub(crate) fn parse_f64(value: &str) -> Result<f64, ExchangeError> {
    value
        .parse::<f64>()
        .map_err(|err| ExchangeError::Transport(format!("number parse '{value}': {err}")))
}

/// Run `attempt` once, and where the venue answers with a redirect, retry exactly
/// once against the returned location. A second redirect escalates to
/// [`ExchangeError::Transport`] so callers can never spin.
pub fn with_redirect_retry<T>(
    initial_url: &str,
    mut attempt: impl FnMut(&str) -> Result<T, ExchangeError>,
) -> Result<T, ExchangeError> {
    match attempt(initial_url) {
        Err(ExchangeError::RedirectRequested(location)) => {
            tracing::warn!(from = initial_url, to = %location, "venue requested redirect, retrying once");
            attempt(&location).map_err(|error| match error {
                ExchangeError::RedirectRequested(second) => ExchangeError::Transport(format!(
                    "redirect loop: {initial_url} -> {location} -> {second}"
                )),
                other => other,
            })
        }
        outcome => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_retry_follows_once() {
        let mut calls = Vec::new();
        let result = with_redirect_retry("https://a", |url| {
            calls.push(url.to_owned());
            if url == "https://a" {
                Err(ExchangeError::RedirectRequested("https://b".to_owned()))
            } else {
                Ok(7)
            }
        });

        assert_eq!(result, Ok(7));
        assert_eq!(calls, vec!["https://a", "https://b"]);
    }

    #[test]
    fn second_redirect_escalates_to_transport() {
        let result = with_redirect_retry("https://a", |_| {
            Err::<(), _>(ExchangeError::RedirectRequested("https://b".to_owned()))
        });

        assert!(matches!(result, Err(ExchangeError::Transport(_))));
    }

    #[test]
    fn non_redirect_errors_pass_through() {
        let result =
            with_redirect_retry("https://a", |_| Err::<(), _>(ExchangeError::InvalidPair));
        assert_eq!(result, Err(ExchangeError::InvalidPair));
    }
}
