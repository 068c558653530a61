use crate::currency::Currency;
use crate::exchange::ExchangeId;
use crate::InstrumentError;
use serde::{Deserialize, Serialize};

/// Represents a unique combination of a base [`Currency`] (the one the funded amount
/// and order prices are denominated in) and a traded [`Currency`] (the one being
/// bought against the base).
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Default,
)]
pub struct Market {
    pub base: Currency,
    pub traded: Currency,
}

impl Market {
    /// Constructs a new [`Market`] from the provided base & traded [`Currency`].
    pub fn new(base: Currency, traded: Currency) -> Self {
        Self { base, traded }
    }

    /// Format this [`Market`] as the wire symbol `exchange` expects.
    ///
    /// Bittrex "BTC-LTC", Binance "LTCBTC", Poloniex "BTC_LTC", Kraken "XXBTZUSD"
    /// (X/Z-aliased, traded then base), Huobi "ltcbtc".
    pub fn symbol(&self, exchange: ExchangeId) -> String {
        match exchange {
            ExchangeId::Bittrex => format!("{}-{}", self.base, self.traded),
            ExchangeId::Binance => format!("{}{}", self.traded, self.base),
            ExchangeId::Poloniex => format!("{}_{}", self.base, self.traded),
            ExchangeId::Kraken => format!(
                "{}{}",
                kraken_alias(self.traded),
                kraken_alias(self.base)
            ),
            ExchangeId::Huobi => {
                format!("{}{}", self.traded, self.base).to_ascii_lowercase()
            }
            ExchangeId::Unknown => format!("{}{}", self.traded, self.base),
        }
    }

    /// Parse an `exchange` wire symbol back into a [`Market`]. Exact inverse of
    /// [`Market::symbol`] for every supported pair.
    pub fn parse_symbol(exchange: ExchangeId, symbol: &str) -> Result<Self, InstrumentError> {
        let unknown = || InstrumentError::UnknownPairSymbol {
            exchange,
            symbol: symbol.to_owned(),
        };

        match exchange {
            ExchangeId::Bittrex => {
                let (base, traded) = symbol.split_once('-').ok_or_else(unknown)?;
                Self::from_parts(base, traded).ok_or_else(unknown)
            }
            ExchangeId::Poloniex => {
                let (base, traded) = symbol.split_once('_').ok_or_else(unknown)?;
                Self::from_parts(base, traded).ok_or_else(unknown)
            }
            ExchangeId::Binance | ExchangeId::Huobi | ExchangeId::Unknown => {
                split_concatenated(symbol, |name| {
                    let currency = Currency::from_name(name);
                    (currency != Currency::Unknown).then_some(currency)
                })
                .ok_or_else(unknown)
            }
            ExchangeId::Kraken => {
                split_concatenated(symbol, from_kraken_alias).ok_or_else(unknown)
            }
        }
    }

    fn from_parts(base: &str, traded: &str) -> Option<Self> {
        let base = Currency::from_name(base);
        let traded = Currency::from_name(traded);
        (base != Currency::Unknown && traded != Currency::Unknown)
            .then_some(Self { base, traded })
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.traded)
    }
}

/// Split a separator-less `traded then base` symbol by trying every prefix length,
/// resolving each half with the provided alias parser.
fn split_concatenated(
    symbol: &str,
    parse: impl Fn(&str) -> Option<Currency>,
) -> Option<Market> {
    (1..symbol.len()).find_map(|split| {
        let traded = parse(&symbol[..split])?;
        let base = parse(&symbol[split..])?;
        Some(Market { base, traded })
    })
}

/// Kraken's asset aliases: fiat carries a Z prefix, most of the older crypto assets an
/// X prefix, newer listings none at all. Public because Kraken keys balances &
/// order-book entries by alias rather than canonical name.
pub fn kraken_alias(currency: Currency) -> &'static str {
    match currency {
        Currency::Usd => "ZUSD",
        Currency::Eur => "ZEUR",
        Currency::Cad => "ZCAD",
        Currency::Gbp => "ZGBP",
        Currency::Jpy => "ZJPY",
        Currency::Btc => "XXBT",
        Currency::Eth => "XETH",
        Currency::Etc => "XETC",
        Currency::Ltc => "XLTC",
        Currency::Rep => "XREP",
        Currency::Xlm => "XXLM",
        Currency::Xmr => "XXMR",
        Currency::Xrp => "XXRP",
        Currency::Zec => "XZEC",
        other => other.as_str(),
    }
}

/// Inverse of [`kraken_alias`].
pub fn from_kraken_alias(alias: &str) -> Option<Currency> {
    Currency::ALL
        .into_iter()
        .filter(|currency| *currency != Currency::Unknown)
        .find(|currency| kraken_alias(*currency) == alias)
}
