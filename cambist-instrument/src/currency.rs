use serde::{Deserialize, Serialize};

/// Closed enumeration of the symbolic currency tokens Cambist understands, plus
/// [`Currency::Unknown`] for anything a venue reports that is outside the catalog.
///
/// The canonical string form is the uppercase token (eg/ "BTC"), and
/// `Currency::from_name(currency.as_str())` round-trips for every non-Unknown variant.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Usdt,
    Eur,
    Cad,
    Gbp,
    Jpy,
    Btc,
    Eth,
    Ltc,
    Xrp,
    Bch,
    Ada,
    Xlm,
    Xmr,
    Dash,
    Etc,
    Zec,
    Eos,
    Atom,
    Qtum,
    Rep,
    Xtz,
    Trx,
    Neo,
    Unknown,
}

impl Currency {
    /// Every [`Currency`] in declaration order, `Unknown` last. Drives pair symbol
    /// parsing & the store's integer round-trips.
    pub const ALL: [Currency; 25] = [
        Currency::Usd,
        Currency::Usdt,
        Currency::Eur,
        Currency::Cad,
        Currency::Gbp,
        Currency::Jpy,
        Currency::Btc,
        Currency::Eth,
        Currency::Ltc,
        Currency::Xrp,
        Currency::Bch,
        Currency::Ada,
        Currency::Xlm,
        Currency::Xmr,
        Currency::Dash,
        Currency::Etc,
        Currency::Zec,
        Currency::Eos,
        Currency::Atom,
        Currency::Qtum,
        Currency::Rep,
        Currency::Xtz,
        Currency::Trx,
        Currency::Neo,
        Currency::Unknown,
    ];

    /// Return the canonical uppercase &str representation of this [`Currency`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Usdt => "USDT",
            Currency::Eur => "EUR",
            Currency::Cad => "CAD",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Btc => "BTC",
            Currency::Eth => "ETH",
            Currency::Ltc => "LTC",
            Currency::Xrp => "XRP",
            Currency::Bch => "BCH",
            Currency::Ada => "ADA",
            Currency::Xlm => "XLM",
            Currency::Xmr => "XMR",
            Currency::Dash => "DASH",
            Currency::Etc => "ETC",
            Currency::Zec => "ZEC",
            Currency::Eos => "EOS",
            Currency::Atom => "ATOM",
            Currency::Qtum => "QTUM",
            Currency::Rep => "REP",
            Currency::Xtz => "XTZ",
            Currency::Trx => "TRX",
            Currency::Neo => "NEO",
            Currency::Unknown => "UNKNOWN",
        }
    }

    /// Parse the canonical uppercase token, yielding [`Currency::Unknown`] for anything
    /// outside the catalog. Case-insensitive since venues disagree on casing.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "USD" => Currency::Usd,
            "USDT" => Currency::Usdt,
            "EUR" => Currency::Eur,
            "CAD" => Currency::Cad,
            "GBP" => Currency::Gbp,
            "JPY" => Currency::Jpy,
            "BTC" => Currency::Btc,
            "ETH" => Currency::Eth,
            "LTC" => Currency::Ltc,
            "XRP" => Currency::Xrp,
            "BCH" => Currency::Bch,
            "ADA" => Currency::Ada,
            "XLM" => Currency::Xlm,
            "XMR" => Currency::Xmr,
            "DASH" => Currency::Dash,
            "ETC" => Currency::Etc,
            "ZEC" => Currency::Zec,
            "EOS" => Currency::Eos,
            "ATOM" => Currency::Atom,
            "QTUM" => Currency::Qtum,
            "REP" => Currency::Rep,
            "XTZ" => Currency::Xtz,
            "TRX" => Currency::Trx,
            "NEO" => Currency::Neo,
            _ => Currency::Unknown,
        }
    }

    /// Integer-stable discriminant used by the persistent store.
    pub fn index(&self) -> i64 {
        *self as i64
    }

    /// Inverse of [`Currency::index`], yielding [`Currency::Unknown`] for anything
    /// outside the catalog (eg/ rows written by a newer schema).
    pub fn from_index(index: i64) -> Self {
        Currency::ALL
            .into_iter()
            .find(|currency| currency.index() == index)
            .unwrap_or(Currency::Unknown)
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::Unknown
    }
}
