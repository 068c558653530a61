use serde::{Deserialize, Serialize};

/// Unique identifier for a supported exchange venue.
///
/// Integer-stable (see [`ExchangeId::index`]) so the persistent store can record it.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeId {
    Bittrex,
    Binance,
    Kraken,
    Poloniex,
    Huobi,
    Unknown,
}

impl ExchangeId {
    /// Every concrete venue, in declaration order.
    pub const ALL: [ExchangeId; 5] = [
        ExchangeId::Bittrex,
        ExchangeId::Binance,
        ExchangeId::Kraken,
        ExchangeId::Poloniex,
        ExchangeId::Huobi,
    ];

    /// Return the &str representation of this [`ExchangeId`].
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Bittrex => "bittrex",
            ExchangeId::Binance => "binance",
            ExchangeId::Kraken => "kraken",
            ExchangeId::Poloniex => "poloniex",
            ExchangeId::Huobi => "huobi",
            ExchangeId::Unknown => "unknown",
        }
    }

    /// Integer-stable discriminant used by the persistent store.
    pub fn index(&self) -> i64 {
        *self as i64
    }

    /// Inverse of [`ExchangeId::index`].
    pub fn from_index(index: i64) -> Self {
        ExchangeId::ALL
            .into_iter()
            .find(|exchange| exchange.index() == index)
            .unwrap_or(ExchangeId::Unknown)
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_id_round_trips_store_index() {
        for exchange in ExchangeId::ALL {
            assert_eq!(ExchangeId::from_index(exchange.index()), exchange);
        }
        assert_eq!(ExchangeId::from_index(99), ExchangeId::Unknown);
    }

    #[test]
    fn exchange_id_serde_snake_case() {
        assert_eq!(
            serde_json::from_str::<ExchangeId>(r#""binance""#).unwrap(),
            ExchangeId::Binance
        );
        assert_eq!(
            serde_json::to_string(&ExchangeId::Huobi).unwrap(),
            r#""huobi""#
        );
    }
}
