use crate::exchange::ExchangeId;
use crate::InstrumentError;
use serde::{Deserialize, Serialize};

/// Ordered candle interval enumeration.
///
/// Not every venue serves every interval; [`CandleInterval::wire`] yields the venue's
/// wire token where one exists (Binance "1h", Kraken minutes-as-integer, Poloniex
/// seconds-as-integer, Bittrex named strings, Huobi "60min") and an
/// [`InstrumentError::UnsupportedInterval`] otherwise. Configuration validation
/// rejects unsupported combinations before an engine worker ever runs.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CandleInterval {
    OneMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    TwoHour,
    FourHour,
    TwelveHour,
    OneDay,
    OneWeek,
    OneMonth,
}

impl CandleInterval {
    /// Return the canonical &str representation of this [`CandleInterval`].
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::OneMin => "one_min",
            CandleInterval::FiveMin => "five_min",
            CandleInterval::FifteenMin => "fifteen_min",
            CandleInterval::ThirtyMin => "thirty_min",
            CandleInterval::OneHour => "one_hour",
            CandleInterval::TwoHour => "two_hour",
            CandleInterval::FourHour => "four_hour",
            CandleInterval::TwelveHour => "twelve_hour",
            CandleInterval::OneDay => "one_day",
            CandleInterval::OneWeek => "one_week",
            CandleInterval::OneMonth => "one_month",
        }
    }

    /// The wire token `exchange` expects for this interval.
    pub fn wire(&self, exchange: ExchangeId) -> Result<&'static str, InstrumentError> {
        let token = match exchange {
            ExchangeId::Binance => match self {
                CandleInterval::OneMin => Some("1m"),
                CandleInterval::FiveMin => Some("5m"),
                CandleInterval::FifteenMin => Some("15m"),
                CandleInterval::ThirtyMin => Some("30m"),
                CandleInterval::OneHour => Some("1h"),
                CandleInterval::TwoHour => Some("2h"),
                CandleInterval::FourHour => Some("4h"),
                CandleInterval::TwelveHour => Some("12h"),
                CandleInterval::OneDay => Some("1d"),
                CandleInterval::OneWeek => Some("1w"),
                CandleInterval::OneMonth => Some("1M"),
            },
            ExchangeId::Kraken => match self {
                CandleInterval::OneMin => Some("1"),
                CandleInterval::FiveMin => Some("5"),
                CandleInterval::FifteenMin => Some("15"),
                CandleInterval::ThirtyMin => Some("30"),
                CandleInterval::OneHour => Some("60"),
                CandleInterval::FourHour => Some("240"),
                CandleInterval::OneDay => Some("1440"),
                CandleInterval::OneWeek => Some("10080"),
                _ => None,
            },
            ExchangeId::Poloniex => match self {
                CandleInterval::FiveMin => Some("300"),
                CandleInterval::FifteenMin => Some("900"),
                CandleInterval::ThirtyMin => Some("1800"),
                CandleInterval::TwoHour => Some("7200"),
                CandleInterval::FourHour => Some("14400"),
                CandleInterval::OneDay => Some("86400"),
                _ => None,
            },
            ExchangeId::Bittrex => match self {
                CandleInterval::OneMin => Some("oneMin"),
                CandleInterval::FiveMin => Some("fiveMin"),
                CandleInterval::ThirtyMin => Some("thirtyMin"),
                CandleInterval::OneHour => Some("hour"),
                CandleInterval::OneDay => Some("day"),
                _ => None,
            },
            ExchangeId::Huobi => match self {
                CandleInterval::OneMin => Some("1min"),
                CandleInterval::FiveMin => Some("5min"),
                CandleInterval::FifteenMin => Some("15min"),
                CandleInterval::ThirtyMin => Some("30min"),
                CandleInterval::OneHour => Some("60min"),
                CandleInterval::FourHour => Some("4hour"),
                CandleInterval::OneDay => Some("1day"),
                CandleInterval::OneWeek => Some("1week"),
                CandleInterval::OneMonth => Some("1mon"),
                _ => None,
            },
            ExchangeId::Unknown => None,
        };

        token.ok_or(InstrumentError::UnsupportedInterval {
            exchange,
            interval: *self,
        })
    }

    /// Inverse of [`CandleInterval::wire`] for the given venue.
    pub fn from_wire(exchange: ExchangeId, token: &str) -> Option<Self> {
        ALL.into_iter()
            .find(|interval| matches!(interval.wire(exchange), Ok(wire) if wire == token))
    }
}

const ALL: [CandleInterval; 11] = [
    CandleInterval::OneMin,
    CandleInterval::FiveMin,
    CandleInterval::FifteenMin,
    CandleInterval::ThirtyMin,
    CandleInterval::OneHour,
    CandleInterval::TwoHour,
    CandleInterval::FourHour,
    CandleInterval::TwelveHour,
    CandleInterval::OneDay,
    CandleInterval::OneWeek,
    CandleInterval::OneMonth,
];

impl std::fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_ordering_is_ascending() {
        assert!(CandleInterval::OneMin < CandleInterval::OneHour);
        assert!(CandleInterval::OneDay < CandleInterval::OneMonth);
    }

    #[test]
    fn interval_wire_round_trips_where_supported() {
        for exchange in ExchangeId::ALL {
            for interval in ALL {
                if let Ok(token) = interval.wire(exchange) {
                    assert_eq!(CandleInterval::from_wire(exchange, token), Some(interval));
                }
            }
        }
    }

    #[test]
    fn unsupported_interval_is_an_error() {
        assert_eq!(
            CandleInterval::TwelveHour.wire(ExchangeId::Kraken),
            Err(InstrumentError::UnsupportedInterval {
                exchange: ExchangeId::Kraken,
                interval: CandleInterval::TwelveHour,
            })
        );
    }
}
