use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Normalised Cambist OHLCV [`Candle`] model. Timestamps carry second granularity;
/// adapters normalise every series they return to newest-last.
///
/// Equality is componentwise and exact — the signal duplicate-suppression machinery
/// relies on bit-identical floats, so no fuzzy tolerance is applied anywhere.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub low: f64,
    pub high: f64,
    pub volume: f64,
}

impl Candle {
    /// Constructs a new [`Candle`] with the provided epoch seconds timestamp.
    pub fn new(
        epoch_secs: i64,
        open: f64,
        close: f64,
        low: f64,
        high: f64,
        volume: f64,
    ) -> Self {
        Self {
            time: Utc.timestamp_opt(epoch_secs, 0).single().unwrap_or_default(),
            open,
            close,
            low,
            high,
            volume,
        }
    }

    /// Ordering over ascending close price.
    pub fn cmp_close_ascending(&self, other: &Self) -> Ordering {
        self.close
            .partial_cmp(&other.close)
            .unwrap_or(Ordering::Equal)
    }

    /// Ordering over descending close price.
    pub fn cmp_close_descending(&self, other: &Self) -> Ordering {
        other
            .close
            .partial_cmp(&self.close)
            .unwrap_or(Ordering::Equal)
    }
}

impl Default for Candle {
    fn default() -> Self {
        Self {
            time: Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
            open: 0.0,
            close: 0.0,
            low: 0.0,
            high: 0.0,
            volume: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_equality_is_componentwise() {
        let candle = Candle::new(1_000, 1.0, 2.0, 0.5, 2.5, 100.0);
        assert_eq!(candle, candle);
        assert_ne!(candle, Candle::new(1_000, 1.0, 2.1, 0.5, 2.5, 100.0));
        assert_ne!(candle, Candle::new(1_001, 1.0, 2.0, 0.5, 2.5, 100.0));
    }

    #[test]
    fn close_price_orderings_are_symmetric() {
        let cheap = Candle::new(0, 1.0, 1.0, 1.0, 1.0, 1.0);
        let dear = Candle::new(0, 1.0, 2.0, 1.0, 2.0, 1.0);

        assert_eq!(cheap.cmp_close_ascending(&dear), Ordering::Less);
        assert_eq!(cheap.cmp_close_descending(&dear), Ordering::Greater);
    }
}
