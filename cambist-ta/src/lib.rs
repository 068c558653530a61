//! # Cambist-TA
//! Technical analysis for Cambist: turns a candle sequence (newest-last) into
//! crossing-based BUY / SELL signals.
//!
//! Every indicator shares the same shape: a pure line computation over the candle
//! window, a crossing-detection step against the newest candle, and
//! duplicate-suppression that rejects a crossing whose price already produced the
//! previous crossing within the last `crossing_interval` points of the indicator
//! line (`crossing_interval = 0` disables suppression entirely).
//!
//! Floating point is compared exactly throughout — duplicate suppression relies on
//! bit-identical equality of the last crossing point, so no tolerance is applied.

use cambist_data::Candle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bollinger;
pub mod ema;
pub mod line;
pub mod ma_crossing;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod strategy;

mod crossing;

pub use bollinger::{BollingerBands, BollingerInput};
pub use ema::Ema;
pub use line::Line;
pub use ma_crossing::{MaCrossing, MaType};
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::{Stochastic, StochasticVariant};
pub use strategy::{CustomStrategy, IndicatorConfig};

/// Largest accepted `crossing_interval`.
pub const MAX_CROSSING_INTERVAL: usize = 10;

/// All errors generated in the cambist-ta crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaError {
    /// Rejected at configuration load; an engine never runs with these.
    #[error("invalid indicator parameters: {0}")]
    InvalidParameters(String),

    /// Not enough candles for the configured period; treated as "no signal".
    #[error("insufficient history: {candles} candles for period {period}")]
    InsufficientHistory { candles: usize, period: usize },
}

/// Composite per-tick strategy verdict.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum Signal {
    Buy,
    Sell,
}

/// Per-indicator crossing outcome for one evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Crossings {
    pub buy: bool,
    pub sell: bool,
}

/// An indicator evaluates a candle window (newest-last) and may emit buy/sell
/// crossings. Implementations carry their previous crossing prices between
/// evaluations for duplicate suppression.
pub trait Indicator: Send {
    /// The [`StrategyKind`] this indicator contributes to the last-tick cache key.
    fn kind(&self) -> StrategyKind;

    /// Evaluate the candle window & detect crossings on the newest candle.
    fn evaluate(&mut self, candles: &[Candle]) -> Result<Crossings, TaError>;
}

/// Strategy discriminant keyed into the last-tick cache & the persistent store.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    BollingerBands,
    BollingerBandsAdvanced,
    Rsi,
    Sma,
    Ema,
    MaCrossing,
    StochasticOscillator,
    Custom,
}

impl StrategyKind {
    const ALL: [StrategyKind; 8] = [
        StrategyKind::BollingerBands,
        StrategyKind::BollingerBandsAdvanced,
        StrategyKind::Rsi,
        StrategyKind::Sma,
        StrategyKind::Ema,
        StrategyKind::MaCrossing,
        StrategyKind::StochasticOscillator,
        StrategyKind::Custom,
    ];

    /// Return the &str representation of this [`StrategyKind`].
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::BollingerBands => "bollinger_bands",
            StrategyKind::BollingerBandsAdvanced => "bollinger_bands_advanced",
            StrategyKind::Rsi => "rsi",
            StrategyKind::Sma => "sma",
            StrategyKind::Ema => "ema",
            StrategyKind::MaCrossing => "ma_crossing",
            StrategyKind::StochasticOscillator => "stochastic_oscillator",
            StrategyKind::Custom => "custom",
        }
    }

    /// Integer-stable discriminant used by the persistent store.
    pub fn index(&self) -> i64 {
        *self as i64
    }

    /// Inverse of [`StrategyKind::index`], defaulting to Custom for unknown rows.
    pub fn from_index(index: i64) -> Self {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.index() == index)
            .unwrap_or(StrategyKind::Custom)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn validate_period(period: usize, max: usize) -> Result<(), TaError> {
    if period == 0 || period > max {
        return Err(TaError::InvalidParameters(format!(
            "period {period} outside [1, {max}]"
        )));
    }
    Ok(())
}

pub(crate) fn validate_crossing_interval(crossing_interval: usize) -> Result<(), TaError> {
    if crossing_interval > MAX_CROSSING_INTERVAL {
        return Err(TaError::InvalidParameters(format!(
            "crossing interval {crossing_interval} outside [0, {MAX_CROSSING_INTERVAL}]"
        )));
    }
    Ok(())
}

pub(crate) fn validate_levels(top: f64, bottom: f64) -> Result<(), TaError> {
    if !(0.0 < bottom && bottom < top && top < 100.0) {
        return Err(TaError::InvalidParameters(format!(
            "levels must satisfy 0 < bottom ({bottom}) < top ({top}) < 100"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_round_trips_store_index() {
        for kind in StrategyKind::ALL {
            assert_eq!(StrategyKind::from_index(kind.index()), kind);
        }
    }

    #[test]
    fn level_validation_rejects_inverted_bounds() {
        assert!(validate_levels(70.0, 30.0).is_ok());
        assert!(validate_levels(30.0, 70.0).is_err());
        assert!(validate_levels(70.0, 70.0).is_err());
        assert!(validate_levels(100.0, 30.0).is_err());
    }
}
