use crate::crossing::CrossingState;
use crate::line::{ema_line, sma_line, Line};
use crate::{
    validate_crossing_interval, validate_period, Crossings, Indicator, StrategyKind, TaError,
};
use cambist_data::Candle;
use serde::{Deserialize, Serialize};

/// Moving average family used by [`MaCrossing`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaType {
    Sma,
    Ema,
}

/// Moving-average crossing indicator: computes a shorter- and a longer-period
/// moving average of close, signalling buy when the shorter crosses above the
/// longer on the newest point and sell when it crosses below.
#[derive(Debug, Clone)]
pub struct MaCrossing {
    smaller_period: usize,
    bigger_period: usize,
    ma_type: MaType,
    crossing_interval: usize,
    state: CrossingState,
    smaller: Line,
    bigger: Line,
}

impl MaCrossing {
    /// Largest accepted period.
    pub const MAX_PERIOD: usize = 100;

    /// Constructs a new [`MaCrossing`], validating parameters.
    pub fn new(
        smaller_period: usize,
        bigger_period: usize,
        ma_type: MaType,
        crossing_interval: usize,
    ) -> Result<Self, TaError> {
        validate_period(smaller_period, Self::MAX_PERIOD)?;
        validate_period(bigger_period, Self::MAX_PERIOD)?;
        validate_crossing_interval(crossing_interval)?;
        if smaller_period >= bigger_period {
            return Err(TaError::InvalidParameters(format!(
                "smaller period {smaller_period} must be below bigger period {bigger_period}"
            )));
        }
        Ok(Self {
            smaller_period,
            bigger_period,
            ma_type,
            crossing_interval,
            state: CrossingState::default(),
            smaller: Line::new(),
            bigger: Line::new(),
        })
    }

    /// The shorter-period line computed by the most recent evaluation.
    pub fn smaller_line(&self) -> &Line {
        &self.smaller
    }

    /// The longer-period line computed by the most recent evaluation.
    pub fn bigger_line(&self) -> &Line {
        &self.bigger
    }
}

impl Indicator for MaCrossing {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MaCrossing
    }

    fn evaluate(&mut self, candles: &[Candle]) -> Result<Crossings, TaError> {
        if candles.len() < self.bigger_period {
            return Err(TaError::InsufficientHistory {
                candles: candles.len(),
                period: self.bigger_period,
            });
        }

        let closes = candles.iter().map(|candle| candle.close).collect::<Vec<_>>();
        let build = match self.ma_type {
            MaType::Sma => sma_line,
            MaType::Ema => ema_line,
        };
        self.smaller = build(&closes, self.smaller_period);
        self.bigger = build(&closes, self.bigger_period);

        let mut crossings = Crossings::default();
        let (Some(last_s), Some(prev_s), Some(last_b), Some(prev_b)) = (
            self.smaller.last(),
            self.smaller.penultimate(),
            self.bigger.last(),
            self.bigger.penultimate(),
        ) else {
            return Ok(crossings);
        };

        if prev_s <= prev_b && last_s > last_b {
            crossings.buy = self
                .state
                .try_buy(&self.smaller, self.crossing_interval, last_s);
        }
        if prev_s >= prev_b && last_s < last_b {
            crossings.sell = self
                .state
                .try_sell(&self.smaller, self.crossing_interval, last_s);
        }
        Ok(crossings)
    }
}
