use crate::crossing::{detect_ma_crossings, CrossingState};
use crate::line::{sma_line, Line};
use crate::{
    validate_crossing_interval, validate_period, Crossings, Indicator, StrategyKind, TaError,
};
use cambist_data::Candle;

/// Simple moving average indicator: the line point at i is the arithmetic mean of
/// close over candles `[i, i + period)`.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    crossing_interval: usize,
    state: CrossingState,
    line: Line,
}

impl Sma {
    /// Largest accepted period.
    pub const MAX_PERIOD: usize = 100;

    /// Constructs a new [`Sma`], validating parameters.
    pub fn new(period: usize, crossing_interval: usize) -> Result<Self, TaError> {
        validate_period(period, Self::MAX_PERIOD)?;
        validate_crossing_interval(crossing_interval)?;
        Ok(Self {
            period,
            crossing_interval,
            state: CrossingState::default(),
            line: Line::new(),
        })
    }

    /// The line computed by the most recent evaluation.
    pub fn line(&self) -> &Line {
        &self.line
    }
}

impl Indicator for Sma {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sma
    }

    fn evaluate(&mut self, candles: &[Candle]) -> Result<Crossings, TaError> {
        if candles.len() < self.period {
            return Err(TaError::InsufficientHistory {
                candles: candles.len(),
                period: self.period,
            });
        }

        let closes = candles.iter().map(|candle| candle.close).collect::<Vec<_>>();
        self.line = sma_line(&closes, self.period);

        let newest = &candles[candles.len() - 1];
        Ok(detect_ma_crossings(
            &self.line,
            newest,
            self.crossing_interval,
            &mut self.state,
        ))
    }
}
