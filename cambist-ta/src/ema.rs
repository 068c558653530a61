use crate::crossing::{detect_ma_crossings, CrossingState};
use crate::line::{ema_line, Line};
use crate::{
    validate_crossing_interval, validate_period, Crossings, Indicator, StrategyKind, TaError,
};
use cambist_data::Candle;

/// Exponential moving average indicator. The first line point equals the SMA over
/// the same period; subsequent points use the `2 / (period + 1)` multiplier.
/// Crossing logic is shared with [`Sma`](crate::Sma).
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    crossing_interval: usize,
    state: CrossingState,
    line: Line,
}

impl Ema {
    /// Largest accepted period.
    pub const MAX_PERIOD: usize = 100;

    /// Constructs a new [`Ema`], validating parameters.
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

impl Indicator for Ema {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ema
    }

    fn evaluate(&mut self, candles: &[Candle]) -> Result<Crossings, TaError> {
        if candles.len() < self.period {
            return Err(TaError::InsufficientHistory {
                candles: candles.len(),
                period: self.period,
            });
        }

        let closes = candles.iter().map(|candle| candle.close).collect::<Vec<_>>();
        self.line = ema_line(&closes, self.period);

        let newest = &candles[candles.len() - 1];
        Ok(detect_ma_crossings(
            &self.line,
            newest,
            self.crossing_interval,
            &mut self.state,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_candle(value: f64) -> Candle {
        Candle::new(0, value, value, value, value, value)
    }

    #[test]
    fn first_point_equals_sma_of_period() {
        let mut ema = Ema::new(3, 0).unwrap();
        let candles: Vec<Candle> = [3.0, 6.0, 9.0, 12.0].into_iter().map(flat_candle).collect();
        ema.evaluate(&candles).unwrap();

        assert_eq!(ema.line().point(0), Some(6.0));
        // Second point: (12 - 6) * 0.5 + 6.
        assert_eq!(ema.line().point(1), Some(9.0));
    }

    #[test]
    fn reacts_faster_than_sma_on_breakout() {
        let mut candles: Vec<Candle> = [10.0, 10.0, 10.0, 10.0].into_iter().map(flat_candle).collect();
        candles.push(Candle::new(0, 10.0, 12.0, 10.0, 12.0, 1.0));

        let mut ema = Ema::new(3, 0).unwrap();
        let crossings = ema.evaluate(&candles).unwrap();

        // Line rose into a point sitting inside the breakout candle's body.
        assert!(crossings.buy);
    }

    #[test]
    fn insufficient_history_is_not_a_signal() {
        let mut ema = Ema::new(10, 0).unwrap();
        assert!(matches!(
            ema.evaluate(&[flat_candle(1.0)]),
            Err(TaError::InsufficientHistory { .. })
        ));
    }
}
