use crate::crossing::CrossingState;
use crate::line::Line;
use crate::{
    validate_crossing_interval, validate_levels, validate_period, Crossings, Indicator,
    StrategyKind, TaError,
};
use cambist_data::Candle;

/// Relative strength index with Wilder's smoothing.
///
/// Average gain & loss seed over the first `period` close-to-close moves, then
/// `avg_t = (avg_{t-1} * (period - 1) + move_t) / period`. A zero average loss is
/// treated as an infinite ratio, pinning RSI at 100.
///
/// Crossings fire against the configured levels: buy when the line crosses upward
/// through `bottom_level`, sell when it crosses downward through `top_level`.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    top_level: f64,
    bottom_level: f64,
    crossing_interval: usize,
    state: CrossingState,
    line: Line,
}

impl Rsi {
    /// Largest accepted period.
    pub const MAX_PERIOD: usize = 100;

    /// Constructs a new [`Rsi`], validating parameters.
    pub fn new(
        period: usize,
        top_level: f64,
        bottom_level: f64,
        crossing_interval: usize,
    ) -> Result<Self, TaError> {
        validate_period(period, Self::MAX_PERIOD)?;
        validate_crossing_interval(crossing_interval)?;
        validate_levels(top_level, bottom_level)?;
        Ok(Self {
            period,
            top_level,
            bottom_level,
            crossing_interval,
            state: CrossingState::default(),
            line: Line::new(),
        })
    }

    /// The line computed by the most recent evaluation.
    pub fn line(&self) -> &Line {
        &self.line
    }

    fn compute_line(&self, candles: &[Candle]) -> Line {
        let moves = candles
            .windows(2)
            .map(|pair| pair[1].close - pair[0].close)
            .collect::<Vec<_>>();

        let gain = |value: &f64| value.max(0.0);
        let loss = |value: &f64| (-value).max(0.0);

        let mut avg_gain = moves[..self.period].iter().map(gain).sum::<f64>() / self.period as f64;
        let mut avg_loss = moves[..self.period].iter().map(loss).sum::<f64>() / self.period as f64;

        let mut line = Line::new();
        line.push(rsi_value(avg_gain, avg_loss));

        for value in &moves[self.period..] {
            avg_gain = (avg_gain * (self.period as f64 - 1.0) + gain(value)) / self.period as f64;
            avg_loss = (avg_loss * (self.period as f64 - 1.0) + loss(value)) / self.period as f64;
            line.push(rsi_value(avg_gain, avg_loss));
        }
        line
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

impl Indicator for Rsi {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rsi
    }

    fn evaluate(&mut self, candles: &[Candle]) -> Result<Crossings, TaError> {
        // One extra candle is needed to form the first close-to-close move.
        if candles.len() <= self.period {
            return Err(TaError::InsufficientHistory {
                candles: candles.len(),
                period: self.period,
            });
        }

        self.line = self.compute_line(candles);

        let mut crossings = Crossings::default();
        let (Some(last), Some(penultimate)) = (self.line.last(), self.line.penultimate()) else {
            return Ok(crossings);
        };

        if penultimate < self.bottom_level && last >= self.bottom_level {
            crossings.buy = self
                .state
                .try_buy(&self.line, self.crossing_interval, last);
        }
        if penultimate > self.top_level && last <= self.top_level {
            crossings.sell = self
                .state
                .try_sell(&self.line, self.crossing_interval, last);
        }
        Ok(crossings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .map(|close| Candle::new(0, *close, *close, *close, *close, 1.0))
            .collect()
    }

    #[test]
    fn levels_must_be_ordered() {
        assert!(Rsi::new(14, 30.0, 70.0, 0).is_err());
        assert!(Rsi::new(14, 70.0, 30.0, 0).is_ok());
    }

    #[test]
    fn all_gains_pin_rsi_at_100() {
        let mut rsi = Rsi::new(3, 70.0, 30.0, 0).unwrap();
        let candles = candles_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        rsi.evaluate(&candles).unwrap();

        assert_eq!(rsi.line().last(), Some(100.0));
    }

    #[test]
    fn upward_cross_through_bottom_level_is_a_buy() {
        let mut rsi = Rsi::new(2, 70.0, 30.0, 0).unwrap();
        // Fall hard (RSI below bottom), then recover (RSI crosses back up).
        let candles = candles_from_closes(&[10.0, 8.0, 6.0, 4.0, 9.0]);
        let crossings = rsi.evaluate(&candles).unwrap();

        assert!(crossings.buy);
        assert!(!crossings.sell);
    }

    #[test]
    fn downward_cross_through_top_level_is_a_sell() {
        let mut rsi = Rsi::new(2, 70.0, 30.0, 0).unwrap();
        // Rise hard (RSI above top), then fall back through it.
        let candles = candles_from_closes(&[4.0, 6.0, 8.0, 10.0, 5.0]);
        let crossings = rsi.evaluate(&candles).unwrap();

        assert!(crossings.sell);
        assert!(!crossings.buy);
    }

    #[test]
    fn period_equal_to_candle_count_is_insufficient() {
        let mut rsi = Rsi::new(5, 70.0, 30.0, 0).unwrap();
        let candles = candles_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(matches!(
            rsi.evaluate(&candles),
            Err(TaError::InsufficientHistory { .. })
        ));
    }
}
