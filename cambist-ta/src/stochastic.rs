use crate::crossing::CrossingState;
use crate::line::{sma_line, Line};
use crate::{
    validate_crossing_interval, validate_levels, Crossings, Indicator, StrategyKind, TaError,
};
use cambist_data::Candle;
use serde::{Deserialize, Serialize};

/// Smoothing window of the classic quick & slow variants.
const CLASSIC_SMOOTHING: usize = 3;

/// Stochastic oscillator variant. Quick uses the classic `%K` with a 3-period `%D`;
/// Slow smooths `%K` once more; Full takes user-provided smoothing periods instead
/// of the classic 3s.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "variant")]
pub enum StochasticVariant {
    Quick,
    Slow,
    Full {
        smooth_fast_period: usize,
        smooth_slow_period: usize,
    },
}

/// Stochastic oscillator.
///
/// Classic `%K = 100 · (close − low_n) / (high_n − low_n)` over the configured
/// window. Buy when `%K` crosses above `%D` while `%K` sits below `bottom_level`;
/// sell when `%K` crosses below `%D` while above `top_level`.
#[derive(Debug, Clone)]
pub struct Stochastic {
    periods: usize,
    top_level: f64,
    bottom_level: f64,
    crossing_interval: usize,
    variant: StochasticVariant,
    state: CrossingState,
    percent_k: Line,
    percent_d: Line,
}

impl Stochastic {
    /// Largest accepted classic-line period.
    pub const MAX_PERIOD: usize = 30;

    /// Largest accepted Full-variant smoothing period.
    pub const MAX_SMOOTHING: usize = 7;

    /// Constructs a new [`Stochastic`], validating parameters.
    pub fn new(
        periods: usize,
        top_level: f64,
        bottom_level: f64,
        crossing_interval: usize,
        variant: StochasticVariant,
    ) -> Result<Self, TaError> {
        if periods == 0 || periods > Self::MAX_PERIOD {
            return Err(TaError::InvalidParameters(format!(
                "periods {periods} outside [1, {}]",
                Self::MAX_PERIOD
            )));
        }
        validate_crossing_interval(crossing_interval)?;
        validate_levels(top_level, bottom_level)?;
        if let StochasticVariant::Full {
            smooth_fast_period,
            smooth_slow_period,
        } = variant
        {
            for period in [smooth_fast_period, smooth_slow_period] {
                if period == 0 || period > Self::MAX_SMOOTHING {
                    return Err(TaError::InvalidParameters(format!(
                        "smoothing period {period} outside [1, {}]",
                        Self::MAX_SMOOTHING
                    )));
                }
            }
        }
        Ok(Self {
            periods,
            top_level,
            bottom_level,
            crossing_interval,
            variant,
            state: CrossingState::default(),
            percent_k: Line::new(),
            percent_d: Line::new(),
        })
    }

    /// The `%K` line computed by the most recent evaluation.
    pub fn percent_k(&self) -> &Line {
        &self.percent_k
    }

    /// The `%D` line computed by the most recent evaluation.
    pub fn percent_d(&self) -> &Line {
        &self.percent_d
    }

    fn classic_k(&self, candles: &[Candle]) -> Line {
        let mut line = Line::new();
        for window in candles.windows(self.periods) {
            let newest = &window[window.len() - 1];
            let low = window.iter().map(|candle| candle.low).fold(f64::MAX, f64::min);
            let high = window.iter().map(|candle| candle.high).fold(f64::MIN, f64::max);
            line.push(100.0 * (newest.close - low) / (high - low));
        }
        line
    }
}

impl Indicator for Stochastic {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StochasticOscillator
    }

    fn evaluate(&mut self, candles: &[Candle]) -> Result<Crossings, TaError> {
        if candles.len() < self.periods {
            return Err(TaError::InsufficientHistory {
                candles: candles.len(),
                period: self.periods,
            });
        }

        let classic = self.classic_k(candles);
        let (percent_k, percent_d) = match self.variant {
            StochasticVariant::Quick => {
                let d = sma_line(classic.points(), CLASSIC_SMOOTHING);
                (classic, d)
            }
            StochasticVariant::Slow => {
                let slow_k = sma_line(classic.points(), CLASSIC_SMOOTHING);
                let slow_d = sma_line(slow_k.points(), CLASSIC_SMOOTHING);
                (slow_k, slow_d)
            }
            StochasticVariant::Full {
                smooth_fast_period,
                smooth_slow_period,
            } => {
                let full_k = sma_line(classic.points(), smooth_fast_period);
                let full_d = sma_line(full_k.points(), smooth_slow_period);
                (full_k, full_d)
            }
        };
        self.percent_k = percent_k;
        self.percent_d = percent_d;

        let mut crossings = Crossings::default();
        let (Some(last_k), Some(prev_k), Some(last_d), Some(prev_d)) = (
            self.percent_k.last(),
            self.percent_k.penultimate(),
            self.percent_d.last(),
            self.percent_d.penultimate(),
        ) else {
            return Ok(crossings);
        };

        if prev_k <= prev_d && last_k > last_d && last_k < self.bottom_level {
            crossings.buy = self
                .state
                .try_buy(&self.percent_k, self.crossing_interval, last_k);
        }
        if prev_k >= prev_d && last_k < last_d && last_k > self.top_level {
            crossings.sell = self
                .state
                .try_sell(&self.percent_k, self.crossing_interval, last_k);
        }
        Ok(crossings)
    }
}
