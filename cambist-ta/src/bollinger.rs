use crate::crossing::CrossingState;
use crate::line::{sma_line, Line};
use crate::{
    validate_crossing_interval, validate_period, Crossings, Indicator, StrategyKind, TaError,
};
use cambist_data::Candle;
use serde::{Deserialize, Serialize};

/// Candle field a Bollinger computation consumes. `Price` is the typical price,
/// the mean of high, low & close.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BollingerInput {
    Price,
    Open,
    Close,
    Low,
    High,
    Volume,
}

impl BollingerInput {
    fn select(&self, candle: &Candle) -> f64 {
        match self {
            BollingerInput::Price => (candle.high + candle.low + candle.close) / 3.0,
            BollingerInput::Open => candle.open,
            BollingerInput::Close => candle.close,
            BollingerInput::Low => candle.low,
            BollingerInput::High => candle.high,
            BollingerInput::Volume => candle.volume,
        }
    }
}

/// Bollinger Bands indicator.
///
/// Middle line = SMA of the selected field; top/bottom = middle ± `deviations · σ`
/// with σ the population standard deviation over the same window.
///
/// The classic variant signals buy when the newest candle's field sits at or below
/// the bottom band, sell at or above the top band. The advanced variant moves both
/// trigger lines a configured percentage along the middle→bottom and middle→top
/// segments instead.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    period: usize,
    deviations: f64,
    input: BollingerInput,
    crossing_interval: usize,
    /// Advanced-variant trigger percentages along (bottom, top) segments.
    percentages: Option<(f64, f64)>,
    state: CrossingState,
    middle: Line,
    top: Line,
    bottom: Line,
}

impl BollingerBands {
    /// Largest accepted period.
    pub const MAX_PERIOD: usize = 100;

    /// Constructs the classic variant, validating parameters.
    pub fn new(
        period: usize,
        deviations: f64,
        input: BollingerInput,
        crossing_interval: usize,
    ) -> Result<Self, TaError> {
        validate_period(period, Self::MAX_PERIOD)?;
        validate_crossing_interval(crossing_interval)?;
        if !(deviations >= 0.0) {
            return Err(TaError::InvalidParameters(format!(
                "standard deviations {deviations} must be non-negative"
            )));
        }
        Ok(Self {
            period,
            deviations,
            input,
            crossing_interval,
            percentages: None,
            state: CrossingState::default(),
            middle: Line::new(),
            top: Line::new(),
            bottom: Line::new(),
        })
    }

    /// Constructs the advanced variant with trigger percentages along the
    /// middle→bottom & middle→top segments, each within `[1, 100]`.
    pub fn advanced(
        period: usize,
        deviations: f64,
        input: BollingerInput,
        crossing_interval: usize,
        bottom_percentage: f64,
        top_percentage: f64,
    ) -> Result<Self, TaError> {
        for percentage in [bottom_percentage, top_percentage] {
            if !(1.0..=100.0).contains(&percentage) {
                return Err(TaError::InvalidParameters(format!(
                    "trigger percentage {percentage} outside [1, 100]"
                )));
            }
        }
        let mut bands = Self::new(period, deviations, input, crossing_interval)?;
        bands.percentages = Some((bottom_percentage, top_percentage));
        Ok(bands)
    }

    /// The middle line computed by the most recent evaluation.
    pub fn middle(&self) -> &Line {
        &self.middle
    }

    /// The top band computed by the most recent evaluation.
    pub fn top(&self) -> &Line {
        &self.top
    }

    /// The bottom band computed by the most recent evaluation.
    pub fn bottom(&self) -> &Line {
        &self.bottom
    }

    fn compute_bands(&mut self, fields: &[f64]) {
        self.middle = sma_line(fields, self.period);
        self.top = Line::new();
        self.bottom = Line::new();

        for (index, window) in fields.windows(self.period).enumerate() {
            let Some(mean) = self.middle.point(index) else {
                break;
            };
            let variance = window
                .iter()
                .map(|value| (value - mean) * (value - mean))
                .sum::<f64>()
                / self.period as f64;
            let sigma = variance.sqrt();
            self.top.push(mean + self.deviations * sigma);
            self.bottom.push(mean - self.deviations * sigma);
        }
    }

    fn buy_trigger(&self, middle: f64, bottom: f64) -> f64 {
        match self.percentages {
            Some((bottom_percentage, _)) => {
                middle - (middle - bottom) / 100.0 * bottom_percentage
            }
            None => bottom,
        }
    }

    fn sell_trigger(&self, middle: f64, top: f64) -> f64 {
        match self.percentages {
            Some((_, top_percentage)) => middle + (top - middle) / 100.0 * top_percentage,
            None => top,
        }
    }
}

impl Indicator for BollingerBands {
    fn kind(&self) -> StrategyKind {
        if self.percentages.is_some() {
            StrategyKind::BollingerBandsAdvanced
        } else {
            StrategyKind::BollingerBands
        }
    }

    fn evaluate(&mut self, candles: &[Candle]) -> Result<Crossings, TaError> {
        if candles.len() < self.period {
            return Err(TaError::InsufficientHistory {
                candles: candles.len(),
                period: self.period,
            });
        }

        let fields = candles
            .iter()
            .map(|candle| self.input.select(candle))
            .collect::<Vec<_>>();
        self.compute_bands(&fields);

        let mut crossings = Crossings::default();
        let (Some(middle), Some(top), Some(bottom)) =
            (self.middle.last(), self.top.last(), self.bottom.last())
        else {
            return Ok(crossings);
        };

        // A degenerate band (σ·deviations = 0) never fires.
        if top == bottom {
            return Ok(crossings);
        }

        let field = fields[fields.len() - 1];
        if field <= self.buy_trigger(middle, bottom) {
            crossings.buy = self
                .state
                .try_buy(&self.bottom, self.crossing_interval, field);
        }
        if field >= self.sell_trigger(middle, top) {
            crossings.sell = self
                .state
                .try_sell(&self.top, self.crossing_interval, field);
        }
        Ok(crossings)
    }
}
