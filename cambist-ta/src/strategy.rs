use crate::bollinger::{BollingerBands, BollingerInput};
use crate::ema::Ema;
use crate::ma_crossing::{MaCrossing, MaType};
use crate::rsi::Rsi;
use crate::sma::Sma;
use crate::stochastic::{Stochastic, StochasticVariant};
use crate::{Crossings, Indicator, Signal, StrategyKind, TaError};
use cambist_data::Candle;
use serde::{Deserialize, Serialize};

/// One indicator configuration inside a custom strategy, as loaded from the trade
/// configuration. Building validates every parameter, so an engine never runs with
/// an invalid setup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "indicator", rename_all = "snake_case")]
pub enum IndicatorConfig {
    Sma {
        period: usize,
        crossing_interval: usize,
    },
    Ema {
        period: usize,
        crossing_interval: usize,
    },
    BollingerBands {
        period: usize,
        standard_deviations: f64,
        input: BollingerInput,
        crossing_interval: usize,
    },
    BollingerBandsAdvanced {
        period: usize,
        standard_deviations: f64,
        input: BollingerInput,
        crossing_interval: usize,
        bottom_percentage: f64,
        top_percentage: f64,
    },
    Rsi {
        period: usize,
        top_level: f64,
        bottom_level: f64,
        crossing_interval: usize,
    },
    MaCrossing {
        smaller_period: usize,
        bigger_period: usize,
        ma_type: MaType,
        crossing_interval: usize,
    },
    Stochastic {
        periods: usize,
        top_level: f64,
        bottom_level: f64,
        crossing_interval: usize,
        #[serde(flatten)]
        variant: StochasticVariant,
    },
}

impl IndicatorConfig {
    /// The [`StrategyKind`] this configuration contributes to last-tick cache keys.
    pub fn kind(&self) -> StrategyKind {
        match self {
            IndicatorConfig::Sma { .. } => StrategyKind::Sma,
            IndicatorConfig::Ema { .. } => StrategyKind::Ema,
            IndicatorConfig::BollingerBands { .. } => StrategyKind::BollingerBands,
            IndicatorConfig::BollingerBandsAdvanced { .. } => {
                StrategyKind::BollingerBandsAdvanced
            }
            IndicatorConfig::Rsi { .. } => StrategyKind::Rsi,
            IndicatorConfig::MaCrossing { .. } => StrategyKind::MaCrossing,
            IndicatorConfig::Stochastic { .. } => StrategyKind::StochasticOscillator,
        }
    }

    /// The candle history this indicator needs before it can produce a signal.
    pub fn required_history(&self) -> usize {
        match self {
            IndicatorConfig::Sma { period, .. } | IndicatorConfig::Ema { period, .. } => *period,
            IndicatorConfig::BollingerBands { period, .. }
            | IndicatorConfig::BollingerBandsAdvanced { period, .. } => *period,
            // RSI needs one extra candle to form the first close-to-close move.
            IndicatorConfig::Rsi { period, .. } => *period + 1,
            IndicatorConfig::MaCrossing { bigger_period, .. } => *bigger_period,
            IndicatorConfig::Stochastic { periods, .. } => *periods,
        }
    }

    /// Build the runnable [`Indicator`], validating parameters.
    pub fn build(&self) -> Result<Box<dyn Indicator>, TaError> {
        Ok(match *self {
            IndicatorConfig::Sma {
                period,
                crossing_interval,
            } => Box::new(Sma::new(period, crossing_interval)?),
            IndicatorConfig::Ema {
                period,
                crossing_interval,
            } => Box::new(Ema::new(period, crossing_interval)?),
            IndicatorConfig::BollingerBands {
                period,
                standard_deviations,
                input,
                crossing_interval,
            } => Box::new(BollingerBands::new(
                period,
                standard_deviations,
                input,
                crossing_interval,
            )?),
            IndicatorConfig::BollingerBandsAdvanced {
                period,
                standard_deviations,
                input,
                crossing_interval,
                bottom_percentage,
                top_percentage,
            } => Box::new(BollingerBands::advanced(
                period,
                standard_deviations,
                input,
                crossing_interval,
                bottom_percentage,
                top_percentage,
            )?),
            IndicatorConfig::Rsi {
                period,
                top_level,
                bottom_level,
                crossing_interval,
            } => Box::new(Rsi::new(period, top_level, bottom_level, crossing_interval)?),
            IndicatorConfig::MaCrossing {
                smaller_period,
                bigger_period,
                ma_type,
                crossing_interval,
            } => Box::new(MaCrossing::new(
                smaller_period,
                bigger_period,
                ma_type,
                crossing_interval,
            )?),
            IndicatorConfig::Stochastic {
                periods,
                top_level,
                bottom_level,
                crossing_interval,
                variant,
            } => Box::new(Stochastic::new(
                periods,
                top_level,
                bottom_level,
                crossing_interval,
                variant,
            )?),
        })
    }
}

/// A custom strategy: an ordered, named list of indicators combined per tick.
///
/// With `any_indicator` unset, a composite BUY (resp. SELL) requires every
/// indicator to emit BUY (resp. SELL) this tick; set, a single emitter suffices.
/// Mixed verdicts resolve conservatively: BUY only when nothing says SELL, SELL
/// only when nothing says BUY, otherwise no signal.
pub struct CustomStrategy {
    name: String,
    any_indicator: bool,
    indicators: Vec<Box<dyn Indicator>>,
    kinds: Vec<StrategyKind>,
}

impl CustomStrategy {
    /// Build a [`CustomStrategy`] from its indicator configurations, validating
    /// every parameter up front.
    pub fn new(
        name: impl Into<String>,
        any_indicator: bool,
        configs: &[IndicatorConfig],
    ) -> Result<Self, TaError> {
        if configs.is_empty() {
            return Err(TaError::InvalidParameters(
                "a strategy needs at least one indicator".to_owned(),
            ));
        }
        let indicators = configs
            .iter()
            .map(IndicatorConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            any_indicator,
            indicators,
            kinds: configs.iter().map(IndicatorConfig::kind).collect(),
        })
    }

    /// The strategy's configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The [`StrategyKind`] keyed into the last-tick cache: the single indicator's
    /// kind for one-indicator strategies, otherwise Custom.
    pub fn kind(&self) -> StrategyKind {
        match self.kinds.as_slice() {
            [kind] => *kind,
            _ => StrategyKind::Custom,
        }
    }

    /// Evaluate every indicator on the candle window & combine their crossings
    /// into a composite verdict.
    pub fn evaluate(&mut self, candles: &[Candle]) -> Result<Option<Signal>, TaError> {
        let mut all = Vec::with_capacity(self.indicators.len());
        for indicator in &mut self.indicators {
            all.push(indicator.evaluate(candles)?);
        }
        Ok(combine(self.any_indicator, &all))
    }
}

impl std::fmt::Debug for CustomStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomStrategy")
            .field("name", &self.name)
            .field("any_indicator", &self.any_indicator)
            .field("kinds", &self.kinds)
            .finish()
    }
}

fn combine(any_indicator: bool, crossings: &[Crossings]) -> Option<Signal> {
    let buy_any = crossings.iter().any(|crossing| crossing.buy);
    let sell_any = crossings.iter().any(|crossing| crossing.sell);
    let buy_all = crossings.iter().all(|crossing| crossing.buy);
    let sell_all = crossings.iter().all(|crossing| crossing.sell);

    let buy = if any_indicator { buy_any } else { buy_all };
    let sell = if any_indicator { sell_any } else { sell_all };

    // Mixed verdicts within one tick cancel out.
    if buy && !sell_any {
        Some(Signal::Buy)
    } else if sell && !buy_any {
        Some(Signal::Sell)
    } else {
        None
    }
}
