use crate::error::EngineError;
use cambist_instrument::{CandleInterval, Currency, ExchangeId};
use cambist_ta::{CustomStrategy, IndicatorConfig};
use serde::Deserialize;
use std::time::Duration;

/// Buy-side admission & lifetime settings for one trade configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BuySettings {
    /// Cap on simultaneously open BUY orders across the configuration.
    pub max_open_orders: usize,
    /// Minutes an unfilled BUY may stay open before cancellation.
    pub max_open_time: u64,
    /// Funded cap in base currency across all committed positions.
    pub max_coin_amount: f64,
    /// Portion of the funded cap used per order, in (0, 100].
    pub percentage_buy_amount: f64,
    /// Base-currency floor below which no order is placed.
    pub min_order_price: f64,
    /// Cap on simultaneous buys per traded currency.
    pub open_positions_per_coin: usize,
    /// Strategy combinator: one triggered indicator suffices when set, otherwise
    /// all indicators must agree.
    pub open_order_when_any_indicator_is_triggered: bool,
}

/// Sell-side settings for one trade configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SellSettings {
    /// Minutes an unfilled SELL may stay open before cancellation.
    pub open_order_time: u64,
    /// Profit margin over the buy price, in percent.
    pub profit_percentage: f64,
}

/// The currencies a configuration trades.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinSettings {
    pub base_currency: Currency,
    pub traded_currencies: Vec<Currency>,
}

/// Venue & credentials for one trade configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StockExchangeSettings {
    pub exchange: ExchangeId,
    pub api_key: String,
    pub secret_key: String,
}

/// One parsed trade configuration, as handed over by the host. Validation happens
/// once via [`TradeConfiguration::validate`] before an engine worker accepts it.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeConfiguration {
    pub name: String,
    pub active: bool,
    pub strategy_name: String,
    /// Ordered indicator list making up the named custom strategy.
    pub indicators: Vec<IndicatorConfig>,
    pub candle_interval: CandleInterval,
    pub buy_settings: BuySettings,
    pub sell_settings: SellSettings,
    pub coin_settings: CoinSettings,
    pub stock_exchange_settings: StockExchangeSettings,
}

impl TradeConfiguration {
    /// Validate every parameter the engine depends on, building (and discarding)
    /// the strategy so indicator bounds are enforced up front.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: String| EngineError::ConfigurationInvalid {
            name: self.name.clone(),
            reason,
        };

        if self.coin_settings.traded_currencies.is_empty() {
            return Err(invalid("no traded currencies".to_owned()));
        }
        if self.coin_settings.base_currency == Currency::Unknown {
            return Err(invalid("unknown base currency".to_owned()));
        }
        if !(0.0 < self.buy_settings.percentage_buy_amount
            && self.buy_settings.percentage_buy_amount <= 100.0)
        {
            return Err(invalid(format!(
                "percentage buy amount {} outside (0, 100]",
                self.buy_settings.percentage_buy_amount
            )));
        }
        if self.buy_settings.max_coin_amount <= 0.0 {
            return Err(invalid("max coin amount must be positive".to_owned()));
        }
        if self.sell_settings.profit_percentage < 0.0 {
            return Err(invalid("profit percentage must be non-negative".to_owned()));
        }
        self.candle_interval
            .wire(self.stock_exchange_settings.exchange)
            .map_err(EngineError::Instrument)?;

        // Indicator parameter bounds are the strategy builder's concern.
        self.build_strategy()?;
        Ok(())
    }

    /// Build the runnable strategy for this configuration.
    pub fn build_strategy(&self) -> Result<CustomStrategy, EngineError> {
        CustomStrategy::new(
            self.strategy_name.clone(),
            self.buy_settings.open_order_when_any_indicator_is_triggered,
            &self.indicators,
        )
        .map_err(EngineError::Ta)
    }

    /// The candle history required before any signal can be computed.
    pub fn required_history(&self) -> usize {
        self.indicators
            .iter()
            .map(IndicatorConfig::required_history)
            .max()
            .unwrap_or(0)
    }
}

/// Application-wide engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    /// Minutes between control-loop ticks.
    pub trading_timeout: u64,
}

impl AppSettings {
    /// The sleep between ticks.
    pub fn tick_sleep(&self) -> Duration {
        Duration::from_secs(self.trading_timeout * 60)
    }
}
