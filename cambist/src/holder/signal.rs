use cambist_data::Candle;
use cambist_instrument::{Currency, Market};
use cambist_ta::StrategyKind;
use std::collections::HashMap;

/// Last-tick cache: per `(base, traded, strategy)` the most recent candle that
/// produced a signal, used to suppress duplicate firings on the same candle.
///
/// Entries only ever move forward in time — an older candle never replaces a newer
/// one, keeping the cached timestamp monotonically non-decreasing.
#[derive(Debug, Clone, Default)]
pub struct SignaledMarketHolder {
    markets: HashMap<(Currency, Currency, StrategyKind), Candle>,
}

impl SignaledMarketHolder {
    /// Constructs an empty [`SignaledMarketHolder`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `candle` as the newest signal-producing candle for the key,
    /// overwriting any previous entry unless it is newer than `candle`.
    pub fn add_market(&mut self, market: Market, strategy: StrategyKind, candle: Candle) {
        let key = (market.base, market.traded, strategy);
        match self.markets.get(&key) {
            Some(existing) if existing.time > candle.time => {}
            _ => {
                self.markets.insert(key, candle);
            }
        }
    }

    /// The cached candle for the key, if any.
    pub fn market(&self, market: Market, strategy: StrategyKind) -> Option<&Candle> {
        self.markets.get(&(market.base, market.traded, strategy))
    }

    /// True when the cached candle for the key equals `candle` componentwise.
    pub fn contains_market(
        &self,
        market: Market,
        strategy: StrategyKind,
        candle: &Candle,
    ) -> bool {
        self.market(market, strategy) == Some(candle)
    }

    pub fn clear(&mut self) {
        self.markets.clear();
    }
}
