use cambist_instrument::Currency;
use serde::{Deserialize, Serialize};

/// Best bid/ask snapshot for one market. The `ask >= bid` invariant is held by the
/// venue's responses and is not enforced locally.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize, Default)]
pub struct CurrencyTick {
    pub bid: f64,
    pub ask: f64,
    pub base: Currency,
    pub traded: Currency,
}

impl CurrencyTick {
    /// Constructs a new [`CurrencyTick`].
    pub fn new(bid: f64, ask: f64, base: Currency, traded: Currency) -> Self {
        Self {
            bid,
            ask,
            base,
            traded,
        }
    }

    /// True when the venue reported a usable, strictly positive bid.
    pub fn has_valid_bid(&self) -> bool {
        self.bid.is_finite() && self.bid > 0.0
    }
}
