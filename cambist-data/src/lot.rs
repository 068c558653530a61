use cambist_instrument::Market;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Quantity filter for one market: `[min_qty, max_qty]` bounds and the `step_size`
/// quantities must be a multiple of.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize, Default)]
pub struct LotSize {
    pub min_qty: f64,
    pub max_qty: f64,
    pub step_size: f64,
}

impl LotSize {
    /// Constructs a new [`LotSize`].
    pub fn new(min_qty: f64, max_qty: f64, step_size: f64) -> Self {
        Self {
            min_qty,
            max_qty,
            step_size,
        }
    }

    /// Round `quantity` down to the nearest step multiple, then clamp to
    /// `[min_qty, max_qty]`. A zero step leaves the quantity untouched before
    /// clamping.
    pub fn round_quantity(&self, quantity: f64) -> f64 {
        let stepped = if self.step_size > 0.0 {
            (quantity / self.step_size).floor() * self.step_size
        } else {
            quantity
        };
        stepped.clamp(self.min_qty, self.max_qty)
    }
}

/// Per-market collection of [`LotSize`] filters. Venues without quantity filters
/// return an empty holder and the engine skips rounding entirely.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, Default)]
pub struct LotSizeHolder {
    lots: HashMap<Market, LotSize>,
}

impl LotSizeHolder {
    /// Constructs an empty [`LotSizeHolder`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// Record the [`LotSize`] filter for `market`.
    pub fn insert(&mut self, market: Market, lot: LotSize) {
        self.lots.insert(market, lot);
    }

    /// The [`LotSize`] filter for `market`, if the venue reported one.
    pub fn get(&self, market: &Market) -> Option<&LotSize> {
        self.lots.get(market)
    }

    /// True when the venue reported no filters at all.
    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Round `quantity` for `market` where a filter exists, otherwise return it
    /// unchanged.
    pub fn round_quantity(&self, market: &Market, quantity: f64) -> f64 {
        match self.lots.get(market) {
            Some(lot) => lot.round_quantity(quantity),
            None => quantity,
        }
    }
}
