use cambist_instrument::{Currency, ExchangeId, Market};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Fixed wire precision for coin quantities & rates, unless a venue overrides it
/// (Huobi: per-pair precision).
pub const COIN_PRECISION: usize = 8;

/// Format a coin amount with the default 8-decimal fixed precision.
pub fn format_coin(value: f64) -> String {
    format_coin_with_precision(value, COIN_PRECISION)
}

/// Format a coin amount with an explicit decimal precision.
pub fn format_coin_with_precision(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

/// Side of a [`MarketOrder`], Buy or Sell.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Return the &str representation of this [`Side`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Integer-stable discriminant used by the persistent store.
    pub fn index(&self) -> i64 {
        *self as i64
    }

    /// Inverse of [`Side::index`], defaulting to Buy for out-of-range rows.
    pub fn from_index(index: i64) -> Self {
        match index {
            1 => Side::Sell,
            _ => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical unit of work tracked by the trading engine: one exchange order.
///
/// `db_id` is 0 until the persistent store assigns one on insert; `uuid` is assigned
/// by the exchange when the order is placed. Two orders are equal iff every field
/// matches; ordering & hashing use the `uuid` alone so sets & matchings key by the
/// exchange's identifier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketOrder {
    pub db_id: i64,
    pub uuid: String,
    pub base: Currency,
    pub traded: Currency,
    pub side: Side,
    pub exchange: ExchangeId,
    pub quantity: f64,
    pub price: f64,
    pub opened_at: DateTime<Utc>,
    pub canceled: bool,
}

impl Default for MarketOrder {
    fn default() -> Self {
        Self {
            db_id: 0,
            uuid: String::new(),
            base: Currency::Unknown,
            traded: Currency::Unknown,
            side: Side::Buy,
            exchange: ExchangeId::Unknown,
            quantity: 0.0,
            price: 0.0,
            opened_at: DateTime::<Utc>::UNIX_EPOCH,
            canceled: false,
        }
    }
}

impl MarketOrder {
    /// The [`Market`] this order trades on.
    pub fn market(&self) -> Market {
        Market::new(self.base, self.traded)
    }

    /// Base-currency value committed by this order.
    pub fn cost(&self) -> f64 {
        self.price * self.quantity
    }

    /// Human-readable single line used by logging.
    pub fn describe(&self) -> String {
        format!(
            "side: {}, exchange: {}, base: {}, traded: {}, quantity: {}, price: {}, canceled: {}",
            self.side,
            self.exchange,
            self.base,
            self.traded,
            format_coin(self.quantity),
            format_coin(self.price),
            if self.canceled { "yes" } else { "no" },
        )
    }
}

impl PartialEq for MarketOrder {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
            && self.base == other.base
            && self.traded == other.traded
            && self.side == other.side
            && self.exchange == other.exchange
            && self.quantity == other.quantity
            && self.price == other.price
            && self.opened_at == other.opened_at
            && self.canceled == other.canceled
    }
}

impl Eq for MarketOrder {}

impl Hash for MarketOrder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl Ord for MarketOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uuid.cmp(&other.uuid)
    }
}

impl PartialOrd for MarketOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
