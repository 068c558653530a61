//! # Cambist-Data
//! Normalised value types flowing between the exchange adapters, the indicator
//! engine, the persistent store and the trading engine:
//!
//! * **Candle**: OHLCV snapshot over a named interval, newest-last in every series.
//! * **CurrencyTick**: best bid/ask for a market.
//! * **LotSize** / **LotSizeHolder**: per-pair quantity filters for venues that
//!   require rounded quantities (Binance); empty for venues that do not.
//! * **MarketOrder**: the canonical unit of work tracked by the engine, equal iff
//!   every field matches and hashed/ordered by exchange uuid.

/// Defines the [`Candle`](candle::Candle) OHLCV model & its close-price ordering
/// helpers.
pub mod candle;

/// Defines the [`MarketOrder`](order::MarketOrder) record & the wire precision rules
/// for coin amounts.
pub mod order;

/// Defines the [`CurrencyTick`](tick::CurrencyTick) best bid/ask model.
pub mod tick;

/// Defines [`LotSize`](lot::LotSize) quantity filters & the
/// [`LotSizeHolder`](lot::LotSizeHolder) per-pair collection.
pub mod lot;

pub use candle::Candle;
pub use lot::{LotSize, LotSizeHolder};
pub use order::{format_coin, format_coin_with_precision, MarketOrder, Side};
pub use tick::CurrencyTick;
