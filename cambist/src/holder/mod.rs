/// In-memory mirror of open buys, open sells, profit groups & buy↔sell matchings
/// for one trade configuration.
pub mod orders;

/// Last-tick cache of the most recent signal-producing candle per market/strategy.
pub mod signal;

pub use orders::{OrderMatching, OrdersProfit, TradeOrdersHolder};
pub use signal::SignaledMarketHolder;
