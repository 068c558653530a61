//! # Cambist-Instrument
//! Core Currency, Exchange and Market taxonomy data structures used by every other
//! Cambist crate. At a high level it provides:
//!
//! * **Currency**: closed enumeration of the symbolic tokens Cambist trades, with
//!   canonical uppercase string round-trips.
//! * **ExchangeId**: unique identifier for each supported venue, integer-stable so it
//!   can be persisted.
//! * **CandleInterval**: ordered candle interval enumeration with per-exchange wire
//!   serialisation.
//! * **Market**: a `(base, traded)` currency pair, plus the per-venue symbol
//!   formatting & parsing rules (eg/ "BTC-LTC", "LTCBTC", "BTC_LTC", "XXBTZUSD").

/// Closed enumeration of currencies plus [`Currency::Unknown`], round-trippable
/// to/from the canonical uppercase string.
pub mod currency;

/// Unique identifier for a supported exchange venue.
pub mod exchange;

/// Ordered candle interval enumeration with per-exchange wire serialisation.
pub mod interval;

/// A `(base, traded)` currency pair & the per-venue symbol formats.
pub mod market;

pub use currency::Currency;
pub use exchange::ExchangeId;
pub use interval::CandleInterval;
pub use market::Market;

use thiserror::Error;

/// All errors generated in the cambist-instrument crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("unrecognised {exchange} pair symbol: {symbol}")]
    UnknownPairSymbol { exchange: ExchangeId, symbol: String },

    #[error("candle interval {interval} is not supported by {exchange}")]
    UnsupportedInterval {
        exchange: ExchangeId,
        interval: CandleInterval,
    },
}
