use cambist_instrument::InstrumentError;
use cambist_integration::ExchangeError;
use cambist_store::StoreError;
use cambist_ta::TaError;
use thiserror::Error;

/// All errors generated in the cambist engine crate.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to build struct due to incomplete attributes provided")]
    BuilderIncomplete,

    #[error("invalid trade configuration '{name}': {reason}")]
    ConfigurationInvalid { name: String, reason: String },

    #[error("indicator: {0}")]
    Ta(#[from] TaError),

    #[error("instrument: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("exchange: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}
