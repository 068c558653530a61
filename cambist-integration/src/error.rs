use thiserror::Error;

/// All error kinds surfaced by an exchange adapter.
///
/// The trading engine switches on these variants to decide per-currency policy:
/// transport errors abandon the currency for the tick, a redirect is retried exactly
/// once, an invalid pair disables the currency for the session, insufficient funds is
/// treated as a failed admission check, and `NoData` feeds the reconciliation rules
/// for orders the venue no longer reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// Network, TLS or payload-decode failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The venue answered 3xx; callers retry exactly once against the new location.
    #[error("redirect requested to {0}")]
    RedirectRequested(String),

    /// The venue rejected the pair symbol.
    #[error("invalid pair")]
    InvalidPair,

    /// The venue rejected an order placement for lack of funds.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Venue-reported generic error message.
    #[error("exchange error: {0}")]
    StockExchange(String),

    /// The venue has no record of the requested entity.
    #[error("no data")]
    NoData,
}

impl ExchangeError {
    /// Fold a venue-reported message into the right variant, recognising the
    /// "insufficient funds" phrasings the supported venues use.
    pub fn from_venue_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("insufficient") && (lowered.contains("fund") || lowered.contains("balance")) {
            ExchangeError::InsufficientFunds
        } else {
            ExchangeError::StockExchange(message)
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(error: reqwest::Error) -> Self {
        ExchangeError::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(error: serde_json::Error) -> Self {
        ExchangeError::Transport(format!("payload decode: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_message_recognises_insufficient_funds() {
        assert_eq!(
            ExchangeError::from_venue_message("INSUFFICIENT_FUNDS"),
            ExchangeError::InsufficientFunds
        );
        assert_eq!(
            ExchangeError::from_venue_message("Account has insufficient balance for requested action."),
            ExchangeError::InsufficientFunds
        );
    }

    #[test]
    fn venue_message_defaults_to_stock_exchange() {
        assert_eq!(
            ExchangeError::from_venue_message("MARKET_OFFLINE"),
            ExchangeError::StockExchange("MARKET_OFFLINE".to_owned())
        );
    }
}
