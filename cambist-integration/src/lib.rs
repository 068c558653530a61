//! # Cambist-Integration
//! Low-level plumbing shared by every Cambist exchange adapter:
//!
//! * **error**: the [`ExchangeError`](error::ExchangeError) sum type every adapter
//!   surfaces — transport failures, venue-requested redirects, invalid pairs,
//!   insufficient funds, venue-reported errors and missing data.
//! * **client**: a blocking [`RestClient`](client::RestClient) over `reqwest` that
//!   normalises transport & decode failures and surfaces 3xx responses instead of
//!   following them.
//! * **signer**: canonical query-string HMAC signing in each venue's dialect
//!   (SHA-256 / SHA-512, hex / base64, Kraken's nonce + path + SHA-256(body) inner
//!   hash).
//!
//! Every operation here is synchronous & blocking: the trading engine runs one
//! control-loop thread per configuration and treats each HTTP call as a blocking
//! suspension point.

pub mod client;
pub mod error;
pub mod signer;

pub use client::RestClient;
pub use error::ExchangeError;
pub use signer::Credentials;

/// Local millisecond epoch timestamp, the signing timestamp fallback for venues that
/// do not publish a server time.
pub fn local_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Canonicalise query pairs into the urlencoded string that gets signed. Signing and
/// sending MUST use the identical string, so adapters build it once through here.
pub fn canonical_query(pairs: &[(&str, String)]) -> Result<String, ExchangeError> {
    serde_urlencoded::to_string(pairs)
        .map_err(|err| ExchangeError::Transport(format!("query encode: {err}")))
}
