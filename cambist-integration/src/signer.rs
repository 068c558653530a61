use crate::error::ExchangeError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Venue API credentials. Adapters receive these once before their worker starts and
/// never re-read them mid-tick.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl Credentials {
    /// Constructs new [`Credentials`].
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// HMAC-SHA256 over `payload`, hex encoded (Binance dialect).
pub fn sign_sha256_hex(secret: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| ExchangeError::Transport(format!("hmac key: {err}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// HMAC-SHA256 over `payload`, base64 encoded (Huobi dialect).
pub fn sign_sha256_base64(secret: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| ExchangeError::Transport(format!("hmac key: {err}")))?;
    mac.update(payload.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// HMAC-SHA512 over `payload`, hex encoded (Bittrex & Poloniex dialect).
pub fn sign_sha512_hex(secret: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|err| ExchangeError::Transport(format!("hmac key: {err}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Kraken's signature dialect: HMAC-SHA512 keyed with the base64-decoded secret over
/// `path + SHA256(nonce + body)`, base64 encoded.
pub fn sign_kraken(
    secret_b64: &str,
    path: &str,
    nonce: &str,
    body: &str,
) -> Result<String, ExchangeError> {
    let secret = BASE64
        .decode(secret_b64)
        .map_err(|err| ExchangeError::Transport(format!("kraken secret decode: {err}")))?;

    let mut inner = Sha256::new();
    inner.update(nonce.as_bytes());
    inner.update(body.as_bytes());
    let inner_digest = inner.finalize();

    let mut mac = HmacSha512::new_from_slice(&secret)
        .map_err(|err| ExchangeError::Transport(format!("hmac key: {err}")))?;
    mac.update(path.as_bytes());
    mac.update(&inner_digest);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = "The quick brown fox jumps over the lazy dog";

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sign_sha256_hex("key", MESSAGE).unwrap(),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn sha512_hex_matches_known_vector() {
        assert_eq!(
            sign_sha512_hex("key", MESSAGE).unwrap(),
            "b42af09057bac1e2d41708e48a902e09b5ff7f12ab428a4fe86653c73dd248fb\
             82f948a549f7b791a5b41915ee4d1ec3935357e4e2317250d0372afa2ebeeb3a"
        );
    }

    #[test]
    fn sha256_base64_encodes_the_same_digest_as_hex() {
        let hex_digest = sign_sha256_hex("key", MESSAGE).unwrap();
        let b64_digest = sign_sha256_base64("key", MESSAGE).unwrap();
        assert_eq!(
            BASE64.decode(b64_digest).unwrap(),
            hex::decode(hex_digest).unwrap()
        );
    }

    #[test]
    fn kraken_signature_matches_documented_example() {
        let secret = "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";
        let signature = sign_kraken(
            secret,
            "/0/private/AddOrder",
            "1616492376594",
            "nonce=1616492376594&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25",
        )
        .unwrap();

        assert_eq!(
            signature,
            "4/dpxb3iT4tp/ZCVEwSnEsLxx0bqyhLpdfOpc6fn7OR8+UClSV5n9E6aSS8MPtnRfp32bAb0nmbRn6H8ndwLUQ=="
        );
    }

    #[test]
    fn invalid_kraken_secret_is_a_transport_error() {
        assert!(matches!(
            sign_kraken("not-base64!!!", "/path", "1", "nonce=1"),
            Err(ExchangeError::Transport(_))
        ));
    }
}
