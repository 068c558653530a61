use crate::error::ExchangeError;
use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::error;

/// Default per-request timeout enforced by every adapter's HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Blocking REST transport shared by the exchange adapters.
///
/// Redirect responses (301/302/303/307) are never followed; they surface as
/// [`ExchangeError::RedirectRequested`] carrying the `Location` header so the caller
/// can retry exactly once. Everything the network layer throws is folded into
/// [`ExchangeError::Transport`].
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
}

impl RestClient {
    /// Constructs a new [`RestClient`] with certificate verification on.
    pub fn new() -> Result<Self, ExchangeError> {
        Self::with_certificate_verification(true)
    }

    /// Constructs a new [`RestClient`], optionally accepting invalid upstream
    /// certificates for the venues that require it.
    pub fn with_certificate_verification(verify: bool) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(Policy::none())
            .danger_accept_invalid_certs(!verify)
            .build()
            .map_err(ExchangeError::from)?;

        Ok(Self { http })
    }

    /// Execute a GET against `url` with the provided query pairs & headers, returning
    /// the response status and raw payload.
    pub fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<(StatusCode, Vec<u8>), ExchangeError> {
        let mut request = self.http.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        Self::execute(request)
    }

    /// Execute a POST against `url` with a pre-canonicalised urlencoded body & the
    /// provided headers, returning the response status and raw payload.
    pub fn post_form(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, String)],
    ) -> Result<(StatusCode, Vec<u8>), ExchangeError> {
        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        Self::execute(request)
    }

    /// Execute a POST against `url` with a JSON body & the provided headers,
    /// returning the response status and raw payload.
    pub fn post_json(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, String)],
    ) -> Result<(StatusCode, Vec<u8>), ExchangeError> {
        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .body(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        Self::execute(request)
    }

    /// Execute a DELETE against `url` with the provided query pairs & headers.
    pub fn delete(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<(StatusCode, Vec<u8>), ExchangeError> {
        let mut request = self.http.delete(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        Self::execute(request)
    }

    fn execute(
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<(StatusCode, Vec<u8>), ExchangeError> {
        let response = request.send()?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
                .ok_or_else(|| {
                    ExchangeError::Transport("redirect without Location header".to_owned())
                })?;
            return Err(ExchangeError::RedirectRequested(location));
        }

        let payload = response.bytes()?.to_vec();
        Ok((status, payload))
    }
}

/// Utilised by an adapter to deserialise a payload into its `Response` model, and
/// upon failure parse the venue's error shape instead.
pub trait HttpParser {
    /// The venue's error payload model.
    type ApiError: DeserializeOwned;

    /// Attempt to parse a [`StatusCode`] & payload into a deserialisable `Response`.
    fn parse<Response>(
        &self,
        status: StatusCode,
        payload: &[u8],
    ) -> Result<Response, ExchangeError>
    where
        Response: DeserializeOwned,
    {
        // Attempt to deserialise the payload into Ok(Response)
        let parse_ok_error = match serde_json::from_slice::<Response>(payload) {
            Ok(response) => return Ok(response),
            Err(serde_error) => serde_error,
        };

        // Attempt to deserialise the venue ApiError if Ok(Response) deserialisation failed
        let parse_api_error_error = match serde_json::from_slice::<Self::ApiError>(payload) {
            Ok(api_error) => return Err(self.parse_api_error(status, api_error)),
            Err(serde_error) => serde_error,
        };

        error!(
            status_code = ?status,
            ?parse_ok_error,
            ?parse_api_error_error,
            response_body = %String::from_utf8_lossy(payload),
            "error deserialising HTTP response"
        );

        Err(ExchangeError::Transport(format!(
            "payload decode: {parse_ok_error}"
        )))
    }

    /// Map the venue [`Self::ApiError`] into an [`ExchangeError`].
    fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> ExchangeError;
}
