use std::time::Duration;

use pricelens_core::errors::TransportError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::ClientBuildError;

/// Shared reqwest client bound to one upstream base URL.
#[derive(Clone, Debug)]
pub struct UpstreamHttp {
    client: Client,
    base_url: String,
}

impl UpstreamHttp {
    pub fn new(
        base_url: &str,
        api_key: Option<&SecretString>,
        timeout: Duration,
    ) -> Result<Self, ClientBuildError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(api_key) = api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|_| ClientBuildError::InvalidApiKey)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| ClientBuildError::Client(error.to_string()))?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Checks the status and decodes a JSON body.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let status = response.status();

    if status.is_success() {
        response.json::<T>().await.map_err(|error| {
            TransportError::decode(format!("failed to decode upstream response: {error}"))
                .with_status(status.as_u16())
        })
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "code")]
    cause: Option<String>,
    #[serde(default, alias = "error", alias = "detail")]
    message: Option<String>,
}

/// 5xx and 429 are transient; every other non-success status is a rejection.
pub fn classify_status(status: StatusCode, body: &str) -> TransportError {
    let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
    let detail = parsed.message.unwrap_or_else(|| body.trim().chars().take(512).collect());
    let message = if detail.is_empty() {
        format!("upstream responded with {status}")
    } else {
        format!("upstream responded with {status}: {detail}")
    };

    let error = if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        TransportError::transient(message).with_status(status.as_u16())
    } else {
        TransportError::rejected(Some(status.as_u16()), message)
    };

    match parsed.cause {
        Some(cause) => error.with_cause(cause),
        None => error,
    }
}

pub fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::transient("upstream request timed out")
    } else if error.is_connect() {
        TransportError::transient(format!("connection failed: {error}"))
    } else if error.is_decode() {
        TransportError::decode(format!("failed to decode upstream response: {error}"))
    } else if error.is_builder() {
        TransportError::rejected(None, format!("invalid upstream request: {error}"))
    } else {
        TransportError::transient(format!("upstream request failed: {error}"))
    }
}
