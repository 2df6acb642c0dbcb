//! HTTP transport.
//!
//! The [`Transport`] trait is the seam between the client logic and the
//! network. [`HttpTransport`] is the production implementation on top of a
//! pooled `reqwest` client.

use crate::config::{ClientConfig, API_KEY_HEADER};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Status, headers and body of an HTTP response, uninterpreted.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs one authenticated API call.
///
/// Implementations return the raw response for any status code and only fail
/// on transport-level problems ([`Error::Network`], [`Error::Timeout`]).
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RawResponse>;
}

/// `reqwest`-backed transport.
///
/// Cloning the inner `reqwest::Client` shares its connection pool, so one
/// instance serves any number of concurrent calls.
#[derive(Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    user_agent: String,
}

impl HttpTransport {
    /// Build the HTTP client from a validated configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|_| Error::Configuration("API key contains invalid header characters".to_string()))?;
        HeaderValue::from_str(&config.user_agent)
            .map_err(|_| Error::Configuration("user agent contains invalid header characters".to_string()))?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.danger_accept_invalid_certs);

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| Error::Configuration(format!("invalid proxy {proxy_url:?}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    /// Build headers for API requests.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|_| Error::Configuration("user agent contains invalid header characters".to_string()))?;
        headers.insert(USER_AGENT, user_agent);

        let mut api_key = HeaderValue::from_str(self.api_key.expose_secret())
            .map_err(|_| Error::Configuration("API key contains invalid header characters".to_string()))?;
        api_key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, api_key);

        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "sending request");

        let mut request = self.http.request(method, &url).headers(self.headers()?);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(transport_error)?;
        debug!(status, %url, "received response");

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            message: format!("request timed out: {err}"),
            details: None,
        }
    } else {
        Error::Network {
            message: format!("request failed: {err}"),
            details: None,
        }
    }
}
