//! Huefy async client implementation.

use crate::config::{BulkMode, ClientConfig, RetryConfig};
use crate::error::classify_response;
use crate::models::{
    decode_bulk_response, decode_health, decode_send_response, decode_template_validation,
    BulkEmailRequest, BulkSendResult, HealthStatus, SendEmailRequest, SendResult, TemplateValidation,
};
use crate::retry::{RequestContext, RetryPolicy};
use crate::transport::{HttpTransport, Transport};
use crate::{Error, Result};
use reqwest::Method;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SEND_PATH: &str = "/emails/send";
const BULK_PATH: &str = "/emails/bulk";
const HEALTH_PATH: &str = "/health";
const VALIDATE_TEMPLATE_PATH: &str = "/templates/validate";

/// Async client for the Huefy email API.
///
/// Use [`Client::new`] for defaults or [`Client::builder`] for custom settings
/// like base URL, timeout, retry policy and proxies. The client is cheap to
/// clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    bulk_mode: BulkMode,
}

impl Client {
    /// Create a builder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client with default settings.
    ///
    /// # Examples
    /// ```no_run
    /// # use huefy::Client;
    /// let client = Client::new("your-api-key")?;
    /// # Ok::<(), huefy::Error>(())
    /// ```
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().api_key(api_key).build()
    }

    /// Create a client configured from `HUEFY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        ClientBuilder::from_env()?.build()
    }

    /// The retry policy applied to every call.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// How [`send_bulk_emails`](Self::send_bulk_emails) reaches the API.
    pub fn bulk_mode(&self) -> BulkMode {
        self.bulk_mode
    }

    /// Send one templated email.
    ///
    /// # Examples
    /// ```no_run
    /// # use huefy::{Client, SendEmailRequest};
    /// # use serde_json::json;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), huefy::Error> {
    /// let client = Client::new("your-api-key")?;
    /// let request = SendEmailRequest::new(
    ///     "welcome-email",
    ///     json!({ "name": "John Doe" }),
    ///     "john@example.com",
    ///     None,
    /// )?;
    /// let sent = client.send_email(&request).await?;
    /// println!("{} via {}", sent.message_id, sent.provider);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send_email(&self, request: &SendEmailRequest) -> Result<SendResult> {
        self.send_email_with_context(request, &RequestContext::default())
            .await
    }

    /// [`send_email`](Self::send_email) bounded by a cancellation token and/or deadline.
    pub async fn send_email_with_context(
        &self,
        request: &SendEmailRequest,
        ctx: &RequestContext,
    ) -> Result<SendResult> {
        debug!(template_key = request.template_key(), "sending email");
        let body = to_body(request)?;
        self.call(ctx, Method::POST, SEND_PATH, Some(body), decode_send_response)
            .await
    }

    /// Send a batch of emails.
    ///
    /// The result holds one outcome per input email, in input order. A failed
    /// item does not affect the others.
    pub async fn send_bulk_emails(&self, request: &BulkEmailRequest) -> Result<BulkSendResult> {
        self.send_bulk_emails_with_context(request, &RequestContext::default())
            .await
    }

    /// [`send_bulk_emails`](Self::send_bulk_emails) bounded by a cancellation token and/or deadline.
    pub async fn send_bulk_emails_with_context(
        &self,
        request: &BulkEmailRequest,
        ctx: &RequestContext,
    ) -> Result<BulkSendResult> {
        debug!(count = request.len(), mode = ?self.bulk_mode, "sending bulk emails");
        match self.bulk_mode {
            BulkMode::SingleRequest => {
                let body = to_body(request)?;
                let result = self
                    .call(ctx, Method::POST, BULK_PATH, Some(body), decode_bulk_response)
                    .await?;
                if result.total() != request.len() {
                    return Err(Error::Decoding {
                        message: format!(
                            "bulk response carried {} results for {} emails",
                            result.total(),
                            request.len()
                        ),
                    });
                }
                Ok(result)
            }
            BulkMode::PerItem => {
                let mut items = Vec::with_capacity(request.len());
                for email in request.emails() {
                    match self.send_email_with_context(email, ctx).await {
                        Err(err @ Error::Cancelled { .. }) => return Err(err),
                        outcome => items.push(outcome),
                    }
                }
                Ok(BulkSendResult::new(items))
            }
        }
    }

    /// Check API availability.
    pub async fn health_check(&self) -> Result<HealthStatus> {
        self.health_check_with_context(&RequestContext::default())
            .await
    }

    /// [`health_check`](Self::health_check) bounded by a cancellation token and/or deadline.
    pub async fn health_check_with_context(&self, ctx: &RequestContext) -> Result<HealthStatus> {
        self.call(ctx, Method::GET, HEALTH_PATH, None, decode_health)
            .await
    }

    /// Render a template against test data without sending anything.
    pub async fn validate_template(
        &self,
        template_key: &str,
        test_data: Value,
    ) -> Result<TemplateValidation> {
        self.validate_template_with_context(template_key, test_data, &RequestContext::default())
            .await
    }

    /// [`validate_template`](Self::validate_template) bounded by a cancellation token and/or deadline.
    pub async fn validate_template_with_context(
        &self,
        template_key: &str,
        test_data: Value,
        ctx: &RequestContext,
    ) -> Result<TemplateValidation> {
        if template_key.trim().is_empty() {
            return Err(Error::Validation {
                field: Some("templateKey".to_string()),
                message: "templateKey is required".to_string(),
                details: None,
            });
        }
        let body = json!({ "templateKey": template_key, "testData": test_data });
        self.call(
            ctx,
            Method::POST,
            VALIDATE_TEMPLATE_PATH,
            Some(body),
            decode_template_validation,
        )
        .await
    }

    /// Common request pattern: retry the transport call, classify failures,
    /// decode successes.
    async fn call<T>(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &'static str,
        body: Option<Value>,
        decode: fn(&str) -> Result<T>,
    ) -> Result<T> {
        let transport = &self.transport;
        let method = &method;
        let body = body.as_ref();

        self.retry
            .run(ctx, move || async move {
                let response = transport.execute(method.clone(), path, body).await?;
                if !response.is_success() {
                    let err = classify_response(&response);
                    debug!(status = response.status, code = err.code(), path, "request failed");
                    return Err(err);
                }
                decode(&response.body)
            })
            .await
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Validation {
        field: None,
        message: format!("request could not be serialized: {e}"),
        details: None,
    })
}

/// Builder for configuring a Huefy client.
///
/// Start with [`Client::builder`] to override defaults.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Create a new builder with default settings.
    ///
    /// Defaults:
    /// - Base URL `https://api.huefy.com/api/v1/sdk`
    /// - 30 second timeout
    /// - 3 retries, 1s initial delay doubling up to 30s
    /// - No proxy, strict TLS validation
    /// - Bulk sends as one request
    ///
    /// An API key must be set before [`build`](Self::build).
    pub fn new() -> Self {
        Self {
            config: ClientConfig::new(String::new()),
            transport: None,
        }
    }

    /// Start from `HUEFY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(ClientConfig::from_env()?))
    }

    /// Start from an explicit configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Set the API key sent as `X-API-Key` (required).
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = SecretString::from(api_key.into());
        self
    }

    /// Override the API base URL; a trailing `/` is ignored.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Replace the whole retry configuration.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Retries after the first attempt; `0` disables retrying.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries;
        self
    }

    /// Set a proxy URL (e.g., "http://127.0.0.1:8080" or "socks5://127.0.0.1:1080").
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Override the default user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Control whether to accept invalid TLS certificates (default: false).
    pub fn danger_accept_invalid_certs(mut self, value: bool) -> Self {
        self.config.danger_accept_invalid_certs = value;
        self
    }

    /// Send batches as one request (default) or one request per email.
    pub fn bulk_mode(mut self, mode: BulkMode) -> Self {
        self.config.bulk_mode = mode;
        self
    }

    /// Replace the HTTP transport, e.g. with an in-memory fake in tests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the configuration and build the client.
    ///
    /// # Examples
    /// ```no_run
    /// # use huefy::{Client, RetryConfig};
    /// # use std::time::Duration;
    /// let client = Client::builder()
    ///     .api_key("your-api-key")
    ///     .timeout(Duration::from_secs(60))
    ///     .retry_config(RetryConfig {
    ///         max_retries: 5,
    ///         base_delay: Duration::from_millis(500),
    ///         max_delay: Duration::from_secs(10),
    ///         multiplier: 2.5,
    ///         jitter: 0.0,
    ///     })
    ///     .build()?;
    /// # Ok::<(), huefy::Error>(())
    /// ```
    pub fn build(self) -> Result<Client> {
        let config = self.config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config)?),
        };

        Ok(Client {
            transport,
            retry: RetryPolicy::new(config.retry),
            bulk_mode: config.bulk_mode,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
