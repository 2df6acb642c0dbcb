//! # Huefy Client
//! Asynchronous client for the Huefy templated email API: send one email or a batch from a server-side template, check API health, and dry-run templates from Rust using [`Client`] and [`ClientBuilder`].
//!
//! ## Audience and uses
//! For Rust services that send transactional email through Huefy: build a [`SendEmailRequest`] (validated locally), hand it to the client, and act on the typed [`SendResult`] or [`Error`].
//!
//! ## Runtime requirements
//! Async-only; run inside a Tokio (v1) runtime. HTTP calls use `reqwest`; backoff waits and cancellation use Tokio timers, so the `time` driver must be enabled.
//!
//! ## Retries and cancellation
//! Network failures, timeouts, rate limits and 5xx responses are retried with exponential backoff as configured by [`RetryConfig`]. Every operation has a `*_with_context` variant taking a [`RequestContext`] whose cancellation token and deadline are honored both during a request and while waiting to retry.
//!
//! ## Out of scope
//! Not an SMTP client or template editor. It only calls the Huefy REST API and inherits its availability and provider behavior.
//!
//! ## Errors
//! Every failure is one variant of [`Error`], carrying a machine-readable [`Error::code`], a message and, where the API supplied them, structured details. The crate-wide [`Result`] alias wraps these errors.
//!
//! ## Example
//! ```no_run
//! use huefy::{Client, Error, SendEmailRequest};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new("your-api-key")?;
//!     let request = SendEmailRequest::new(
//!         "welcome-email",
//!         json!({ "name": "John Doe", "company": "Acme Corp" }),
//!         "john@example.com",
//!         None,
//!     )?;
//!
//!     match client.send_email(&request).await {
//!         Ok(sent) => println!("Sent {} via {}", sent.message_id, sent.provider),
//!         Err(Error::TemplateNotFound { template_key, .. }) => {
//!             eprintln!("No template named {template_key}");
//!         }
//!         Err(err) => return Err(err),
//!     }
//!     Ok(())
//! }
//! ```

mod client;
pub mod config;
mod error;
mod models;
mod retry;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use config::{BulkMode, ClientConfig, RetryConfig};
pub use error::{classify, classify_response, codes, CancelReason, Details, Error};
pub use models::{
    decode_bulk_response, decode_health, decode_send_response, decode_template_validation,
    BulkEmailRequest, BulkSendResult, HealthStatus, Provider, SendEmailRequest,
    SendEmailRequestBuilder, SendResult, TemplateValidation,
};
pub use retry::{RequestContext, RetryPolicy, RetryPredicate};
pub use transport::{HttpTransport, RawResponse, Transport};

/// Re-exported so callers can build a [`RequestContext`] without a direct
/// `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;

/// Result type alias for Huefy operations.
///
/// This is equivalent to `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
