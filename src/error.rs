//! Error taxonomy and classification of failed API calls.
//!
//! Every failure surfaced by the client is one variant of [`Error`]. Failed HTTP
//! responses are turned into a variant by [`classify`], which reads the
//! machine-readable `code` from the error body and falls back to the status
//! code when the body is missing or the code is unknown.

use crate::transport::RawResponse;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Structured error details as sent by the API.
pub type Details = Map<String, Value>;

/// Machine-readable error codes used by the Huefy API and this client.
pub mod codes {
    pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";
    pub const TEMPLATE_NOT_FOUND: &str = "TEMPLATE_NOT_FOUND";
    pub const INVALID_TEMPLATE_DATA: &str = "INVALID_TEMPLATE_DATA";
    pub const INVALID_RECIPIENT: &str = "INVALID_RECIPIENT";
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    pub const BAD_GATEWAY: &str = "BAD_GATEWAY";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const DECODING_ERROR: &str = "DECODING_ERROR";
    pub const CANCELLED: &str = "CANCELLED";
    pub const DEADLINE_EXCEEDED: &str = "DEADLINE_EXCEEDED";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
    /// A failure that arrived without any code.
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
}

/// Why a call was abandoned before it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The caller's deadline passed.
    DeadlineExceeded,
}

impl CancelReason {
    fn code(self) -> &'static str {
        match self {
            CancelReason::Cancelled => codes::CANCELLED,
            CancelReason::DeadlineExceeded => codes::DEADLINE_EXCEEDED,
        }
    }

    fn message(self) -> &'static str {
        match self {
            CancelReason::Cancelled => "request cancelled by caller",
            CancelReason::DeadlineExceeded => "request deadline exceeded",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors returned by the Huefy client.
///
/// The taxonomy is closed: match on the variant to react to a specific failure,
/// or use [`Error::code`], [`Error::message`] and [`Error::details`] for the
/// generic view shared by all variants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Caller input was rejected, either locally before any request was made
    /// or by the API with `VALIDATION_FAILED`.
    #[error("[VALIDATION_FAILED] {message}")]
    Validation {
        field: Option<String>,
        message: String,
        details: Option<Details>,
    },

    /// The API key was rejected.
    #[error("[AUTHENTICATION_FAILED] {message}")]
    Authentication {
        message: String,
        details: Option<Details>,
    },

    /// The referenced template does not exist.
    #[error("[TEMPLATE_NOT_FOUND] {message}")]
    TemplateNotFound {
        template_key: String,
        message: String,
        details: Option<Details>,
    },

    /// The template data failed server-side validation.
    #[error("[INVALID_TEMPLATE_DATA] {message}")]
    InvalidTemplateData {
        validation_errors: Vec<String>,
        message: String,
        details: Option<Details>,
    },

    /// The API rejected the recipient address.
    #[error("[INVALID_RECIPIENT] {message}")]
    InvalidRecipient {
        recipient: Option<String>,
        message: String,
        details: Option<Details>,
    },

    /// The selected email provider refused the send.
    #[error("[PROVIDER_ERROR] {message}")]
    Provider {
        provider: Option<String>,
        provider_code: Option<String>,
        message: String,
        details: Option<Details>,
    },

    /// Too many requests; `retry_after` carries the server's hint when given.
    #[error("[RATE_LIMIT_EXCEEDED] {message}")]
    RateLimit {
        retry_after: Option<Duration>,
        message: String,
        details: Option<Details>,
    },

    /// Connection, DNS, TLS or body transfer failure.
    #[error("[NETWORK_ERROR] {message}")]
    Network {
        message: String,
        details: Option<Details>,
    },

    /// No response arrived within the configured timeout.
    #[error("[TIMEOUT] {message}")]
    Timeout {
        message: String,
        details: Option<Details>,
    },

    /// 5xx failure on the API side.
    #[error("[{code}] {message}")]
    Server {
        status: Option<u16>,
        code: String,
        message: String,
        details: Option<Details>,
    },

    /// A 2xx response body did not have the expected shape.
    #[error("[DECODING_ERROR] {message}")]
    Decoding { message: String },

    /// An error code this client does not know, preserved as received.
    #[error("[{code}] {message}")]
    Unknown {
        status: Option<u16>,
        code: String,
        message: String,
        details: Option<Details>,
    },

    /// The caller cancelled the call or its deadline passed.
    #[error("{reason}")]
    Cancelled { reason: CancelReason },

    /// The client could not be constructed from the given configuration.
    #[error("invalid client configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Machine-readable code of this error.
    pub fn code(&self) -> &str {
        match self {
            Error::Validation { .. } => codes::VALIDATION_FAILED,
            Error::Authentication { .. } => codes::AUTHENTICATION_FAILED,
            Error::TemplateNotFound { .. } => codes::TEMPLATE_NOT_FOUND,
            Error::InvalidTemplateData { .. } => codes::INVALID_TEMPLATE_DATA,
            Error::InvalidRecipient { .. } => codes::INVALID_RECIPIENT,
            Error::Provider { .. } => codes::PROVIDER_ERROR,
            Error::RateLimit { .. } => codes::RATE_LIMIT_EXCEEDED,
            Error::Network { .. } => codes::NETWORK_ERROR,
            Error::Timeout { .. } => codes::TIMEOUT,
            Error::Server { code, .. } | Error::Unknown { code, .. } => code,
            Error::Decoding { .. } => codes::DECODING_ERROR,
            Error::Cancelled { reason } => reason.code(),
            Error::Configuration(_) => codes::CONFIGURATION_ERROR,
        }
    }

    /// Human-readable message of this error.
    pub fn message(&self) -> &str {
        match self {
            Error::Validation { message, .. }
            | Error::Authentication { message, .. }
            | Error::TemplateNotFound { message, .. }
            | Error::InvalidTemplateData { message, .. }
            | Error::InvalidRecipient { message, .. }
            | Error::Provider { message, .. }
            | Error::RateLimit { message, .. }
            | Error::Network { message, .. }
            | Error::Timeout { message, .. }
            | Error::Server { message, .. }
            | Error::Decoding { message }
            | Error::Unknown { message, .. } => message,
            Error::Cancelled { reason } => reason.message(),
            Error::Configuration(message) => message,
        }
    }

    /// Structured details attached by the API or the client, if any.
    pub fn details(&self) -> Option<&Details> {
        match self {
            Error::Validation { details, .. }
            | Error::Authentication { details, .. }
            | Error::TemplateNotFound { details, .. }
            | Error::InvalidTemplateData { details, .. }
            | Error::InvalidRecipient { details, .. }
            | Error::Provider { details, .. }
            | Error::RateLimit { details, .. }
            | Error::Network { details, .. }
            | Error::Timeout { details, .. }
            | Error::Server { details, .. }
            | Error::Unknown { details, .. } => details.as_ref(),
            Error::Decoding { .. } | Error::Cancelled { .. } | Error::Configuration(_) => None,
        }
    }

    /// Whether a retry may succeed: network failures, timeouts, rate limits
    /// and 5xx server errors.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network { .. } | Error::Timeout { .. } | Error::RateLimit { .. } | Error::Server { .. }
        )
    }

    /// Server-provided wait hint of a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Error::Validation {
            field: Some(field.to_string()),
            message: message.into(),
            details: None,
        }
    }

    pub(crate) fn decoding(what: &str, err: serde_json::Error) -> Self {
        Error::Decoding {
            message: format!("failed to decode {what}: {err}"),
        }
    }
}

/// An error body as `{"error": {...}}`, `{"error": "text"}` or flat.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ErrorEnvelope {
    Nested { error: ErrorBody },
    Text { error: String },
    Flat(ErrorBody),
}

impl ErrorEnvelope {
    fn into_body(self) -> ErrorBody {
        match self {
            ErrorEnvelope::Nested { error } | ErrorEnvelope::Flat(error) => error,
            ErrorEnvelope::Text { error } => ErrorBody {
                message: error,
                ..ErrorBody::default()
            },
        }
    }
}

/// Fields of an error body. An absent `code` is left empty and resolved by
/// the caller.
#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Option<Details>,
}

/// Map an HTTP status and response body to an [`Error`].
///
/// A body without a `code` yields the code `HTTP_<status>`; a body without a
/// message keeps the raw body text as message.
pub fn classify(status: u16, body: &str) -> Error {
    let ErrorBody {
        code,
        message,
        details,
    } = serde_json::from_str::<ErrorEnvelope>(body)
        .map(ErrorEnvelope::into_body)
        .unwrap_or_default();

    let code = non_empty_or(code, || format!("HTTP_{status}"));
    let message = non_empty_or(message, || body.to_string());
    from_parts(Some(status), code, message, details)
}

/// Like [`classify`], but also honors a `Retry-After` header on rate limits.
pub fn classify_response(response: &RawResponse) -> Error {
    let mut error = classify(response.status, &response.body);
    if let Error::RateLimit { retry_after, .. } = &mut error {
        if retry_after.is_none() {
            *retry_after = response
                .headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
        }
    }
    error
}

/// Classify the `error` of one bulk result item, which has no status.
///
/// Any shape is accepted: an error body, a bare string or arbitrary JSON.
/// Without a recognizable code the item becomes [`Error::Unknown`] with
/// code `UNKNOWN_ERROR`.
pub(crate) fn classify_item(error: Value) -> Error {
    let raw = error.to_string();
    let body = match error {
        Value::String(message) => ErrorBody {
            message,
            ..ErrorBody::default()
        },
        other => ErrorEnvelope::deserialize(&other)
            .map(ErrorEnvelope::into_body)
            .unwrap_or_default(),
    };

    let code = non_empty_or(body.code, || codes::UNKNOWN_ERROR.to_string());
    let message = non_empty_or(body.message, || raw);
    from_parts(None, code, message, body.details)
}

fn non_empty_or(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.trim().is_empty() { fallback() } else { value }
}

fn from_parts(status: Option<u16>, code: String, message: String, details: Option<Details>) -> Error {
    match code.as_str() {
        codes::AUTHENTICATION_FAILED => Error::Authentication { message, details },
        codes::TEMPLATE_NOT_FOUND => Error::TemplateNotFound {
            template_key: detail_str(&details, "templateKey").unwrap_or_default(),
            message,
            details,
        },
        codes::INVALID_TEMPLATE_DATA => Error::InvalidTemplateData {
            validation_errors: detail_strings(&details, "validationErrors"),
            message,
            details,
        },
        codes::INVALID_RECIPIENT => Error::InvalidRecipient {
            recipient: detail_str(&details, "recipient"),
            message,
            details,
        },
        codes::PROVIDER_ERROR => Error::Provider {
            provider: detail_str(&details, "provider"),
            provider_code: detail_str(&details, "providerCode"),
            message,
            details,
        },
        codes::RATE_LIMIT_EXCEEDED => Error::RateLimit {
            retry_after: detail_seconds(&details, "retryAfter"),
            message,
            details,
        },
        codes::VALIDATION_FAILED => Error::Validation {
            field: detail_str(&details, "field"),
            message,
            details,
        },
        codes::INTERNAL_SERVER_ERROR | codes::SERVICE_UNAVAILABLE | codes::BAD_GATEWAY => {
            Error::Server {
                status,
                code,
                message,
                details,
            }
        }
        codes::TIMEOUT => Error::Timeout { message, details },
        codes::NETWORK_ERROR => Error::Network { message, details },
        _ => match status {
            Some(401) => Error::Authentication { message, details },
            Some(429) => Error::RateLimit {
                retry_after: detail_seconds(&details, "retryAfter"),
                message,
                details,
            },
            Some(s) if (500..600).contains(&s) => Error::Server {
                status,
                code,
                message,
                details,
            },
            _ => Error::Unknown {
                status,
                code,
                message,
                details,
            },
        },
    }
}

fn detail_str(details: &Option<Details>, key: &str) -> Option<String> {
    details
        .as_ref()
        .and_then(|d| d.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn detail_strings(details: &Option<Details>, key: &str) -> Vec<String> {
    details
        .as_ref()
        .and_then(|d| d.get(key))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn detail_seconds(details: &Option<Details>, key: &str) -> Option<Duration> {
    let value = details.as_ref().and_then(|d| d.get(key))?;
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Duration::try_from_secs_f64(secs).ok()
}
