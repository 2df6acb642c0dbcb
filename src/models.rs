//! Request and response models for the Huefy API.

use crate::error::{classify_item, codes};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// Email delivery services the API can dispatch through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ses,
    SendGrid,
    Mailgun,
    Mailchimp,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Ses,
        Provider::SendGrid,
        Provider::Mailgun,
        Provider::Mailchimp,
    ];

    /// Wire name of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ses => "ses",
            Provider::SendGrid => "sendgrid",
            Provider::Mailgun => "mailgun",
            Provider::Mailchimp => "mailchimp",
        }
    }
}

impl AsRef<str> for Provider {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::validation("provider", format!("invalid provider: {s}")))
    }
}

/// A validated request to send one templated email.
///
/// Built with [`SendEmailRequest::new`] or [`SendEmailRequest::builder`];
/// both reject invalid input before anything is sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    template_key: String,
    data: Map<String, Value>,
    recipient: String,
    #[serde(rename = "providerType", skip_serializing_if = "Option::is_none")]
    provider: Option<Provider>,
}

impl SendEmailRequest {
    /// Validate and build a request.
    ///
    /// `data` must be a JSON object; `provider`, when given, must be one of
    /// `ses`, `sendgrid`, `mailgun` or `mailchimp`.
    ///
    /// # Examples
    /// ```
    /// use huefy::SendEmailRequest;
    /// use serde_json::json;
    ///
    /// let request = SendEmailRequest::new(
    ///     "welcome-email",
    ///     json!({ "name": "John Doe", "company": "Acme Corp" }),
    ///     "john@example.com",
    ///     None,
    /// )?;
    /// assert_eq!(request.template_key(), "welcome-email");
    /// # Ok::<(), huefy::Error>(())
    /// ```
    pub fn new(
        template_key: impl Into<String>,
        data: Value,
        recipient: impl Into<String>,
        provider: Option<&str>,
    ) -> Result<Self> {
        let mut builder = Self::builder()
            .template_key(template_key)
            .data(data)
            .recipient(recipient);
        if let Some(provider) = provider {
            builder = builder.provider(provider);
        }
        builder.build()
    }

    pub fn builder() -> SendEmailRequestBuilder {
        SendEmailRequestBuilder::default()
    }

    pub fn template_key(&self) -> &str {
        &self.template_key
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn provider(&self) -> Option<Provider> {
        self.provider
    }
}

/// Builder for [`SendEmailRequest`]. Nothing is checked until [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct SendEmailRequestBuilder {
    template_key: String,
    data: Option<Value>,
    recipient: String,
    provider: Option<String>,
}

impl SendEmailRequestBuilder {
    pub fn template_key(mut self, template_key: impl Into<String>) -> Self {
        self.template_key = template_key.into();
        self
    }

    /// Template data; must be a JSON object.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }

    /// Provider by wire name or [`Provider`] value.
    pub fn provider(mut self, provider: impl AsRef<str>) -> Self {
        self.provider = Some(provider.as_ref().to_string());
        self
    }

    pub fn build(self) -> Result<SendEmailRequest> {
        if self.template_key.trim().is_empty() {
            return Err(Error::validation("templateKey", "templateKey is required"));
        }
        if self.recipient.trim().is_empty() {
            return Err(Error::validation("recipient", "recipient is required"));
        }
        if !EMAIL_RE.is_match(&self.recipient) {
            return Err(Error::validation(
                "recipient",
                format!("invalid email address: {}", self.recipient),
            ));
        }
        let data = match self.data {
            None | Some(Value::Null) => return Err(Error::validation("data", "data is required")),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(Error::validation("data", "data must be a JSON object")),
        };
        let provider = self.provider.as_deref().map(str::parse::<Provider>).transpose()?;

        Ok(SendEmailRequest {
            template_key: self.template_key,
            data,
            recipient: self.recipient,
            provider,
        })
    }
}

/// A non-empty batch of emails sent with one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkEmailRequest {
    emails: Vec<SendEmailRequest>,
}

impl BulkEmailRequest {
    /// Validate every item; the first failure is reported with its index.
    pub fn new(items: impl IntoIterator<Item = SendEmailRequestBuilder>) -> Result<Self> {
        let emails = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.build().map_err(|err| with_item_index(err, index)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_requests(emails)
    }

    /// Batch already-validated requests.
    pub fn from_requests(emails: Vec<SendEmailRequest>) -> Result<Self> {
        if emails.is_empty() {
            return Err(Error::Validation {
                field: Some("emails".to_string()),
                message: "emails cannot be empty".to_string(),
                details: None,
            });
        }
        Ok(Self { emails })
    }

    pub fn emails(&self) -> &[SendEmailRequest] {
        &self.emails
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    /// Never true for a constructed batch.
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

fn with_item_index(err: Error, index: usize) -> Error {
    match err {
        Error::Validation {
            field,
            message,
            details,
        } => {
            let mut details = details.unwrap_or_default();
            details.insert("index".to_string(), Value::from(index));
            Error::Validation {
                field,
                message: format!("validation failed for item {index}: {message}"),
                details: Some(details),
            }
        }
        other => other,
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendResult {
    pub message_id: String,
    pub provider: Provider,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailResponse {
    #[serde(default)]
    message: String,
    message_id: String,
    provider: Provider,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl SendEmailResponse {
    fn into_result(self) -> SendResult {
        SendResult {
            message_id: self.message_id,
            provider: self.provider,
            status: self.status.unwrap_or_else(|| "sent".to_string()),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            message: self.message,
        }
    }
}

/// Per-item outcomes of a bulk send, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkSendResult {
    items: Vec<Result<SendResult>>,
}

impl BulkSendResult {
    pub fn new(items: Vec<Result<SendResult>>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Result<SendResult>] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Result<SendResult>> {
        self.items
    }

    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_ok()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_err()).count()
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }
}

#[derive(Debug, Deserialize)]
struct BulkEmailResponse {
    results: Vec<BulkItemResponse>,
}

/// One entry of a bulk response. Payloads stay raw so that a malformed item
/// fails on its own instead of failing the whole batch.
#[derive(Debug, Deserialize)]
struct BulkItemResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkItemResponse {
    fn into_outcome(self, index: usize) -> Result<SendResult> {
        match (self.success, self.result, self.error) {
            (true, Some(result), _) => serde_json::from_value::<SendEmailResponse>(result)
                .map(SendEmailResponse::into_result)
                .map_err(|e| Error::decoding(&format!("bulk item {index} result"), e)),
            (_, _, Some(error)) => Err(classify_item(error)),
            (true, None, None) => Err(Error::Decoding {
                message: format!("bulk item {index} reported success without a result"),
            }),
            (false, _, None) => Err(Error::Unknown {
                status: None,
                code: codes::UNKNOWN_ERROR.to_string(),
                message: format!("bulk item {index} failed without an error body"),
                details: None,
            }),
        }
    }
}

/// API health as reported by `GET /health`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "deserialize_uptime")]
    pub uptime: Option<Duration>,
    #[serde(default)]
    pub providers: Option<BTreeMap<String, String>>,
}

fn deserialize_uptime<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
        .transpose()
}

/// Result of a template dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TemplateValidationResponse {
    valid: bool,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

/// Decode the body of a successful `POST /emails/send`.
pub fn decode_send_response(body: &str) -> Result<SendResult> {
    serde_json::from_str::<SendEmailResponse>(body)
        .map(SendEmailResponse::into_result)
        .map_err(|e| Error::decoding("send response", e))
}

/// Decode the body of a successful `POST /emails/bulk`.
///
/// Each item is classified on its own; a failed item never affects another.
pub fn decode_bulk_response(body: &str) -> Result<BulkSendResult> {
    let response: BulkEmailResponse =
        serde_json::from_str(body).map_err(|e| Error::decoding("bulk response", e))?;
    let items = response
        .results
        .into_iter()
        .enumerate()
        .map(|(index, item)| item.into_outcome(index))
        .collect();
    Ok(BulkSendResult::new(items))
}

/// Decode the body of a successful `GET /health`.
pub fn decode_health(body: &str) -> Result<HealthStatus> {
    serde_json::from_str(body).map_err(|e| Error::decoding("health response", e))
}

/// Decode the body of a successful `POST /templates/validate`.
pub fn decode_template_validation(body: &str) -> Result<TemplateValidation> {
    let response: TemplateValidationResponse =
        serde_json::from_str(body).map_err(|e| Error::decoding("template validation response", e))?;
    Ok(TemplateValidation {
        valid: response.valid,
        errors: response.errors.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> SendEmailRequestBuilder {
        SendEmailRequest::builder()
            .template_key("welcome-email")
            .data(json!({ "name": "John Doe", "company": "Acme Corp" }))
            .recipient("john@example.com")
    }

    fn field_of(err: &Error) -> Option<&str> {
        match err {
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    #[test]
    fn test_valid_request_serializes_to_wire_shape() {
        let request = valid().provider(Provider::SendGrid).build().unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "templateKey": "welcome-email",
                "data": { "name": "John Doe", "company": "Acme Corp" },
                "recipient": "john@example.com",
                "providerType": "sendgrid",
            })
        );

        let request = valid().build().unwrap();
        assert!(serde_json::to_value(&request).unwrap().get("providerType").is_none());
    }

    #[test]
    fn test_each_invalid_field_is_named() {
        let cases = [
            (valid().template_key(""), "templateKey", "templateKey is required"),
            (valid().recipient(""), "recipient", "recipient is required"),
            (
                valid().recipient("not-an-email"),
                "recipient",
                "invalid email address: not-an-email",
            ),
            (valid().recipient("john@example"), "recipient", "invalid email address"),
            (valid().data(Value::Null), "data", "data is required"),
            (valid().data(json!(["a", "b"])), "data", "data must be a JSON object"),
            (valid().provider("postmark"), "provider", "invalid provider: postmark"),
        ];

        for (builder, field, message) in cases {
            let err = builder.build().unwrap_err();
            assert_eq!(field_of(&err), Some(field), "{err}");
            assert!(err.message().contains(message), "{err}");
            assert!(!err.is_retryable());
        }

        let err = SendEmailRequest::builder()
            .template_key("welcome-email")
            .recipient("john@example.com")
            .build()
            .unwrap_err();
        assert_eq!(field_of(&err), Some("data"));
    }

    #[test]
    fn test_every_known_provider_is_accepted() {
        for name in ["ses", "sendgrid", "mailgun", "mailchimp"] {
            let request = SendEmailRequest::new(
                "welcome-email",
                json!({}),
                "john@example.com",
                Some(name),
            )
            .unwrap();
            assert_eq!(request.provider().map(|p| p.as_str()), Some(name));
        }

        for name in ["SES", "smtp", "", "send grid"] {
            assert!(name.parse::<Provider>().is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_bulk_rejects_empty() {
        let err = BulkEmailRequest::new(Vec::new()).unwrap_err();
        assert_eq!(err.message(), "emails cannot be empty");
    }

    #[test]
    fn test_bulk_reports_first_invalid_index() {
        let err = BulkEmailRequest::new([
            valid(),
            valid().recipient("invalid-email"),
            valid().template_key(""),
        ])
        .unwrap_err();

        assert_eq!(
            err.message(),
            "validation failed for item 1: invalid email address: invalid-email"
        );
        assert_eq!(err.details().and_then(|d| d.get("index")), Some(&json!(1)));
    }

    #[test]
    fn test_decode_send_response() {
        let result = decode_send_response(
            r#"{"success":true,"message":"ok","messageId":"msg-123","provider":"ses"}"#,
        )
        .unwrap();
        assert_eq!(result.message_id, "msg-123");
        assert_eq!(result.provider, Provider::Ses);
        assert_eq!(result.status, "sent");
        assert_eq!(result.message, "ok");

        let result = decode_send_response(
            r#"{"messageId":"msg-9","provider":"mailgun","status":"queued","timestamp":"2024-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(result.status, "queued");
        assert_eq!(result.timestamp.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_decode_send_response_shape_mismatch() {
        let err = decode_send_response(r#"{"success":true}"#).unwrap_err();
        assert!(matches!(err, Error::Decoding { .. }));
        assert!(!err.is_retryable());

        assert!(matches!(
            decode_send_response(r#"{"messageId":"m","provider":"pigeon"}"#),
            Err(Error::Decoding { .. })
        ));
    }

    #[test]
    fn test_decode_bulk_preserves_order_and_isolates_failures() {
        let body = json!({
            "results": [
                { "success": true, "result": { "messageId": "msg-0", "provider": "ses" } },
                { "success": false, "error": { "error": {
                    "code": "INVALID_RECIPIENT",
                    "message": "bounced",
                    "details": { "recipient": "bad@example.com" }
                } } },
                { "success": true, "result": { "messageId": "msg-2", "provider": "sendgrid" } },
                { "success": false, "error": { "code": "PROVIDER_ERROR", "message": "rejected",
                    "details": { "provider": "mailgun", "providerCode": "421" } } },
            ]
        })
        .to_string();

        let result = decode_bulk_response(&body).unwrap();
        assert_eq!(result.total(), 4);
        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failure_count(), 2);

        let items = result.items();
        assert_eq!(items[0].as_ref().unwrap().message_id, "msg-0");
        assert!(matches!(
            &items[1],
            Err(Error::InvalidRecipient { recipient: Some(r), .. }) if r == "bad@example.com"
        ));
        assert_eq!(items[2].as_ref().unwrap().message_id, "msg-2");
        assert!(matches!(
            &items[3],
            Err(Error::Provider { provider_code: Some(c), .. }) if c == "421"
        ));
    }

    #[test]
    fn test_decode_bulk_malformed_item_stays_isolated() {
        let body = json!({
            "results": [
                { "success": true, "result": { "messageId": "msg-0", "provider": "ses" } },
                { "success": false, "error": { "message": "recipient bounced" } },
                { "success": false, "error": "mailbox full" },
                { "success": true, "result": { "provider": "ses" } },
                { "success": true, "result": { "messageId": "msg-4", "provider": "mailgun" } },
            ]
        })
        .to_string();

        let result = decode_bulk_response(&body).unwrap();
        assert_eq!(result.total(), 5);
        assert_eq!(result.success_count(), 2);

        let items = result.items();
        assert_eq!(items[0].as_ref().unwrap().message_id, "msg-0");
        assert!(matches!(
            &items[1],
            Err(Error::Unknown { code, message, .. })
                if code == "UNKNOWN_ERROR" && message == "recipient bounced"
        ));
        assert!(matches!(
            &items[2],
            Err(Error::Unknown { message, .. }) if message == "mailbox full"
        ));
        assert!(matches!(&items[3], Err(Error::Decoding { .. })));
        assert_eq!(items[4].as_ref().unwrap().message_id, "msg-4");
    }

    #[test]
    fn test_decode_bulk_item_without_payload() {
        let body = r#"{"results":[{"success":true},{"success":false}]}"#;
        let result = decode_bulk_response(body).unwrap();
        assert!(matches!(result.items()[0], Err(Error::Decoding { .. })));
        assert!(matches!(result.items()[1], Err(Error::Unknown { .. })));
    }

    #[test]
    fn test_decode_health() {
        let health = decode_health(
            r#"{"status":"healthy","timestamp":"2024-05-01T12:00:00Z","version":"1.0.0","uptime":3600.5,"providers":{"ses":"up","sendgrid":"degraded"}}"#,
        )
        .unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.version.as_deref(), Some("1.0.0"));
        assert_eq!(health.uptime, Some(Duration::from_millis(3_600_500)));
        assert_eq!(
            health.providers.unwrap().get("sendgrid").map(String::as_str),
            Some("degraded")
        );

        let health = decode_health(r#"{"status":"ok","timestamp":"2024-05-01T12:00:00Z"}"#).unwrap();
        assert_eq!(health.uptime, None);
        assert_eq!(health.providers, None);

        assert!(matches!(
            decode_health(r#"{"status":"ok","timestamp":"2024-05-01T12:00:00Z","uptime":-1}"#),
            Err(Error::Decoding { .. })
        ));
    }

    #[test]
    fn test_decode_template_validation() {
        let validation = decode_template_validation(r#"{"valid":true}"#).unwrap();
        assert!(validation.valid);
        assert!(validation.errors.is_empty());

        let validation =
            decode_template_validation(r#"{"valid":false,"errors":["missing variable: name"]}"#).unwrap();
        assert!(!validation.valid);
        assert_eq!(validation.errors, vec!["missing variable: name"]);
    }
}
