//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use huefy::{Error, RawResponse, Result, Transport};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One request seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// In-memory transport that replays a fixed list of outcomes and counts calls.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RawResponse>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Result<RawResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(Recorded {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(Error::Network {
                message: "script exhausted".to_string(),
                details: None,
            })
        })
    }
}

pub fn sent(message_id: &str) -> Result<RawResponse> {
    Ok(RawResponse::new(
        200,
        json!({
            "success": true,
            "message": "Email sent",
            "messageId": message_id,
            "provider": "ses",
        })
        .to_string(),
    ))
}

pub fn api_error(status: u16, code: &str, message: &str) -> Result<RawResponse> {
    Ok(RawResponse::new(
        status,
        json!({ "error": { "code": code, "message": message } }).to_string(),
    ))
}

pub fn welcome_request() -> huefy::SendEmailRequest {
    huefy::SendEmailRequest::new(
        "welcome-email",
        json!({ "name": "John Doe", "company": "Acme Corp" }),
        "john@example.com",
        None,
    )
    .unwrap()
}
