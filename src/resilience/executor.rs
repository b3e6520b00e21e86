//! Outbound call execution.
//!
//! # Responsibilities
//! - Describe a single outbound request (method, target, timeout)
//! - Perform it and hand back a payload or an error
//!
//! The circuit breaker is generic over [`OutboundExecutor`], so tests can
//! script outcomes without a network and production code uses reqwest.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Description of one outbound call.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Deadline for the whole call. Overwritten by the circuit breaker.
    pub timeout: Option<Duration>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Key used for failure tracking, e.g. `GET:https://host/path`.
    pub fn endpoint_key(&self) -> String {
        format!("{}:{}", self.method, self.url)
    }
}

/// Something that can perform an [`OutboundRequest`].
pub trait OutboundExecutor: Send + Sync {
    /// Payload produced by a successful call.
    type Output: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    fn execute(
        &self,
        request: OutboundRequest,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

impl<E: OutboundExecutor> OutboundExecutor for Arc<E> {
    type Output = E::Output;
    type Error = E::Error;

    fn execute(
        &self,
        request: OutboundRequest,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send {
        (**self).execute(request)
    }
}

/// Errors produced by [`ReqwestExecutor`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Connection, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with a non-2xx status.
    #[error("upstream returned {0}")]
    Status(StatusCode),
}

/// Executes requests over HTTP with a shared reqwest client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl OutboundExecutor for ReqwestExecutor {
    type Output = Value;
    type Error = ExecutorError;

    async fn execute(&self, request: OutboundRequest) -> Result<Value, ExecutorError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExecutorError::Status(status));
        }

        let text = response.text().await?;
        Ok(decode_payload(&text))
    }
}

/// JSON bodies are parsed; anything else is returned as a JSON string.
fn decode_payload(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}
