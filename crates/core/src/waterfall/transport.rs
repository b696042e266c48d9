//! # Waterfall Transport
//!
//! The seam between the controller and the waterfall server.
//!
//! [`HttpTransport`] talks to the real endpoints over reqwest; tests plug in
//! scripted transports through the same [`WaterfallTransport`] trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;

use super::error::WaterfallError;
use super::phase::Phase;
use crate::config::ClientConfig;
use crate::models::LlmProvider;

/// Raw response body of the streaming endpoint
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, WaterfallError>> + Send>>;

/// A file the user has open in the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Optional workspace context attached to streaming requests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceContext {
    pub notepad_content: Option<String>,
    pub open_files: Vec<FileRef>,
}

/// Body of `POST /waterfall`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallRequest {
    pub prompt: String,
    pub provider: LlmProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notepad_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub open_files: Vec<FileRef>,
    pub force_proceed: bool,
}

/// Body of `POST /waterfall/step`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRequest {
    pub step: Phase,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Access to the waterfall endpoints
#[async_trait]
pub trait WaterfallTransport: Send + Sync + 'static {
    /// Start a streaming run and return its body
    async fn open_stream(&self, request: &WaterfallRequest) -> Result<ByteStream, WaterfallError>;

    /// Run a single phase and return its payload
    async fn run_step(&self, request: &StepRequest) -> Result<Value, WaterfallError>;
}

#[async_trait]
impl<T: WaterfallTransport> WaterfallTransport for std::sync::Arc<T> {
    async fn open_stream(&self, request: &WaterfallRequest) -> Result<ByteStream, WaterfallError> {
        (**self).open_stream(request).await
    }

    async fn run_step(&self, request: &StepRequest) -> Result<Value, WaterfallError> {
        (**self).run_step(request).await
    }
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    step_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, WaterfallError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            step_timeout: config.step_timeout(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl WaterfallTransport for HttpTransport {
    async fn open_stream(&self, request: &WaterfallRequest) -> Result<ByteStream, WaterfallError> {
        let response = self
            .client
            .post(self.endpoint("/waterfall"))
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| WaterfallError::Transport(e.to_string())));
        Ok(Box::pin(body))
    }

    async fn run_step(&self, request: &StepRequest) -> Result<Value, WaterfallError> {
        let response = self
            .client
            .post(self.endpoint("/waterfall/step"))
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.step_timeout)
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json::<Value>().await?)
    }
}

/// Turn a non-2xx response into an error, preferring the server's own
/// `error` message when the body carries one.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, WaterfallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let server_message = serde_json::from_str::<Value>(&body).ok().and_then(|v| {
        v.get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match server_message {
        Some(message) => Err(WaterfallError::Server(message)),
        None => Err(WaterfallError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}
