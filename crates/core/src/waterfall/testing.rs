//! Scripted transport for controller tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::error::WaterfallError;
use super::transport::{ByteStream, StepRequest, WaterfallRequest, WaterfallTransport};

pub(crate) type ChunkSender = mpsc::UnboundedSender<Result<Bytes, WaterfallError>>;

/// Format one frame the way the server writes it
pub(crate) fn frame(value: Value) -> String {
    format!("data: {}\n\n", value)
}

/// Hands out queued responses in order. An empty step queue never answers.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    streams: Mutex<VecDeque<Result<ByteStream, WaterfallError>>>,
    steps: Mutex<VecDeque<Result<Value, WaterfallError>>>,
    pub(crate) requests: Mutex<Vec<WaterfallRequest>>,
    pub(crate) step_requests: Mutex<Vec<StepRequest>>,
}

impl ScriptedTransport {
    /// Queue a body made of `chunks` that closes after the last one
    pub(crate) fn push_chunks(&self, chunks: &[&str]) {
        let (tx, rx) = mpsc::unbounded();
        for chunk in chunks {
            tx.unbounded_send(Ok(Bytes::from(chunk.to_string())))
                .expect("receiver is alive");
        }
        drop(tx);
        self.streams.lock().unwrap().push_back(Ok(Box::pin(rx)));
    }

    /// Queue a body delivered as a single chunk
    pub(crate) fn push_body(&self, body: &str) {
        self.push_chunks(&[body]);
    }

    /// Queue a body that stays open until the returned sender is dropped
    pub(crate) fn push_open(&self) -> ChunkSender {
        let (tx, rx) = mpsc::unbounded();
        self.streams.lock().unwrap().push_back(Ok(Box::pin(rx)));
        tx
    }

    /// Queue a failure to open the stream
    pub(crate) fn push_open_error(&self, error: WaterfallError) {
        self.streams.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn push_step(&self, result: Result<Value, WaterfallError>) {
        self.steps.lock().unwrap().push_back(result);
    }

    pub(crate) fn requests(&self) -> Vec<WaterfallRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn step_requests(&self) -> Vec<StepRequest> {
        self.step_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WaterfallTransport for ScriptedTransport {
    async fn open_stream(&self, request: &WaterfallRequest) -> Result<ByteStream, WaterfallError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.streams.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(WaterfallError::Transport("no scripted response".into())))
    }

    async fn run_step(&self, request: &StepRequest) -> Result<Value, WaterfallError> {
        self.step_requests.lock().unwrap().push(request.clone());
        let next = self.steps.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => futures::future::pending().await,
        }
    }
}

/// Send one frame on an open body
pub(crate) fn send(tx: &ChunkSender, value: Value) {
    let _ = tx.unbounded_send(Ok(Bytes::from(frame(value))));
}
