//! # Replay API
//!
//! A stand-in waterfall server that streams a scripted run.
//!
//! The script is a JSONL file: one frame object per line, blank lines and
//! `#` comments ignored. A fresh request streams from the top until the first
//! `gated` frame (inclusive) and then closes; a `forceProceed` request picks up
//! after the last gate that was sent.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;

/// Frames to replay, in order
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayScript {
    pub frames: Vec<Value>,
}

impl ReplayScript {
    pub fn parse(source: &str) -> Result<Self> {
        let mut frames = Vec::new();
        for (index, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let frame: Value = serde_json::from_str(line)
                .with_context(|| format!("Invalid frame on line {}", index + 1))?;
            if frame.get("phase").and_then(Value::as_str).is_none() {
                anyhow::bail!("Frame on line {} has no phase", index + 1);
            }
            frames.push(frame);
        }
        Ok(Self { frames })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let source = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read script: {:?}", path))?;
        Self::parse(&source)
    }

    /// Frames for the next response, and where the one after should start
    fn segment(&self, start: usize) -> (Vec<Value>, usize) {
        let start = start.min(self.frames.len());
        let end = self.frames[start..]
            .iter()
            .position(is_gate)
            .map(|offset| start + offset + 1)
            .unwrap_or(self.frames.len());
        (self.frames[start..end].to_vec(), end)
    }
}

fn is_gate(frame: &Value) -> bool {
    frame.get("phase").and_then(Value::as_str) == Some("gated")
}

/// Shared replay state
#[derive(Clone)]
pub struct ReplayState {
    script: Arc<ReplayScript>,
    /// Index of the first frame after the last gate sent
    resume_at: Arc<Mutex<usize>>,
    delay: Duration,
}

impl ReplayState {
    pub fn new(script: ReplayScript, delay: Duration) -> Self {
        Self {
            script: Arc::new(script),
            resume_at: Arc::new(Mutex::new(0)),
            delay,
        }
    }

    fn take_segment(&self, force_proceed: bool) -> Vec<Value> {
        let mut resume_at = self.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
        let start = if force_proceed { *resume_at } else { 0 };
        let (frames, next) = self.script.segment(start);
        *resume_at = next;
        frames
    }
}

/// Subset of the waterfall request the replay cares about
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayRequest {
    prompt: String,
    #[serde(default)]
    force_proceed: bool,
}

#[derive(Debug, Deserialize)]
struct StepRequest {
    step: String,
    input: Value,
    #[serde(default)]
    context: Option<Value>,
}

pub fn replay_routes() -> Router<ReplayState> {
    Router::new()
        .route("/waterfall", post(stream_run))
        .route("/waterfall/step", post(echo_step))
}

/// Stream the next scripted segment as SSE frames
async fn stream_run(
    State(state): State<ReplayState>,
    Json(req): Json<ReplayRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames = state.take_segment(req.force_proceed);
    tracing::info!(
        prompt = %req.prompt.chars().take(50).collect::<String>(),
        force_proceed = req.force_proceed,
        frames = frames.len(),
        "Replaying waterfall segment"
    );

    let stream = tokio_stream::iter(frames)
        .map(|frame| Ok(Event::default().data(frame.to_string())))
        .throttle(state.delay);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Echo the step request back as its own result
async fn echo_step(Json(req): Json<StepRequest>) -> Json<Value> {
    tracing::info!(step = %req.step, "Replaying waterfall step");
    Json(json!({
        "step": req.step,
        "input": req.input,
        "context": req.context,
        "replayed": true
    }))
}

/// Serve the replay API until the process exits
pub async fn serve(listener: TcpListener, state: ReplayState) -> Result<()> {
    let app = replay_routes().with_state(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Bind on localhost and serve
pub async fn run_replay_server(script: ReplayScript, port: u16, delay: Duration) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    println!("🔁 Waterfall replay server running at http://{}", addr);
    println!("   Frames: {}", script.frames.len());
    serve(listener, ReplayState::new(script, delay)).await
}
