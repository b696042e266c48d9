//! # Waterfall Errors
//!
//! Error taxonomy and typed run outcomes.
//!
//! Only transport- and server-declared failures reach user-visible state.
//! Rejected transitions and malformed frames are recovered where they occur.

use serde_json::Value;
use thiserror::Error;

use super::events::FinalPayload;
use super::phase::Phase;

/// Message recorded on the current phase when the user cancels a run
pub const CANCELLED_BY_USER: &str = "Cancelled by user.";

/// A requested phase jump that the state machine refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal phase transition {} -> {to}", from.map(|p| p.as_str()).unwrap_or("start"))]
pub struct TransitionRejected {
    pub from: Option<Phase>,
    pub to: Phase,
}

/// A single event line that could not be decoded
#[derive(Debug, Error)]
pub enum FrameParseError {
    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no string `phase` field")]
    MissingPhase,
}

/// Failures that surface on the pipeline state
#[derive(Debug, Error)]
pub enum WaterfallError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    /// The server sent an `error` frame
    #[error("{0}")]
    Server(String),
    #[error("stream failed: {0}")]
    Transport(String),
    #[error("run was cancelled")]
    Cancelled,
    #[error("no prompt to resume")]
    MissingPrompt,
}

/// How a streaming run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The server sent `final`
    Completed(FinalPayload),
    /// The stream closed while a phase was held at a gate
    Paused { phase: Phase, reason: String },
    /// The stream closed without a terminal signal
    Incomplete,
    Failed(String),
    /// Cancelled by this controller; never recorded as a fault
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// How a single manual step ended
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(Value),
    Failed(String),
    Cancelled,
}
