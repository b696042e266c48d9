//! # Phase State Machine
//!
//! Pure transition layer for the waterfall pipeline.
//!
//! ```text
//! start → architect → reasoner → executor → reviewer
//!                                    ▲          │
//!                                    └─ retry ──┘
//! ```
//!
//! Every function takes the current [`PipelineState`] by reference and returns
//! the next one. Nothing here performs I/O; rejected transitions are logged and
//! leave the state untouched.

use serde_json::{json, Value};

use super::error::TransitionRejected;
use super::events::{FinalPayload, WirePhase};
use super::phase::{Phase, PhaseState, PhaseStatus, PipelineState};

/// Placeholder recorded on the executor while it reworks a rejected result
pub const REFINING_MESSAGE: &str = "Refining code based on reviewer feedback...";

/// Reviewer feedback used when a `retrying` frame carries none
pub const DEFAULT_RETRY_FEEDBACK: &str = "Reviewer requested changes";

/// Gate reason used when a `gated` frame carries none
pub const DEFAULT_GATE_REASON: &str = "Awaiting confirmation to proceed";

/// Whether the pipeline may move from `current` to `next`
pub fn can_transition(current: Option<Phase>, next: Phase) -> bool {
    match current {
        None => next == Phase::Architect,
        Some(current) if current == next => true,
        // retry loop
        Some(Phase::Reviewer) if next == Phase::Executor => true,
        Some(current) => current.next() == Some(next),
    }
}

/// [`can_transition`] with a typed rejection
pub fn validate_transition(current: Option<Phase>, next: Phase) -> Result<(), TransitionRejected> {
    if can_transition(current, next) {
        Ok(())
    } else {
        Err(TransitionRejected {
            from: current,
            to: next,
        })
    }
}

/// Map a wire tag onto the phase it reports progress for
pub fn map_phase_to_step(wire_phase: &str) -> Option<Phase> {
    WirePhase::parse(wire_phase).and_then(WirePhase::step)
}

/// Compute the state that follows `state` after a progress frame.
///
/// Handles the four phase tags and `retrying`. Other tags, including the
/// control signals the controller dispatches itself, return the state as is.
pub fn transition(state: &PipelineState, wire_phase: &str, payload: &Value) -> PipelineState {
    if wire_phase == WirePhase::Retrying.as_str() {
        return apply_retry(state, payload);
    }

    let Some(next) = map_phase_to_step(wire_phase) else {
        return state.clone();
    };

    if let Err(rejected) = validate_transition(state.current_phase, next) {
        tracing::warn!(wire_phase, error = %rejected, "Ignoring out-of-order phase event");
        return state.clone();
    }

    let mut updated = state.clone();
    if let Some(previous) = next.previous() {
        let slot = &mut updated.phases[previous];
        if !slot.is_completed() {
            slot.status = PhaseStatus::Completed;
            slot.error = None;
        }
    }
    updated.current_phase = Some(next);
    updated.phases[next] = PhaseState::processing(as_data(payload));
    updated
}

/// Reviewer rejected the result: re-arm the executor without rerunning
/// the earlier phases.
fn apply_retry(state: &PipelineState, payload: &Value) -> PipelineState {
    let feedback = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_RETRY_FEEDBACK);

    let mut updated = state.clone();
    updated.current_phase = Some(Phase::Executor);

    let reviewer = &mut updated.phases.reviewer;
    reviewer.status = PhaseStatus::Error;
    reviewer.error = Some(feedback.to_string());

    updated.phases.executor = PhaseState::processing(Some(json!({ "message": REFINING_MESSAGE })));
    updated
}

/// Hold the current phase at a gate.
///
/// Partial data stays in place; the estimate preview is added under
/// `estimate` when the phase data is an object (or empty).
pub fn apply_gate(
    state: &PipelineState,
    message: Option<&str>,
    estimate: Option<&Value>,
) -> PipelineState {
    let target = state.current_phase.unwrap_or(Phase::Architect);
    let mut updated = state.clone();
    let slot = &mut updated.phases[target];

    slot.status = PhaseStatus::Paused;
    slot.error = Some(message.unwrap_or(DEFAULT_GATE_REASON).to_string());

    if let Some(estimate) = estimate {
        match &mut slot.data {
            Some(Value::Object(fields)) => {
                fields.insert("estimate".to_string(), estimate.clone());
            }
            None | Some(Value::Null) => {
                slot.data = Some(json!({ "estimate": estimate }));
            }
            Some(_) => {
                tracing::debug!(phase = %target, "Gate estimate not merged into non-object data");
            }
        }
    }
    updated
}

/// Terminal success: every phase completed with its final payload
pub fn apply_final(state: &PipelineState, payload: &FinalPayload) -> PipelineState {
    let mut updated = state.clone();
    for phase in Phase::ALL {
        updated.phases[phase] = PhaseState::completed(payload.get(phase).cloned());
    }
    updated.current_phase = Some(Phase::Reviewer);
    updated
}

/// Mark the current phase failed, leaving every other phase as it was
pub fn apply_failure(state: &PipelineState, message: &str) -> PipelineState {
    let target = state.current_phase.unwrap_or(Phase::Architect);
    let mut updated = state.clone();
    let slot = &mut updated.phases[target];
    slot.status = PhaseStatus::Error;
    slot.error = Some(message.to_string());
    updated
}

fn as_data(payload: &Value) -> Option<Value> {
    match payload {
        Value::Null => None,
        other => Some(other.clone()),
    }
}
