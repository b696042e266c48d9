//! # Waterfall Orchestration
//!
//! Client-side driver for the four-phase pipeline.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Architect → Reasoner → Executor → Reviewer
//!                           ▲          │
//!                           └─ retry ──┘
//! ```
//!
//! - `decoder` - splits the streamed body into event frames
//! - `machine` - pure phase transitions
//! - `controller` - the single active run, gate/resume, cancellation
//! - `step` - manual single-phase runs
//! - `transport` - HTTP endpoints behind a trait

pub mod controller;
pub mod decoder;
pub mod error;
pub mod events;
pub mod machine;
pub mod phase;
pub mod step;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::WaterfallController;
pub use decoder::FrameDecoder;
pub use error::{
    FrameParseError, RunOutcome, StepOutcome, TransitionRejected, WaterfallError,
    CANCELLED_BY_USER,
};
pub use events::{FinalPayload, StreamEvent, WirePhase};
pub use machine::{can_transition, map_phase_to_step, transition};
pub use phase::{Phase, PhaseSlots, PhaseState, PhaseStatus, PipelineState};
pub use step::step_context;
pub use transport::{
    FileRef, HttpTransport, StepRequest, WaterfallRequest, WaterfallTransport, WorkspaceContext,
};
