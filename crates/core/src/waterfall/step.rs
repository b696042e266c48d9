//! # Step Runner
//!
//! Manual, one-phase-at-a-time execution against the non-streaming step
//! endpoint. Shares the controller's state slots and single-flight handle.
//!
//! Phase order is advisory here: an out-of-order step is logged and run
//! anyway so an operator can redo or skip a phase by hand.

use serde_json::Value;

use super::controller::WaterfallController;
use super::error::{StepOutcome, WaterfallError, CANCELLED_BY_USER};
use super::machine;
use super::phase::{Phase, PhaseState, PhaseStatus, PipelineState};
use super::transport::{StepRequest, WaterfallTransport};

/// Data handed to a manual step as context.
///
/// The reviewer audits the reasoner's plan rather than the executor's code.
pub fn step_context(state: &PipelineState, step: Phase) -> Option<Value> {
    let source = match step {
        Phase::Architect => return None,
        Phase::Reasoner => Phase::Architect,
        Phase::Executor | Phase::Reviewer => Phase::Reasoner,
    };
    state.phases[source].data.clone()
}

impl<T: WaterfallTransport> WaterfallController<T> {
    /// Run exactly one phase and record its result
    #[tracing::instrument(skip(self, input), fields(step = %step))]
    pub async fn run_waterfall_step(&self, step: Phase, input: Value) -> StepOutcome {
        let guard = self.begin_run();
        let token = guard.token.clone();
        let superseded = guard.superseded;

        let snapshot = self.snapshot();
        if let Err(rejected) = machine::validate_transition(snapshot.current_phase, step) {
            tracing::warn!(error = %rejected, "Manual step out of order, running anyway");
        }
        let context = step_context(&snapshot, step);

        self.apply(&token, |state| {
            // A run cut short by this step ends the same way a user cancel does
            let interrupted = superseded
                && state
                    .current()
                    .is_some_and(|slot| slot.status == PhaseStatus::Processing);
            let mut next = if interrupted {
                machine::apply_failure(state, CANCELLED_BY_USER)
            } else {
                state.clone()
            };
            next.current_phase = Some(step);
            next.phases[step] = PhaseState::processing(state.phases[step].data.clone());
            next
        });

        let request = StepRequest {
            step,
            input,
            context,
        };
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(WaterfallError::Cancelled),
            result = self.transport().run_step(&request) => result,
        };
        if token.is_cancelled() {
            return StepOutcome::Cancelled;
        }

        match result {
            Ok(payload) => {
                self.apply(&token, |state| {
                    let mut next = state.clone();
                    next.phases[step] = PhaseState::completed(Some(payload.clone()));
                    next
                });
                tracing::info!("Manual step completed");
                StepOutcome::Completed(payload)
            }
            Err(WaterfallError::Cancelled) => StepOutcome::Cancelled,
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(error = %message, "Manual step failed");
                self.apply(&token, |state| {
                    let mut next = state.clone();
                    let slot = &mut next.phases[step];
                    slot.status = PhaseStatus::Error;
                    slot.error = Some(message.clone());
                    next
                });
                StepOutcome::Failed(message)
            }
        }
    }
}
