//! # Pipeline Controller
//!
//! Owns the one active waterfall run for a session.
//!
//! ```text
//! run_full_waterfall ──▶ transport.open_stream ──▶ FrameDecoder ──▶ dispatch
//!        ▲                                                            │
//!        │ proceed_with_waterfall (force_proceed)       machine::* ◀──┘
//!        │                                                  │
//! cancel_waterfall ── CancellationToken              watch::Sender<PipelineState>
//! ```
//!
//! Single-flight: starting a run (or a manual step) cancels the token of
//! whatever was running before. Every state update happens inside the watch
//! channel's write lock and is dropped if the run's token was cancelled, so a
//! cancelled stream can never touch the state again.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::decoder::{DecodedFrame, FrameDecoder};
use super::error::{RunOutcome, WaterfallError, CANCELLED_BY_USER};
use super::events::{FinalPayload, StreamEvent};
use super::machine;
use super::phase::{Phase, PhaseStatus, PipelineState};
use super::transport::{HttpTransport, WaterfallRequest, WaterfallTransport, WorkspaceContext};
use crate::config::ClientConfig;
use crate::models::LlmProvider;

/// The run currently allowed to mutate state
struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

/// Ownership of the active slot for one run.
///
/// Dropping it releases the slot (and invalidates the token) unless a newer
/// run or a cancel already took it.
pub(super) struct RunGuard<'a> {
    slot: &'a Mutex<Option<ActiveRun>>,
    run_id: Uuid,
    pub(super) token: CancellationToken,
    /// Whether claiming the slot cancelled another run
    pub(super) superseded: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|run| run.run_id == self.run_id) {
            if let Some(run) = slot.take() {
                run.cancel.cancel();
                let elapsed = Utc::now() - run.started_at;
                tracing::debug!(
                    run_id = %run.run_id,
                    elapsed_ms = elapsed.num_milliseconds(),
                    "Waterfall run released"
                );
            }
        }
    }
}

/// Client-side controller for the staged pipeline
pub struct WaterfallController<T: WaterfallTransport> {
    transport: T,
    provider: LlmProvider,
    context: Mutex<WorkspaceContext>,
    state: watch::Sender<PipelineState>,
    active: Mutex<Option<ActiveRun>>,
}

impl WaterfallController<HttpTransport> {
    /// Controller talking HTTP to the configured server
    pub fn from_config(config: &ClientConfig) -> Result<Self, WaterfallError> {
        Ok(Self::new(HttpTransport::new(config)?, config.provider))
    }
}

impl<T: WaterfallTransport> WaterfallController<T> {
    /// Create a controller with an empty pipeline state
    pub fn new(transport: T, provider: LlmProvider) -> Self {
        let (state, _) = watch::channel(PipelineState::default());
        Self {
            transport,
            provider,
            context: Mutex::new(WorkspaceContext::default()),
            state,
            active: Mutex::new(None),
        }
    }

    /// Attach workspace context to every request
    pub fn with_context(self, context: WorkspaceContext) -> Self {
        self.set_context(context);
        self
    }

    /// Replace the workspace context used by subsequent runs
    pub fn set_context(&self, context: WorkspaceContext) {
        *self.context.lock().unwrap_or_else(PoisonError::into_inner) = context;
    }

    pub(super) fn transport(&self) -> &T {
        &self.transport
    }

    /// Receive every published state
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Whether a run or step currently owns the state
    pub fn is_running(&self) -> bool {
        self.lock_active().is_some()
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the active slot, cancelling whatever held it
    pub(super) fn begin_run(&self) -> RunGuard<'_> {
        let run = ActiveRun {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
        };
        let run_id = run.run_id;
        let token = run.cancel.clone();

        let previous = self.lock_active().replace(run);
        let superseded = previous.is_some();
        if let Some(previous) = previous {
            tracing::info!(run_id = %previous.run_id, "Superseding in-flight waterfall run");
            previous.cancel.cancel();
        }
        RunGuard {
            slot: &self.active,
            run_id,
            token,
            superseded,
        }
    }

    /// Apply an update unless the run has been cancelled. Returns whether
    /// the state changed.
    pub(super) fn apply<F>(&self, token: &CancellationToken, update: F) -> bool
    where
        F: FnOnce(&PipelineState) -> PipelineState,
    {
        self.state.send_if_modified(|state| {
            if token.is_cancelled() {
                return false;
            }
            let next = update(state);
            if next == *state {
                return false;
            }
            *state = next;
            true
        })
    }

    /// Run all four phases against the streaming endpoint.
    ///
    /// With `force_proceed` the existing phase data is kept and the server is
    /// asked to continue past a gate; otherwise the state starts over.
    #[tracing::instrument(
        skip(self, prompt),
        fields(prompt_preview = %prompt.chars().take(50).collect::<String>())
    )]
    pub async fn run_full_waterfall(&self, prompt: &str, force_proceed: bool) -> RunOutcome {
        let guard = self.begin_run();
        let token = guard.token.clone();
        tracing::info!(run_id = %guard.run_id, force_proceed, "Waterfall run started");

        if force_proceed {
            self.apply(&token, |state| PipelineState {
                prompt: prompt.to_string(),
                ..state.clone()
            });
        } else {
            self.apply(&token, |_| PipelineState::seeded(prompt));
        }

        let request = self.build_request(prompt, force_proceed);
        let result = self.drive(&token, &request).await;
        if token.is_cancelled() {
            tracing::info!(run_id = %guard.run_id, "Waterfall run cancelled");
            return RunOutcome::Cancelled;
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(WaterfallError::Cancelled) => RunOutcome::Cancelled,
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(error = %message, "Waterfall run failed");
                self.apply(&token, |state| machine::apply_failure(state, &message));
                RunOutcome::Failed(message)
            }
        };
        tracing::info!(
            run_id = %guard.run_id,
            outcome = outcome_label(&outcome),
            "Waterfall run finished"
        );
        outcome
    }

    /// Continue a gated run without discarding accumulated phase data
    pub async fn proceed_with_waterfall(&self) -> RunOutcome {
        let prompt = self.state.borrow().prompt.clone();
        if prompt.is_empty() {
            tracing::warn!("Proceed requested with no prompt in state");
            return RunOutcome::Failed(WaterfallError::MissingPrompt.to_string());
        }
        self.run_full_waterfall(&prompt, true).await
    }

    /// Stop the in-flight run or step.
    ///
    /// Marks the current phase as cancelled by the user and returns whether
    /// anything was running.
    pub fn cancel_waterfall(&self) -> bool {
        let Some(run) = self.lock_active().take() else {
            return false;
        };
        run.cancel.cancel();
        tracing::info!(run_id = %run.run_id, "Waterfall cancelled by user");

        self.state.send_if_modified(|state| {
            if state.current_phase.is_none() {
                return false;
            }
            *state = machine::apply_failure(state, CANCELLED_BY_USER);
            true
        });
        true
    }

    /// Drop any run and return to the empty state
    pub fn reset(&self) {
        if let Some(run) = self.lock_active().take() {
            run.cancel.cancel();
        }
        self.state.send_replace(PipelineState::default());
    }

    fn build_request(&self, prompt: &str, force_proceed: bool) -> WaterfallRequest {
        let context = self
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        WaterfallRequest {
            prompt: prompt.to_string(),
            provider: self.provider,
            notepad_content: context.notepad_content,
            open_files: context.open_files,
            force_proceed,
        }
    }

    /// Open the stream and feed it through the decoder and state machine
    async fn drive(
        &self,
        token: &CancellationToken,
        request: &WaterfallRequest,
    ) -> Result<RunOutcome, WaterfallError> {
        let mut body = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(WaterfallError::Cancelled),
            body = self.transport.open_stream(request) => body?,
        };

        let mut decoder = FrameDecoder::new();
        // Gate seen on this stream and not yet overtaken by a later frame
        let mut gate: Option<(Phase, String)> = None;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(WaterfallError::Cancelled),
                chunk = body.next() => chunk,
            };
            let (frames, ended) = match chunk {
                Some(chunk) => (decoder.push(&chunk?), false),
                None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for frame in frames {
                if let Some(payload) = self.dispatch(token, frame, &mut gate)? {
                    return Ok(RunOutcome::Completed(payload));
                }
            }
            if ended {
                break;
            }
        }

        let still_paused =
            |phase: Phase| self.state.borrow().phases[phase].status == PhaseStatus::Paused;
        Ok(match gate {
            Some((phase, reason)) if still_paused(phase) => RunOutcome::Paused { phase, reason },
            _ => RunOutcome::Incomplete,
        })
    }

    /// Apply one decoded frame. Returns the final payload once the server
    /// reports success.
    fn dispatch(
        &self,
        token: &CancellationToken,
        frame: DecodedFrame,
        gate: &mut Option<(Phase, String)>,
    ) -> Result<Option<FinalPayload>, WaterfallError> {
        if token.is_cancelled() {
            return Err(WaterfallError::Cancelled);
        }

        let event = match frame {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed waterfall frame");
                return Ok(None);
            }
        };
        tracing::debug!(wire_phase = event.wire_phase(), "Waterfall event");

        match event {
            StreamEvent::Gated {
                message, estimate, ..
            } => {
                let phase = self.state.borrow().current_phase.unwrap_or(Phase::Architect);
                let reason = message
                    .clone()
                    .unwrap_or_else(|| machine::DEFAULT_GATE_REASON.to_string());
                tracing::info!(%phase, %reason, "Waterfall gated");
                self.apply(token, |state| {
                    machine::apply_gate(state, message.as_deref(), estimate.as_ref())
                });
                *gate = Some((phase, reason));
            }
            StreamEvent::Final(payload) => {
                self.apply(token, |state| machine::apply_final(state, &payload));
                return Ok(Some(payload));
            }
            StreamEvent::Error { message } => {
                return Err(WaterfallError::Server(message));
            }
            other => {
                let wire_phase = other.wire_phase().to_string();
                let payload = other.payload();
                let changed = self.apply(token, |state| {
                    machine::transition(state, &wire_phase, &payload)
                });
                if changed {
                    *gate = None;
                }
            }
        }
        Ok(None)
    }
}

fn outcome_label(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed(_) => "completed",
        RunOutcome::Paused { .. } => "paused",
        RunOutcome::Incomplete => "incomplete",
        RunOutcome::Failed(_) => "failed",
        RunOutcome::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waterfall::phase::{PhaseState, PhaseStatus};
    use crate::waterfall::testing::{frame, send, ScriptedTransport};
    use crate::waterfall::transport::FileRef;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    type TestController = WaterfallController<Arc<ScriptedTransport>>;

    fn controller() -> (Arc<ScriptedTransport>, Arc<TestController>) {
        let transport = Arc::new(ScriptedTransport::default());
        let controller = Arc::new(WaterfallController::new(
            Arc::clone(&transport),
            LlmProvider::Anthropic,
        ));
        (transport, controller)
    }

    async fn wait_until<F>(rx: &mut watch::Receiver<PipelineState>, predicate: F)
    where
        F: Fn(&PipelineState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if predicate(&rx.borrow_and_update()) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("state never matched");
    }

    fn body(frames: &[Value]) -> String {
        frames.iter().cloned().map(frame).collect()
    }

    #[tokio::test]
    async fn test_happy_path_completes_all_phases() {
        let (transport, controller) = controller();
        let full = body(&[
            json!({"phase": "architecting", "message": "designing"}),
            json!({"phase": "reasoning"}),
            json!({"phase": "executing"}),
            json!({"phase": "reviewing"}),
            json!({
                "phase": "final",
                "architect": {},
                "reasoner": {},
                "executor": {"code": "x"},
                "reviewer": {"score": 91}
            }),
        ]);
        // split mid-frame to exercise buffering
        let (head, tail) = full.split_at(37);
        transport.push_chunks(&[head, tail]);

        let outcome = controller.run_full_waterfall("build a stock tracker", false).await;
        let RunOutcome::Completed(payload) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(payload.executor, Some(json!({"code": "x"})));

        let state = controller.snapshot();
        assert!(state.is_complete());
        assert_eq!(state.current_phase, Some(Phase::Reviewer));
        assert_eq!(state.phases.reviewer.data, Some(json!({"score": 91})));
        assert_eq!(state.prompt, "build a stock tracker");
        assert!(!controller.is_running());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].force_proceed);
        assert_eq!(requests[0].provider, LlmProvider::Anthropic);
    }

    #[tokio::test]
    async fn test_frames_after_final_are_ignored() {
        let (transport, controller) = controller();
        transport.push_body(&body(&[
            json!({"phase": "final", "executor": {"code": "x"}}),
            json!({"phase": "architecting", "late": true}),
        ]));

        let outcome = controller.run_full_waterfall("p", false).await;
        assert!(outcome.is_success());
        assert!(controller.snapshot().is_complete());
    }

    #[tokio::test]
    async fn test_retry_loop_rearms_executor() {
        let (transport, controller) = controller();
        transport.push_body(&body(&[
            json!({"phase": "architecting"}),
            json!({"phase": "reasoning"}),
            json!({"phase": "executing", "code": "x"}),
            json!({"phase": "reviewing"}),
            json!({"phase": "retrying", "message": "missing null check"}),
        ]));

        let outcome = controller.run_full_waterfall("p", false).await;
        assert_eq!(outcome, RunOutcome::Incomplete);

        let state = controller.snapshot();
        assert_eq!(state.current_phase, Some(Phase::Executor));
        assert_eq!(state.phases.reviewer.status, PhaseStatus::Error);
        assert_eq!(state.phases.reviewer.error.as_deref(), Some("missing null check"));
        assert_eq!(state.phases.executor.status, PhaseStatus::Processing);
        assert_eq!(state.phases.reasoner.status, PhaseStatus::Completed);
    }

    #[tokio::test]
    async fn test_gate_pauses_and_resume_keeps_data() {
        let (transport, controller) = controller();
        transport.push_body(&body(&[
            json!({"phase": "architecting", "draft": "modules"}),
            json!({
                "phase": "gated",
                "message": "cost exceeds estimate",
                "estimate": {"tokens": 50000}
            }),
        ]));

        let outcome = controller.run_full_waterfall("p", false).await;
        assert_eq!(
            outcome,
            RunOutcome::Paused {
                phase: Phase::Architect,
                reason: "cost exceeds estimate".to_string()
            }
        );

        let gated = controller.snapshot();
        let expected_data = json!({"draft": "modules", "estimate": {"tokens": 50000}});
        assert_eq!(gated.current_phase, Some(Phase::Architect));
        assert_eq!(gated.phases.architect.status, PhaseStatus::Paused);
        assert_eq!(
            gated.phases.architect.error.as_deref(),
            Some("cost exceeds estimate")
        );
        assert_eq!(gated.phases.architect.data, Some(expected_data.clone()));

        // resuming must not reset anything before the server speaks
        transport.push_chunks(&[]);
        assert_eq!(controller.proceed_with_waterfall().await, RunOutcome::Incomplete);
        assert_eq!(controller.snapshot(), gated);

        transport.push_body(&frame(json!({"phase": "reasoning", "plan": [1]})));
        controller.proceed_with_waterfall().await;
        let resumed = controller.snapshot();
        assert_eq!(resumed.current_phase, Some(Phase::Reasoner));
        assert_eq!(resumed.phases.architect.status, PhaseStatus::Completed);
        assert_eq!(resumed.phases.architect.data, Some(expected_data));

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].force_proceed && requests[2].force_proceed);
        assert_eq!(requests[2].prompt, "p");
    }

    #[tokio::test]
    async fn test_phase_after_gate_on_same_stream_clears_gate() {
        let (transport, controller) = controller();
        transport.push_body(&body(&[
            json!({"phase": "architecting", "draft": "modules"}),
            json!({"phase": "gated", "message": "cost exceeds estimate"}),
            json!({"phase": "reasoning", "plan": [1]}),
        ]));

        let outcome = controller.run_full_waterfall("p", false).await;
        assert_eq!(outcome, RunOutcome::Incomplete);

        let state = controller.snapshot();
        assert_eq!(state.paused_phase(), None);
        assert_eq!(state.current_phase, Some(Phase::Reasoner));
        assert_eq!(state.phases.architect.status, PhaseStatus::Completed);
        assert_eq!(state.phases.architect.error, None);
    }

    #[tokio::test]
    async fn test_retry_after_gate_on_same_stream_is_not_paused() {
        let (transport, controller) = controller();
        transport.push_body(&body(&[
            json!({"phase": "architecting"}),
            json!({"phase": "reasoning"}),
            json!({"phase": "executing"}),
            json!({"phase": "reviewing"}),
            json!({"phase": "gated", "message": "review budget"}),
            json!({"phase": "retrying", "message": "missing null check"}),
        ]));

        let outcome = controller.run_full_waterfall("p", false).await;
        assert_eq!(outcome, RunOutcome::Incomplete);

        let state = controller.snapshot();
        assert_eq!(state.paused_phase(), None);
        assert_eq!(state.current_phase, Some(Phase::Executor));
        assert_eq!(state.phases.reviewer.status, PhaseStatus::Error);
        assert_eq!(
            state.phases.reviewer.error.as_deref(),
            Some("missing null check")
        );
        assert_eq!(state.phases.executor.status, PhaseStatus::Processing);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let (transport, controller) = controller();
        transport.push_chunks(&[
            "data: {\"phase\":\"architecting\"}\n\n",
            "data: {this is not json}\n\n",
            "data: {\"phase\":\"reasoning\",\"plan\":1}\n\n",
        ]);

        assert_eq!(
            controller.run_full_waterfall("p", false).await,
            RunOutcome::Incomplete
        );
        let state = controller.snapshot();
        assert_eq!(state.current_phase, Some(Phase::Reasoner));
        assert_eq!(state.phases.reasoner, PhaseState::processing(Some(json!({"plan": 1}))));
    }

    #[tokio::test]
    async fn test_cancel_stops_state_updates() {
        let (transport, controller) = controller();
        let tx = transport.push_open();
        let mut rx = controller.subscribe();

        let running = Arc::clone(&controller);
        let handle = tokio::spawn(async move { running.run_full_waterfall("p", false).await });

        send(&tx, json!({"phase": "architecting", "draft": 1}));
        wait_until(&mut rx, |s| s.phases.architect.data.is_some()).await;

        assert!(controller.cancel_waterfall());
        let cancelled = controller.snapshot();
        assert_eq!(cancelled.phases.architect.status, PhaseStatus::Error);
        assert_eq!(
            cancelled.phases.architect.error.as_deref(),
            Some(CANCELLED_BY_USER)
        );

        send(&tx, json!({"phase": "reasoning"}));
        assert_eq!(handle.await.unwrap(), RunOutcome::Cancelled);
        assert_eq!(controller.snapshot(), cancelled);
        assert!(!controller.is_running());
        assert!(!controller.cancel_waterfall());
    }

    #[tokio::test]
    async fn test_new_run_supersedes_old_one() {
        let (transport, controller) = controller();
        let first = transport.push_open();
        let second = transport.push_open();
        let mut rx = controller.subscribe();

        let running = Arc::clone(&controller);
        let run1 = tokio::spawn(async move { running.run_full_waterfall("one", false).await });
        send(&first, json!({"phase": "architecting", "run": 1}));
        wait_until(&mut rx, |s| s.phases.architect.data == Some(json!({"run": 1}))).await;

        let running = Arc::clone(&controller);
        let run2 = tokio::spawn(async move { running.run_full_waterfall("two", false).await });
        assert_eq!(run1.await.unwrap(), RunOutcome::Cancelled);

        send(&first, json!({"phase": "reasoning", "run": 1}));
        send(&second, json!({"phase": "architecting", "run": 2}));
        drop(second);
        assert_eq!(run2.await.unwrap(), RunOutcome::Incomplete);

        let state = controller.snapshot();
        assert_eq!(state.prompt, "two");
        assert_eq!(state.current_phase, Some(Phase::Architect));
        assert_eq!(
            state.phases.architect,
            PhaseState::processing(Some(json!({"run": 2})))
        );
        assert_eq!(state.phases.reasoner.status, PhaseStatus::Idle);
    }

    #[tokio::test]
    async fn test_server_error_marks_current_phase() {
        let (transport, controller) = controller();
        transport.push_body(&body(&[
            json!({"phase": "architecting"}),
            json!({"phase": "reasoning"}),
            json!({"phase": "error", "message": "quota exceeded"}),
            json!({"phase": "executing"}),
        ]));

        let outcome = controller.run_full_waterfall("p", false).await;
        assert_eq!(outcome, RunOutcome::Failed("quota exceeded".to_string()));

        let state = controller.snapshot();
        assert_eq!(state.current_phase, Some(Phase::Reasoner));
        assert_eq!(state.phases.reasoner.status, PhaseStatus::Error);
        assert_eq!(state.phases.reasoner.error.as_deref(), Some("quota exceeded"));
        assert_eq!(state.phases.architect.status, PhaseStatus::Completed);
        assert_eq!(state.phases.executor.status, PhaseStatus::Idle);
    }

    #[tokio::test]
    async fn test_transport_failure_mid_stream() {
        let (transport, controller) = controller();
        let tx = transport.push_open();
        send(&tx, json!({"phase": "architecting"}));
        tx.unbounded_send(Err(WaterfallError::Transport("connection reset".into())))
            .unwrap();

        let outcome = controller.run_full_waterfall("p", false).await;
        assert_eq!(
            outcome,
            RunOutcome::Failed("stream failed: connection reset".to_string())
        );
        let architect = controller.snapshot().phases.architect;
        assert_eq!(architect.status, PhaseStatus::Error);
        assert_eq!(
            architect.error.as_deref(),
            Some("stream failed: connection reset")
        );
    }

    #[tokio::test]
    async fn test_open_failure_marks_seeded_phase() {
        let (transport, controller) = controller();
        transport.push_open_error(WaterfallError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        });

        let outcome = controller.run_full_waterfall("p", false).await;
        assert_eq!(
            outcome,
            RunOutcome::Failed("server returned 502: bad gateway".to_string())
        );
        assert_eq!(
            controller.snapshot().phases.architect.status,
            PhaseStatus::Error
        );
    }

    #[tokio::test]
    async fn test_request_carries_workspace_context() {
        let (transport, controller) = controller();
        controller.set_context(WorkspaceContext {
            notepad_content: Some("remember: no unsafe".to_string()),
            open_files: vec![FileRef {
                path: "src/main.rs".to_string(),
                name: Some("main.rs".to_string()),
                content: None,
            }],
        });
        transport.push_chunks(&[]);

        controller.run_full_waterfall("p", false).await;
        let request = &transport.requests()[0];
        assert_eq!(request.notepad_content.as_deref(), Some("remember: no unsafe"));
        assert_eq!(request.open_files.len(), 1);
    }

    #[tokio::test]
    async fn test_proceed_without_prompt() {
        let (transport, controller) = controller();
        let outcome = controller.proceed_with_waterfall().await;
        assert_eq!(
            outcome,
            RunOutcome::Failed(WaterfallError::MissingPrompt.to_string())
        );
        assert!(transport.requests().is_empty());
        assert_eq!(controller.snapshot().current_phase, None);
    }

    #[tokio::test]
    async fn test_reset_returns_to_empty_state() {
        let (transport, controller) = controller();
        transport.push_body(&frame(json!({"phase": "architecting"})));
        controller.run_full_waterfall("p", false).await;
        assert!(controller.snapshot().current_phase.is_some());

        controller.reset();
        assert_eq!(controller.snapshot(), PipelineState::default());
    }
}
