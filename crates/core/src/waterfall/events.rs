//! # Waterfall Events
//!
//! Typed view over the frames streamed by the waterfall endpoint.
//!
//! Every frame is a JSON object with a string `phase` tag. The tag is mapped
//! onto the fixed wire vocabulary; anything else is kept as
//! [`StreamEvent::Unrecognized`] so newer servers do not break older clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::FrameParseError;
use super::phase::Phase;

/// Wire vocabulary of the `phase` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirePhase {
    Architecting,
    Reasoning,
    Executing,
    Reviewing,
    Gated,
    Final,
    Error,
    Retrying,
}

impl WirePhase {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "architecting" => Some(WirePhase::Architecting),
            "reasoning" => Some(WirePhase::Reasoning),
            "executing" => Some(WirePhase::Executing),
            "reviewing" => Some(WirePhase::Reviewing),
            "gated" => Some(WirePhase::Gated),
            "final" => Some(WirePhase::Final),
            "error" => Some(WirePhase::Error),
            "retrying" => Some(WirePhase::Retrying),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WirePhase::Architecting => "architecting",
            WirePhase::Reasoning => "reasoning",
            WirePhase::Executing => "executing",
            WirePhase::Reviewing => "reviewing",
            WirePhase::Gated => "gated",
            WirePhase::Final => "final",
            WirePhase::Error => "error",
            WirePhase::Retrying => "retrying",
        }
    }

    /// The pipeline phase this tag reports progress for
    pub fn step(self) -> Option<Phase> {
        match self {
            WirePhase::Architecting => Some(Phase::Architect),
            WirePhase::Reasoning => Some(Phase::Reasoner),
            WirePhase::Executing => Some(Phase::Executor),
            WirePhase::Reviewing => Some(Phase::Reviewer),
            _ => None,
        }
    }

    /// Wire tag reporting progress for a phase
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Architect => WirePhase::Architecting,
            Phase::Reasoner => WirePhase::Reasoning,
            Phase::Executor => WirePhase::Executing,
            Phase::Reviewer => WirePhase::Reviewing,
        }
    }
}

/// Payloads carried by the `final` frame, one per phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalPayload {
    #[serde(default)]
    pub architect: Option<Value>,
    #[serde(default)]
    pub reasoner: Option<Value>,
    #[serde(default)]
    pub executor: Option<Value>,
    #[serde(default)]
    pub reviewer: Option<Value>,
}

impl FinalPayload {
    pub fn get(&self, phase: Phase) -> Option<&Value> {
        match phase {
            Phase::Architect => self.architect.as_ref(),
            Phase::Reasoner => self.reasoner.as_ref(),
            Phase::Executor => self.executor.as_ref(),
            Phase::Reviewer => self.reviewer.as_ref(),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        let take = |key: &str| fields.get(key).filter(|v| !v.is_null()).cloned();
        Self {
            architect: take("architect"),
            reasoner: take("reasoner"),
            executor: take("executor"),
            reviewer: take("reviewer"),
        }
    }
}

/// One decoded event frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Progress snapshot for a phase
    Phase {
        phase: Phase,
        message: Option<String>,
        payload: Value,
    },
    /// Reviewer rejected the result; executor goes again
    Retrying {
        message: Option<String>,
        payload: Value,
    },
    /// Server paused the run pending confirmation
    Gated {
        message: Option<String>,
        estimate: Option<Value>,
        payload: Value,
    },
    Final(FinalPayload),
    Error { message: String },
    /// Tag outside the known vocabulary
    Unrecognized { wire_phase: String, payload: Value },
}

impl StreamEvent {
    /// Build an event from a decoded JSON frame
    pub fn from_frame(frame: Value) -> Result<Self, FrameParseError> {
        let Value::Object(mut fields) = frame else {
            return Err(FrameParseError::MissingPhase);
        };
        let tag = match fields.remove("phase") {
            Some(Value::String(tag)) => tag,
            _ => return Err(FrameParseError::MissingPhase),
        };
        let message = fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);

        let event = match WirePhase::parse(&tag) {
            Some(WirePhase::Gated) => StreamEvent::Gated {
                message,
                estimate: fields.get("estimate").filter(|v| !v.is_null()).cloned(),
                payload: Value::Object(fields),
            },
            Some(WirePhase::Final) => StreamEvent::Final(FinalPayload::from_fields(&fields)),
            Some(WirePhase::Error) => StreamEvent::Error {
                message: message
                    .or_else(|| {
                        fields
                            .get("error")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| "Waterfall failed".to_string()),
            },
            Some(WirePhase::Retrying) => StreamEvent::Retrying {
                message,
                payload: Value::Object(fields),
            },
            Some(wire) => match wire.step() {
                Some(phase) => StreamEvent::Phase {
                    phase,
                    message,
                    payload: Value::Object(fields),
                },
                None => StreamEvent::Unrecognized {
                    wire_phase: tag,
                    payload: Value::Object(fields),
                },
            },
            None => StreamEvent::Unrecognized {
                wire_phase: tag,
                payload: Value::Object(fields),
            },
        };
        Ok(event)
    }

    /// The raw `phase` tag this event was decoded from
    pub fn wire_phase(&self) -> &str {
        match self {
            StreamEvent::Phase { phase, .. } => WirePhase::for_phase(*phase).as_str(),
            StreamEvent::Retrying { .. } => WirePhase::Retrying.as_str(),
            StreamEvent::Gated { .. } => WirePhase::Gated.as_str(),
            StreamEvent::Final(_) => WirePhase::Final.as_str(),
            StreamEvent::Error { .. } => WirePhase::Error.as_str(),
            StreamEvent::Unrecognized { wire_phase, .. } => wire_phase,
        }
    }

    /// Frame fields other than the tag
    pub fn payload(&self) -> Value {
        match self {
            StreamEvent::Phase { payload, .. }
            | StreamEvent::Retrying { payload, .. }
            | StreamEvent::Gated { payload, .. }
            | StreamEvent::Unrecognized { payload, .. } => payload.clone(),
            StreamEvent::Final(payload) => {
                serde_json::to_value(payload).unwrap_or(Value::Null)
            }
            StreamEvent::Error { message } => serde_json::json!({ "message": message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase_frame() {
        let event =
            StreamEvent::from_frame(json!({"phase": "reasoning", "message": "planning"})).unwrap();
        assert_eq!(
            event,
            StreamEvent::Phase {
                phase: Phase::Reasoner,
                message: Some("planning".to_string()),
                payload: json!({"message": "planning"}),
            }
        );
        assert_eq!(event.wire_phase(), "reasoning");
    }

    #[test]
    fn test_gated_frame_keeps_estimate() {
        let event = StreamEvent::from_frame(json!({
            "phase": "gated",
            "message": "cost exceeds estimate",
            "estimate": {"tokens": 50000}
        }))
        .unwrap();
        match event {
            StreamEvent::Gated {
                message, estimate, ..
            } => {
                assert_eq!(message.as_deref(), Some("cost exceeds estimate"));
                assert_eq!(estimate, Some(json!({"tokens": 50000})));
            }
            other => panic!("expected gate, got {other:?}"),
        }
    }

    #[test]
    fn test_final_frame() {
        let event = StreamEvent::from_frame(json!({
            "phase": "final",
            "architect": {},
            "executor": {"code": "x"},
            "reviewer": {"score": 91}
        }))
        .unwrap();
        let StreamEvent::Final(payload) = event else {
            panic!("expected final");
        };
        assert_eq!(payload.architect, Some(json!({})));
        assert_eq!(payload.reasoner, None);
        assert_eq!(payload.get(Phase::Executor), Some(&json!({"code": "x"})));
    }

    #[test]
    fn test_error_frame_message_fallbacks() {
        let event = StreamEvent::from_frame(json!({"phase": "error", "error": "boom"})).unwrap();
        assert_eq!(
            event,
            StreamEvent::Error {
                message: "boom".to_string()
            }
        );

        let event = StreamEvent::from_frame(json!({"phase": "error"})).unwrap();
        assert_eq!(
            event,
            StreamEvent::Error {
                message: "Waterfall failed".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_tag_is_unrecognized() {
        let event = StreamEvent::from_frame(json!({"phase": "summarizing", "n": 1})).unwrap();
        assert_eq!(event.wire_phase(), "summarizing");
        assert!(matches!(event, StreamEvent::Unrecognized { .. }));
    }

    #[test]
    fn test_missing_tag_is_rejected() {
        assert!(StreamEvent::from_frame(json!({"message": "hi"})).is_err());
        assert!(StreamEvent::from_frame(json!({"phase": 3})).is_err());
        assert!(StreamEvent::from_frame(json!([1, 2])).is_err());
    }
}
