//! # Pipeline Phases
//!
//! Defines the four phases of a waterfall run and the state held for each.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Phase of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Architect drafting the high-level design
    Architect,
    /// Reasoner turning the design into a plan
    Reasoner,
    /// Executor producing code from the plan
    Executor,
    /// Reviewer auditing the result
    Reviewer,
}

impl Phase {
    /// All phases in forward order
    pub const ALL: [Phase; 4] = [
        Phase::Architect,
        Phase::Reasoner,
        Phase::Executor,
        Phase::Reviewer,
    ];

    /// The phase after this one in forward order
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Architect => Some(Phase::Reasoner),
            Phase::Reasoner => Some(Phase::Executor),
            Phase::Executor => Some(Phase::Reviewer),
            Phase::Reviewer => None,
        }
    }

    /// The phase before this one in forward order
    pub fn previous(self) -> Option<Phase> {
        match self {
            Phase::Architect => None,
            Phase::Reasoner => Some(Phase::Architect),
            Phase::Executor => Some(Phase::Reasoner),
            Phase::Reviewer => Some(Phase::Executor),
        }
    }

    /// Identifier used on the wire and in the CLI
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Architect => "architect",
            Phase::Reasoner => "reasoner",
            Phase::Executor => "executor",
            Phase::Reviewer => "reviewer",
        }
    }

    /// Display name for UI
    pub fn display_name(self) -> &'static str {
        match self {
            Phase::Architect => "Architect",
            Phase::Reasoner => "Reasoner",
            Phase::Executor => "Executor",
            Phase::Reviewer => "Reviewer",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "architect" => Ok(Phase::Architect),
            "reasoner" => Ok(Phase::Reasoner),
            "executor" => Ok(Phase::Executor),
            "reviewer" => Ok(Phase::Reviewer),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

/// Status of a single phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Idle,
    Processing,
    Completed,
    Error,
    /// Held at a gate until the run is resumed
    Paused,
}

/// Status, payload, and failure message for one phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: PhaseStatus,
    /// Latest snapshot reported for the phase
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PhaseState {
    /// A phase that is actively running with the given snapshot
    pub fn processing(data: Option<Value>) -> Self {
        Self {
            status: PhaseStatus::Processing,
            data,
            error: None,
        }
    }

    /// A finished phase
    pub fn completed(data: Option<Value>) -> Self {
        Self {
            status: PhaseStatus::Completed,
            data,
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PhaseStatus::Completed
    }
}

/// One state slot per phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseSlots {
    pub architect: PhaseState,
    pub reasoner: PhaseState,
    pub executor: PhaseState,
    pub reviewer: PhaseState,
}

impl PhaseSlots {
    pub fn get(&self, phase: Phase) -> &PhaseState {
        match phase {
            Phase::Architect => &self.architect,
            Phase::Reasoner => &self.reasoner,
            Phase::Executor => &self.executor,
            Phase::Reviewer => &self.reviewer,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut PhaseState {
        match phase {
            Phase::Architect => &mut self.architect,
            Phase::Reasoner => &mut self.reasoner,
            Phase::Executor => &mut self.executor,
            Phase::Reviewer => &mut self.reviewer,
        }
    }

    /// Iterate slots in forward order
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &PhaseState)> {
        Phase::ALL.into_iter().map(move |phase| (phase, self.get(phase)))
    }
}

impl std::ops::Index<Phase> for PhaseSlots {
    type Output = PhaseState;

    fn index(&self, phase: Phase) -> &PhaseState {
        self.get(phase)
    }
}

impl std::ops::IndexMut<Phase> for PhaseSlots {
    fn index_mut(&mut self, phase: Phase) -> &mut PhaseState {
        self.get_mut(phase)
    }
}

/// The live state of a waterfall session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    /// Prompt of the most recent run
    pub prompt: String,
    /// `None` only before the first run starts
    pub current_phase: Option<Phase>,
    pub phases: PhaseSlots,
}

impl PipelineState {
    /// Fresh state for a new (non-resumed) run: every phase idle except
    /// the architect, which is seeded as processing.
    pub fn seeded(prompt: impl Into<String>) -> Self {
        let mut state = Self {
            prompt: prompt.into(),
            current_phase: Some(Phase::Architect),
            phases: PhaseSlots::default(),
        };
        state.phases.architect = PhaseState::processing(None);
        state
    }

    /// State of the phase the run is currently in
    pub fn current(&self) -> Option<&PhaseState> {
        self.current_phase.map(|phase| self.phases.get(phase))
    }

    /// Whether every phase finished successfully
    pub fn is_complete(&self) -> bool {
        self.phases.iter().all(|(_, state)| state.is_completed())
    }

    /// The phase currently held at a gate, if any
    pub fn paused_phase(&self) -> Option<Phase> {
        self.phases
            .iter()
            .find(|(_, state)| state.status == PhaseStatus::Paused)
            .map(|(phase, _)| phase)
    }
}
