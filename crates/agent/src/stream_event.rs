//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps classifier output and loop progress into
//! events a transport (terminal, SSE, WebSocket) can forward to a user.

use serde::{Deserialize, Serialize};
use sqlpilot_core::{FinalAnswer, Step};

use crate::stream::StreamEvent;

/// Events emitted by the agent during a streaming run.
///
/// - `segment_start`: the visible part of a completion begins
/// - `segment_token`: one visible fragment
/// - `segment_end`: the visible part ended with the completion
/// - `tool_start`: a tool is about to run (used as the query notice)
/// - `step`: a tool round finished
/// - `done`: the run produced its final answer
/// - `error`: the run failed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    SegmentStart,

    SegmentToken { content: String },

    SegmentEnd,

    /// A tool is about to be invoked with this input.
    ToolStart { name: String, input: String },

    /// A completed `(action, observation)` round.
    Step { step: Step },

    Done {
        run_id: String,
        answer: FinalAnswer,
        iterations: u32,
    },

    /// The run failed; no answer follows.
    Error { message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SegmentStart => "segment_start",
            Self::SegmentToken { .. } => "segment_token",
            Self::SegmentEnd => "segment_end",
            Self::ToolStart { .. } => "tool_start",
            Self::Step { .. } => "step",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

impl From<StreamEvent> for AgentStreamEvent {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::SegmentStart => Self::SegmentStart,
            StreamEvent::SegmentToken(content) => Self::SegmentToken { content },
            StreamEvent::SegmentEnd => Self::SegmentEnd,
        }
    }
}
