//! Run-level domain types: tool calls, final answers, steps and the
//! scratchpad that accumulates them.
//!
//! A run is one question answered by the agent. Each tool call and its
//! observation become a [`Step`]; the ordered steps form the run's
//! [`Scratchpad`], which is re-rendered into the prompt every round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolInput;

/// Longest observation kept verbatim in a rendered step.
pub const MAX_OBSERVATION_CHARS: usize = 4000;

/// Unique identifier for one agent run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An instruction to call a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub input: ToolInput,
    /// The raw completion this call was parsed from.
    #[serde(default)]
    pub log: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: ToolInput) -> Self {
        Self {
            name: name.into(),
            input,
            log: String::new(),
        }
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }
}

/// How a final answer came about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// The model produced a final answer.
    #[default]
    Answer,
    /// The iteration or time budget ran out first.
    EarlyStopped,
    /// The model output could not be parsed and is surfaced as-is.
    Unparsed,
}

impl AnswerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::EarlyStopped => "early_stopped",
            Self::Unparsed => "unparsed",
        }
    }
}

/// The terminal output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub text: String,
    #[serde(default)]
    pub kind: AnswerKind,
}

impl FinalAnswer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: AnswerKind::Answer,
        }
    }

    pub fn early_stopped(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: AnswerKind::EarlyStopped,
        }
    }

    pub fn unparsed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: AnswerKind::Unparsed,
        }
    }

    pub fn is_early_stopped(&self) -> bool {
        self.kind == AnswerKind::EarlyStopped
    }
}

/// What the agent did in a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    ToolCall(ToolCall),
    Finish(FinalAnswer),
}

/// One `(action, observation)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: AgentAction,
    /// Tool output, or empty for a terminal step.
    #[serde(default)]
    pub observation: String,
    pub at: DateTime<Utc>,
}

impl Step {
    pub fn tool(call: ToolCall, observation: impl Into<String>) -> Self {
        Self {
            action: AgentAction::ToolCall(call),
            observation: observation.into(),
            at: Utc::now(),
        }
    }

    pub fn finish(answer: FinalAnswer) -> Self {
        Self {
            action: AgentAction::Finish(answer),
            observation: String::new(),
            at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.action, AgentAction::Finish(_))
    }

    /// The observation cut down to [`MAX_OBSERVATION_CHARS`].
    pub fn observation_excerpt(&self) -> String {
        truncate(&self.observation, MAX_OBSERVATION_CHARS)
    }

    /// The model-facing text of this step's action.
    ///
    /// The model's own output is replayed when it was recorded; otherwise
    /// the call is written out as a fenced JSON action.
    pub fn action_text(&self) -> String {
        match &self.action {
            AgentAction::ToolCall(call) if !call.log.trim().is_empty() => {
                call.log.trim().to_string()
            }
            AgentAction::ToolCall(call) => format!(
                "```json\n{}\n```",
                serde_json::json!({ "tool_name": call.name, "tool_input": call.input })
            ),
            AgentAction::Finish(answer) => format!("Final Answer: {}", answer.text),
        }
    }
}

/// The ordered, append-only history of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scratchpad {
    steps: Vec<Step>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... [truncated]", &text[..idx]),
        None => text.to_string(),
    }
}
