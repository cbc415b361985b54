//! What to answer when the budget runs out before the model finishes.

use sqlpilot_config::EarlyStoppingMethod;
use sqlpilot_core::FinalAnswer;

use crate::parser::ParseResult;

/// Answer returned by the `force` method.
pub const FORCE_STOP_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

/// Appended to the prompt for the single concluding generation.
pub const CONCLUDE_INSTRUCTION: &str =
    "I now need to return a final answer based on the previous steps:";

/// What the loop should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum EarlyStopDecision {
    /// Return this answer as-is.
    Stop(FinalAnswer),
    /// Run exactly one more generation asking for a conclusion.
    GenerateOnce,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EarlyStoppingPolicy {
    method: EarlyStoppingMethod,
}

impl EarlyStoppingPolicy {
    pub fn new(method: EarlyStoppingMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> EarlyStoppingMethod {
        self.method
    }

    pub fn decide(&self) -> EarlyStopDecision {
        match self.method {
            EarlyStoppingMethod::Force => {
                EarlyStopDecision::Stop(FinalAnswer::early_stopped(FORCE_STOP_MESSAGE))
            }
            EarlyStoppingMethod::Generate => EarlyStopDecision::GenerateOnce,
        }
    }

    /// Turn the concluding generation into an answer. A parsed final
    /// answer is taken at face value; anything else (including another
    /// tool call) becomes the raw completion, still tagged early-stopped.
    pub fn conclude(&self, parsed: ParseResult, raw: &str) -> FinalAnswer {
        match parsed {
            ParseResult::FinalAnswer(text) => FinalAnswer::new(text),
            ParseResult::ToolCall(_) | ParseResult::Unparsable(_) => {
                FinalAnswer::early_stopped(raw.trim())
            }
        }
    }
}
