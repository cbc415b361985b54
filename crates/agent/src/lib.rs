//! The SQLPilot agent runtime.
//!
//! The agent follows a **Thought → Action → Observation** cycle:
//!
//! 1. **Render** the prompt (instructions, tools, previous steps, question)
//! 2. **Generate** a completion, optionally streaming visible fragments
//! 3. **Parse** it into a tool call or a final answer
//! 4. **If tool call**: run the tool, record the observation, loop back to 1
//! 5. **If final answer**: return it
//!
//! The loop also ends when the iteration or time budget runs out, in which
//! case the configured early-stopping method decides the answer.

pub mod budget;
pub mod early_stop;
pub mod loop_runner;
pub mod parser;
pub mod prompt;
pub mod stream;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use budget::{BudgetExhausted, RunBudget};
pub use early_stop::{EarlyStopDecision, EarlyStoppingPolicy};
pub use loop_runner::{AgentError, AgentLoop, AgentSettings, RunOutcome};
pub use parser::{ActionParser, ParseAnomaly, ParseOutput, ParseResult};
pub use prompt::{ChatMlPromptRenderer, PromptContext, PromptRenderer};
pub use stream::{StreamClassifier, StreamClassifierConfig, StreamEvent};
pub use stream_event::AgentStreamEvent;
