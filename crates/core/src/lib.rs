//! # SQLPilot Core
//!
//! Domain types, ports, and error definitions for the SQLPilot agent
//! runtime. Every external collaborator (text generation, tools, history
//! persistence) is a trait here; implementations live in their own crates
//! or in the embedding service.

pub mod error;
pub mod event;
pub mod generation;
pub mod history;
pub mod step;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{GenerationError, HistoryError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use generation::{FragmentStream, GenerationRequest, Generator};
pub use history::{HistorySink, InMemoryHistory, RunRecord};
pub use step::{AgentAction, AnswerKind, FinalAnswer, RunId, Scratchpad, Step, ToolCall};
pub use tool::{Tool, ToolDescription, ToolInput, ToolRegistry};
