//! Error types for the SQLPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each port has its own error enum; callers decide which ones are fatal.

use thiserror::Error;

/// Failures of the text-generation backend.
///
/// These are fatal to the run that hit them.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Generator not configured: {0}")]
    NotConfigured(String),
}

/// Failures of a tool invocation.
///
/// The agent loop never propagates these; it renders them into the
/// observation the model sees next.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),
}
