//! Generator trait: the abstraction over text-generation backends.
//!
//! A Generator turns a fully rendered prompt into completion text, either
//! in one piece or as a stream of fragments. The agent loop never knows
//! which backend it is talking to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::GenerationError;

/// A single generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The rendered prompt text
    pub prompt: String,

    /// Stop sequences; generation halts before emitting any of them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Maximum new tokens to generate (backend default if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,

    /// Sampling temperature (backend default if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

/// Receiving half of a streaming generation.
///
/// Each item is one text fragment in arrival order. The channel closing is
/// the end-of-stream signal; an `Err` item aborts the stream.
pub type FragmentStream = mpsc::Receiver<Result<String, GenerationError>>;

/// The core Generator trait.
#[async_trait]
pub trait Generator: Send + Sync {
    /// A human-readable name for this backend (e.g. "tgi").
    fn name(&self) -> &str;

    /// Generate the full completion for a prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;

    /// Generate a completion as a stream of fragments.
    ///
    /// Default implementation calls `generate()` and yields the result as a
    /// single fragment.
    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<FragmentStream, GenerationError> {
        let text = self.generate(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(text)).await;
        Ok(rx)
    }

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> Result<bool, GenerationError> {
        Ok(true)
    }
}
