//! Shared test helpers for agent tests.

use async_trait::async_trait;
use sqlpilot_core::{
    FragmentStream, GenerationError, GenerationRequest, Generator, Tool, ToolError, ToolInput,
};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted completion.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Whole text; streamed as a single fragment.
    Text(String),
    /// Streamed fragment by fragment; joined for non-streaming calls.
    Fragments(Vec<String>),
    /// The call fails.
    Fail(GenerationError),
}

/// A mock generator that returns a sequence of scripted completions.
///
/// Each call returns the next entry. Once the script runs out the
/// `repeat` completion is used if set, otherwise the call panics.
pub struct ScriptedGenerator {
    script: Mutex<Vec<Scripted>>,
    repeat: Option<String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script),
            repeat: None,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Scripted::Text(t.to_string())).collect())
    }

    /// Always answer with the same completion.
    pub fn repeating(text: &str) -> Self {
        let mut generator = Self::new(Vec::new());
        generator.repeat = Some(text.to_string());
        generator
    }

    /// Sleep this long (on the tokio clock) before every completion.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.prompts.lock().unwrap().clone()
    }

    async fn next(&self, request: GenerationRequest) -> Scripted {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request);
            prompts.len()
        };
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            match &self.repeat {
                Some(text) => return Scripted::Text(text.clone()),
                None => panic!("ScriptedGenerator: no more completions (call #{call})"),
            }
        }
        script.remove(0)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        match self.next(request).await {
            Scripted::Text(text) => Ok(text),
            Scripted::Fragments(fragments) => Ok(fragments.concat()),
            Scripted::Fail(e) => Err(e),
        }
    }

    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<FragmentStream, GenerationError> {
        let fragments = match self.next(request).await {
            Scripted::Text(text) => vec![text],
            Scripted::Fragments(fragments) => fragments,
            Scripted::Fail(e) => return Err(e),
        };
        let (tx, rx) = mpsc::channel(fragments.len().max(1));
        for fragment in fragments {
            let _ = tx.send(Ok(fragment)).await;
        }
        Ok(rx)
    }
}

/// Echoes its input back, prefixed.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input back."
    }

    async fn invoke(&self, input: &ToolInput) -> Result<String, ToolError> {
        Ok(format!("echo: {}", input.as_text()))
    }
}

/// Always fails.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails."
    }

    async fn invoke(&self, _input: &ToolInput) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "disk on fire".into(),
        })
    }
}

/// A fenced tool-call completion.
pub fn tool_call(name: &str, input: &str) -> String {
    format!(
        "Thought: I should use {name}.\n```json\n{}\n```",
        serde_json::json!({ "tool_name": name, "tool_input": input })
    )
}
