//! The agent loop: one question in, one final answer out.
//!
//! Each round renders the prompt, asks the generator for a completion,
//! parses it, and either finishes or runs the requested tool and records
//! the observation. The loop ends on a final answer, on output nothing can
//! parse, or when the run budget is spent.

use sqlpilot_config::{AppConfig, EarlyStoppingMethod};
use sqlpilot_core::{
    DomainEvent, EventBus, FinalAnswer, GenerationError, GenerationRequest, Generator,
    HistorySink, RunId, Scratchpad, Step, ToolCall, ToolDescription, ToolRegistry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::budget::RunBudget;
use crate::early_stop::{EarlyStopDecision, EarlyStoppingPolicy};
use crate::parser::{ActionParser, ParseResult};
use crate::prompt::{ChatMlPromptRenderer, PromptContext, PromptRenderer};
use crate::stream::{StreamClassifier, StreamClassifierConfig};
use crate::stream_event::AgentStreamEvent;

/// Longest slice of unparsable output carried in a domain event.
const RAW_PREVIEW_CHARS: usize = 200;

/// Errors that end a run without an answer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The stream consumer went away.
    #[error("Run cancelled: event receiver dropped")]
    Cancelled,
}

/// Per-run limits and sampling settings.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: u32,
    pub max_wall_clock: Option<Duration>,
    pub early_stopping: EarlyStoppingMethod,
    pub max_new_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Stop sequences added to the renderer's own.
    pub extra_stop: Vec<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_wall_clock: None,
            early_stopping: EarlyStoppingMethod::Force,
            max_new_tokens: None,
            temperature: None,
            extra_stop: Vec::new(),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.agent.max_iterations,
            max_wall_clock: config
                .agent
                .max_wall_clock_secs
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
            early_stopping: config.agent.early_stopping_method,
            max_new_tokens: Some(config.generation.max_new_tokens),
            temperature: Some(config.generation.temperature),
            extra_stop: config.generation.stop_sequences.clone(),
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_wall_clock(mut self, limit: Duration) -> Self {
        self.max_wall_clock = Some(limit);
        self
    }

    pub fn with_early_stopping(mut self, method: EarlyStoppingMethod) -> Self {
        self.early_stopping = method;
        self
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub answer: FinalAnswer,
    /// Tool rounds in order.
    pub steps: Vec<Step>,
    pub iterations: u32,
}

/// Forwards events to an optional stream consumer and notices when the
/// consumer has gone away.
struct Emitter<'a> {
    tx: Option<&'a mpsc::Sender<AgentStreamEvent>>,
    closed: bool,
}

impl<'a> Emitter<'a> {
    fn new(tx: Option<&'a mpsc::Sender<AgentStreamEvent>>) -> Self {
        Self { tx, closed: false }
    }

    fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    async fn send(&mut self, event: AgentStreamEvent) {
        if self.closed {
            return;
        }
        if let Some(tx) = self.tx
            && tx.send(event).await.is_err()
        {
            self.closed = true;
        }
    }

    /// Safe point between generations and tool calls.
    fn checkpoint(&self) -> Result<(), AgentError> {
        if self.closed || self.tx.is_some_and(|tx| tx.is_closed()) {
            return Err(AgentError::Cancelled);
        }
        Ok(())
    }
}

/// The agent runtime.
pub struct AgentLoop {
    generator: Arc<dyn Generator>,
    tools: Arc<ToolRegistry>,
    settings: AgentSettings,
    renderer: Arc<dyn PromptRenderer>,
    parser: ActionParser,
    stream_config: StreamClassifierConfig,
    history: Option<Arc<dyn HistorySink>>,
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(
        generator: Arc<dyn Generator>,
        tools: Arc<ToolRegistry>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            generator,
            tools,
            settings,
            renderer: Arc::new(ChatMlPromptRenderer::default()),
            parser: ActionParser::new(),
            stream_config: StreamClassifierConfig::default(),
            history: None,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PromptRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Persist steps and answers through this sink.
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_stream_config(mut self, config: StreamClassifierConfig) -> Self {
        self.stream_config = config;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Answer `input` using whole completions.
    pub async fn run(&self, input: &str) -> Result<RunOutcome, AgentError> {
        self.drive(input, None).await
    }

    /// Answer `input` using streamed completions, forwarding visible
    /// fragments and progress to `events`.
    ///
    /// Dropping the receiver cancels the run at the next checkpoint.
    pub async fn run_stream(
        &self,
        input: &str,
        events: mpsc::Sender<AgentStreamEvent>,
    ) -> Result<RunOutcome, AgentError> {
        let result = self.drive(input, Some(&events)).await;
        if let Err(AgentError::Generation(e)) = &result {
            let _ = events
                .send(AgentStreamEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
        result
    }

    /// Run [`run_stream`](Self::run_stream) on a background task.
    ///
    /// The caller reads events from the receiver and awaits the handle for
    /// the outcome.
    pub fn spawn_stream(
        self: Arc<Self>,
        input: impl Into<String>,
        buffer: usize,
    ) -> (
        mpsc::Receiver<AgentStreamEvent>,
        JoinHandle<Result<RunOutcome, AgentError>>,
    ) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let input = input.into();
        let handle = tokio::spawn(async move { self.run_stream(&input, tx).await });
        (rx, handle)
    }

    async fn drive(
        &self,
        input: &str,
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        let run_id = RunId::new();
        let mut emitter = Emitter::new(events);
        let mut budget = RunBudget::new(self.settings.max_iterations, self.settings.max_wall_clock);
        let mut scratchpad = Scratchpad::new();
        let tool_descriptions = self.tools.descriptions();

        info!(
            run_id = %run_id,
            generator = self.generator.name(),
            max_iterations = self.settings.max_iterations,
            streaming = emitter.is_streaming(),
            "Agent run starting"
        );

        let answer = loop {
            if let Some(reason) = budget.exhausted() {
                warn!(run_id = %run_id, %reason, "Run budget exhausted");
                self.event_bus.publish(DomainEvent::EarlyStopped {
                    run_id: run_id.to_string(),
                    iterations: budget.iterations(),
                    reason: reason.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                break self
                    .stop_early(&run_id, input, &tool_descriptions, &scratchpad, &mut emitter)
                    .await?;
            }

            emitter.checkpoint()?;
            debug!(run_id = %run_id, iteration = budget.iterations() + 1, "Agent iteration");

            // ── Generate ──
            let prompt = self.renderer.render(&PromptContext {
                tools: &tool_descriptions,
                scratchpad: &scratchpad,
                input,
                conclude: false,
            });
            let raw = self.generate(&run_id, prompt, &mut emitter).await?;
            emitter.checkpoint()?;

            // ── Interpret ──
            match self.parser.parse(&raw) {
                ParseResult::FinalAnswer(text) => break FinalAnswer::new(text),
                ParseResult::Unparsable(raw) => {
                    warn!(run_id = %run_id, chars = raw.len(), "Model output could not be parsed");
                    self.event_bus.publish(DomainEvent::UnparsableOutput {
                        run_id: run_id.to_string(),
                        raw_preview: raw.chars().take(RAW_PREVIEW_CHARS).collect(),
                        timestamp: chrono::Utc::now(),
                    });
                    break FinalAnswer::unparsed(raw.trim());
                }
                ParseResult::ToolCall(call) => {
                    let observation = self.dispatch(&run_id, &call, &mut emitter).await;
                    let step = Step::tool(call, observation);
                    self.record_step(&run_id, &step).await;
                    emitter
                        .send(AgentStreamEvent::Step { step: step.clone() })
                        .await;
                    scratchpad.push(step);
                    budget.tick();
                }
            }
        };

        emitter.checkpoint()?;

        let iterations = budget.iterations();
        self.record_step(&run_id, &Step::finish(answer.clone())).await;
        if let Some(history) = &self.history
            && let Err(e) = history.record_answer(&run_id, input, &answer).await
        {
            warn!(run_id = %run_id, "Failed to record answer: {e}");
        }

        self.event_bus.publish(DomainEvent::RunFinished {
            run_id: run_id.to_string(),
            kind: answer.kind,
            iterations,
            timestamp: chrono::Utc::now(),
        });
        info!(
            run_id = %run_id,
            iterations,
            kind = answer.kind.as_str(),
            "Agent run finished"
        );

        emitter
            .send(AgentStreamEvent::Done {
                run_id: run_id.to_string(),
                answer: answer.clone(),
                iterations,
            })
            .await;

        Ok(RunOutcome {
            run_id,
            answer,
            steps: scratchpad.into_steps(),
            iterations,
        })
    }

    fn stop_sequences(&self) -> Vec<String> {
        let mut stop = self.renderer.stop_sequences();
        for s in &self.settings.extra_stop {
            if !stop.contains(s) {
                stop.push(s.clone());
            }
        }
        stop
    }

    /// One completion. Streaming runs drain the fragment channel fully and
    /// feed a fresh classifier; the full text is returned either way.
    async fn generate(
        &self,
        run_id: &RunId,
        prompt: String,
        emitter: &mut Emitter<'_>,
    ) -> Result<String, AgentError> {
        let request = GenerationRequest {
            prompt,
            stop: self.stop_sequences(),
            max_new_tokens: self.settings.max_new_tokens,
            temperature: self.settings.temperature,
        };

        let start = Instant::now();
        let text = if emitter.is_streaming() {
            let mut fragments = self.generator.generate_stream(request).await?;
            let mut classifier = StreamClassifier::new(self.stream_config.clone());
            classifier.on_start();
            let mut text = String::new();
            while let Some(fragment) = fragments.recv().await {
                let fragment = fragment?;
                text.push_str(&fragment);
                for event in classifier.on_token(&fragment) {
                    emitter.send(event.into()).await;
                }
            }
            for event in classifier.on_end() {
                emitter.send(event.into()).await;
            }
            text
        } else {
            self.generator.generate(request).await?
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(run_id = %run_id, chars = text.len(), duration_ms, "Generation complete");
        self.event_bus.publish(DomainEvent::GenerationCompleted {
            run_id: run_id.to_string(),
            generator: self.generator.name().to_string(),
            chars: text.len(),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });

        Ok(text)
    }

    /// Run a tool call and produce the observation the model sees next.
    /// Tool failures never escape; they become observations.
    async fn dispatch(&self, run_id: &RunId, call: &ToolCall, emitter: &mut Emitter<'_>) -> String {
        if !self.tools.contains(&call.name) {
            warn!(run_id = %run_id, tool = %call.name, "Model requested an unknown tool");
            self.event_bus.publish(DomainEvent::ToolExecuted {
                run_id: run_id.to_string(),
                tool_name: call.name.clone(),
                success: false,
                duration_ms: 0,
                timestamp: chrono::Utc::now(),
            });
            return format!(
                "{} is not a valid tool, try one of [{}].",
                call.name,
                self.tools.names().join(", ")
            );
        }

        emitter
            .send(AgentStreamEvent::ToolStart {
                name: call.name.clone(),
                input: call.input.as_text(),
            })
            .await;

        let start = Instant::now();
        let result = self.tools.invoke(&call.name, &call.input).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ToolExecuted {
            run_id: run_id.to_string(),
            tool_name: call.name.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });

        match result {
            Ok(output) => {
                debug!(run_id = %run_id, tool = %call.name, duration_ms, "Tool executed");
                output
            }
            Err(e) => {
                warn!(run_id = %run_id, tool = %call.name, "Tool failed: {e}");
                format!("Error: {e}")
            }
        }
    }

    async fn stop_early(
        &self,
        run_id: &RunId,
        input: &str,
        tools: &[ToolDescription],
        scratchpad: &Scratchpad,
        emitter: &mut Emitter<'_>,
    ) -> Result<FinalAnswer, AgentError> {
        let policy = EarlyStoppingPolicy::new(self.settings.early_stopping);
        match policy.decide() {
            EarlyStopDecision::Stop(answer) => Ok(answer),
            EarlyStopDecision::GenerateOnce => {
                emitter.checkpoint()?;
                let prompt = self.renderer.render(&PromptContext {
                    tools,
                    scratchpad,
                    input,
                    conclude: true,
                });
                let raw = self.generate(run_id, prompt, emitter).await?;
                Ok(policy.conclude(self.parser.parse(&raw), &raw))
            }
        }
    }

    async fn record_step(&self, run_id: &RunId, step: &Step) {
        if let Some(history) = &self.history
            && let Err(e) = history.record_step(run_id, step).await
        {
            warn!(run_id = %run_id, "Failed to record step: {e}");
        }
    }
}
