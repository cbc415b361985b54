//! `sqlpilot ask`: answer one question against the configured database.

use sqlpilot_agent::{
    AgentLoop, AgentSettings, AgentStreamEvent, ChatMlPromptRenderer, RunOutcome,
    StreamClassifierConfig,
};
use sqlpilot_config::AppConfig;
use sqlpilot_core::{AgentAction, AnswerKind, FinalAnswer, Generator, Step};
use sqlpilot_providers::TextGenInference;
use std::io::Write;
use std::sync::Arc;
use tracing::info;

const QUERY_TOOL: &str = "sql_db_query";

pub async fn run(
    config: &AppConfig,
    question: &str,
    stream: bool,
    show_steps: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(super::open_database(config).await?);
    let generator: Arc<dyn Generator> = Arc::new(
        TextGenInference::from_config(&config.generation)
            .map_err(|e| format!("Failed to set up text generation: {e}"))?,
    );
    let tools = Arc::new(sqlpilot_tools::sql_toolkit(
        db.clone(),
        generator.clone(),
        config.agent.top_k,
    ));

    let agent = AgentLoop::new(generator, tools, AgentSettings::from_config(config))
        .with_renderer(Arc::new(ChatMlPromptRenderer::new(
            db.dialect(),
            config.agent.top_k,
        )))
        .with_stream_config(StreamClassifierConfig::from(&config.stream));

    let stream = stream && config.generation.streaming;
    info!(stream, database = %config.database.url, "Answering question");

    let outcome = if stream {
        stream_run(Arc::new(agent), question, show_steps).await?
    } else {
        let outcome = agent.run(question).await?;
        if show_steps {
            for step in &outcome.steps {
                print_step(step);
            }
        }
        outcome
    };

    println!("{}", answer_line(&outcome.answer));
    Ok(())
}

/// Drive a streaming run, printing visible text as it arrives.
///
/// Ctrl-C drops the event receiver, which cancels the run.
async fn stream_run(
    agent: Arc<AgentLoop>,
    question: &str,
    show_steps: bool,
) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let (mut rx, handle) = agent.spawn_stream(question, 64);
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    AgentStreamEvent::SegmentStart => {}
                    AgentStreamEvent::SegmentToken { content } => {
                        print!("{content}");
                        stdout.flush()?;
                    }
                    AgentStreamEvent::SegmentEnd => println!(),
                    AgentStreamEvent::ToolStart { name, input } => {
                        if let Some(notice) = query_notice(&name, &input) {
                            eprintln!("{notice}");
                        }
                    }
                    AgentStreamEvent::Step { step } => {
                        if show_steps {
                            print_step(&step);
                        }
                    }
                    AgentStreamEvent::Done { .. } => {}
                    AgentStreamEvent::Error { message } => eprintln!("  [Error] {message}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                eprintln!("  Cancelled.");
                break;
            }
        }
    }
    // A closed receiver cancels the run at its next checkpoint.
    drop(rx);

    let outcome = handle
        .await
        .map_err(|e| format!("Agent task failed: {e}"))??;
    Ok(outcome)
}

/// Shown before a query runs so the user sees the SQL being executed.
fn query_notice(tool: &str, input: &str) -> Option<String> {
    (tool == QUERY_TOOL).then(|| format!("executing sql:\n```sql\n{}\n```", input.trim()))
}

fn print_step(step: &Step) {
    if let AgentAction::ToolCall(call) = &step.action {
        eprintln!("  ── {} ──", call.name);
        eprintln!("  input: {}", call.input.as_text());
        for line in step.observation_excerpt().lines() {
            eprintln!("  | {line}");
        }
    }
}

fn answer_line(answer: &FinalAnswer) -> String {
    match answer.kind {
        AnswerKind::Answer => answer.text.clone(),
        AnswerKind::EarlyStopped => format!("[stopped early] {}", answer.text),
        AnswerKind::Unparsed => format!("[unparsed model output] {}", answer.text),
    }
}
