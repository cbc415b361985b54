//! End-to-end tests for the SQLPilot agent.
//!
//! These tests run the whole pipeline (prompt, scripted model, parser,
//! real SQL toolkit over in-memory SQLite) from question to answer.

use std::sync::{Arc, Mutex};

use sqlpilot_agent::{AgentLoop, AgentSettings, AgentStreamEvent};
use sqlpilot_config::{AppConfig, EarlyStoppingMethod};
use sqlpilot_core::{
    AgentAction, AnswerKind, FragmentStream, GenerationError, GenerationRequest, Generator,
    InMemoryHistory,
};
use sqlpilot_tools::{SqlDatabase, sql_toolkit};
use tokio::sync::mpsc;

// ── Mock Generator ───────────────────────────────────────────────────────

/// A mock generator that returns scripted completions in sequence.
///
/// Each completion is a list of fragments; streaming calls send them one by
/// one, whole calls join them.
struct ScriptedGenerator {
    completions: Mutex<Vec<Vec<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(completions: Vec<Vec<&str>>) -> Self {
        Self {
            completions: Mutex::new(
                completions
                    .into_iter()
                    .map(|c| c.into_iter().map(String::from).collect())
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| vec![*t]).collect())
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }

    fn next(&self, request: GenerationRequest) -> Vec<String> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.prompt);
            prompts.len()
        };
        let mut completions = self.completions.lock().unwrap();
        if completions.is_empty() {
            panic!("ScriptedGenerator exhausted: call #{call}");
        }
        completions.remove(0)
    }
}

#[async_trait::async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        Ok(self.next(request).concat())
    }

    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<FragmentStream, GenerationError> {
        let fragments = self.next(request);
        let (tx, rx) = mpsc::channel(fragments.len().max(1));
        for fragment in fragments {
            let _ = tx.send(Ok(fragment)).await;
        }
        Ok(rx)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

async fn warehouse() -> Arc<SqlDatabase> {
    let db = SqlDatabase::connect("sqlite::memory:").await.unwrap();
    for sql in [
        "CREATE TABLE artists (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE albums (id INTEGER PRIMARY KEY, artist_id INTEGER, title TEXT, year INTEGER)",
        "INSERT INTO artists VALUES (1, 'Nina Simone'), (2, 'Miles Davis')",
        "INSERT INTO albums VALUES (1, 2, 'Kind of Blue', 1959), (2, 2, 'Bitches Brew', 1970), (3, 1, 'Pastel Blues', 1965)",
    ] {
        sqlx::query(sql).execute(db.pool()).await.unwrap();
    }
    Arc::new(db)
}

fn call(name: &str, input: &str) -> String {
    format!(
        "Thought: I should use {name}.\n```json\n{}\n```",
        serde_json::json!({ "tool_name": name, "tool_input": input })
    )
}

fn agent(generator: Arc<ScriptedGenerator>, db: Arc<SqlDatabase>, settings: AgentSettings) -> AgentLoop {
    let tools = Arc::new(sql_toolkit(db, generator.clone(), 10));
    AgentLoop::new(generator, tools, settings)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_explores_schema_then_answers() {
    let db = warehouse().await;
    let generator = Arc::new(ScriptedGenerator::texts(&[
        &call("sql_db_list_tables", ""),
        &call("sql_db_schema", "albums, artists"),
        &call(
            "sql_db_query",
            "SELECT COUNT(*) FROM albums a JOIN artists r ON a.artist_id = r.id WHERE r.name = 'Miles Davis'",
        ),
        "Thought: I know the answer.\nFinal Answer: Miles Davis has 2 albums.",
    ]));

    let outcome = agent(generator.clone(), db, AgentSettings::default())
        .run("How many albums does Miles Davis have?")
        .await
        .unwrap();

    assert_eq!(outcome.answer.text, "Miles Davis has 2 albums.");
    assert_eq!(outcome.answer.kind, AnswerKind::Answer);
    assert_eq!(outcome.steps.len(), 3);
    assert_eq!(generator.calls(), 4);

    assert_eq!(outcome.steps[0].observation, "albums, artists");
    assert!(outcome.steps[1].observation.contains("CREATE TABLE albums"));
    assert!(outcome.steps[1].observation.contains("Kind of Blue"));
    assert_eq!(outcome.steps[2].observation, "[(2,)]");

    // Each observation is fed back into the next prompt.
    assert!(generator.prompt(3).contains("[(2,)]"));
    assert!(generator.prompt(3).contains("How many albums does Miles Davis have?"));
}

#[tokio::test]
async fn e2e_sql_error_becomes_observation_and_run_recovers() {
    let db = warehouse().await;
    let generator = Arc::new(ScriptedGenerator::texts(&[
        &call("sql_db_query", "SELECT title FROM album"),
        &call("sql_db_query", "SELECT title FROM albums WHERE year < 1960"),
        "Final Answer: Kind of Blue",
    ]));

    let outcome = agent(generator, db, AgentSettings::default())
        .run("Which album came out before 1960?")
        .await
        .unwrap();

    assert_eq!(outcome.answer.text, "Kind of Blue");
    assert!(outcome.steps[0].observation.starts_with("Error:"));
    assert!(outcome.steps[0].observation.contains("album"));
    assert_eq!(outcome.steps[1].observation, "[('Kind of Blue',)]");
}

#[tokio::test]
async fn e2e_query_checker_uses_the_same_model() {
    let db = warehouse().await;
    let generator = Arc::new(ScriptedGenerator::texts(&[
        &call("sql_db_query_checker", "SELECT name FROM artist"),
        // The checker's own completion.
        "```sql\nSELECT name FROM artists ORDER BY name\n```",
        &call("sql_db_query", "SELECT name FROM artists ORDER BY name"),
        "Final Answer: Miles Davis and Nina Simone",
    ]));

    let outcome = agent(generator.clone(), db, AgentSettings::default())
        .run("Who are the artists?")
        .await
        .unwrap();

    assert_eq!(generator.calls(), 4);
    assert!(generator.prompt(1).contains("Double check the SQLite query"));
    assert_eq!(
        outcome.steps[0].observation,
        "SELECT name FROM artists ORDER BY name"
    );
    assert_eq!(
        outcome.steps[1].observation,
        "[('Miles Davis',), ('Nina Simone',)]"
    );
}

#[tokio::test]
async fn e2e_unknown_tool_lists_real_tools() {
    let db = warehouse().await;
    let generator = Arc::new(ScriptedGenerator::texts(&[
        &call("sql_db_describe", "albums"),
        "Final Answer: done",
    ]));

    let outcome = agent(generator, db, AgentSettings::default())
        .run("Describe albums")
        .await
        .unwrap();

    let observation = &outcome.steps[0].observation;
    assert!(observation.starts_with("sql_db_describe is not a valid tool"));
    assert!(observation.contains("sql_db_schema"));
}

#[tokio::test]
async fn e2e_force_stop_after_budget() {
    let db = warehouse().await;
    let generator = Arc::new(ScriptedGenerator::texts(&[
        &call("sql_db_list_tables", ""),
        &call("sql_db_list_tables", ""),
    ]));

    let settings = AgentSettings::default()
        .with_max_iterations(2)
        .with_early_stopping(EarlyStoppingMethod::Force);
    let outcome = agent(generator.clone(), db, settings)
        .run("Loop forever")
        .await
        .unwrap();

    assert_eq!(outcome.answer.kind, AnswerKind::EarlyStopped);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn e2e_generate_stop_asks_for_conclusion() {
    let db = warehouse().await;
    let generator = Arc::new(ScriptedGenerator::texts(&[
        &call("sql_db_list_tables", ""),
        "Final Answer: There are two tables.",
    ]));

    let settings = AgentSettings::default()
        .with_max_iterations(1)
        .with_early_stopping(EarlyStoppingMethod::Generate);
    let outcome = agent(generator.clone(), db, settings)
        .run("How many tables?")
        .await
        .unwrap();

    assert_eq!(outcome.answer.text, "There are two tables.");
    assert_eq!(generator.calls(), 2);
    assert!(generator.prompt(1).contains("albums, artists"));
}

#[tokio::test]
async fn e2e_streaming_run_emits_visible_text_and_query_notice() {
    let db = warehouse().await;
    let query = call("sql_db_query", "SELECT COUNT(*) FROM artists");
    let generator = Arc::new(ScriptedGenerator::new(vec![
        vec!["Thought", ":", " Count", " the artists.", "\n", &query[query.find("```").unwrap()..]],
        vec!["Thought", ":", " Two", " artists.", "\nFinal Answer: 2"],
    ]));

    let agent = Arc::new(agent(generator, db, AgentSettings::default()));
    let (mut rx, handle) = agent.spawn_stream("How many artists?", 16);

    let mut visible = String::new();
    let mut notices = Vec::new();
    let mut steps = 0;
    let mut done = None;
    while let Some(event) = rx.recv().await {
        match event {
            AgentStreamEvent::SegmentToken { content } => visible.push_str(&content),
            AgentStreamEvent::ToolStart { name, input } => notices.push((name, input)),
            AgentStreamEvent::Step { .. } => steps += 1,
            AgentStreamEvent::Done { answer, .. } => done = Some(answer),
            _ => {}
        }
    }

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.answer.text, "2");
    assert_eq!(done.unwrap().text, "2");
    assert_eq!(steps, 1);
    assert_eq!(
        notices,
        vec![("sql_db_query".to_string(), "SELECT COUNT(*) FROM artists".to_string())]
    );
    assert!(visible.contains(" Count the artists."));
    assert!(visible.contains(" Two artists."));
    assert!(!visible.starts_with("Thought"));
}

#[tokio::test]
async fn e2e_history_records_steps_and_answer() {
    let db = warehouse().await;
    let generator = Arc::new(ScriptedGenerator::texts(&[
        &call("sql_db_list_tables", ""),
        "Final Answer: albums and artists",
    ]));
    let history = Arc::new(InMemoryHistory::new());

    let outcome = agent(generator, db, AgentSettings::default())
        .with_history(history.clone())
        .run("What tables exist?")
        .await
        .unwrap();

    let record = history.run(&outcome.run_id).await.unwrap();
    assert_eq!(record.input.as_deref(), Some("What tables exist?"));
    assert_eq!(record.answer.unwrap().text, "albums and artists");
    assert!(matches!(record.steps[0].action, AgentAction::ToolCall(_)));
    assert!(record.steps.last().unwrap().is_terminal());
}

#[tokio::test]
async fn e2e_settings_follow_config() {
    let mut config = AppConfig::default();
    config.agent.max_iterations = 1;

    let db = warehouse().await;
    let generator = Arc::new(ScriptedGenerator::texts(&[&call("sql_db_list_tables", "")]));
    let outcome = agent(generator, db, AgentSettings::from_config(&config))
        .run("Anything")
        .await
        .unwrap();

    assert_eq!(outcome.iterations, 1);
    assert!(outcome.answer.is_early_stopped());
}
