//! History sink: where completed steps and answers go to be persisted.
//!
//! Durable storage is the surrounding service's business. The core only
//! pushes completed steps and the final answer through this port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::HistoryError;
use crate::step::{FinalAnswer, RunId, Step};

/// Receives the output of agent runs.
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Record one completed step.
    async fn record_step(&self, run_id: &RunId, step: &Step) -> Result<(), HistoryError>;

    /// Record the final answer of a run together with the question asked.
    async fn record_answer(
        &self,
        run_id: &RunId,
        input: &str,
        answer: &FinalAnswer,
    ) -> Result<(), HistoryError>;
}

/// Everything recorded for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRecord {
    pub input: Option<String>,
    pub steps: Vec<Step>,
    pub answer: Option<FinalAnswer>,
}

/// A history sink that keeps everything in memory.
/// Useful for testing and ephemeral sessions.
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    runs: Arc<RwLock<Vec<(RunId, RunRecord)>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a run's record, if anything was recorded for it.
    pub async fn run(&self, run_id: &RunId) -> Option<RunRecord> {
        self.runs
            .read()
            .await
            .iter()
            .find(|(id, _)| id == run_id)
            .map(|(_, record)| record.clone())
    }

    /// Number of distinct runs recorded.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    async fn with_record<F>(&self, run_id: &RunId, f: F)
    where
        F: FnOnce(&mut RunRecord),
    {
        let mut runs = self.runs.write().await;
        match runs.iter_mut().find(|(id, _)| id == run_id) {
            Some((_, record)) => f(record),
            None => {
                let mut record = RunRecord::default();
                f(&mut record);
                runs.push((run_id.clone(), record));
            }
        }
    }
}

#[async_trait]
impl HistorySink for InMemoryHistory {
    async fn record_step(&self, run_id: &RunId, step: &Step) -> Result<(), HistoryError> {
        let step = step.clone();
        self.with_record(run_id, |record| record.steps.push(step))
            .await;
        Ok(())
    }

    async fn record_answer(
        &self,
        run_id: &RunId,
        input: &str,
        answer: &FinalAnswer,
    ) -> Result<(), HistoryError> {
        let input = input.to_string();
        let answer = answer.clone();
        self.with_record(run_id, |record| {
            record.input = Some(input);
            record.answer = Some(answer);
        })
        .await;
        Ok(())
    }
}
