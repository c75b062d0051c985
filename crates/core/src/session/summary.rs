use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::question::DifficultyFilter;
use crate::session::state::AnswerRecord;

/// The final record of a session, built once when it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub role: String,
    pub difficulty: DifficultyFilter,
    pub total_questions: usize,
    pub answered_questions: usize,
    /// Mean of the scores that were actually evaluated, or 0 when none were.
    pub average_score: f64,
    pub answers: Vec<AnswerRecord>,
    pub duration_seconds: u64,
    pub completed_at: DateTime<Utc>,
    pub ended_early: bool,
}

impl SessionSummary {
    pub fn build(
        role: &str,
        difficulty: DifficultyFilter,
        total_questions: usize,
        answers: Vec<AnswerRecord>,
        duration_seconds: u64,
        completed_at: DateTime<Utc>,
        ended_early: bool,
    ) -> Self {
        let answered_questions = answers.iter().filter(|a| !a.is_blank()).count();
        let scores: Vec<f64> = answers
            .iter()
            .filter_map(|a| a.evaluation.as_ref().map(|e| e.score))
            .collect();
        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        Self {
            role: role.to_string(),
            difficulty,
            total_questions,
            answered_questions,
            average_score,
            answers,
            duration_seconds,
            completed_at,
            ended_early,
        }
    }

    pub fn evaluated_questions(&self) -> usize {
        self.answers.iter().filter(|a| a.evaluation.is_some()).count()
    }
}

/// Receives the summary of every finished session. The runner never persists anything itself.
#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn persist(&self, summary: &SessionSummary) -> anyhow::Result<()>;
}
