use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::question::Difficulty;

/// Structured feedback for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub ideal_answer: String,
    /// Always within `[0, 10]`.
    pub score: f64,
    pub strengths: Vec<String>,
    pub missing_concepts: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub question: String,
    pub answer: String,
    pub role: String,
    pub difficulty: Difficulty,
}

// The runner only sees this trait, so tests can swap in `MockEvaluator` and
// the CLI can point at any chat-completions endpoint.
//
// Implementations must not retry; a failed call is recorded as a missing
// evaluation and the session moves on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<Evaluation, EvaluationError>;

    /// Whether a credential is present. Used for an early warning only.
    fn is_configured(&self) -> bool {
        true
    }
}
