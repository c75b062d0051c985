use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evaluation::Evaluation;
use crate::question::{Question, SessionPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Setup,
    InProgress,
    Completed,
    Aborted,
}

impl SessionStatus {
    /// Terminal sessions accept no further mutating events.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }
}

/// Sub-state of an in-progress session for the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Asking,
    Listening,
    Evaluating,
    Advancing,
}

/// A recoverable problem the operator may want to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advisory {
    /// The question could not be spoken. Replay to try again.
    SpeechOutputFailed(String),
    /// Recognition failed. Replay, or stop to submit what was heard.
    SpeechInputFailed(String),
    /// The capture span ended with nothing said. Replay to answer, or stop to skip.
    EmptyAnswer,
    /// Scoring failed for `question_index`; the answer is kept without an evaluation.
    EvaluationFailed { question_index: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_index: usize,
    pub question: Question,
    pub raw_answer_text: String,
    pub evaluation: Option<Evaluation>,
    pub timestamp_completed: DateTime<Utc>,
}

impl AnswerRecord {
    pub fn is_blank(&self) -> bool {
        self.raw_answer_text.trim().is_empty()
    }
}

/// Live session state. Owned by the runner task and never shared.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) status: SessionStatus,
    pub(crate) phase: Phase,
    pub(crate) current_index: usize,
    pub(crate) generation: u64,
    pub(crate) elapsed_seconds: u64,
    pub(crate) answers: Vec<AnswerRecord>,
    pub(crate) plan: SessionPlan,
    pub(crate) transcript: String,
    pub(crate) speaking: bool,
    pub(crate) listening: bool,
    pub(crate) forced_stop: bool,
    pub(crate) advisory: Option<Advisory>,
}

impl SessionState {
    pub(crate) fn new(plan: SessionPlan) -> Self {
        Self {
            status: SessionStatus::Setup,
            phase: Phase::Asking,
            current_index: 0,
            generation: 0,
            elapsed_seconds: 0,
            answers: Vec::new(),
            plan,
            transcript: String::new(),
            speaking: false,
            listening: false,
            forced_stop: false,
            advisory: None,
        }
    }

    pub(crate) fn current_question(&self) -> Option<&Question> {
        self.plan.get(self.current_index)
    }

    pub(crate) fn has_answer_for(&self, index: usize) -> bool {
        self.answers.iter().any(|a| a.question_index == index)
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            phase: self.phase,
            current_index: self.current_index,
            total_questions: self.plan.len(),
            current_question: self.current_question().cloned(),
            generation: self.generation,
            elapsed_seconds: self.elapsed_seconds,
            transcript: self.transcript.clone(),
            speaking: self.speaking,
            listening: self.listening,
            advisory: self.advisory.clone(),
            answers: self.answers.clone(),
        }
    }
}

/// An immutable copy of session state for observers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub phase: Phase,
    pub current_index: usize,
    pub total_questions: usize,
    pub current_question: Option<Question>,
    pub generation: u64,
    pub elapsed_seconds: u64,
    /// Transcript of the active or most recent capture span.
    pub transcript: String,
    pub speaking: bool,
    pub listening: bool,
    pub advisory: Option<Advisory>,
    pub answers: Vec<AnswerRecord>,
}
