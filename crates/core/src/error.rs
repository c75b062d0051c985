//! Error taxonomy shared by the session runner and its collaborators.
//!
//! Only `SessionError::EmptyPlan` and `SessionError::CapabilityUnavailable`
//! stop a session from starting. Everything else raised while a session is in
//! progress is absorbed into session state as an advisory.

use std::fmt;

use thiserror::Error;

/// A host capability the runner needs before it can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SpeechOutput,
    SpeechInput,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::SpeechOutput => f.write_str("text-to-speech"),
            Capability::SpeechInput => f.write_str("speech-to-text"),
        }
    }
}

/// Errors surfaced by `SessionRunner` and `SessionHandle`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session plan contains no questions")]
    EmptyPlan,
    #[error("{capability} is not available on this host")]
    CapabilityUnavailable { capability: Capability },
    #[error("session is not in progress")]
    NotInProgress,
    #[error("session runner stopped unexpectedly")]
    RunnerStopped,
}

/// Errors raised by a `SpeechOutput` utterance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechOutputError {
    #[error("utterance was cancelled")]
    Cancelled,
    #[error("speech synthesis is unavailable")]
    Unavailable,
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

/// Errors raised when a `SpeechInput` capture span cannot start or fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechInputError {
    #[error("a capture span is already active")]
    AlreadyActive,
    #[error("speech recognition is unavailable")]
    Unavailable,
    #[error("speech recognition failed: {0}")]
    Recognition(String),
}

/// Errors raised by an `Evaluator`. None of them are fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("evaluator is not configured: {0}")]
    Configuration(String),
    #[error("answer rejected: {0}")]
    Validation(String),
    #[error("evaluation service failed: {0}")]
    Service(String),
}

impl From<reqwest::Error> for EvaluationError {
    fn from(err: reqwest::Error) -> Self {
        EvaluationError::Service(err.to_string())
    }
}

/// Errors raised while selecting questions from a bank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionBankError {
    #[error("no questions are registered for role '{0}'")]
    UnknownRole(String),
    #[error("'{0}' is not a difficulty (expected Easy, Medium or Hard)")]
    InvalidDifficulty(String),
}
