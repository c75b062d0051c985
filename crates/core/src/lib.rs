//! Core of the mock interview: question plans, the session state machine, and
//! the capability traits it drives.
//!
//! The runner only talks to [`SpeechOutput`], [`SpeechInput`], [`Evaluator`]
//! and [`SummarySink`]. Concrete adapters live in the service crate.

pub mod clock;
pub mod error;
pub mod evaluation;
pub mod evaluator_client;
pub mod question;
pub mod session;
pub mod speech;

pub use clock::{SessionClock, format_elapsed};
pub use error::{
    Capability, EvaluationError, QuestionBankError, SessionError, SpeechInputError, SpeechOutputError,
};
pub use evaluation::{Evaluation, EvaluationRequest, Evaluator};
pub use evaluator_client::{EvaluatorClient, EvaluatorConfig, EvaluatorConfigBuilder};
pub use question::{Difficulty, DifficultyFilter, Question, QuestionBank, RoleQuestions, SessionPlan};
pub use session::{
    Advisory, AnswerRecord, Phase, SessionController, SessionHandle, SessionRunner, SessionSettings,
    SessionSnapshot, SessionStatus, SessionSummary, SummarySink,
};
pub use speech::{CaptureEvent, SpeechInput, SpeechOutput};
