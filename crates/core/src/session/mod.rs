//! The interview state machine and its observable state.

mod runner;
mod state;
mod summary;

#[cfg(test)]
mod tests;

pub use runner::{DEFAULT_ADVANCE_DELAY, SessionController, SessionHandle, SessionRunner, SessionSettings};
pub use state::{Advisory, AnswerRecord, Phase, SessionSnapshot, SessionStatus};
pub use summary::{SessionSummary, SummarySink};
