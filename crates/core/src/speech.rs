//! Capability interfaces for speech synthesis and recognition.
//!
//! Any platform's speech SDK can sit behind these traits. Neither side knows
//! about the other; `SessionRunner` is the only thing that sequences them.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::error::{SpeechInputError, SpeechOutputError};

/// Speaks one utterance at a time.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    fn is_available(&self) -> bool;

    /// Resolves once playback finishes.
    ///
    /// Fails with `SpeechOutputError::Cancelled` if `cancel` is called while
    /// the utterance is still playing.
    async fn speak(&self, text: &str) -> Result<(), SpeechOutputError>;

    /// Stops the active utterance, if any.
    fn cancel(&self);
}

/// Updates produced during one capture span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// The transcript so far. May be sent any number of times.
    Interim(String),
    /// The span ended normally. The text may be empty.
    Final(String),
    /// The span ended with a recognition failure.
    Error(String),
}

/// Continuous speech recognition.
///
/// A span started with `start` delivers zero or more `Interim` events followed
/// by exactly one `Final` or `Error`, after which the channel closes. `abort`
/// closes the channel without a terminal event.
#[cfg_attr(test, automock)]
pub trait SpeechInput: Send + Sync {
    fn is_available(&self) -> bool;

    /// Begins a capture span. Fails with `AlreadyActive` while one is running.
    fn start(&self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, SpeechInputError>;

    /// Ends the span gracefully, emitting `Final` with whatever has accumulated.
    fn stop(&self);

    /// Ends the span immediately without a terminal event.
    fn abort(&self);
}
