//! Terminal stand-ins for speech: questions are printed, answers are typed.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use interview_core::error::{SessionError, SpeechInputError, SpeechOutputError};
use interview_core::session::SessionController;
use interview_core::speech::{CaptureEvent, SpeechInput, SpeechOutput};
use tokio::sync::{Notify, mpsc};

pub const DEFAULT_WORDS_PER_MINUTE: u32 = 170;

/// Shown when an answer is typed while no capture span is open.
pub const NOT_LISTENING_HINT: &str =
    "[notice] not listening right now. Type :replay to hear the question and answer again, or :stop to skip.";

/// Prints each utterance and holds it for as long as reading it aloud would take.
pub struct ConsoleSpeechOutput {
    words_per_minute: u32,
    cancel: Notify,
}

impl ConsoleSpeechOutput {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            cancel: Notify::new(),
        }
    }

    pub fn speaking_time(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as u64;
        Duration::from_millis(words * 60_000 / u64::from(self.words_per_minute))
    }
}

impl Default for ConsoleSpeechOutput {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS_PER_MINUTE)
    }
}

#[async_trait]
impl SpeechOutput for ConsoleSpeechOutput {
    fn is_available(&self) -> bool {
        true
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechOutputError> {
        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        // Register before printing so a cancel issued right after is not lost.
        cancelled.as_mut().enable();

        println!("\n[interviewer] {text}");
        tokio::select! {
            _ = tokio::time::sleep(self.speaking_time(text)) => Ok(()),
            _ = cancelled => Err(SpeechOutputError::Cancelled),
        }
    }

    fn cancel(&self) {
        self.cancel.notify_waiters();
    }
}

struct CaptureSpan {
    events: mpsc::UnboundedSender<CaptureEvent>,
    lines: Vec<String>,
}

impl CaptureSpan {
    fn transcript(&self) -> String {
        self.lines.join(" ")
    }
}

/// Typed answers. Each line extends the transcript; a blank line ends the answer.
#[derive(Default)]
pub struct ConsoleSpeechInput {
    span: Mutex<Option<CaptureSpan>>,
}

impl ConsoleSpeechInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn span(&self) -> MutexGuard<'_, Option<CaptureSpan>> {
        self.span.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_capturing(&self) -> bool {
        self.span().is_some()
    }

    /// Feeds one typed line into the active span. Returns false when nothing is listening.
    pub fn push_line(&self, line: &str) -> bool {
        let mut guard = self.span();
        let Some(span) = guard.as_mut() else {
            return false;
        };

        let line = line.trim();
        if line.is_empty() {
            if let Some(span) = guard.take() {
                let _ = span.events.send(CaptureEvent::Final(span.transcript()));
            }
        } else {
            span.lines.push(line.to_string());
            let _ = span.events.send(CaptureEvent::Interim(span.transcript()));
        }
        true
    }
}

impl SpeechInput for ConsoleSpeechInput {
    fn is_available(&self) -> bool {
        true
    }

    fn start(&self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, SpeechInputError> {
        let mut guard = self.span();
        if guard.is_some() {
            return Err(SpeechInputError::AlreadyActive);
        }
        let (events, receiver) = mpsc::unbounded_channel();
        *guard = Some(CaptureSpan {
            events,
            lines: Vec::new(),
        });
        println!("[listening] type your answer, then an empty line to submit");
        Ok(receiver)
    }

    fn stop(&self) {
        if let Some(span) = self.span().take() {
            let _ = span.events.send(CaptureEvent::Final(span.transcript()));
        }
    }

    fn abort(&self) {
        self.span().take();
    }
}

/// What a line typed at the console means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Replay,
    Stop,
    End,
    Unknown(String),
    Answer(String),
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let trimmed = line.trim();
    match trimmed.strip_prefix(':') {
        Some(command) => match command.trim().to_lowercase().as_str() {
            "replay" | "r" => ConsoleCommand::Replay,
            "stop" | "s" => ConsoleCommand::Stop,
            "end" | "quit" | "q" => ConsoleCommand::End,
            _ => ConsoleCommand::Unknown(trimmed.to_string()),
        },
        None => ConsoleCommand::Answer(trimmed.to_string()),
    }
}

/// Routes typed lines to the session until it ends or stdin closes.
pub async fn route_console(
    mut lines: mpsc::UnboundedReceiver<String>,
    controller: SessionController,
    input: std::sync::Arc<ConsoleSpeechInput>,
) {
    while let Some(line) = lines.recv().await {
        let result = match parse_line(&line) {
            ConsoleCommand::Replay => controller.replay_current_question().await,
            ConsoleCommand::Stop => controller.stop_listening().await,
            ConsoleCommand::End => controller.end_interview().await,
            ConsoleCommand::Unknown(command) => {
                println!("Unknown command {command}. Use :replay, :stop or :end.");
                Ok(())
            }
            ConsoleCommand::Answer(text) => {
                if !input.push_line(&text) && !text.is_empty() {
                    tracing::debug!("Ignoring input while not listening: {}", text);
                    println!("{}", NOT_LISTENING_HINT);
                }
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(SessionError::NotInProgress) => break,
            Err(e) => {
                tracing::warn!("Operator action failed: {}", e);
                break;
            }
        }
    }
    tracing::debug!("Console router stopped.");
}
