//! Speech output through an external synthesiser such as `espeak` or `say`.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use interview_core::error::SpeechOutputError;
use interview_core::speech::SpeechOutput;
use tokio::process::Command;
use tokio::sync::Notify;

/// Runs `<program> [args...] <text>` once per utterance.
#[derive(Debug)]
pub struct CommandSpeechOutput {
    program: String,
    args: Vec<String>,
    cancel: Notify,
}

impl CommandSpeechOutput {
    /// Splits a command line such as `"espeak -s 160"`. Returns `None` when it is blank.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            cancel: Notify::new(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn resolve(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }
        let path = env::var_os("PATH")?;
        env::split_paths(&path)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }
}

#[async_trait]
impl SpeechOutput for CommandSpeechOutput {
    fn is_available(&self) -> bool {
        self.resolve().is_some()
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechOutputError> {
        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechOutputError::Synthesis(format!("failed to run {}: {}", self.program, e)))?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| SpeechOutputError::Synthesis(e.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(SpeechOutputError::Synthesis(format!("{} exited with {}", self.program, status)))
                }
            }
            _ = cancelled => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to stop {}: {}", self.program, e);
                }
                Err(SpeechOutputError::Cancelled)
            }
        }
    }

    fn cancel(&self) {
        self.cancel.notify_waiters();
    }
}
