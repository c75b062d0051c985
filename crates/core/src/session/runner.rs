use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::clock::SessionClock;
use crate::error::{Capability, EvaluationError, SessionError, SpeechOutputError};
use crate::evaluation::{Evaluation, EvaluationRequest, Evaluator};
use crate::question::{DifficultyFilter, SessionPlan};
use crate::session::state::{Advisory, AnswerRecord, Phase, SessionSnapshot, SessionState, SessionStatus};
use crate::session::summary::{SessionSummary, SummarySink};
use crate::speech::{CaptureEvent, SpeechInput, SpeechOutput};

/// Pause between a scored answer and the next question.
pub const DEFAULT_ADVANCE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub role: String,
    pub difficulty: DifficultyFilter,
    pub advance_delay: Duration,
    pub tick_period: Duration,
}

impl SessionSettings {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            difficulty: DifficultyFilter::default(),
            advance_delay: DEFAULT_ADVANCE_DELAY,
            tick_period: Duration::from_secs(1),
        }
    }

    pub fn with_difficulty(mut self, difficulty: DifficultyFilter) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_advance_delay(mut self, advance_delay: Duration) -> Self {
        self.advance_delay = advance_delay;
        self
    }

    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period;
        self
    }
}

/// Identifies which question, and which attempt at it, an async result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tag {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperatorAction {
    Replay,
    StopListening,
    End,
}

pub(crate) enum SessionEvent {
    Operator {
        action: OperatorAction,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    SpeechSettled {
        tag: Tag,
        result: Result<(), SpeechOutputError>,
    },
    Capture {
        tag: Tag,
        event: CaptureEvent,
    },
    EvaluationSettled {
        tag: Tag,
        result: Result<Evaluation, EvaluationError>,
    },
    AdvanceDue {
        tag: Tag,
    },
    Tick,
}

/// Sequences one interview over the speech and evaluation capabilities.
///
/// Nothing runs until [`SessionRunner::start`]. From then on a single task owns
/// the session state; leaf components post their results back to it and the
/// operator drives it through a [`SessionHandle`].
pub struct SessionRunner {
    plan: SessionPlan,
    settings: SessionSettings,
    output: Arc<dyn SpeechOutput>,
    input: Arc<dyn SpeechInput>,
    evaluator: Arc<dyn Evaluator>,
    sink: Arc<dyn SummarySink>,
}

impl SessionRunner {
    pub fn new(
        plan: SessionPlan,
        settings: SessionSettings,
        output: Arc<dyn SpeechOutput>,
        input: Arc<dyn SpeechInput>,
        evaluator: Arc<dyn Evaluator>,
        sink: Arc<dyn SummarySink>,
    ) -> Self {
        Self {
            plan,
            settings,
            output,
            input,
            evaluator,
            sink,
        }
    }

    /// Checks the plan and capabilities, then spawns the session task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<SessionHandle, SessionError> {
        if self.plan.is_empty() {
            return Err(SessionError::EmptyPlan);
        }
        if !self.output.is_available() {
            return Err(SessionError::CapabilityUnavailable {
                capability: Capability::SpeechOutput,
            });
        }
        if !self.input.is_available() {
            return Err(SessionError::CapabilityUnavailable {
                capability: Capability::SpeechInput,
            });
        }
        if !self.evaluator.is_configured() {
            tracing::warn!("Evaluator has no credentials; answers will be recorded without scores.");
        }

        tracing::info!(
            "Starting {} interview with {} questions ({})",
            self.settings.role,
            self.plan.len(),
            self.settings.difficulty
        );

        let (actor, events, snapshots) = self.into_actor();
        let controller = SessionController {
            events: actor.events.clone(),
            snapshots,
        };
        let task = tokio::spawn(actor.run(events));
        Ok(SessionHandle { controller, task })
    }

    pub(crate) fn into_actor(
        self,
    ) -> (
        SessionActor,
        mpsc::UnboundedReceiver<SessionEvent>,
        watch::Receiver<SessionSnapshot>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = SessionState::new(self.plan);
        let (snapshots_tx, snapshots_rx) = watch::channel(state.snapshot());
        let clock = SessionClock::new(self.settings.tick_period);

        let actor = SessionActor {
            state,
            settings: self.settings,
            output: self.output,
            input: self.input,
            evaluator: self.evaluator,
            sink: self.sink,
            events: events_tx,
            snapshots: snapshots_tx,
            clock,
            speech_task: None,
            capture_task: None,
            advance_task: None,
        };
        (actor, events_rx, snapshots_rx)
    }
}

/// Cloneable access to a running session for operators and observers.
#[derive(Clone)]
pub struct SessionController {
    events: mpsc::UnboundedSender<SessionEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionController {
    /// Re-speaks the current question and restarts capture.
    pub async fn replay_current_question(&self) -> Result<(), SessionError> {
        self.send(OperatorAction::Replay).await
    }

    /// Submits whatever has been heard so far as the answer, even if it is empty.
    pub async fn stop_listening(&self) -> Result<(), SessionError> {
        self.send(OperatorAction::StopListening).await
    }

    /// Ends the session early, keeping the answers recorded so far.
    pub async fn end_interview(&self) -> Result<(), SessionError> {
        self.send(OperatorAction::End).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    async fn send(&self, action: OperatorAction) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        if self.events.send(SessionEvent::Operator { action, reply }).is_err() {
            return Err(self.closed_error());
        }
        match response.await {
            Ok(result) => result,
            Err(_) => Err(self.closed_error()),
        }
    }

    fn closed_error(&self) -> SessionError {
        if self.snapshots.borrow().status.is_terminal() {
            SessionError::NotInProgress
        } else {
            SessionError::RunnerStopped
        }
    }
}

pub struct SessionHandle {
    controller: SessionController,
    task: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    pub fn controller(&self) -> SessionController {
        self.controller.clone()
    }

    pub async fn replay_current_question(&self) -> Result<(), SessionError> {
        self.controller.replay_current_question().await
    }

    pub async fn stop_listening(&self) -> Result<(), SessionError> {
        self.controller.stop_listening().await
    }

    pub async fn end_interview(&self) -> Result<(), SessionError> {
        self.controller.end_interview().await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.controller.subscribe()
    }

    /// Waits for the session to finish and returns its summary.
    pub async fn wait(self) -> Result<SessionSummary, SessionError> {
        self.task.await.map_err(|e| {
            tracing::error!("Session task failed: {}", e);
            SessionError::RunnerStopped
        })
    }
}

/// The single owner of `SessionState`. Every mutation happens in `handle`.
pub(crate) struct SessionActor {
    pub(crate) state: SessionState,
    settings: SessionSettings,
    output: Arc<dyn SpeechOutput>,
    input: Arc<dyn SpeechInput>,
    evaluator: Arc<dyn Evaluator>,
    sink: Arc<dyn SummarySink>,
    events: mpsc::UnboundedSender<SessionEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
    clock: SessionClock,
    speech_task: Option<JoinHandle<()>>,
    capture_task: Option<JoinHandle<()>>,
    advance_task: Option<JoinHandle<()>>,
}

impl SessionActor {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) -> SessionSummary {
        self.begin();
        self.publish();

        while !self.state.status.is_terminal() {
            let Some(event) = events.recv().await else {
                break;
            };
            self.handle(event);
            self.publish();
        }

        if !self.state.status.is_terminal() {
            self.finish(SessionStatus::Aborted);
            self.publish();
        }

        let summary = self.summary();
        tracing::info!(
            "Session finished: {}/{} answered, average score {:.1}",
            summary.answered_questions,
            summary.total_questions,
            summary.average_score
        );
        if let Err(e) = self.sink.persist(&summary).await {
            tracing::error!("Failed to persist session summary: {:?}", e);
        }
        summary
    }

    pub(crate) fn tag(&self) -> Tag {
        Tag {
            index: self.state.current_index,
            generation: self.state.generation,
        }
    }

    fn is_current(&self, tag: Tag) -> bool {
        tag == self.tag() && self.state.status == SessionStatus::InProgress
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.state.snapshot());
    }

    pub(crate) fn begin(&mut self) {
        self.state.status = SessionStatus::InProgress;
        let events = self.events.clone();
        self.clock.start(move || {
            let _ = events.send(SessionEvent::Tick);
        });
        self.ask();
    }

    pub(crate) fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Operator { action, reply } => {
                let result = self.apply(action);
                self.publish();
                let _ = reply.send(result);
            }
            SessionEvent::SpeechSettled { tag, result } => self.on_speech_settled(tag, result),
            SessionEvent::Capture { tag, event } => self.on_capture(tag, event),
            SessionEvent::EvaluationSettled { tag, result } => self.on_evaluation_settled(tag, result),
            SessionEvent::AdvanceDue { tag } => {
                if self.is_current(tag) && self.state.phase == Phase::Advancing {
                    self.advance();
                } else {
                    tracing::debug!("Discarding stale advance for {:?}", tag);
                }
            }
            SessionEvent::Tick => {
                if self.state.status == SessionStatus::InProgress {
                    self.state.elapsed_seconds += 1;
                }
            }
        }
    }

    pub(crate) fn apply(&mut self, action: OperatorAction) -> Result<(), SessionError> {
        if self.state.status != SessionStatus::InProgress {
            return Err(SessionError::NotInProgress);
        }
        match action {
            OperatorAction::Replay => self.replay(),
            OperatorAction::StopListening => self.force_stop(),
            OperatorAction::End => {
                tracing::info!("Interview ended by operator at question {}", self.state.current_index + 1);
                self.finish(SessionStatus::Aborted);
            }
        }
        Ok(())
    }

    fn replay(&mut self) {
        match self.state.phase {
            Phase::Asking | Phase::Listening => {
                tracing::info!("Replaying question {}", self.state.current_index + 1);
                self.state.advisory = None;
                self.invalidate();
                self.ask();
            }
            Phase::Evaluating | Phase::Advancing => {
                tracing::debug!("Answer already recorded; ignoring replay.");
            }
        }
    }

    fn force_stop(&mut self) {
        if self.state.phase != Phase::Listening {
            tracing::debug!("Not listening; ignoring stop in phase {:?}", self.state.phase);
            return;
        }
        if self.state.listening {
            // The capture span answers with `Final` carrying the accumulated text.
            self.state.forced_stop = true;
            self.input.stop();
        } else {
            let transcript = self.state.transcript.clone();
            self.record_answer(transcript);
        }
    }

    /// Orphans every outstanding leaf operation.
    fn invalidate(&mut self) {
        self.state.generation += 1;
        self.halt_leaves();
    }

    fn halt_leaves(&mut self) {
        if self.state.speaking {
            self.output.cancel();
            self.state.speaking = false;
        }
        if self.state.listening {
            self.input.abort();
            self.state.listening = false;
        }
        for task in [
            self.speech_task.take(),
            self.capture_task.take(),
            self.advance_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }

    fn ask(&mut self) {
        let Some(question) = self.state.current_question().cloned() else {
            self.finish(SessionStatus::Completed);
            return;
        };

        self.state.phase = Phase::Asking;
        self.state.speaking = true;
        self.state.listening = false;
        self.state.forced_stop = false;
        self.state.transcript.clear();

        let tag = self.tag();
        let text = format!("Question {}. {}", tag.index + 1, question.text);
        tracing::info!("Asking: {}", text);

        let output = Arc::clone(&self.output);
        let events = self.events.clone();
        self.speech_task = Some(tokio::spawn(async move {
            let result = output.speak(&text).await;
            let _ = events.send(SessionEvent::SpeechSettled { tag, result });
        }));
    }

    fn on_speech_settled(&mut self, tag: Tag, result: Result<(), SpeechOutputError>) {
        if !self.is_current(tag) || self.state.phase != Phase::Asking {
            tracing::debug!("Discarding stale speech result for {:?}", tag);
            return;
        }
        self.state.speaking = false;
        self.speech_task = None;

        match result {
            Ok(()) => self.listen(),
            Err(e) => {
                tracing::warn!("Failed to speak question {}: {}", tag.index + 1, e);
                self.state.advisory = Some(Advisory::SpeechOutputFailed(e.to_string()));
            }
        }
    }

    fn listen(&mut self) {
        self.state.phase = Phase::Listening;
        let mut captures = match self.input.start() {
            Ok(captures) => captures,
            Err(e) => {
                tracing::warn!("Failed to start listening: {}", e);
                self.state.advisory = Some(Advisory::SpeechInputFailed(e.to_string()));
                return;
            }
        };
        self.state.listening = true;

        let tag = self.tag();
        let events = self.events.clone();
        self.capture_task = Some(tokio::spawn(async move {
            while let Some(event) = captures.recv().await {
                if events.send(SessionEvent::Capture { tag, event }).is_err() {
                    break;
                }
            }
        }));
    }

    fn on_capture(&mut self, tag: Tag, event: CaptureEvent) {
        if !self.is_current(tag) || self.state.phase != Phase::Listening {
            tracing::debug!("Discarding stale capture event for {:?}", tag);
            return;
        }

        match event {
            CaptureEvent::Interim(text) => {
                self.state.transcript = text;
            }
            CaptureEvent::Final(text) => {
                self.state.listening = false;
                self.capture_task = None;
                let answer = if text.trim().is_empty() {
                    self.state.transcript.clone()
                } else {
                    text
                };

                if !answer.trim().is_empty() || self.state.forced_stop {
                    self.record_answer(answer);
                } else {
                    tracing::info!("Heard nothing for question {}", tag.index + 1);
                    self.state.advisory = Some(Advisory::EmptyAnswer);
                }
            }
            CaptureEvent::Error(reason) => {
                self.state.listening = false;
                self.state.forced_stop = false;
                self.capture_task = None;
                tracing::warn!("Speech recognition failed: {}", reason);
                self.state.advisory = Some(Advisory::SpeechInputFailed(reason));
            }
        }
    }

    fn record_answer(&mut self, answer: String) {
        let index = self.state.current_index;
        if self.state.has_answer_for(index) {
            tracing::debug!("Question {} already has an answer", index + 1);
            return;
        }
        let Some(question) = self.state.current_question().cloned() else {
            return;
        };

        self.state.transcript = answer.clone();
        self.state.listening = false;
        self.state.answers.push(AnswerRecord {
            question_index: index,
            question: question.clone(),
            raw_answer_text: answer.clone(),
            evaluation: None,
            timestamp_completed: Utc::now(),
        });

        if answer.trim().is_empty() {
            tracing::info!("Question {} skipped without an answer", index + 1);
            self.advance();
            return;
        }

        self.state.phase = Phase::Evaluating;
        self.state.advisory = None;
        tracing::info!("Evaluating answer to question {}", index + 1);

        let tag = self.tag();
        let request = EvaluationRequest {
            question: question.text,
            answer,
            role: self.settings.role.clone(),
            difficulty: question.difficulty,
        };
        let evaluator = Arc::clone(&self.evaluator);
        let events = self.events.clone();
        // Left running on abort; its result is dropped by the tag check.
        tokio::spawn(async move {
            let result = evaluator.evaluate(request).await;
            let _ = events.send(SessionEvent::EvaluationSettled { tag, result });
        });
    }

    fn on_evaluation_settled(&mut self, tag: Tag, result: Result<Evaluation, EvaluationError>) {
        if !self.is_current(tag) || self.state.phase != Phase::Evaluating {
            tracing::debug!("Discarding stale evaluation for {:?}", tag);
            return;
        }

        match result {
            Ok(evaluation) => {
                tracing::info!("Question {} scored {:.1}/10", tag.index + 1, evaluation.score);
                if let Some(record) = self
                    .state
                    .answers
                    .iter_mut()
                    .find(|a| a.question_index == tag.index)
                {
                    record.evaluation = Some(evaluation);
                    record.timestamp_completed = Utc::now();
                }
                self.state.phase = Phase::Advancing;
                self.schedule_advance(tag);
            }
            Err(e) => {
                tracing::warn!("Failed to evaluate question {}: {}", tag.index + 1, e);
                self.state.advisory = Some(Advisory::EvaluationFailed {
                    question_index: tag.index,
                    reason: e.to_string(),
                });
                self.advance();
            }
        }
    }

    fn schedule_advance(&mut self, tag: Tag) {
        let delay = self.settings.advance_delay;
        let events = self.events.clone();
        self.advance_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::AdvanceDue { tag });
        }));
    }

    fn advance(&mut self) {
        self.invalidate();
        let next = self.state.current_index + 1;
        if next >= self.state.plan.len() {
            self.finish(SessionStatus::Completed);
        } else {
            self.state.current_index = next;
            // Advisories belong to the question that raised them. A failed score
            // names its own question and stays visible until the next answer.
            self.state.advisory = self
                .state
                .advisory
                .take()
                .filter(|a| matches!(a, Advisory::EvaluationFailed { .. }));
            self.ask();
        }
    }

    fn finish(&mut self, status: SessionStatus) {
        self.invalidate();
        self.clock.stop();
        self.state.status = status;
        self.state.forced_stop = false;
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary::build(
            &self.settings.role,
            self.settings.difficulty,
            self.state.plan.len(),
            self.state.answers.clone(),
            self.state.elapsed_seconds,
            Utc::now(),
            self.state.status == SessionStatus::Aborted,
        )
    }
}
