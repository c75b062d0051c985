use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};

use super::runner::{OperatorAction, SessionEvent};
use super::*;
use crate::error::{Capability, EvaluationError, SessionError, SpeechInputError, SpeechOutputError};
use crate::evaluation::{Evaluation, EvaluationRequest, Evaluator, MockEvaluator};
use crate::question::{Difficulty, DifficultyFilter, Question, SessionPlan};
use crate::speech::{CaptureEvent, MockSpeechInput, MockSpeechOutput, SpeechInput, SpeechOutput};

const WAIT: Duration = Duration::from_secs(30);

/// Speaks instantly, or fails with whatever has been queued.
#[derive(Default)]
struct ScriptedOutput {
    spoken: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<SpeechOutputError>>,
    cancels: Mutex<usize>,
}

impl ScriptedOutput {
    fn fail_next(&self, error: SpeechOutputError) {
        self.failures.lock().unwrap().push_back(error);
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechOutput for ScriptedOutput {
    fn is_available(&self) -> bool {
        true
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechOutputError> {
        self.spoken.lock().unwrap().push(text.to_string());
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn cancel(&self) {
        *self.cancels.lock().unwrap() += 1;
    }
}

/// A capture source the test speaks into directly.
#[derive(Default)]
struct ScriptedInput {
    span: Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>,
    heard: Mutex<String>,
    starts: Mutex<usize>,
    aborts: Mutex<usize>,
}

impl ScriptedInput {
    fn interim(&self, text: &str) {
        *self.heard.lock().unwrap() = text.to_string();
        if let Some(span) = self.span.lock().unwrap().as_ref() {
            span.send(CaptureEvent::Interim(text.to_string())).unwrap();
        }
    }

    fn finish(&self, text: &str) {
        let span = self.span.lock().unwrap().take().expect("no active capture span");
        span.send(CaptureEvent::Final(text.to_string())).unwrap();
    }

    fn fail(&self, reason: &str) {
        let span = self.span.lock().unwrap().take().expect("no active capture span");
        span.send(CaptureEvent::Error(reason.to_string())).unwrap();
    }

    fn starts(&self) -> usize {
        *self.starts.lock().unwrap()
    }

    fn aborts(&self) -> usize {
        *self.aborts.lock().unwrap()
    }
}

impl SpeechInput for ScriptedInput {
    fn is_available(&self) -> bool {
        true
    }

    fn start(&self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, SpeechInputError> {
        let mut span = self.span.lock().unwrap();
        if span.is_some() {
            return Err(SpeechInputError::AlreadyActive);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *span = Some(tx);
        self.heard.lock().unwrap().clear();
        *self.starts.lock().unwrap() += 1;
        Ok(rx)
    }

    fn stop(&self) {
        if let Some(span) = self.span.lock().unwrap().take() {
            let heard = self.heard.lock().unwrap().clone();
            let _ = span.send(CaptureEvent::Final(heard));
        }
    }

    fn abort(&self) {
        self.span.lock().unwrap().take();
        *self.aborts.lock().unwrap() += 1;
    }
}

type PendingEvaluation = (EvaluationRequest, oneshot::Sender<Result<Evaluation, EvaluationError>>);

/// Holds every evaluation until the test answers it.
struct GatedEvaluator {
    requests: mpsc::UnboundedSender<PendingEvaluation>,
}

#[async_trait]
impl Evaluator for GatedEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<Evaluation, EvaluationError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send((request, reply))
            .map_err(|_| EvaluationError::Service("test dropped the evaluator".to_string()))?;
        response
            .await
            .unwrap_or_else(|_| Err(EvaluationError::Service("no reply".to_string())))
    }
}

#[derive(Default)]
struct RecordingSink {
    summaries: Mutex<Vec<SessionSummary>>,
}

#[async_trait]
impl SummarySink for RecordingSink {
    async fn persist(&self, summary: &SessionSummary) -> anyhow::Result<()> {
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

struct Harness {
    output: Arc<ScriptedOutput>,
    input: Arc<ScriptedInput>,
    evaluations: mpsc::UnboundedReceiver<PendingEvaluation>,
    sink: Arc<RecordingSink>,
    runner: SessionRunner,
}

fn question(id: &str, text: &str) -> Question {
    Question {
        id: id.to_string(),
        text: text.to_string(),
        difficulty: Difficulty::Medium,
        topic_name: "Cloud".to_string(),
        topic_category: "Infrastructure".to_string(),
    }
}

fn docker_and_vpc() -> SessionPlan {
    SessionPlan::new(vec![
        question("docker-1", "Explain Docker?"),
        question("vpc-1", "What is a VPC?"),
    ])
}

fn evaluation(score: f64) -> Evaluation {
    Evaluation {
        ideal_answer: "Docker packages an application with its dependencies.".to_string(),
        score,
        strengths: vec!["Mentions isolation".to_string()],
        missing_concepts: vec!["Images".to_string()],
        suggestions: vec!["Compare with virtual machines".to_string()],
    }
}

fn settings() -> SessionSettings {
    SessionSettings::new("DevOps Engineer").with_difficulty(DifficultyFilter::Only(Difficulty::Medium))
}

fn harness(plan: SessionPlan) -> Harness {
    let output = Arc::new(ScriptedOutput::default());
    let input = Arc::new(ScriptedInput::default());
    let (requests, evaluations) = mpsc::unbounded_channel();
    let sink = Arc::new(RecordingSink::default());
    let runner = SessionRunner::new(
        plan,
        settings(),
        output.clone(),
        input.clone(),
        Arc::new(GatedEvaluator { requests }),
        sink.clone(),
    );
    Harness {
        output,
        input,
        evaluations,
        sink,
        runner,
    }
}

async fn wait_until<F>(snapshots: &mut watch::Receiver<SessionSnapshot>, condition: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    tokio::time::timeout(WAIT, snapshots.wait_for(condition))
        .await
        .expect("timed out waiting for session state")
        .expect("session task went away")
        .clone()
}

fn listening_at(index: usize) -> impl FnMut(&SessionSnapshot) -> bool {
    move |s| s.current_index == index && s.phase == Phase::Listening && s.listening
}

#[tokio::test]
async fn empty_plan_is_rejected() {
    // Arrange
    let h = harness(SessionPlan::new(vec![]));

    // Act
    let result = h.runner.start();

    // Assert
    assert!(matches!(result, Err(SessionError::EmptyPlan)));
    assert!(h.output.spoken().is_empty());
}

#[tokio::test]
async fn unavailable_speech_output_prevents_start() {
    let mut output = MockSpeechOutput::new();
    output.expect_is_available().return_const(false);
    output.expect_speak().never();
    let mut input = MockSpeechInput::new();
    input.expect_is_available().return_const(true);
    input.expect_start().never();

    let runner = SessionRunner::new(
        docker_and_vpc(),
        settings(),
        Arc::new(output),
        Arc::new(input),
        Arc::new(MockEvaluator::new()),
        Arc::new(RecordingSink::default()),
    );

    let result = runner.start();

    assert_eq!(
        result.err(),
        Some(SessionError::CapabilityUnavailable {
            capability: Capability::SpeechOutput
        })
    );
}

#[tokio::test]
async fn unavailable_speech_input_prevents_start() {
    let mut output = MockSpeechOutput::new();
    output.expect_is_available().return_const(true);
    let mut input = MockSpeechInput::new();
    input.expect_is_available().return_const(false);

    let runner = SessionRunner::new(
        docker_and_vpc(),
        settings(),
        Arc::new(output),
        Arc::new(input),
        Arc::new(MockEvaluator::new()),
        Arc::new(RecordingSink::default()),
    );

    assert_eq!(
        runner.start().err(),
        Some(SessionError::CapabilityUnavailable {
            capability: Capability::SpeechInput
        })
    );
}

#[tokio::test(start_paused = true)]
async fn ending_after_one_scored_answer_summarizes_what_exists() {
    // Arrange
    let mut h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();

    // Act
    wait_until(&mut snapshots, listening_at(0)).await;
    h.input.finish("Docker isolates processes");

    let (request, reply) = h.evaluations.recv().await.unwrap();
    assert_eq!(request.question, "Explain Docker?");
    assert_eq!(request.answer, "Docker isolates processes");
    assert_eq!(request.role, "DevOps Engineer");
    reply.send(Ok(evaluation(7.5))).unwrap();

    wait_until(&mut snapshots, listening_at(1)).await;
    handle.end_interview().await.unwrap();
    let summary = handle.wait().await.unwrap();

    // Assert
    assert_eq!(summary.answered_questions, 1);
    assert_eq!(summary.average_score, 7.5);
    assert_eq!(summary.total_questions, 2);
    assert!(summary.ended_early);
    assert_eq!(
        h.output.spoken(),
        vec!["Question 1. Explain Docker?", "Question 2. What is a VPC?"]
    );
    assert_eq!(h.input.aborts(), 1);
    assert_eq!(h.sink.summaries.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_evaluation_keeps_the_answer_and_moves_on() {
    let output = Arc::new(ScriptedOutput::default());
    let input = Arc::new(ScriptedInput::default());
    let mut evaluator = MockEvaluator::new();
    evaluator
        .expect_evaluate()
        .times(2)
        .returning(|_| Err(EvaluationError::Service("rate limited".to_string())));
    evaluator.expect_is_configured().return_const(true);
    let sink = Arc::new(RecordingSink::default());

    let handle = SessionRunner::new(
        docker_and_vpc(),
        settings(),
        output.clone(),
        input.clone(),
        Arc::new(evaluator),
        sink.clone(),
    )
    .start()
    .unwrap();
    let mut snapshots = handle.subscribe();

    wait_until(&mut snapshots, listening_at(0)).await;
    input.finish("Containers share the kernel");
    let snapshot = wait_until(&mut snapshots, listening_at(1)).await;
    assert_eq!(
        snapshot.advisory,
        Some(Advisory::EvaluationFailed {
            question_index: 0,
            reason: "evaluation service failed: rate limited".to_string(),
        })
    );

    input.finish("A private network in the cloud");
    let summary = handle.wait().await.unwrap();

    assert!(!summary.ended_early);
    assert_eq!(summary.answered_questions, 2);
    assert_eq!(summary.average_score, 0.0);
    assert!(summary.answers.iter().all(|a| a.evaluation.is_none()));
    assert_eq!(sink.summaries.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_evaluation_after_abort_is_discarded() {
    let mut h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();

    wait_until(&mut snapshots, listening_at(0)).await;
    h.input.finish("Docker isolates processes");
    let (_request, reply) = h.evaluations.recv().await.unwrap();
    wait_until(&mut snapshots, |s| s.phase == Phase::Evaluating).await;

    handle.end_interview().await.unwrap();
    let _ = reply.send(Ok(evaluation(9.0)));
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.answers.len(), 1);
    assert_eq!(summary.answers[0].evaluation, None);
    assert_eq!(summary.average_score, 0.0);
    assert_eq!(summary.answered_questions, 1);
}

#[tokio::test]
async fn capture_from_a_replayed_attempt_is_discarded() {
    let h = harness(docker_and_vpc());
    let (mut actor, _events, _snapshots) = h.runner.into_actor();
    actor.begin();
    let first_attempt = actor.tag();
    actor.handle(SessionEvent::SpeechSettled {
        tag: first_attempt,
        result: Ok(()),
    });
    assert_eq!(actor.state.phase, Phase::Listening);

    actor.apply(OperatorAction::Replay).unwrap();
    actor.handle(SessionEvent::Capture {
        tag: first_attempt,
        event: CaptureEvent::Final("an answer to the old attempt".to_string()),
    });

    assert!(actor.state.answers.is_empty());
    assert_eq!(actor.state.phase, Phase::Asking);
    assert_eq!(actor.tag().generation, first_attempt.generation + 1);
}

#[tokio::test]
async fn repeated_replays_record_a_single_answer() {
    let h = harness(docker_and_vpc());
    let (mut actor, _events, _snapshots) = h.runner.into_actor();
    actor.begin();

    let mut stale = Vec::new();
    for _ in 0..3 {
        let tag = actor.tag();
        actor.handle(SessionEvent::SpeechSettled { tag, result: Ok(()) });
        stale.push(tag);
        actor.apply(OperatorAction::Replay).unwrap();
    }
    let live = actor.tag();
    actor.handle(SessionEvent::SpeechSettled {
        tag: live,
        result: Ok(()),
    });
    for tag in stale {
        actor.handle(SessionEvent::Capture {
            tag,
            event: CaptureEvent::Final("stale".to_string()),
        });
    }
    actor.handle(SessionEvent::Capture {
        tag: live,
        event: CaptureEvent::Final("Docker isolates processes".to_string()),
    });
    actor.handle(SessionEvent::Capture {
        tag: live,
        event: CaptureEvent::Final("duplicate".to_string()),
    });

    assert_eq!(actor.state.answers.len(), 1);
    assert_eq!(actor.state.answers[0].raw_answer_text, "Docker isolates processes");
    assert_eq!(actor.state.phase, Phase::Evaluating);
    assert_eq!(h.input.starts(), 4);
}

#[tokio::test(start_paused = true)]
async fn empty_final_waits_for_the_operator() {
    let h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();

    wait_until(&mut snapshots, listening_at(0)).await;
    h.input.finish("   ");
    let snapshot = wait_until(&mut snapshots, |s| s.advisory == Some(Advisory::EmptyAnswer)).await;
    assert_eq!(snapshot.phase, Phase::Listening);
    assert_eq!(snapshot.current_index, 0);
    assert!(snapshot.answers.is_empty());

    handle.stop_listening().await.unwrap();
    let snapshot = wait_until(&mut snapshots, listening_at(1)).await;

    assert_eq!(snapshot.answers.len(), 1);
    assert_eq!(snapshot.answers[0].raw_answer_text.trim(), "");
    assert_eq!(snapshot.answers[0].evaluation, None);
    assert_eq!(snapshot.advisory, None);

    // The next question raises its own notice.
    h.input.finish("");
    let snapshot = wait_until(&mut snapshots, |s| s.advisory == Some(Advisory::EmptyAnswer)).await;
    assert_eq!(snapshot.current_index, 1);

    handle.end_interview().await.unwrap();
    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.answered_questions, 0);
}

#[tokio::test(start_paused = true)]
async fn skipping_a_silent_question_starts_the_next_one_clean() {
    // Arrange
    let h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();
    wait_until(&mut snapshots, listening_at(0)).await;

    // Act
    handle.stop_listening().await.unwrap();
    let snapshot = wait_until(&mut snapshots, listening_at(1)).await;

    // Assert
    assert_eq!(snapshot.advisory, None);
    assert_eq!(snapshot.transcript, "");
    assert!(snapshot.answers.iter().all(|a| a.question_index == 0));
    assert_eq!(h.output.spoken().last().map(String::as_str), Some("Question 2. What is a VPC?"));
    handle.end_interview().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_listening_submits_the_accumulated_transcript() {
    let mut h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();

    wait_until(&mut snapshots, listening_at(0)).await;
    h.input.interim("Docker runs containers");
    let snapshot = wait_until(&mut snapshots, |s| s.transcript == "Docker runs containers").await;
    assert!(snapshot.listening);

    handle.stop_listening().await.unwrap();
    let (request, _reply) = h.evaluations.recv().await.unwrap();

    assert_eq!(request.answer, "Docker runs containers");
    handle.end_interview().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn speech_failure_waits_for_replay() {
    let h = harness(docker_and_vpc());
    h.output.fail_next(SpeechOutputError::Unavailable);
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();

    let snapshot = wait_until(&mut snapshots, |s| {
        matches!(s.advisory, Some(Advisory::SpeechOutputFailed(_)))
    })
    .await;
    assert_eq!(snapshot.phase, Phase::Asking);
    assert!(!snapshot.speaking);
    assert_eq!(h.input.starts(), 0);

    handle.replay_current_question().await.unwrap();
    let snapshot = wait_until(&mut snapshots, listening_at(0)).await;

    assert_eq!(snapshot.advisory, None);
    assert_eq!(h.output.spoken().len(), 2);
    handle.end_interview().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn recognition_error_surfaces_as_advisory() {
    let h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();

    wait_until(&mut snapshots, listening_at(0)).await;
    h.input.interim("Docker is");
    h.input.fail("microphone disconnected");
    let snapshot = wait_until(&mut snapshots, |s| s.advisory.is_some()).await;

    assert_eq!(
        snapshot.advisory,
        Some(Advisory::SpeechInputFailed("microphone disconnected".to_string()))
    );
    assert!(!snapshot.listening);
    assert!(snapshot.answers.is_empty());
    handle.end_interview().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn elapsed_time_stops_after_abort() {
    let h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();

    wait_until(&mut snapshots, |s| s.elapsed_seconds >= 3).await;
    let controller = handle.controller();
    controller.end_interview().await.unwrap();
    let at_abort = controller.snapshot().elapsed_seconds;

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(controller.snapshot().elapsed_seconds, at_abort);
    assert_eq!(controller.snapshot().status, SessionStatus::Aborted);
    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.duration_seconds, at_abort);
}

#[tokio::test(start_paused = true)]
async fn operator_actions_after_the_session_ends_are_rejected() {
    let h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let controller = handle.controller();

    controller.end_interview().await.unwrap();
    let summary = handle.wait().await.unwrap();

    assert_eq!(controller.end_interview().await, Err(SessionError::NotInProgress));
    assert_eq!(controller.replay_current_question().await, Err(SessionError::NotInProgress));
    assert_eq!(controller.stop_listening().await, Err(SessionError::NotInProgress));
    assert_eq!(h.sink.summaries.lock().unwrap().len(), 1);
    assert_eq!(h.sink.summaries.lock().unwrap()[0], summary);
}

#[tokio::test(start_paused = true)]
async fn scored_answer_holds_before_advancing() {
    let mut h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();

    wait_until(&mut snapshots, listening_at(0)).await;
    h.input.finish("Docker isolates processes");
    let (_request, reply) = h.evaluations.recv().await.unwrap();
    reply.send(Ok(evaluation(8.0))).unwrap();
    let snapshot = wait_until(&mut snapshots, |s| s.phase == Phase::Advancing).await;
    assert_eq!(snapshot.answers[0].evaluation, Some(evaluation(8.0)));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(handle.snapshot().phase, Phase::Advancing);
    assert_eq!(handle.snapshot().current_index, 0);

    // Replay is ignored once the answer has been recorded.
    handle.replay_current_question().await.unwrap();
    assert_eq!(h.output.spoken().len(), 1);

    wait_until(&mut snapshots, listening_at(1)).await;
    handle.end_interview().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn completing_every_question_finishes_the_session() {
    let mut h = harness(docker_and_vpc());
    let handle = h.runner.start().unwrap();
    let mut snapshots = handle.subscribe();

    for (index, (answer, score)) in [("Docker isolates processes", 6.0), ("An isolated network", 9.0)]
        .into_iter()
        .enumerate()
    {
        wait_until(&mut snapshots, listening_at(index)).await;
        h.input.finish(answer);
        let (_request, reply) = h.evaluations.recv().await.unwrap();
        reply.send(Ok(evaluation(score))).unwrap();
    }
    let summary = handle.wait().await.unwrap();

    assert!(!summary.ended_early);
    assert_eq!(summary.answered_questions, 2);
    assert_eq!(summary.average_score, 7.5);
    assert_eq!(summary.answers[1].question.id, "vpc-1");
    assert_eq!(snapshots.borrow().status, SessionStatus::Completed);

    // The clock stops with the session.
    let at_completion = snapshots.borrow().elapsed_seconds;
    assert!(at_completion >= 2);
    assert_eq!(summary.duration_seconds, at_completion);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(snapshots.borrow().elapsed_seconds, at_completion);
}
