use super::*;
use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use shared::{
    domain::{QuestionKind, QuizId},
    error::ErrorCode,
    protocol::{Question, QuizDefinition, SubmitQuizRequest},
};
use tokio::sync::Notify;

use crate::ticker::ChannelTicks;

struct ScriptedGrader {
    outcomes: Mutex<VecDeque<Result<QuizResult, String>>>,
    requests: Mutex<Vec<SubmitQuizRequest>>,
    gate: Option<Notify>,
}

impl ScriptedGrader {
    fn new(outcomes: Vec<Result<QuizResult, String>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    fn gated(outcomes: Vec<Result<QuizResult, String>>) -> Self {
        let mut grader = Self::new(outcomes);
        grader.gate = Some(Notify::new());
        grader
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    async fn calls(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl QuizGrader for ScriptedGrader {
    async fn grade(
        &self,
        _quiz_id: &QuizId,
        request: SubmitQuizRequest,
    ) -> Result<QuizResult, ClientError> {
        self.requests.lock().await.push(request);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.outcomes.lock().await.pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(ClientError::Status {
                status: 503,
                code: ErrorCode::Internal,
                message,
            }),
            None => Err(ClientError::Config("no scripted outcome left".into())),
        }
    }
}

fn quiz(time_limit_minutes: Option<u32>) -> QuizSession {
    let questions = ["q1", "q2", "q3"]
        .into_iter()
        .map(|id| Question {
            id: QuestionId::new(id),
            text: format!("Question {id}"),
            kind: QuestionKind::TrueFalse,
            options: Vec::new(),
        })
        .collect();
    QuizSession::new(QuizDefinition {
        id: QuizId::new("quiz-7"),
        title: "Runner".into(),
        description: String::new(),
        questions,
        time_limit_minutes,
        passing_score: 2,
    })
}

fn passed() -> QuizResult {
    QuizResult {
        score: 2,
        total: 3,
        passed: true,
        results: Vec::new(),
    }
}

async fn wait_for(
    events: &mut broadcast::Receiver<QuizEvent>,
    mut predicate: impl FnMut(&QuizEvent) -> bool,
) -> QuizEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for quiz event")
}

#[tokio::test]
async fn manual_submit_sends_only_answered_questions() {
    let grader = Arc::new(ScriptedGrader::new(vec![Ok(passed())]));
    let runner = QuizRunner::start(quiz(None), grader.clone(), Arc::new(ChannelTicks::new()));

    runner
        .record_answer(&QuestionId::new("q1"), "true")
        .await
        .expect("q1");
    runner.go_to(2).await.expect("jump");
    runner.record_current_answer("false").await.expect("q3");

    let result = runner.submit().await.expect("graded");

    assert!(result.passed);
    let requests = grader.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].answers.len(), 2);
    assert!(!requests[0].answers.contains_key(&QuestionId::new("q2")));
    drop(requests);
    assert_eq!(runner.view().await.status, SessionStatus::Completed);
}

#[tokio::test]
async fn countdown_expiry_submits_exactly_once() {
    let grader = Arc::new(ScriptedGrader::new(vec![Ok(passed()), Ok(passed())]));
    let ticks = Arc::new(ChannelTicks::new());
    let runner = QuizRunner::start(quiz(Some(1)), grader.clone(), ticks.clone());
    let mut events = runner.subscribe_events();

    for _ in 0..61 {
        ticks.fire();
    }

    let event = wait_for(&mut events, |e| matches!(e, QuizEvent::Submitting { .. })).await;
    assert_eq!(
        event,
        QuizEvent::Submitting {
            trigger: SubmitTrigger::TimeExpired
        }
    );
    wait_for(&mut events, |e| matches!(e, QuizEvent::Completed(_))).await;

    ticks.fire();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(grader.calls().await, 1);
    assert_eq!(runner.view().await.status, SessionStatus::Completed);
}

#[tokio::test]
async fn concurrent_submit_is_rejected_while_in_flight() {
    let grader = Arc::new(ScriptedGrader::gated(vec![Ok(passed())]));
    let runner = QuizRunner::start(quiz(None), grader.clone(), Arc::new(ChannelTicks::new()));
    let mut events = runner.subscribe_events();

    let first = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { runner.submit().await }
    });
    wait_for(&mut events, |e| matches!(e, QuizEvent::Submitting { .. })).await;

    let err = runner.submit().await.expect_err("second submit must be rejected");
    assert!(matches!(
        err,
        ClientError::Session(SessionError::SubmissionInFlight)
    ));

    grader.release();
    let result = first.await.expect("join").expect("graded");
    assert_eq!(result.score, 2);
    assert_eq!(grader.calls().await, 1);
}

#[tokio::test]
async fn failed_manual_submit_reopens_session_and_rearms_countdown() {
    let grader = Arc::new(ScriptedGrader::new(vec![Err("bad gateway".into())]));
    let ticks = Arc::new(ChannelTicks::new());
    let runner = QuizRunner::start(quiz(Some(1)), grader.clone(), ticks.clone());
    let mut events = runner.subscribe_events();

    let err = runner.submit().await.expect_err("grader fails");
    assert!(matches!(err, ClientError::Status { status: 503, .. }));
    let failed = wait_for(&mut events, |e| matches!(e, QuizEvent::SubmitFailed { .. })).await;
    assert!(matches!(
        failed,
        QuizEvent::SubmitFailed {
            status: SessionStatus::InProgress,
            ..
        }
    ));

    assert!(ticks.fire());
    let tick = wait_for(&mut events, |e| matches!(e, QuizEvent::Tick { .. })).await;
    assert_eq!(
        tick,
        QuizEvent::Tick {
            remaining_seconds: 59
        }
    );
    runner
        .record_answer(&QuestionId::new("q2"), "true")
        .await
        .expect("editable after failure");
}

#[tokio::test]
async fn failed_expiry_submit_waits_for_manual_retry() {
    let grader = Arc::new(ScriptedGrader::new(vec![
        Err("grader offline".into()),
        Ok(passed()),
    ]));
    let ticks = Arc::new(ChannelTicks::new());
    let runner = QuizRunner::start(quiz(Some(1)), grader.clone(), ticks.clone());
    let mut events = runner.subscribe_events();

    for _ in 0..60 {
        ticks.fire();
    }
    let failed = wait_for(&mut events, |e| matches!(e, QuizEvent::SubmitFailed { .. })).await;
    assert!(matches!(
        failed,
        QuizEvent::SubmitFailed {
            status: SessionStatus::AwaitingRetry,
            ..
        }
    ));

    let err = runner
        .record_answer(&QuestionId::new("q1"), "true")
        .await
        .expect_err("frozen after expiry");
    assert!(matches!(
        err,
        ClientError::Session(SessionError::NotInProgress { .. })
    ));

    let result = runner.submit().await.expect("manual retry");
    assert!(result.passed);
    assert_eq!(grader.calls().await, 2);
    assert_eq!(runner.view().await.status, SessionStatus::Completed);
}

#[tokio::test]
async fn cancel_stops_countdown() {
    let grader = Arc::new(ScriptedGrader::new(vec![Ok(passed())]));
    let ticks = Arc::new(ChannelTicks::new());
    let runner = QuizRunner::start(quiz(Some(1)), grader.clone(), ticks.clone());

    runner.cancel();
    for _ in 0..70 {
        ticks.fire();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(grader.calls().await, 0);
    let view = runner.view().await;
    assert_eq!(view.status, SessionStatus::InProgress);
    assert_eq!(view.remaining.as_deref(), Some("01:00"));
}

#[tokio::test]
async fn clearing_current_answer_marks_question_unanswered() {
    let grader = Arc::new(ScriptedGrader::new(Vec::new()));
    let runner = QuizRunner::start(quiz(None), grader, Arc::new(ChannelTicks::new()));

    runner.go_to_next().await.expect("next");
    runner.record_current_answer("true").await.expect("answer");
    assert_eq!(runner.view().await.answered, 1);

    runner.clear_current_answer().await.expect("clear");
    let unanswered = runner
        .with_session(|session| session.progress().unanswered)
        .await;
    assert_eq!(unanswered.len(), 3);
}
