//! Async driver around a single [`QuizSession`].
//!
//! Owns the countdown task and the grader call. At most one grading request is
//! in flight per session; the countdown only runs while the session is
//! `in_progress`.

use std::sync::Arc;

use futures::StreamExt;
use shared::{domain::QuestionId, protocol::QuizResult};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, SessionError},
    quiz_session::{QuizSession, SessionStatus, Submission, SubmitTrigger, TickOutcome},
    ticker::TickSource,
    QuizGrader,
};

#[derive(Debug, Clone, PartialEq)]
pub enum QuizEvent {
    Tick { remaining_seconds: u64 },
    Submitting { trigger: SubmitTrigger },
    Completed(QuizResult),
    SubmitFailed { status: SessionStatus, message: String },
}

/// Snapshot for rendering; detached from the live session.
#[derive(Debug, Clone)]
pub struct QuizView {
    pub status: SessionStatus,
    pub current_index: usize,
    pub question_count: usize,
    pub remaining: Option<String>,
    pub answered: usize,
}

pub struct QuizRunner {
    session: Arc<Mutex<QuizSession>>,
    grader: Arc<dyn QuizGrader>,
    ticks: Arc<dyn TickSource>,
    countdown: std::sync::Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<QuizEvent>,
}

impl QuizRunner {
    /// Wraps `session` and arms the countdown if the quiz is timed.
    /// Must be called from within a tokio runtime.
    pub fn start(
        session: QuizSession,
        grader: Arc<dyn QuizGrader>,
        ticks: Arc<dyn TickSource>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let timed = session.is_timed();
        info!(
            "quiz: session started quiz={} questions={} timed={}",
            session.quiz().id,
            session.question_count(),
            timed
        );
        let runner = Arc::new(Self {
            session: Arc::new(Mutex::new(session)),
            grader,
            ticks,
            countdown: std::sync::Mutex::new(None),
            events,
        });
        if timed {
            runner.arm_countdown();
        }
        runner
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<QuizEvent> {
        self.events.subscribe()
    }

    /// Read access to the live session.
    pub async fn with_session<R>(&self, f: impl FnOnce(&QuizSession) -> R) -> R {
        let guard = self.session.lock().await;
        f(&guard)
    }

    pub async fn view(&self) -> QuizView {
        self.with_session(|session| QuizView {
            status: session.status(),
            current_index: session.current_index(),
            question_count: session.question_count(),
            remaining: session.remaining_display(),
            answered: session.progress().answered,
        })
        .await
    }

    pub async fn record_answer(
        &self,
        question_id: &QuestionId,
        value: impl Into<String>,
    ) -> Result<(), ClientError> {
        let mut guard = self.session.lock().await;
        guard.record_answer(question_id, value)?;
        Ok(())
    }

    pub async fn record_current_answer(&self, value: impl Into<String>) -> Result<(), ClientError> {
        let mut guard = self.session.lock().await;
        let question_id = guard
            .current_question()
            .map(|q| q.id.clone())
            .ok_or(SessionError::NoCurrentQuestion)?;
        guard.record_answer(&question_id, value)?;
        Ok(())
    }

    pub async fn clear_current_answer(&self) -> Result<(), ClientError> {
        let mut guard = self.session.lock().await;
        let question_id = guard
            .current_question()
            .map(|q| q.id.clone())
            .ok_or(SessionError::NoCurrentQuestion)?;
        guard.clear_answer(&question_id)?;
        Ok(())
    }

    pub async fn go_to_next(&self) -> Result<usize, ClientError> {
        Ok(self.session.lock().await.go_to_next()?)
    }

    pub async fn go_to_previous(&self) -> Result<usize, ClientError> {
        Ok(self.session.lock().await.go_to_previous()?)
    }

    pub async fn go_to(&self, index: usize) -> Result<usize, ClientError> {
        Ok(self.session.lock().await.go_to(index)?)
    }

    /// Manual submit, also the retry path after a failed submission.
    /// Rejected while another submission is in flight.
    pub async fn submit(&self) -> Result<QuizResult, ClientError> {
        let submission = self.session.lock().await.submit()?;
        self.disarm_countdown();

        let outcome = deliver(&self.session, self.grader.as_ref(), &self.events, submission).await;
        if outcome.is_err() {
            let status = self.session.lock().await.status();
            if status == SessionStatus::InProgress {
                self.arm_countdown_if_timed().await;
            }
        }
        outcome
    }

    /// Navigating away: stops the countdown. The session is discarded with the runner.
    pub fn cancel(&self) {
        self.disarm_countdown();
        debug!("quiz: runner cancelled");
    }

    async fn arm_countdown_if_timed(&self) {
        let timed = {
            let guard = self.session.lock().await;
            guard.is_timed() && guard.status() == SessionStatus::InProgress
        };
        if timed {
            self.arm_countdown();
        }
    }

    fn arm_countdown(&self) {
        let mut ticks = self.ticks.ticks();
        let session = Arc::clone(&self.session);
        let grader = Arc::clone(&self.grader);
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            while ticks.next().await.is_some() {
                let outcome = session.lock().await.tick();
                match outcome {
                    TickOutcome::Idle => break,
                    TickOutcome::Running { remaining_seconds } => {
                        let _ = events.send(QuizEvent::Tick { remaining_seconds });
                    }
                    TickOutcome::Expired(submission) => {
                        let _ = events.send(QuizEvent::Tick {
                            remaining_seconds: 0,
                        });
                        info!("quiz: time expired quiz={}", submission.quiz_id);
                        let _ = deliver(&session, grader.as_ref(), &events, submission).await;
                        break;
                    }
                }
            }
        });

        let mut slot = lock_countdown(&self.countdown);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    fn disarm_countdown(&self) {
        if let Some(task) = lock_countdown(&self.countdown).take() {
            task.abort();
        }
    }
}

impl Drop for QuizRunner {
    fn drop(&mut self) {
        self.disarm_countdown();
    }
}

fn lock_countdown(
    slot: &std::sync::Mutex<Option<JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Sends `submission` to the grader and feeds the outcome back into the session.
/// The session lock is not held across the grader call.
async fn deliver(
    session: &Mutex<QuizSession>,
    grader: &dyn QuizGrader,
    events: &broadcast::Sender<QuizEvent>,
    submission: Submission,
) -> Result<QuizResult, ClientError> {
    let Submission {
        quiz_id,
        trigger,
        request,
    } = submission;
    let _ = events.send(QuizEvent::Submitting { trigger });
    info!(
        "quiz: submitting quiz={} trigger={:?} answered={} time_taken={}s",
        quiz_id,
        trigger,
        request.answers.len(),
        request.time_taken_seconds
    );

    match grader.grade(&quiz_id, request).await {
        Ok(result) => {
            let mut guard = session.lock().await;
            let result = guard.complete(result)?.clone();
            info!(
                "quiz: completed quiz={} score={}/{} passed={}",
                quiz_id, result.score, result.total, result.passed
            );
            let _ = events.send(QuizEvent::Completed(result.clone()));
            Ok(result)
        }
        Err(err) => {
            let message = err.to_string();
            let status = session.lock().await.fail_submission(message.clone())?;
            warn!("quiz: submission failed quiz={quiz_id} status={status} error={message}");
            let _ = events.send(QuizEvent::SubmitFailed { status, message });
            Err(err)
        }
    }
}

#[cfg(test)]
#[path = "tests/runner_tests.rs"]
mod tests;
