//! Quiz-taking state machine.
//!
//! `in_progress -> submitting -> completed`, with `submitting -> in_progress`
//! on a failed manual submission and `submitting -> awaiting_retry` on a failed
//! submission forced by the countdown. The session never performs I/O itself:
//! [`QuizSession::submit`] hands back a [`Submission`] for the caller to deliver
//! and the outcome is fed back through [`QuizSession::complete`] or
//! [`QuizSession::fail_submission`].

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{QuestionId, QuizId},
    protocol::{Question, QuizDefinition, QuizResult, SubmitQuizRequest},
};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Submitting,
    /// Time ran out and grading failed. Frozen except for a manual resubmit.
    AwaitingRetry,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InProgress => "in_progress",
            Self::Submitting => "submitting",
            Self::AwaitingRetry => "awaiting_retry",
            Self::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    TimeExpired,
}

/// A frozen answer set ready to be sent to the grader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub quiz_id: QuizId,
    pub trigger: SubmitTrigger,
    pub request: SubmitQuizRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Untimed quiz, or the session is no longer counting down.
    Idle,
    Running { remaining_seconds: u64 },
    /// The countdown hit zero on this tick. Returned at most once per countdown.
    Expired(Submission),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
    pub unanswered: Vec<QuestionId>,
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    quiz: QuizDefinition,
    current_index: usize,
    answers: BTreeMap<QuestionId, String>,
    remaining_seconds: Option<u64>,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    pending_trigger: Option<SubmitTrigger>,
    result: Option<QuizResult>,
    last_error: Option<String>,
}

impl QuizSession {
    pub fn new(quiz: QuizDefinition) -> Self {
        Self::started_at(quiz, Utc::now())
    }

    /// Starts a fresh session with an explicit wall-clock reference.
    pub fn started_at(quiz: QuizDefinition, started_at: DateTime<Utc>) -> Self {
        let remaining_seconds = quiz
            .time_limit_minutes
            .filter(|minutes| *minutes > 0)
            .map(|minutes| u64::from(minutes) * 60);
        Self {
            quiz,
            current_index: 0,
            answers: BTreeMap::new(),
            remaining_seconds,
            status: SessionStatus::InProgress,
            started_at,
            pending_trigger: None,
            result: None,
            last_error: None,
        }
    }

    pub fn quiz(&self) -> &QuizDefinition {
        &self.quiz
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_timed(&self) -> bool {
        self.remaining_seconds.is_some()
    }

    pub fn remaining_seconds(&self) -> Option<u64> {
        self.remaining_seconds
    }

    /// `mm:ss`, or `None` for untimed quizzes.
    pub fn remaining_display(&self) -> Option<String> {
        self.remaining_seconds
            .map(|secs| format!("{:02}:{:02}", secs / 60, secs % 60))
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.quiz.questions.get(self.current_index)
    }

    pub fn question_count(&self) -> usize {
        self.quiz.questions.len()
    }

    pub fn answers(&self) -> &BTreeMap<QuestionId, String> {
        &self.answers
    }

    pub fn answer(&self, question_id: &QuestionId) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }

    pub fn result(&self) -> Option<&QuizResult> {
        self.result.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn progress(&self) -> Progress {
        let unanswered: Vec<QuestionId> = self
            .quiz
            .questions
            .iter()
            .filter(|q| !self.answers.contains_key(&q.id))
            .map(|q| q.id.clone())
            .collect();
        Progress {
            answered: self.question_count() - unanswered.len(),
            total: self.question_count(),
            unanswered,
        }
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.started_at).num_seconds()).unwrap_or(0)
    }

    /// Overwrites any previous answer. The value is not checked against the question kind.
    pub fn record_answer(
        &mut self,
        question_id: &QuestionId,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        if self.quiz.question(question_id).is_none() {
            return Err(SessionError::UnknownQuestion(question_id.to_string()));
        }
        self.answers.insert(question_id.clone(), value.into());
        Ok(())
    }

    pub fn clear_answer(&mut self, question_id: &QuestionId) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.answers.remove(question_id);
        Ok(())
    }

    pub fn go_to_next(&mut self) -> Result<usize, SessionError> {
        self.go_to(self.current_index.saturating_add(1))
    }

    pub fn go_to_previous(&mut self) -> Result<usize, SessionError> {
        self.go_to(self.current_index.saturating_sub(1))
    }

    /// Jumps to `index`, clamped to the question range. Never wraps.
    pub fn go_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.ensure_in_progress()?;
        let last = self.question_count().saturating_sub(1);
        self.current_index = index.min(last);
        Ok(self.current_index)
    }

    /// One second of countdown. Reaching zero moves the session to `submitting`.
    pub fn tick(&mut self) -> TickOutcome {
        self.tick_at(Utc::now())
    }

    pub fn tick_at(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.status != SessionStatus::InProgress {
            return TickOutcome::Idle;
        }
        let Some(remaining) = self.remaining_seconds.as_mut() else {
            return TickOutcome::Idle;
        };

        *remaining = remaining.saturating_sub(1);
        if *remaining > 0 {
            return TickOutcome::Running {
                remaining_seconds: *remaining,
            };
        }
        TickOutcome::Expired(self.freeze(SubmitTrigger::TimeExpired, now))
    }

    /// Moves to `submitting` and returns the answer set to deliver.
    pub fn submit(&mut self) -> Result<Submission, SessionError> {
        self.submit_at(Utc::now())
    }

    pub fn submit_at(&mut self, now: DateTime<Utc>) -> Result<Submission, SessionError> {
        let trigger = match self.status {
            SessionStatus::InProgress => SubmitTrigger::Manual,
            // Retrying after expiry keeps the expiry semantics on failure.
            SessionStatus::AwaitingRetry => SubmitTrigger::TimeExpired,
            SessionStatus::Submitting => return Err(SessionError::SubmissionInFlight),
            SessionStatus::Completed => return Err(SessionError::AlreadyCompleted),
        };
        Ok(self.freeze(trigger, now))
    }

    /// Terminal transition. The session is immutable afterwards.
    pub fn complete(&mut self, result: QuizResult) -> Result<&QuizResult, SessionError> {
        if self.status != SessionStatus::Submitting {
            return Err(SessionError::NoPendingSubmission);
        }
        self.status = SessionStatus::Completed;
        self.pending_trigger = None;
        self.last_error = None;
        Ok(self.result.insert(result))
    }

    /// Records a failed delivery. Returns the status the session fell back to.
    pub fn fail_submission(
        &mut self,
        error: impl Into<String>,
    ) -> Result<SessionStatus, SessionError> {
        if self.status != SessionStatus::Submitting {
            return Err(SessionError::NoPendingSubmission);
        }
        self.status = match self.pending_trigger.take() {
            Some(SubmitTrigger::TimeExpired) => SessionStatus::AwaitingRetry,
            _ => SessionStatus::InProgress,
        };
        self.last_error = Some(error.into());
        Ok(self.status)
    }

    fn freeze(&mut self, trigger: SubmitTrigger, now: DateTime<Utc>) -> Submission {
        self.status = SessionStatus::Submitting;
        self.pending_trigger = Some(trigger);
        Submission {
            quiz_id: self.quiz.id.clone(),
            trigger,
            request: SubmitQuizRequest {
                answers: self.answers.clone(),
                time_taken_seconds: self.elapsed_seconds(now),
            },
        }
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::InProgress => Ok(()),
            SessionStatus::Completed => Err(SessionError::AlreadyCompleted),
            status => Err(SessionError::NotInProgress { status }),
        }
    }
}

#[cfg(test)]
#[path = "tests/quiz_session_tests.rs"]
mod tests;
