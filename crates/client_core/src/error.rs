use shared::error::ErrorCode;
use thiserror::Error;

use crate::quiz_session::SessionStatus;

/// Rejected quiz-session operations. None of these mutate the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("quiz session is not in progress (status: {status})")]
    NotInProgress { status: SessionStatus },
    #[error("a submission is already in flight for this quiz session")]
    SubmissionInFlight,
    #[error("quiz session is already completed")]
    AlreadyCompleted,
    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(String),
    #[error("quiz has no questions")]
    NoCurrentQuestion,
    #[error("no submission is pending for this quiz session")]
    NoPendingSubmission,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to backend failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status} ({code:?}): {message}")]
    Status {
        status: u16,
        code: ErrorCode,
        message: String,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("invalid client configuration: {0}")]
    Config(String),
}
