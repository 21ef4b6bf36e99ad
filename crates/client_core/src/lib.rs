use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::QuizId,
    error::{ApiError, ErrorCode},
    protocol::{CatalogItem, QuizDefinition, QuizResult, SubmitQuizRequest},
};
use tracing::{debug, warn};

pub mod config;
pub mod error;
pub mod filter;
pub mod quiz_session;
pub mod runner;
pub mod ticker;

pub use config::{load_settings, ApiContext, ClientSettings};
pub use error::{ClientError, SessionError};
pub use filter::{
    apply_filters, derive_filter_options, sort_items, CatalogBrowser, DurationBucket,
    FilterCriteria, FilterOptions, PriceRange, SortKey,
};
pub use quiz_session::{QuizSession, SessionStatus, Submission, SubmitTrigger, TickOutcome};
pub use runner::{QuizEvent, QuizRunner, QuizView};
pub use ticker::{ChannelTicks, IntervalTicks, TickSource};

/// Grading collaborator for a finished quiz session.
#[async_trait]
pub trait QuizGrader: Send + Sync {
    async fn grade(
        &self,
        quiz_id: &QuizId,
        request: SubmitQuizRequest,
    ) -> Result<QuizResult, ClientError>;
}

/// REST client for the LMS backend. Every call carries the context's bearer token, if any.
#[derive(Debug, Clone)]
pub struct LmsClient {
    http: Client,
    ctx: ApiContext,
}

impl LmsClient {
    pub fn new(ctx: ApiContext) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(ctx.request_timeout).build()?;
        Ok(Self { http, ctx })
    }

    pub fn context(&self) -> &ApiContext {
        &self.ctx
    }

    pub async fn fetch_catalog(&self) -> Result<Vec<CatalogItem>, ClientError> {
        let url = self.ctx.url_for(&["courses"])?;
        let response = self.authorized(self.http.get(url)).send().await?;
        let items: Vec<CatalogItem> = decode(response).await?;
        debug!("catalog: fetched items={}", items.len());
        Ok(items)
    }

    pub async fn fetch_quiz(&self, quiz_id: &QuizId) -> Result<QuizDefinition, ClientError> {
        let url = self.ctx.url_for(&["quizzes", quiz_id.as_str()])?;
        let response = self.authorized(self.http.get(url)).send().await?;
        let quiz: QuizDefinition = decode(response).await?;
        debug!(
            "quiz: fetched quiz={} questions={}",
            quiz.id,
            quiz.questions.len()
        );
        Ok(quiz)
    }

    pub async fn submit_quiz(
        &self,
        quiz_id: &QuizId,
        request: &SubmitQuizRequest,
    ) -> Result<QuizResult, ClientError> {
        let url = self
            .ctx
            .url_for(&["quizzes", quiz_id.as_str(), "submit"])?;
        let response = self
            .authorized(self.http.post(url))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.ctx.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl QuizGrader for LmsClient {
    async fn grade(
        &self,
        quiz_id: &QuizId,
        request: SubmitQuizRequest,
    ) -> Result<QuizResult, ClientError> {
        self.submit_quiz(quiz_id, &request).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => (api_error.code, api_error.message),
        Err(_) if !body.trim().is_empty() => (ErrorCode::from_status(status.as_u16()), body),
        Err(_) => (
            ErrorCode::from_status(status.as_u16()),
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        ),
    };
    warn!("http: request failed url={url} status={status} code={code:?}");
    Err(ClientError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
