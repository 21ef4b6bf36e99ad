use super::*;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response as AxumResponse},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::QuestionId;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct BackendState {
    submissions: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn list_courses() -> Json<Value> {
    Json(json!([
        {
            "id": "c1",
            "title": "Algebra Basics",
            "description": "Equations",
            "category": "Math",
            "level": "beginner",
            "price": 0,
            "instructor": "Emmy Noether"
        },
        {
            "id": "c2",
            "title": "Advanced Calculus",
            "category": "Math",
            "level": "advanced",
            "price": 500,
            "duration": 12.5
        }
    ]))
}

async fn get_quiz(Path(quiz_id): Path<String>) -> AxumResponse {
    if quiz_id != "quiz-1" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "not_found", "message": "quiz not found" })),
        )
            .into_response();
    }
    Json(json!({
        "id": "quiz-1",
        "title": "Algebra check",
        "questions": [
            { "id": "q1", "text": "x + 1 = 2", "type": "short-answer" },
            { "id": "q2", "text": "Pick one", "type": "multiple-choice", "options": ["a", "b"] },
            { "id": "q3", "text": "0 is even", "type": "true-false" }
        ],
        "timeLimit": 10,
        "passingScore": 2
    }))
    .into_response()
}

async fn submit_quiz(
    State(state): State<BackendState>,
    Path(quiz_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AxumResponse {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if auth.is_none() {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }
    state.submissions.lock().await.push((auth, body.clone()));

    let answered = body["answers"].as_object().map_or(0, |answers| answers.len());
    Json(json!({
        "score": answered,
        "total": 3,
        "passed": answered >= 2,
        "results": [
            { "correct": true, "userAnswer": "1", "correctAnswer": "1" },
            { "correct": false, "userAnswer": null, "correctAnswer": "a" },
            { "correct": true, "userAnswer": "true", "correctAnswer": "true" }
        ],
        "quiz": quiz_id
    }))
    .into_response()
}

async fn spawn_backend() -> anyhow::Result<(String, BackendState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = BackendState::default();
    let app = Router::new()
        .route("/api/courses", get(list_courses))
        .route("/api/quizzes/:quiz_id", get(get_quiz))
        .route("/api/quizzes/:quiz_id/submit", post(submit_quiz))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), state))
}

fn client(base_url: &str, token: Option<&str>) -> LmsClient {
    let ctx = ApiContext::new(base_url, token.map(str::to_string)).expect("context");
    LmsClient::new(ctx).expect("client")
}

#[tokio::test]
async fn fetch_catalog_decodes_items_and_feeds_filter_options() {
    let (base_url, _state) = spawn_backend().await.expect("spawn backend");
    let items = client(&base_url, None)
        .fetch_catalog()
        .await
        .expect("catalog");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].instructor_name.as_deref(), Some("Emmy Noether"));
    assert_eq!(items[1].duration, Some(12.5));
    assert_eq!(items[1].description, "");

    let options = derive_filter_options(&items);
    assert_eq!(options.categories, vec!["Math"]);
    assert_eq!(options.instructors, vec!["Emmy Noether"]);
}

#[tokio::test]
async fn missing_quiz_surfaces_backend_error_envelope() {
    let (base_url, _state) = spawn_backend().await.expect("spawn backend");
    let err = client(&base_url, None)
        .fetch_quiz(&QuizId::new("nope"))
        .await
        .expect_err("must fail");

    match err {
        ClientError::Status {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 404);
            assert_eq!(code, ErrorCode::NotFound);
            assert_eq!(message, "quiz not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn submit_without_token_is_unauthorized() {
    let (base_url, state) = spawn_backend().await.expect("spawn backend");
    let request = SubmitQuizRequest {
        answers: Default::default(),
        time_taken_seconds: 3,
    };

    let err = client(&base_url, None)
        .submit_quiz(&QuizId::new("quiz-1"), &request)
        .await
        .expect_err("must fail");

    assert!(matches!(
        err,
        ClientError::Status {
            status: 401,
            code: ErrorCode::Unauthorized,
            ..
        }
    ));
    assert!(state.submissions.lock().await.is_empty());
}

#[tokio::test]
async fn quiz_runner_grades_through_backend_with_bearer_token() {
    let (base_url, state) = spawn_backend().await.expect("spawn backend");
    let lms = Arc::new(client(&base_url, Some("secret-token")));

    let quiz = lms.fetch_quiz(&QuizId::new("quiz-1")).await.expect("quiz");
    assert_eq!(quiz.time_limit_minutes, Some(10));

    let runner = QuizRunner::start(
        QuizSession::new(quiz),
        lms.clone(),
        Arc::new(ChannelTicks::new()),
    );
    runner
        .record_answer(&QuestionId::new("q1"), "1")
        .await
        .expect("q1");
    runner
        .record_answer(&QuestionId::new("q3"), "true")
        .await
        .expect("q3");

    let result = runner.submit().await.expect("graded");
    assert_eq!(result.score, 2);
    assert!(result.passed);
    assert_eq!(result.results.len(), 3);
    assert_eq!(result.results[1].user_answer, None);

    let submissions = state.submissions.lock().await;
    assert_eq!(submissions.len(), 1);
    let (auth, body) = &submissions[0];
    assert_eq!(auth.as_deref(), Some("Bearer secret-token"));
    assert_eq!(body["answers"], json!({ "q1": "1", "q3": "true" }));
    assert!(body["timeTakenSeconds"].is_u64());
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = client(&format!("http://{addr}/api"), None)
        .fetch_catalog()
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClientError::Transport(_)));
}
