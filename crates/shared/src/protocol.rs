use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{CourseId, QuestionId, QuestionKind, QuizId};

/// Catalog entry as served by `GET /courses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub level: String,
    /// Minor currency units.
    #[serde(default)]
    pub price: u64,
    /// Hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(
        default,
        alias = "instructor",
        skip_serializing_if = "Option::is_none"
    )]
    pub instructor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Quiz as served to a taker. Correct answers are never part of this payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDefinition {
    pub id: QuizId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
    #[serde(
        default,
        alias = "timeLimit",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_limit_minutes: Option<u32>,
    #[serde(default)]
    pub passing_score: u32,
}

impl QuizDefinition {
    pub fn is_timed(&self) -> bool {
        self.time_limit_minutes.is_some_and(|minutes| minutes > 0)
    }

    pub fn question(&self, question_id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == question_id)
    }
}

/// Body of `POST /quizzes/{id}/submit`. Unanswered questions are absent from `answers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizRequest {
    pub answers: BTreeMap<QuestionId, String>,
    pub time_taken_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub correct: bool,
    #[serde(default)]
    pub user_answer: Option<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub score: u32,
    pub total: u32,
    pub passed: bool,
    #[serde(default)]
    pub results: Vec<QuestionResult>,
}

impl QuizResult {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.score) * 100.0 / f64::from(self.total)
    }
}
