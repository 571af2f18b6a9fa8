use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::ExamAttempt;
use crate::db::types::AttemptMode;

#[derive(Debug, Deserialize)]
pub(crate) struct AttemptSubmission {
    #[serde(default = "default_mode")]
    pub(crate) mode: AttemptMode,
    pub(crate) answers: Vec<AnswerSubmission>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerSubmission {
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) answer: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) score: i32,
    pub(crate) total: i32,
    pub(crate) mode: AttemptMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ai_feedback: Option<String>,
    pub(crate) details: serde_json::Value,
    pub(crate) created_at: String,
}

impl AttemptResponse {
    pub(crate) fn from_db(attempt: ExamAttempt) -> Self {
        Self {
            id: attempt.id,
            exam_id: attempt.exam_id,
            user_id: attempt.user_id,
            score: attempt.score,
            total: attempt.total,
            mode: attempt.mode,
            ai_feedback: attempt.ai_feedback,
            details: attempt.details.0,
            created_at: format_primitive(attempt.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptListResponse {
    pub(crate) items: Vec<AttemptResponse>,
}

fn default_mode() -> AttemptMode {
    AttemptMode::Test
}
