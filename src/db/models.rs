use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AnswerType, AttemptMode, Category, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) hashed_password: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct BankQuestion {
    pub(crate) id: String,
    pub(crate) category: Category,
    pub(crate) prompt: String,
    pub(crate) answer_type: AnswerType,
    pub(crate) correct_answer: Option<String>,
    pub(crate) wrong1: Option<String>,
    pub(crate) wrong2: Option<String>,
    pub(crate) wrong3: Option<String>,
    pub(crate) reference_answer: Option<String>,
    pub(crate) created_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) category: Category,
    pub(crate) question_count: i32,
    pub(crate) is_active: bool,
    pub(crate) study_enabled: bool,
    pub(crate) test_enabled: bool,
    pub(crate) ai_prompt: Option<String>,
    pub(crate) created_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamQuestion {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) prompt: String,
    pub(crate) answer_type: AnswerType,
    pub(crate) correct_answer: Option<String>,
    pub(crate) wrong1: Option<String>,
    pub(crate) wrong2: Option<String>,
    pub(crate) wrong3: Option<String>,
    pub(crate) reference_answer: Option<String>,
    pub(crate) position: i32,
    pub(crate) ai_source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamAssignment {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) can_study: bool,
    pub(crate) can_test: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamAttempt {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) exam_id: String,
    pub(crate) score: i32,
    pub(crate) total: i32,
    pub(crate) details: Json<serde_json::Value>,
    pub(crate) ai_feedback: Option<String>,
    pub(crate) mode: AttemptMode,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionGroup {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) category: Category,
    pub(crate) description: Option<String>,
    pub(crate) ai_prompt: Option<String>,
    pub(crate) created_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}
