use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Exam, ExamQuestion};
use crate::db::types::{AnswerType, Category};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, max = 80, message = "title must be 1-80 characters"))]
    pub(crate) title: String,
    #[serde(default)]
    #[validate(length(max = 200, message = "description must be at most 200 characters"))]
    pub(crate) description: Option<String>,
    pub(crate) category: Category,
    #[serde(default = "default_question_count")]
    #[serde(alias = "questions")]
    #[validate(range(min = 3, max = 10, message = "question_count must be between 3 and 10"))]
    pub(crate) question_count: i32,
    #[serde(default = "default_true")]
    pub(crate) study_enabled: bool,
    #[serde(default = "default_true")]
    pub(crate) test_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateExamRequest {
    #[serde(default)]
    pub(crate) prompt: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamQuestionCreate {
    #[validate(length(min = 1, max = 400, message = "prompt must be 1-400 characters"))]
    pub(crate) prompt: String,
    #[serde(default)]
    pub(crate) answer_type: Option<AnswerType>,
    #[serde(default)]
    pub(crate) correct_answer: Option<String>,
    #[serde(default)]
    pub(crate) wrong1: Option<String>,
    #[serde(default)]
    pub(crate) wrong2: Option<String>,
    #[serde(default)]
    pub(crate) wrong3: Option<String>,
    #[serde(default)]
    pub(crate) reference_answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamAssignRequest {
    pub(crate) user_id: String,
    #[serde(default = "default_true")]
    pub(crate) can_study: bool,
    #[serde(default = "default_true")]
    pub(crate) can_test: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) category: Category,
    pub(crate) question_count: i32,
    pub(crate) is_active: bool,
    pub(crate) study_enabled: bool,
    pub(crate) test_enabled: bool,
    pub(crate) created_at: String,
}

impl ExamResponse {
    pub(crate) fn from_db(exam: Exam) -> Self {
        Self {
            id: exam.id,
            title: exam.title,
            description: exam.description,
            category: exam.category,
            question_count: exam.question_count,
            is_active: exam.is_active,
            study_enabled: exam.study_enabled,
            test_enabled: exam.test_enabled,
            created_at: format_primitive(exam.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamQuestionResponse {
    pub(crate) id: String,
    pub(crate) prompt: String,
    pub(crate) answer_type: AnswerType,
    pub(crate) options: Vec<String>,
    pub(crate) position: i32,
}

impl ExamQuestionResponse {
    /// Student-facing view: the correct answer is shuffled into the options.
    pub(crate) fn from_db(question: ExamQuestion) -> Self {
        use rand::seq::SliceRandom;

        let mut options: Vec<String> = match question.answer_type {
            AnswerType::Mcq => {
                [&question.correct_answer, &question.wrong1, &question.wrong2, &question.wrong3]
                    .iter()
                    .filter_map(|option| option.as_ref().cloned())
                    .collect()
            }
            AnswerType::Text => Vec::new(),
        };
        options.shuffle(&mut rand::thread_rng());

        Self {
            id: question.id,
            prompt: question.prompt,
            answer_type: question.answer_type,
            options,
            position: question.position,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamDetailResponse {
    #[serde(flatten)]
    pub(crate) exam: ExamResponse,
    pub(crate) questions: Vec<ExamQuestionResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamListResponse {
    pub(crate) items: Vec<ExamResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GeneratedExamResponse {
    #[serde(flatten)]
    pub(crate) exam: ExamResponse,
    pub(crate) fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) notice: Option<String>,
}

fn default_question_count() -> i32 {
    5
}

fn default_true() -> bool {
    true
}
