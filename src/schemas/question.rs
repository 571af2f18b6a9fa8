use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::BankQuestion;
use crate::db::types::{AnswerType, Category};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    /// Vocabulary word, grammar sentence with `__` blank, or translation prompt.
    #[validate(length(min = 1, message = "source text must not be empty"))]
    pub(crate) text: String,
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
pub(crate) struct QuestionUpdate {
    #[serde(default)]
    pub(crate) prompt: Option<String>,
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
pub(crate) struct GenerateQuestionsRequest {
    #[serde(default)]
    pub(crate) prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) category: Category,
    pub(crate) prompt: String,
    pub(crate) answer_type: AnswerType,
    pub(crate) correct_answer: Option<String>,
    pub(crate) wrong1: Option<String>,
    pub(crate) wrong2: Option<String>,
    pub(crate) wrong3: Option<String>,
    pub(crate) reference_answer: Option<String>,
    pub(crate) created_at: String,
}

impl QuestionResponse {
    pub(crate) fn from_db(question: BankQuestion) -> Self {
        Self {
            id: question.id,
            category: question.category,
            prompt: question.prompt,
            answer_type: question.answer_type,
            correct_answer: question.correct_answer,
            wrong1: question.wrong1,
            wrong2: question.wrong2,
            wrong3: question.wrong3,
            reference_answer: question.reference_answer,
            created_at: format_primitive(question.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GeneratedQuestionsResponse {
    pub(crate) items: Vec<QuestionResponse>,
    /// Set when the curated fallback pool supplied the items.
    pub(crate) fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) notice: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GroupCreate {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub(crate) name: String,
    pub(crate) category: Category,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupQuestionRef {
    pub(crate) question_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupShareRequest {
    pub(crate) user_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) category: Category,
    pub(crate) description: Option<String>,
    pub(crate) created_at: String,
}

impl GroupResponse {
    pub(crate) fn from_db(group: crate::db::models::QuestionGroup) -> Self {
        Self {
            id: group.id,
            name: group.name,
            category: group.category,
            description: group.description,
            created_at: format_primitive(group.created_at),
        }
    }
}
