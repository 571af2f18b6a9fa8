use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::{AnswerType, Category};
use crate::repositories;
use crate::schemas::question::{
    GenerateQuestionsRequest, GeneratedQuestionsResponse, QuestionCreate, QuestionResponse,
    QuestionUpdate,
};
use crate::services::generation;

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:category", get(list_questions).post(create_question))
        .route("/:category/generate", post(generate_questions))
        .route("/:category/:question_id", axum::routing::patch(update_question).delete(delete_question))
}

async fn list_questions(
    Path(category): Path<Category>,
    Query(params): Query<QuestionListQuery>,
    CurrentTeacher(_teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let questions =
        repositories::questions::list_by_category(state.db(), category, params.skip, params.limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list questions"))?;

    Ok(Json(questions.into_iter().map(QuestionResponse::from_db).collect()))
}

async fn create_question(
    Path(category): Path<Category>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<QuestionCreate>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let prompt = rendered_prompt(category, &payload.text);

    match category.answer_type() {
        AnswerType::Mcq => {
            let missing = payload.correct_answer.as_deref().map_or(true, str::is_empty)
                || payload.wrong1.as_deref().map_or(true, str::is_empty)
                || payload.wrong2.as_deref().map_or(true, str::is_empty)
                || payload.wrong3.as_deref().map_or(true, str::is_empty);
            if missing {
                return Err(ApiError::BadRequest(
                    "Multiple-choice questions need a correct answer and three wrong options"
                        .to_string(),
                ));
            }
        }
        AnswerType::Text => {
            if payload.reference_answer.as_deref().map_or(true, str::is_empty) {
                return Err(ApiError::BadRequest(
                    "Translation questions need a reference answer".to_string(),
                ));
            }
        }
    }

    let question = repositories::questions::create(
        state.db(),
        repositories::questions::CreateQuestion {
            id: &Uuid::new_v4().to_string(),
            category,
            prompt: &prompt,
            answer_type: category.answer_type(),
            correct_answer: payload.correct_answer.as_deref(),
            wrong1: payload.wrong1.as_deref(),
            wrong2: payload.wrong2.as_deref(),
            wrong3: payload.wrong3.as_deref(),
            reference_answer: payload.reference_answer.as_deref(),
            created_by: Some(&teacher.id),
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create question"))?;

    tracing::info!(
        user_id = %teacher.id,
        question_id = %question.id,
        category = category.as_str(),
        action = "question_create",
        "Question added to the bank"
    );

    Ok((StatusCode::CREATED, Json(QuestionResponse::from_db(question))))
}

async fn generate_questions(
    Path(category): Path<Category>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<GenerateQuestionsRequest>,
) -> Result<(StatusCode, Json<GeneratedQuestionsResponse>), ApiError> {
    let (drafts, used_fallback) =
        generation::generate_questions(state.model(), category, payload.prompt.as_deref()).await;

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let mut created = Vec::with_capacity(drafts.len());
    for draft in &drafts {
        let question = repositories::questions::create(
            &mut *tx,
            repositories::questions::CreateQuestion {
                id: &Uuid::new_v4().to_string(),
                category,
                prompt: &draft.prompt,
                answer_type: draft.answer_type,
                correct_answer: draft.correct_answer.as_deref(),
                wrong1: draft.wrong1.as_deref(),
                wrong2: draft.wrong2.as_deref(),
                wrong3: draft.wrong3.as_deref(),
                reference_answer: draft.reference_answer.as_deref(),
                created_by: Some(&teacher.id),
                created_at: now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to insert generated question"))?;
        created.push(question);
    }
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(
        user_id = %teacher.id,
        category = category.as_str(),
        count = created.len(),
        fallback = used_fallback,
        action = "question_generate",
        "Generated bank questions"
    );

    Ok((
        StatusCode::CREATED,
        Json(GeneratedQuestionsResponse {
            items: created.into_iter().map(QuestionResponse::from_db).collect(),
            fallback: used_fallback,
            notice: used_fallback
                .then(|| "AI temporarily offline. Added sample questions instead.".to_string()),
        }),
    ))
}

async fn update_question(
    Path((category, question_id)): Path<(Category, String)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<QuestionUpdate>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = fetch_in_category(&state, category, &question_id).await?;

    repositories::questions::update(
        state.db(),
        &question.id,
        repositories::questions::UpdateQuestion {
            prompt: payload.prompt,
            correct_answer: payload.correct_answer,
            wrong1: payload.wrong1,
            wrong2: payload.wrong2,
            wrong3: payload.wrong3,
            reference_answer: payload.reference_answer,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update question"))?;

    let updated = repositories::questions::find_by_id(state.db(), &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch updated question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    tracing::info!(
        user_id = %teacher.id,
        question_id = %updated.id,
        action = "question_update",
        "Question updated"
    );

    Ok(Json(QuestionResponse::from_db(updated)))
}

async fn delete_question(
    Path((category, question_id)): Path<(Category, String)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let question = fetch_in_category(&state, category, &question_id).await?;

    repositories::questions::delete_by_id(state.db(), &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete question"))?;

    tracing::info!(
        user_id = %teacher.id,
        question_id = %question.id,
        action = "question_delete",
        "Question removed from the bank"
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_in_category(
    state: &AppState,
    category: Category,
    question_id: &str,
) -> Result<crate::db::models::BankQuestion, ApiError> {
    let question = repositories::questions::find_by_id(state.db(), question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?;

    match question {
        Some(question) if question.category == category => Ok(question),
        _ => Err(ApiError::NotFound("Question not found".to_string())),
    }
}

fn rendered_prompt(category: Category, text: &str) -> String {
    let text = text.trim();
    match category {
        Category::Vocabulary => format!("Select the correct meaning for the word '{text}'."),
        Category::Grammar => text.replace("__", "____"),
        Category::Translation => text.to_string(),
    }
}

fn default_limit() -> i64 {
    100
}

#[cfg(test)]
mod tests {
    use super::rendered_prompt;
    use crate::db::types::Category;

    #[test]
    fn prompts_are_rendered_per_category() {
        assert_eq!(
            rendered_prompt(Category::Vocabulary, "serene"),
            "Select the correct meaning for the word 'serene'."
        );
        assert_eq!(rendered_prompt(Category::Grammar, "She __ home."), "She ____ home.");
        assert_eq!(
            rendered_prompt(Category::Translation, "Translate: Hallo."),
            "Translate: Hallo."
        );
    }
}
