use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentTeacher, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::question::{
    GroupCreate, GroupQuestionRef, GroupResponse, GroupShareRequest, QuestionResponse,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups).post(create_group))
        .route("/:group_id/questions", get(list_group_questions).post(add_question))
        .route("/:group_id/questions/:question_id", axum::routing::delete(remove_question))
        .route("/:group_id/share", post(share_group))
}

async fn list_groups(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let groups =
        repositories::groups::list_visible_to_user(state.db(), &user.id, user.role.is_staff())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list study packs"))?;

    Ok(Json(groups.into_iter().map(GroupResponse::from_db).collect()))
}

async fn create_group(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<GroupCreate>,
) -> Result<(StatusCode, Json<GroupResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let group = repositories::groups::create(
        state.db(),
        repositories::groups::CreateGroup {
            id: &Uuid::new_v4().to_string(),
            name: &payload.name,
            category: payload.category,
            description: payload.description.as_deref(),
            ai_prompt: None,
            created_by: Some(&teacher.id),
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create study pack"))?;

    tracing::info!(
        user_id = %teacher.id,
        group_id = %group.id,
        action = "group_create",
        "Study pack created"
    );

    Ok((StatusCode::CREATED, Json(GroupResponse::from_db(group))))
}

async fn list_group_questions(
    Path(group_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let group = fetch_group(&state, &group_id).await?;

    if !user.role.is_staff() {
        let visible =
            repositories::groups::list_visible_to_user(state.db(), &user.id, false)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to check study pack access"))?;
        if !visible.iter().any(|candidate| candidate.id == group.id) {
            return Err(ApiError::Forbidden("This study pack is not shared with you"));
        }
    }

    let questions = repositories::groups::list_questions(state.db(), &group.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list study pack questions"))?;

    Ok(Json(questions.into_iter().map(QuestionResponse::from_db).collect()))
}

async fn add_question(
    Path(group_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<GroupQuestionRef>,
) -> Result<StatusCode, ApiError> {
    let group = fetch_group(&state, &group_id).await?;

    let question = repositories::questions::find_by_id(state.db(), &payload.question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    if question.category != group.category {
        return Err(ApiError::BadRequest(
            "Question category does not match the study pack".to_string(),
        ));
    }

    let added = repositories::groups::add_question(
        state.db(),
        &Uuid::new_v4().to_string(),
        &group.id,
        &question.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to add question to study pack"))?;

    if !added {
        return Err(ApiError::Conflict("Question is already in this study pack".to_string()));
    }

    tracing::info!(
        user_id = %teacher.id,
        group_id = %group.id,
        question_id = %question.id,
        action = "group_add_question",
        "Question added to study pack"
    );

    Ok(StatusCode::CREATED)
}

async fn remove_question(
    Path((group_id, question_id)): Path<(String, String)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let group = fetch_group(&state, &group_id).await?;

    let removed = repositories::groups::remove_question(state.db(), &group.id, &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to remove question from study pack"))?;

    if removed == 0 {
        return Err(ApiError::NotFound("Question is not in this study pack".to_string()));
    }

    tracing::info!(
        user_id = %teacher.id,
        group_id = %group.id,
        question_id = %question_id,
        action = "group_remove_question",
        "Question removed from study pack"
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn share_group(
    Path(group_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<GroupShareRequest>,
) -> Result<StatusCode, ApiError> {
    let group = fetch_group(&state, &group_id).await?;

    let user = repositories::users::find_by_id(state.db(), &payload.user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    repositories::groups::share_with_user(
        state.db(),
        &Uuid::new_v4().to_string(),
        &group.id,
        &user.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to share study pack"))?;

    tracing::info!(
        user_id = %teacher.id,
        group_id = %group.id,
        shared_with = %user.id,
        action = "group_share",
        "Study pack shared"
    );

    Ok(StatusCode::CREATED)
}

async fn fetch_group(
    state: &AppState,
    group_id: &str,
) -> Result<crate::db::models::QuestionGroup, ApiError> {
    repositories::groups::find_by_id(state.db(), group_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch study pack"))?
        .ok_or_else(|| ApiError::NotFound("Study pack not found".to_string()))
}
