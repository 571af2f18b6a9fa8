use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentTeacher, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, ExamQuestion, User};
use crate::db::types::{AnswerType, AttemptMode};
use crate::repositories;
use crate::schemas::attempt::{AttemptListResponse, AttemptResponse, AttemptSubmission};
use crate::schemas::exam::{
    ExamAssignRequest, ExamCreate, ExamDetailResponse, ExamListResponse, ExamQuestionCreate,
    ExamQuestionResponse, ExamResponse, GenerateExamRequest, GeneratedExamResponse,
};
use crate::services::{generation, grading};

#[derive(Debug, Deserialize)]
pub(crate) struct ExamListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_exams).post(create_exam))
        .route("/generate", post(generate_exam))
        .route("/attempts", get(list_attempts))
        .route("/attempts/mine", get(list_my_attempts))
        .route("/attempts/:attempt_id", get(attempt_detail))
        .route("/:exam_id", get(exam_detail))
        .route("/:exam_id/questions", post(add_question))
        .route("/:exam_id/questions/generate", post(generate_exam_questions))
        .route("/:exam_id/questions/:question_id", axum::routing::delete(delete_question))
        .route("/:exam_id/assign", post(assign_exam))
        .route("/:exam_id/attempts", post(submit_attempt))
}

async fn list_exams(
    Query(params): Query<ExamListQuery>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamListResponse>, ApiError> {
    let exams = repositories::exams::list_active(state.db(), params.skip, params.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;

    let mut items = Vec::with_capacity(exams.len());
    for exam in exams {
        if user.role.is_staff() || exam_visible_to_student(&state, &exam, &user).await? {
            items.push(ExamResponse::from_db(exam));
        }
    }

    Ok(Json(ExamListResponse { items }))
}

async fn create_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let now = primitive_now_utc();
    let exam = repositories::exams::create(
        state.db(),
        repositories::exams::CreateExam {
            id: &Uuid::new_v4().to_string(),
            title: &payload.title,
            description: payload.description.as_deref(),
            category: payload.category,
            question_count: payload.question_count,
            is_active: true,
            study_enabled: payload.study_enabled,
            test_enabled: payload.test_enabled,
            ai_prompt: None,
            created_by: Some(&teacher.id),
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %exam.id,
        action = "exam_create",
        "Exam created"
    );

    Ok((StatusCode::CREATED, Json(ExamResponse::from_db(exam))))
}

async fn generate_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<GenerateExamRequest>,
) -> Result<(StatusCode, Json<GeneratedExamResponse>), ApiError> {
    let (mut blueprint, used_fallback) =
        generation::generate_exam(state.model(), payload.prompt.as_deref()).await;
    blueprint.ensure_items();

    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();
    let ai_source = if used_fallback { "fallback" } else { "ai" };

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let exam = repositories::exams::create(
        &mut *tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: &blueprint.title,
            description: Some(&blueprint.description),
            category: blueprint.category,
            question_count: blueprint.question_count as i32,
            is_active: true,
            study_enabled: true,
            test_enabled: true,
            ai_prompt: payload.prompt.as_deref(),
            created_by: Some(&teacher.id),
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    for (index, draft) in blueprint.items.iter().enumerate() {
        repositories::exams::create_question(
            &mut *tx,
            repositories::exams::CreateExamQuestion {
                id: &Uuid::new_v4().to_string(),
                exam_id: &exam_id,
                prompt: &draft.prompt,
                answer_type: draft.answer_type,
                correct_answer: draft.correct_answer.as_deref(),
                wrong1: draft.wrong1.as_deref(),
                wrong2: draft.wrong2.as_deref(),
                wrong3: draft.wrong3.as_deref(),
                reference_answer: draft.reference_answer.as_deref(),
                position: (index + 1) as i32,
                ai_source: Some(ai_source),
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to insert exam question"))?;
    }
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %exam.id,
        fallback = used_fallback,
        action = "exam_generate",
        "Exam generated"
    );

    Ok((
        StatusCode::CREATED,
        Json(GeneratedExamResponse {
            exam: ExamResponse::from_db(exam),
            fallback: used_fallback,
            notice: used_fallback
                .then(|| "AI unavailable. Created a built-in exam template.".to_string()),
        }),
    ))
}

async fn exam_detail(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamDetailResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if !user.role.is_staff() && !exam_visible_to_student(&state, &exam, &user).await? {
        return Err(ApiError::Forbidden("This exam is not shared with you"));
    }

    let questions = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exam questions"))?;

    Ok(Json(ExamDetailResponse {
        exam: ExamResponse::from_db(exam),
        questions: questions.into_iter().map(ExamQuestionResponse::from_db).collect(),
    }))
}

async fn add_question(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamQuestionCreate>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = fetch_exam(&state, &exam_id).await?;
    let answer_type = payload.answer_type.unwrap_or_else(|| exam.category.answer_type());

    match answer_type {
        AnswerType::Mcq => {
            if payload.correct_answer.as_deref().map_or(true, str::is_empty) {
                return Err(ApiError::BadRequest(
                    "Multiple-choice questions need a correct answer".to_string(),
                ));
            }
        }
        AnswerType::Text => {
            let reference = payload
                .reference_answer
                .as_deref()
                .or(payload.correct_answer.as_deref())
                .map_or(true, str::is_empty);
            if reference {
                return Err(ApiError::BadRequest(
                    "Text questions need a reference answer".to_string(),
                ));
            }
        }
    }

    let position = repositories::exams::next_question_position(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to compute question position"))?;

    let question_id = Uuid::new_v4().to_string();
    repositories::exams::create_question(
        state.db(),
        repositories::exams::CreateExamQuestion {
            id: &question_id,
            exam_id: &exam.id,
            prompt: &payload.prompt,
            answer_type,
            correct_answer: payload.correct_answer.as_deref(),
            wrong1: payload.wrong1.as_deref(),
            wrong2: payload.wrong2.as_deref(),
            wrong3: payload.wrong3.as_deref(),
            reference_answer: payload
                .reference_answer
                .as_deref()
                .or(payload.correct_answer.as_deref()),
            position,
            ai_source: None,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to add exam question"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %exam.id,
        question_id = %question_id,
        action = "exam_add_question",
        "Exam question added"
    );

    Ok((StatusCode::CREATED, Json(json!({ "question_id": question_id, "position": position }))))
}

async fn generate_exam_questions(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<GenerateExamRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    let (drafts, used_fallback) =
        generation::generate_questions(state.model(), exam.category, payload.prompt.as_deref())
            .await;

    let mut position = repositories::exams::next_question_position(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to compute question position"))?;

    let ai_source = if used_fallback { "fallback" } else { "ai" };
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    for draft in &drafts {
        repositories::exams::create_question(
            &mut *tx,
            repositories::exams::CreateExamQuestion {
                id: &Uuid::new_v4().to_string(),
                exam_id: &exam.id,
                prompt: &draft.prompt,
                answer_type: draft.answer_type,
                correct_answer: draft.correct_answer.as_deref(),
                wrong1: draft.wrong1.as_deref(),
                wrong2: draft.wrong2.as_deref(),
                wrong3: draft.wrong3.as_deref(),
                reference_answer: draft.reference_answer.as_deref(),
                position,
                ai_source: Some(ai_source),
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to insert exam question"))?;
        position += 1;
    }
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %exam.id,
        count = drafts.len(),
        fallback = used_fallback,
        action = "exam_generate_questions",
        "Exam questions generated"
    );

    Ok((StatusCode::CREATED, Json(json!({ "added": drafts.len(), "fallback": used_fallback }))))
}

async fn delete_question(
    Path((exam_id, question_id)): Path<(String, String)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    let removed = repositories::exams::delete_question(state.db(), &exam.id, &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam question"))?;

    if removed == 0 {
        return Err(ApiError::NotFound("Exam question not found".to_string()));
    }

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %exam.id,
        question_id = %question_id,
        action = "exam_delete_question",
        "Exam question removed"
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn assign_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamAssignRequest>,
) -> Result<StatusCode, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    let user = repositories::users::find_by_id(state.db(), &payload.user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    repositories::exams::create_assignment(
        state.db(),
        repositories::exams::CreateAssignment {
            id: &Uuid::new_v4().to_string(),
            exam_id: &exam.id,
            user_id: &user.id,
            can_study: payload.can_study,
            can_test: payload.can_test,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to assign exam"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %exam.id,
        assigned_to = %user.id,
        action = "exam_assign",
        "Exam shared with student"
    );

    Ok(StatusCode::CREATED)
}

async fn submit_attempt(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AttemptSubmission>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    if !exam.is_active {
        return Err(ApiError::BadRequest("This exam is no longer available".to_string()));
    }
    match payload.mode {
        AttemptMode::Study if !exam.study_enabled => {
            return Err(ApiError::BadRequest("Study mode is disabled for this exam".to_string()));
        }
        AttemptMode::Test if !exam.test_enabled => {
            return Err(ApiError::BadRequest(
                "This exam is not accepting test attempts right now".to_string(),
            ));
        }
        _ => {}
    }
    if !user.role.is_staff() && !attempt_allowed(&state, &exam, &user, payload.mode).await? {
        return Err(ApiError::Forbidden("This exam is not shared with you for that mode"));
    }

    let questions = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exam questions"))?;
    if questions.is_empty() {
        return Err(ApiError::BadRequest(
            "This exam does not have any questions yet".to_string(),
        ));
    }

    let mut details = Vec::with_capacity(questions.len());
    let mut score = 0;
    for question in &questions {
        let submitted = payload
            .answers
            .iter()
            .find(|answer| answer.question_id == question.id)
            .map(|answer| answer.answer.trim())
            .unwrap_or("");

        let entry = grade_question(&state, question, submitted).await;
        if entry["is_correct"].as_bool().unwrap_or(false) {
            score += 1;
        }
        details.push(entry);
    }

    let ai_feedback = if payload.mode == AttemptMode::Test {
        grading::summarize_attempt_for_teacher(state.model(), &exam.title, &details).await
    } else {
        None
    };

    let attempt = repositories::attempts::create(
        state.db(),
        repositories::attempts::CreateAttempt {
            id: &Uuid::new_v4().to_string(),
            user_id: &user.id,
            exam_id: &exam.id,
            score,
            total: questions.len() as i32,
            details: Value::Array(details),
            ai_feedback: ai_feedback.as_deref(),
            mode: payload.mode,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record exam attempt"))?;

    tracing::info!(
        user_id = %user.id,
        exam_id = %exam.id,
        attempt_id = %attempt.id,
        score = attempt.score,
        total = attempt.total,
        action = "attempt_submit",
        "Exam attempt recorded"
    );

    Ok((StatusCode::CREATED, Json(AttemptResponse::from_db(attempt))))
}

async fn list_attempts(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<AttemptListResponse>, ApiError> {
    let attempts = repositories::attempts::list_recent(state.db(), 50)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    Ok(Json(AttemptListResponse {
        items: attempts.into_iter().map(AttemptResponse::from_db).collect(),
    }))
}

async fn list_my_attempts(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptListResponse>, ApiError> {
    let attempts = repositories::attempts::list_for_user(state.db(), &user.id, 50)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    Ok(Json(AttemptListResponse {
        items: attempts.into_iter().map(AttemptResponse::from_db).collect(),
    }))
}

async fn attempt_detail(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("Exam attempt not found".to_string()))?;

    if attempt.user_id != user.id && !user.role.is_staff() {
        return Err(ApiError::Forbidden("You do not have access to that report"));
    }

    Ok(Json(AttemptResponse::from_db(attempt)))
}

async fn grade_question(state: &AppState, question: &ExamQuestion, submitted: &str) -> Value {
    let (is_correct, feedback, explanation) = match question.answer_type {
        AnswerType::Text => {
            let reference = question
                .reference_answer
                .as_deref()
                .or(question.correct_answer.as_deref())
                .unwrap_or("");
            let evaluation = grading::evaluate_text_answer(
                state.model(),
                &question.prompt,
                reference,
                submitted,
            )
            .await;
            (evaluation.is_correct, evaluation.feedback, evaluation.explanation)
        }
        AnswerType::Mcq => {
            let correct = question.correct_answer.as_deref().unwrap_or("");
            (!submitted.is_empty() && submitted == correct, String::new(), String::new())
        }
    };

    json!({
        "question_id": question.id,
        "prompt": question.prompt,
        "selected": submitted,
        "correct_answer": question
            .correct_answer
            .as_deref()
            .or(question.reference_answer.as_deref())
            .unwrap_or(""),
        "is_correct": is_correct,
        "feedback": feedback,
        "explanation": explanation,
    })
}

async fn attempt_allowed(
    state: &AppState,
    exam: &Exam,
    user: &User,
    mode: AttemptMode,
) -> Result<bool, ApiError> {
    let has_assignments = repositories::exams::has_assignments(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check exam assignments"))?;

    // Exams without explicit assignments are open to everyone.
    if !has_assignments {
        return Ok(true);
    }

    let assignment = repositories::exams::find_assignment(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam assignment"))?;

    Ok(match assignment {
        Some(assignment) => match mode {
            AttemptMode::Study => assignment.can_study,
            AttemptMode::Test => assignment.can_test,
        },
        None => false,
    })
}

async fn exam_visible_to_student(
    state: &AppState,
    exam: &Exam,
    user: &User,
) -> Result<bool, ApiError> {
    let has_assignments = repositories::exams::has_assignments(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check exam assignments"))?;

    if !has_assignments {
        return Ok(true);
    }

    let assignment = repositories::exams::find_assignment(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam assignment"))?;

    Ok(assignment.is_some())
}

async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}

fn default_limit() -> i64 {
    100
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::db::types::UserRole;
    use crate::test_support;

    #[tokio::test]
    async fn generated_exam_can_be_taken_end_to_end_offline() {
        let ctx = test_support::setup_test_context().await;

        let teacher = test_support::insert_user(
            ctx.state.db(),
            "grammar-teacher",
            "grammar-teacher@example.com",
            UserRole::Teacher,
            "teacher-pass",
        )
        .await;
        let student = test_support::insert_user(
            ctx.state.db(),
            "grammar-student",
            "grammar-student@example.com",
            UserRole::Student,
            "student-pass",
        )
        .await;
        let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());
        let student_token = test_support::bearer_token(&student.id, ctx.state.settings());

        // Model is unconfigured in tests, so the curated fallback must serve.
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/exams/generate",
                Some(&teacher_token),
                Some(json!({"prompt": "a quick mixed drill"})),
            ))
            .await
            .expect("generate exam");

        let status = response.status();
        let generated = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::CREATED, "response: {generated}");
        assert_eq!(generated["fallback"], true);
        let exam_id = generated["id"].as_str().expect("exam id").to_string();

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/exams/{exam_id}"),
                Some(&student_token),
                None,
            ))
            .await
            .expect("exam detail");

        let status = response.status();
        let detail = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {detail}");
        let questions = detail["questions"].as_array().expect("questions");
        assert_eq!(questions.len(), detail["question_count"].as_i64().unwrap() as usize);

        let answers: Vec<serde_json::Value> = questions
            .iter()
            .map(|question| {
                json!({
                    "question_id": question["id"],
                    "answer": question["options"].as_array().and_then(|o| o.first()).cloned().unwrap_or(json!(""))
                })
            })
            .collect();

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/exams/{exam_id}/attempts"),
                Some(&student_token),
                Some(json!({"mode": "study", "answers": answers})),
            ))
            .await
            .expect("submit attempt");

        let status = response.status();
        let attempt = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::CREATED, "response: {attempt}");
        assert_eq!(attempt["total"].as_i64().unwrap() as usize, questions.len());
        assert!(attempt["details"].as_array().is_some());
    }

    #[tokio::test]
    async fn students_cannot_create_exams() {
        let ctx = test_support::setup_test_context().await;

        let student = test_support::insert_user(
            ctx.state.db(),
            "plain-student",
            "plain-student@example.com",
            UserRole::Student,
            "student-pass",
        )
        .await;
        let token = test_support::bearer_token(&student.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/exams",
                Some(&token),
                Some(json!({"title": "Nope", "category": "grammar"})),
            ))
            .await
            .expect("create exam");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
