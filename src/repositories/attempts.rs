use sqlx::PgPool;

use crate::db::models::ExamAttempt;
use crate::db::types::AttemptMode;

const COLUMNS: &str = "\
    id, user_id, exam_id, score, total, details, ai_feedback, mode, created_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!("SELECT {COLUMNS} FROM exam_attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts ORDER BY created_at DESC LIMIT $1"
    ))
    .bind(limit.clamp(1, 500))
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_for_user(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts
         WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
    ))
    .bind(user_id)
    .bind(limit.clamp(1, 500))
    .fetch_all(pool)
    .await
}

pub(crate) struct CreateAttempt<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub exam_id: &'a str,
    pub score: i32,
    pub total: i32,
    pub details: serde_json::Value,
    pub ai_feedback: Option<&'a str>,
    pub mode: AttemptMode,
    pub created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create<'a>(
    executor: impl sqlx::PgExecutor<'a>,
    params: CreateAttempt<'_>,
) -> Result<ExamAttempt, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "INSERT INTO exam_attempts (
            id, user_id, exam_id, score, total, details, ai_feedback, mode, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.exam_id)
    .bind(params.score)
    .bind(params.total)
    .bind(params.details)
    .bind(params.ai_feedback)
    .bind(params.mode)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}
