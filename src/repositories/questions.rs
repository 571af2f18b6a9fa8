use sqlx::PgPool;

use crate::db::models::BankQuestion;
use crate::db::types::{AnswerType, Category};

const COLUMNS: &str = "\
    id, category, prompt, answer_type, correct_answer, wrong1, wrong2, wrong3, \
    reference_answer, created_by, created_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<BankQuestion>, sqlx::Error> {
    sqlx::query_as::<_, BankQuestion>(&format!(
        "SELECT {COLUMNS} FROM bank_questions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_category(
    pool: &PgPool,
    category: Category,
    skip: i64,
    limit: i64,
) -> Result<Vec<BankQuestion>, sqlx::Error> {
    sqlx::query_as::<_, BankQuestion>(&format!(
        "SELECT {COLUMNS} FROM bank_questions
         WHERE category = $1
         ORDER BY created_at DESC OFFSET $2 LIMIT $3"
    ))
    .bind(category)
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_all(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM bank_questions").fetch_one(pool).await
}

pub(crate) struct CreateQuestion<'a> {
    pub id: &'a str,
    pub category: Category,
    pub prompt: &'a str,
    pub answer_type: AnswerType,
    pub correct_answer: Option<&'a str>,
    pub wrong1: Option<&'a str>,
    pub wrong2: Option<&'a str>,
    pub wrong3: Option<&'a str>,
    pub reference_answer: Option<&'a str>,
    pub created_by: Option<&'a str>,
    pub created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create<'a>(
    executor: impl sqlx::PgExecutor<'a>,
    params: CreateQuestion<'_>,
) -> Result<BankQuestion, sqlx::Error> {
    sqlx::query_as::<_, BankQuestion>(&format!(
        "INSERT INTO bank_questions (
            id, category, prompt, answer_type, correct_answer, wrong1, wrong2, wrong3,
            reference_answer, created_by, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.category)
    .bind(params.prompt)
    .bind(params.answer_type)
    .bind(params.correct_answer)
    .bind(params.wrong1)
    .bind(params.wrong2)
    .bind(params.wrong3)
    .bind(params.reference_answer)
    .bind(params.created_by)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) struct UpdateQuestion {
    pub prompt: Option<String>,
    pub correct_answer: Option<String>,
    pub wrong1: Option<String>,
    pub wrong2: Option<String>,
    pub wrong3: Option<String>,
    pub reference_answer: Option<String>,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateQuestion,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE bank_questions SET
            prompt = COALESCE($1, prompt),
            correct_answer = COALESCE($2, correct_answer),
            wrong1 = COALESCE($3, wrong1),
            wrong2 = COALESCE($4, wrong2),
            wrong3 = COALESCE($5, wrong3),
            reference_answer = COALESCE($6, reference_answer)
         WHERE id = $7",
    )
    .bind(params.prompt)
    .bind(params.correct_answer)
    .bind(params.wrong1)
    .bind(params.wrong2)
    .bind(params.wrong3)
    .bind(params.reference_answer)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM bank_questions WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}
