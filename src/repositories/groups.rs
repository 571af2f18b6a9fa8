use sqlx::PgPool;

use crate::db::models::{BankQuestion, QuestionGroup};
use crate::db::types::Category;

const COLUMNS: &str = "\
    id, name, category, description, ai_prompt, created_by, created_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<QuestionGroup>, sqlx::Error> {
    sqlx::query_as::<_, QuestionGroup>(&format!(
        "SELECT {COLUMNS} FROM question_groups WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Groups the user created plus groups shared with them.
pub(crate) async fn list_visible_to_user(
    pool: &PgPool,
    user_id: &str,
    is_staff: bool,
) -> Result<Vec<QuestionGroup>, sqlx::Error> {
    if is_staff {
        return sqlx::query_as::<_, QuestionGroup>(&format!(
            "SELECT {COLUMNS} FROM question_groups ORDER BY created_at DESC"
        ))
        .fetch_all(pool)
        .await;
    }

    sqlx::query_as::<_, QuestionGroup>(&format!(
        "SELECT {COLUMNS} FROM question_groups g
         WHERE EXISTS (
             SELECT 1 FROM question_group_assignments a
             WHERE a.group_id = g.id AND a.user_id = $1 AND a.can_view = TRUE
         )
         ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub(crate) struct CreateGroup<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub category: Category,
    pub description: Option<&'a str>,
    pub ai_prompt: Option<&'a str>,
    pub created_by: Option<&'a str>,
    pub created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create<'a>(
    executor: impl sqlx::PgExecutor<'a>,
    params: CreateGroup<'_>,
) -> Result<QuestionGroup, sqlx::Error> {
    sqlx::query_as::<_, QuestionGroup>(&format!(
        "INSERT INTO question_groups (
            id, name, category, description, ai_prompt, created_by, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.name)
    .bind(params.category)
    .bind(params.description)
    .bind(params.ai_prompt)
    .bind(params.created_by)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn add_question(
    pool: &PgPool,
    id: &str,
    group_id: &str,
    question_id: &str,
    now: time::PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO question_group_items (id, group_id, question_id, created_at)
         VALUES ($1,$2,$3,$4)
         ON CONFLICT (group_id, question_id) DO NOTHING",
    )
    .bind(id)
    .bind(group_id)
    .bind(question_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn remove_question(
    pool: &PgPool,
    group_id: &str,
    question_id: &str,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM question_group_items WHERE group_id = $1 AND question_id = $2")
            .bind(group_id)
            .bind(question_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn share_with_user(
    pool: &PgPool,
    id: &str,
    group_id: &str,
    user_id: &str,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO question_group_assignments (id, group_id, user_id, can_view, created_at)
         VALUES ($1,$2,$3,TRUE,$4)
         ON CONFLICT (group_id, user_id) DO UPDATE SET can_view = TRUE",
    )
    .bind(id)
    .bind(group_id)
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn list_questions(
    pool: &PgPool,
    group_id: &str,
) -> Result<Vec<BankQuestion>, sqlx::Error> {
    sqlx::query_as::<_, BankQuestion>(
        "SELECT q.id, q.category, q.prompt, q.answer_type, q.correct_answer,
                q.wrong1, q.wrong2, q.wrong3, q.reference_answer, q.created_by, q.created_at
         FROM bank_questions q
         JOIN question_group_items i ON i.question_id = q.id
         WHERE i.group_id = $1
         ORDER BY i.created_at ASC",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
}
