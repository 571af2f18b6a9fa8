use sqlx::PgPool;

use crate::db::types::UserRole;

pub(crate) struct CreateTranscript<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub role: UserRole,
    pub message: &'a str,
    pub answer: &'a str,
    pub actions: serde_json::Value,
    pub created_at: time::PrimitiveDateTime,
}

/// Append-only log of completed assistant turns.
pub(crate) async fn create(pool: &PgPool, params: CreateTranscript<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO assistant_transcripts (id, user_id, role, message, answer, actions, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7)",
    )
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.role)
    .bind(params.message)
    .bind(params.answer)
    .bind(params.actions)
    .bind(params.created_at)
    .execute(pool)
    .await?;
    Ok(())
}
