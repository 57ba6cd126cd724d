use sqlx::PgPool;
use uuid::Uuid;

use crate::model::DeadLetterJob;

pub async fn insert(
    pool: &PgPool,
    event_id: Uuid,
    job_key: &str,
    last_error: &str,
    attempts: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO dead_letter_jobs (event_id, job_key, last_error, attempts)
        VALUES ($1, $2, $3, $4)
        "#,
        event_id,
        job_key,
        last_error,
        attempts,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list(pool: &PgPool) -> Result<Vec<DeadLetterJob>, sqlx::Error> {
    sqlx::query_as!(
        DeadLetterJob,
        r#"
        SELECT id, event_id, job_key, last_error, attempts, created_at
        FROM dead_letter_jobs
        ORDER BY created_at DESC
        "#
    )
    .fetch_all(pool)
    .await
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<DeadLetterJob>, sqlx::Error> {
    sqlx::query_as!(
        DeadLetterJob,
        r#"
        SELECT id, event_id, job_key, last_error, attempts, created_at
        FROM dead_letter_jobs
        WHERE id = $1
        "#,
        id
    )
    .fetch_optional(pool)
    .await
}

pub async fn remove(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!("DELETE FROM dead_letter_jobs WHERE id = $1", id)
        .execute(pool)
        .await?;
    Ok(())
}
