//! Work Queue storage (component B). Durable Postgres-backed table,
//! dequeued with `FOR UPDATE SKIP LOCKED`, directly generalizing
//! `delivery::dequeue`'s `issue_delivery_queue` pattern to a generic job
//! envelope keyed by `event_id`.

use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Transaction;
use uuid::Uuid;

use crate::model::WorkQueueJob;

/// `job_key = "event:{event_id}"`. Enqueuing the same key twice is a no-op
/// (§8 idempotency).
pub async fn enqueue(
    pool: &PgPool,
    job_key: &str,
    event_id: Uuid,
    available_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO work_queue (job_key, event_id, available_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (job_key) DO NOTHING
        "#,
        job_key,
        event_id,
        available_at,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn dequeue(
    pool: &PgPool,
) -> Result<Option<(Transaction<'static, Postgres>, WorkQueueJob)>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query!(
        r#"
        SELECT id, job_key, event_id, attempts, available_at, created_at
        FROM work_queue
        WHERE available_at <= now()
        ORDER BY available_at
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        "#
    )
    .fetch_optional(&mut *tx)
    .await?;

    Ok(row.map(|r| {
        (
            tx,
            WorkQueueJob {
                id: r.id,
                job_key: r.job_key,
                event_id: r.event_id,
                attempts: r.attempts,
                available_at: r.available_at,
                created_at: r.created_at,
            },
        )
    }))
}

pub async fn reschedule(
    mut tx: Transaction<'static, Postgres>,
    job_id: Uuid,
    next_available_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE work_queue SET attempts = attempts + 1, available_at = $2
        WHERE id = $1
        "#,
        job_id,
        next_available_at
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn delete(
    mut tx: Transaction<'static, Postgres>,
    job_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query!("DELETE FROM work_queue WHERE id = $1", job_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
