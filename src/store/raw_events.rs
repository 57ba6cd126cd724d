//! Event Store (component A). Append-only; `store` is the only insertion
//! path and is idempotent on `idempotency_key` via a unique index, mirroring
//! `idempotency::persistence::try_save_response`'s
//! `INSERT ... ON CONFLICT DO NOTHING` + fallback-select shape.

use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::EntityKind;
use crate::model::RawEvent;

pub struct NewRawEvent {
    pub organization_id: Uuid,
    pub event_type: String,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub payload: Json,
    pub idempotency_key: Option<String>,
}

/// Returns `(event_id, is_new)`. `is_new=false` means the idempotency key
/// was already present and the existing row's id is returned unchanged —
/// storing the same event twice must be indistinguishable from storing it
/// once (§8).
pub async fn store(pool: &PgPool, event: NewRawEvent) -> Result<(Uuid, bool), sqlx::Error> {
    let inserted = sqlx::query!(
        r#"
        INSERT INTO raw_events
            (organization_id, event_type, entity_type, entity_id, payload, idempotency_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (idempotency_key) DO NOTHING
        RETURNING id
        "#,
        event.organization_id,
        event.event_type,
        event.entity_type.as_str(),
        event.entity_id,
        event.payload,
        event.idempotency_key,
    )
    .fetch_optional(pool)
    .await?;

    if let Some(row) = inserted {
        return Ok((row.id, true));
    }

    // Idempotency key collided (or is absent and two requests raced — rare,
    // acceptable per §5's "minor race" tolerance); fetch the existing row.
    let existing = sqlx::query!(
        "SELECT id FROM raw_events WHERE idempotency_key = $1",
        event.idempotency_key
    )
    .fetch_one(pool)
    .await?;
    Ok((existing.id, false))
}

/// Direct fetch by id, regardless of processed state — unlike `for_replay`,
/// which only ever returns already-processed rows. Dispatch needs this to
/// look up the row it just inserted.
pub async fn get(pool: &PgPool, event_id: Uuid) -> Result<Option<RawEvent>, sqlx::Error> {
    sqlx::query_as!(
        RawEvent,
        r#"
        SELECT
            id, organization_id, event_type,
            entity_type as "entity_type: EntityKind",
            entity_id, payload, idempotency_key, processed, processed_at,
            error_message, retry_count, created_at
        FROM raw_events
        WHERE id = $1
        "#,
        event_id
    )
    .fetch_optional(pool)
    .await
}

pub async fn mark_processed(pool: &PgPool, event_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE raw_events SET processed = true, processed_at = now() WHERE id = $1",
        event_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Used by `ops::dlq_retry` to give a re-queued job a clean retry budget.
pub async fn reset_retry(pool: &PgPool, event_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE raw_events SET retry_count = 0, error_message = NULL WHERE id = $1",
        event_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    pool: &PgPool,
    event_id: Uuid,
    error_message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE raw_events SET
            error_message = $2,
            retry_count = retry_count + 1
        WHERE id = $1
        "#,
        event_id,
        error_message
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unprocessed(
    pool: &PgPool,
    organization_id: Uuid,
    limit: i64,
) -> Result<Vec<RawEvent>, sqlx::Error> {
    sqlx::query_as!(
        RawEvent,
        r#"
        SELECT
            id, organization_id, event_type,
            entity_type as "entity_type: EntityKind",
            entity_id, payload, idempotency_key, processed, processed_at,
            error_message, retry_count, created_at
        FROM raw_events
        WHERE organization_id = $1 AND processed = false AND retry_count < 3
        ORDER BY created_at
        LIMIT $2
        "#,
        organization_id,
        limit
    )
    .fetch_all(pool)
    .await
}

/// Chronological, processed-only replay feed for one entity (§4.1).
pub async fn for_replay(
    pool: &PgPool,
    entity_type: EntityKind,
    entity_id: Uuid,
    from: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Vec<RawEvent>, sqlx::Error> {
    sqlx::query_as!(
        RawEvent,
        r#"
        SELECT
            id, organization_id, event_type,
            entity_type as "entity_type: EntityKind",
            entity_id, payload, idempotency_key, processed, processed_at,
            error_message, retry_count, created_at
        FROM raw_events
        WHERE entity_type = $1 AND entity_id = $2 AND processed = true
          AND ($3::timestamptz IS NULL OR created_at >= $3)
        ORDER BY created_at
        "#,
        entity_type.as_str(),
        entity_id,
        from,
    )
    .fetch_all(pool)
    .await
}

/// Recent bounce events for a mailbox, used by Correlation (§4.5).
pub async fn recent_bounces_for_mailbox(
    pool: &PgPool,
    mailbox_id: Uuid,
    since: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<RawEvent>, sqlx::Error> {
    sqlx::query_as!(
        RawEvent,
        r#"
        SELECT
            id, organization_id, event_type,
            entity_type as "entity_type: EntityKind",
            entity_id, payload, idempotency_key, processed, processed_at,
            error_message, retry_count, created_at
        FROM raw_events
        WHERE entity_type = 'mailbox' AND entity_id = $1
          AND event_type IN ('HARD_BOUNCE', 'BOUNCE')
          AND created_at >= $2
        ORDER BY created_at
        "#,
        mailbox_id,
        since,
    )
    .fetch_all(pool)
    .await
}
