use serde_json::Value as Json;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Transaction;
use uuid::Uuid;

use crate::domain::EntityKind;

/// Audit rows are keyed `(entity_type, entity_id, action)` per §7.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    organization_id: Uuid,
    entity_type: EntityKind,
    entity_id: Uuid,
    action: &str,
    detail: Json,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO audit_log (organization_id, entity_type, entity_id, action, detail)
        VALUES ($1, $2, $3, $4, $5)
        "#,
        organization_id,
        entity_type.as_str(),
        entity_id,
        action,
        detail,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Standalone variant for call sites with no open transaction (e.g. the
/// transient-bounce log-only path, §4.7 step 2, and the gate, which never
/// mutates entity state).
pub async fn insert_standalone(
    pool: &PgPool,
    organization_id: Uuid,
    entity_type: EntityKind,
    entity_id: Uuid,
    action: &str,
    detail: Json,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO audit_log (organization_id, entity_type, entity_id, action, detail)
        VALUES ($1, $2, $3, $4, $5)
        "#,
        organization_id,
        entity_type.as_str(),
        entity_id,
        action,
        detail,
    )
    .execute(pool)
    .await?;
    Ok(())
}
