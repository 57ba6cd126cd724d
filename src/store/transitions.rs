//! `StateTransition` audit rows (§3, §4.6). Always written in the same
//! transaction as the entity update and the `AuditLog` row it accompanies —
//! see `state_machine::commit_transition`.

use sqlx::Postgres;
use sqlx::Transaction;
use uuid::Uuid;

use crate::domain::EntityKind;

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    organization_id: Uuid,
    entity_type: EntityKind,
    entity_id: Uuid,
    from_state: &str,
    to_state: &str,
    reason: &str,
    triggered_by: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO state_transitions
            (organization_id, entity_type, entity_id, from_state, to_state, reason, triggered_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
        organization_id,
        entity_type.as_str(),
        entity_id,
        from_state,
        to_state,
        reason,
        triggered_by,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}
