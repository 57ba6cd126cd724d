use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::SystemMode;
use crate::model::Organization;

pub async fn get(
    pool: &PgPool,
    organization_id: Uuid,
) -> Result<Option<Organization>, sqlx::Error> {
    sqlx::query_as!(
        Organization,
        r#"
        SELECT
            id,
            name,
            system_mode as "system_mode: SystemMode",
            assessment_completed,
            webhook_secret,
            created_at
        FROM organizations
        WHERE id = $1
        "#,
        organization_id
    )
    .fetch_optional(pool)
    .await
}

pub async fn set_assessment_completed(
    pool: &PgPool,
    organization_id: Uuid,
    completed: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE organizations SET assessment_completed = $2 WHERE id = $1",
        organization_id,
        completed
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Full roster, used by the periodic metrics and sync workers to iterate
/// every tenant once per cycle (§4.9, §4.10).
pub async fn list_all(pool: &PgPool) -> Result<Vec<Organization>, sqlx::Error> {
    sqlx::query_as!(
        Organization,
        r#"
        SELECT
            id,
            name,
            system_mode as "system_mode: SystemMode",
            assessment_completed,
            webhook_secret,
            created_at
        FROM organizations
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn set_system_mode(
    pool: &PgPool,
    organization_id: Uuid,
    mode: SystemMode,
) -> Result<(), sqlx::Error> {
    let as_text = match mode {
        SystemMode::Observe => "observe",
        SystemMode::Suggest => "suggest",
        SystemMode::Enforce => "enforce",
    };
    sqlx::query!(
        "UPDATE organizations SET system_mode = $2 WHERE id = $1",
        organization_id,
        as_text
    )
    .execute(pool)
    .await?;
    Ok(())
}
