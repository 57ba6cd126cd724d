//! User-visible notifications, deduplicated per `(organization, dedup_key,
//! 24h)` per §7.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::NotificationSeverity;

pub async fn notify(
    pool: &PgPool,
    organization_id: Uuid,
    campaign_id: Option<Uuid>,
    severity: NotificationSeverity,
    message: &str,
    dedup_key: Option<&str>,
) -> Result<(), sqlx::Error> {
    if let Some(key) = dedup_key {
        let existing = sqlx::query!(
            r#"
            SELECT id FROM notifications
            WHERE organization_id = $1 AND dedup_key = $2
              AND created_at >= now() - interval '24 hours'
            LIMIT 1
            "#,
            organization_id,
            key
        )
        .fetch_optional(pool)
        .await?;
        if existing.is_some() {
            return Ok(());
        }
    }

    sqlx::query!(
        r#"
        INSERT INTO notifications (organization_id, campaign_id, severity, message, dedup_key)
        VALUES ($1, $2, $3, $4, $5)
        "#,
        organization_id,
        campaign_id,
        severity.as_str(),
        message,
        dedup_key,
    )
    .execute(pool)
    .await?;
    Ok(())
}
