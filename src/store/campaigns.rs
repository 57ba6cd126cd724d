use sqlx::PgPool;
use uuid::Uuid;

use crate::model::Campaign;

pub async fn get(pool: &PgPool, campaign_id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as!(
        Campaign,
        r#"
        SELECT id, organization_id, name, status, routing_rules, sent_count, bounce_count, created_at
        FROM campaigns
        WHERE id = $1
        "#,
        campaign_id
    )
    .fetch_optional(pool)
    .await
}

/// Best-effort unassignment of a mailbox from all of its active campaigns,
/// called when the mailbox is paused (§4.7: "remove the mailbox from its
/// external campaigns via the platform adapter"). The local join-table row
/// is dropped regardless of the adapter call's outcome.
pub async fn remove_mailbox(pool: &PgPool, mailbox_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "DELETE FROM campaign_mailboxes WHERE mailbox_id = $1",
        mailbox_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Used by Correlation's `PauseCampaign` branch (§4.5) to pull a whole
/// campaign out of rotation rather than each of its mailboxes one at a time.
pub async fn set_status(
    pool: &PgPool,
    campaign_id: Uuid,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE campaigns SET status = $2 WHERE id = $1",
        campaign_id,
        status
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn campaigns_for_mailbox(
    pool: &PgPool,
    mailbox_id: Uuid,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query!(
        "SELECT campaign_id FROM campaign_mailboxes WHERE mailbox_id = $1",
        mailbox_id
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.campaign_id).collect())
}
