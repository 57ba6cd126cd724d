use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Transaction;
use uuid::Uuid;

use crate::domain::LeadState;
use crate::model::Lead;

pub async fn get(pool: &PgPool, lead_id: Uuid) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as!(
        Lead,
        r#"
        SELECT
            id, organization_id, email, persona, lead_score,
            status as "status: LeadState",
            assigned_campaign_id, opens, replies, created_at
        FROM leads
        WHERE id = $1
        "#,
        lead_id
    )
    .fetch_optional(pool)
    .await
}

pub async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    lead_id: Uuid,
    status: LeadState,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE leads SET status = $2 WHERE id = $1",
        lead_id,
        status.as_str()
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Lead -> Campaign assignment under `SERIALIZABLE` (§5), locking the
/// campaign row and verifying capacity before inserting. Capacity:
/// `ideal = mailboxes*75`, `max = mailboxes*150` (§5).
pub async fn assign_to_campaign(
    pool: &PgPool,
    lead_id: Uuid,
    campaign_id: Uuid,
) -> Result<bool, anyhow::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query!("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;

    let campaign = sqlx::query!(
        r#"SELECT id FROM campaigns WHERE id = $1 FOR UPDATE"#,
        campaign_id
    )
    .fetch_optional(&mut *tx)
    .await?;
    if campaign.is_none() {
        return Ok(false);
    }

    let mailbox_count = sqlx::query!(
        "SELECT count(*) as \"count!\" FROM campaign_mailboxes WHERE campaign_id = $1",
        campaign_id
    )
    .fetch_one(&mut *tx)
    .await?
    .count;

    let assigned = sqlx::query!(
        "SELECT count(*) as \"count!\" FROM leads WHERE assigned_campaign_id = $1",
        campaign_id
    )
    .fetch_one(&mut *tx)
    .await?
    .count;

    let max_capacity = mailbox_count * 150;
    if assigned >= max_capacity {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query!(
        "UPDATE leads SET assigned_campaign_id = $2, status = 'active' WHERE id = $1",
        lead_id,
        campaign_id
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}
