use sqlx::PgPool;
use uuid::Uuid;

use crate::model::MailboxMetrics;

pub async fn get_or_init(
    pool: &PgPool,
    mailbox_id: Uuid,
) -> Result<MailboxMetrics, sqlx::Error> {
    sqlx::query!(
        "INSERT INTO mailbox_metrics (mailbox_id) VALUES ($1) ON CONFLICT DO NOTHING",
        mailbox_id
    )
    .execute(pool)
    .await?;

    sqlx::query_as!(
        MailboxMetrics,
        r#"
        SELECT
            mailbox_id, sent_1h, bounce_1h, failure_1h, window_1h_start,
            sent_24h, bounce_24h, failure_24h, window_24h_start,
            sent_7d, bounce_7d, failure_7d, window_7d_start,
            risk_score, velocity, prev_bounce_rate, prev_failure_rate, updated_at
        FROM mailbox_metrics
        WHERE mailbox_id = $1
        "#,
        mailbox_id
    )
    .fetch_one(pool)
    .await
}

/// Atomic rotate-then-increment (§4.4): any window whose age has passed its
/// duration is zeroed before the new count is added, in one `UPDATE`.
pub async fn record_sent(pool: &PgPool, mailbox_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE mailbox_metrics SET
            sent_1h  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN 1 ELSE sent_1h + 1 END,
            window_1h_start  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN now() ELSE window_1h_start END,
            sent_24h = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN 1 ELSE sent_24h + 1 END,
            window_24h_start = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN now() ELSE window_24h_start END,
            sent_7d  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN 1 ELSE sent_7d + 1 END,
            window_7d_start  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN now() ELSE window_7d_start END,
            bounce_1h  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN 0 ELSE bounce_1h END,
            bounce_24h = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN 0 ELSE bounce_24h END,
            bounce_7d  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN 0 ELSE bounce_7d END,
            failure_1h  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN 0 ELSE failure_1h END,
            failure_24h = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN 0 ELSE failure_24h END,
            failure_7d  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN 0 ELSE failure_7d END,
            updated_at = now()
        WHERE mailbox_id = $1
        "#,
        mailbox_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomic rotate-then-increment (§4.4), same window-aging rule as
/// `record_sent`: a bounce/failure arriving after a window has aged out
/// must not inflate a stale count, so `sent_*` is reset (not incremented,
/// no send happened here) and the target counter starts fresh at 1.
pub async fn record_bounce(
    pool: &PgPool,
    mailbox_id: Uuid,
    is_failure_only: bool,
) -> Result<(), sqlx::Error> {
    if is_failure_only {
        sqlx::query!(
            r#"
            UPDATE mailbox_metrics SET
                sent_1h  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN 0 ELSE sent_1h END,
                sent_24h = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN 0 ELSE sent_24h END,
                sent_7d  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN 0 ELSE sent_7d END,
                bounce_1h  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN 0 ELSE bounce_1h END,
                bounce_24h = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN 0 ELSE bounce_24h END,
                bounce_7d  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN 0 ELSE bounce_7d END,
                failure_1h  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN 1 ELSE failure_1h + 1 END,
                failure_24h = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN 1 ELSE failure_24h + 1 END,
                failure_7d  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN 1 ELSE failure_7d + 1 END,
                window_1h_start  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN now() ELSE window_1h_start END,
                window_24h_start = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN now() ELSE window_24h_start END,
                window_7d_start  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN now() ELSE window_7d_start END,
                updated_at = now()
            WHERE mailbox_id = $1
            "#,
            mailbox_id
        )
        .execute(pool)
        .await?;
    } else {
        sqlx::query!(
            r#"
            UPDATE mailbox_metrics SET
                sent_1h  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN 0 ELSE sent_1h END,
                sent_24h = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN 0 ELSE sent_24h END,
                sent_7d  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN 0 ELSE sent_7d END,
                bounce_1h  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN 1 ELSE bounce_1h + 1 END,
                bounce_24h = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN 1 ELSE bounce_24h + 1 END,
                bounce_7d  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN 1 ELSE bounce_7d + 1 END,
                failure_1h  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN 0 ELSE failure_1h END,
                failure_24h = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN 0 ELSE failure_24h END,
                failure_7d  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN 0 ELSE failure_7d END,
                window_1h_start  = CASE WHEN now() - window_1h_start  >= interval '1 hour'  THEN now() ELSE window_1h_start END,
                window_24h_start = CASE WHEN now() - window_24h_start >= interval '24 hours' THEN now() ELSE window_24h_start END,
                window_7d_start  = CASE WHEN now() - window_7d_start  >= interval '7 days'   THEN now() ELSE window_7d_start END,
                updated_at = now()
            WHERE mailbox_id = $1
            "#,
            mailbox_id
        )
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Sum of `sent_24h` across every mailbox on a domain, the aggregate-throttle
/// proxy for "sent today" used by the healing service's domain cap (§4.8).
pub async fn sum_sent_24h_for_domain(pool: &PgPool, domain_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query!(
        r#"
        SELECT COALESCE(SUM(mm.sent_24h), 0)::bigint as "total!" FROM mailbox_metrics mm
        JOIN mailboxes m ON m.id = mm.mailbox_id
        WHERE m.domain_id = $1
        "#,
        domain_id
    )
    .fetch_one(pool)
    .await?;
    Ok(row.total)
}

pub async fn sum_sent_24h_for_org(pool: &PgPool, organization_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query!(
        r#"
        SELECT COALESCE(SUM(mm.sent_24h), 0)::bigint as "total!" FROM mailbox_metrics mm
        JOIN mailboxes m ON m.id = mm.mailbox_id
        WHERE m.organization_id = $1
        "#,
        organization_id
    )
    .fetch_one(pool)
    .await?;
    Ok(row.total)
}

pub async fn update_risk(
    pool: &PgPool,
    mailbox_id: Uuid,
    risk_score: f64,
    velocity: f64,
    prev_bounce_rate: f64,
    prev_failure_rate: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE mailbox_metrics SET
            risk_score = $2,
            velocity = $3,
            prev_bounce_rate = $4,
            prev_failure_rate = $5,
            updated_at = now()
        WHERE mailbox_id = $1
        "#,
        mailbox_id,
        risk_score,
        velocity,
        prev_bounce_rate,
        prev_failure_rate,
    )
    .execute(pool)
    .await?;
    Ok(())
}
