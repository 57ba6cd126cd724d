use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Transaction;
use uuid::Uuid;

use crate::domain::HealthState;
use crate::domain::RecoveryPhase;
use crate::model::Mailbox;

pub async fn get(pool: &PgPool, mailbox_id: Uuid) -> Result<Option<Mailbox>, sqlx::Error> {
    sqlx::query_as!(
        Mailbox,
        r#"
        SELECT
            id, organization_id, domain_id, email,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, last_activity_at,
            rehab_origin, window_sent_count, window_bounce_count, window_start_at,
            hard_bounce_count, total_sent_count, provider_restrictions,
            smtp_status, imap_status, created_at
        FROM mailboxes
        WHERE id = $1
        "#,
        mailbox_id
    )
    .fetch_optional(pool)
    .await
}

pub async fn by_domain(pool: &PgPool, domain_id: Uuid) -> Result<Vec<Mailbox>, sqlx::Error> {
    sqlx::query_as!(
        Mailbox,
        r#"
        SELECT
            id, organization_id, domain_id, email,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, last_activity_at,
            rehab_origin, window_sent_count, window_bounce_count, window_start_at,
            hard_bounce_count, total_sent_count, provider_restrictions,
            smtp_status, imap_status, created_at
        FROM mailboxes
        WHERE domain_id = $1
        "#,
        domain_id
    )
    .fetch_all(pool)
    .await
}

/// Looked up by the webhook ingestion route, which only ever receives a
/// platform's `email_account_id` (the mailbox address itself, not our
/// internal id) on the wire.
pub async fn by_email(
    pool: &PgPool,
    organization_id: Uuid,
    email: &str,
) -> Result<Option<Mailbox>, sqlx::Error> {
    sqlx::query_as!(
        Mailbox,
        r#"
        SELECT
            id, organization_id, domain_id, email,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, last_activity_at,
            rehab_origin, window_sent_count, window_bounce_count, window_start_at,
            hard_bounce_count, total_sent_count, provider_restrictions,
            smtp_status, imap_status, created_at
        FROM mailboxes
        WHERE organization_id = $1 AND email = $2
        "#,
        organization_id,
        email,
    )
    .fetch_optional(pool)
    .await
}

pub async fn by_organization(
    pool: &PgPool,
    organization_id: Uuid,
    limit: i64,
) -> Result<Vec<Mailbox>, sqlx::Error> {
    sqlx::query_as!(
        Mailbox,
        r#"
        SELECT
            id, organization_id, domain_id, email,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, last_activity_at,
            rehab_origin, window_sent_count, window_bounce_count, window_start_at,
            hard_bounce_count, total_sent_count, provider_restrictions,
            smtp_status, imap_status, created_at
        FROM mailboxes
        WHERE organization_id = $1
        ORDER BY created_at
        LIMIT $2
        "#,
        organization_id,
        limit,
    )
    .fetch_all(pool)
    .await
}

pub async fn healthy_for_campaign(
    pool: &PgPool,
    campaign_id: Uuid,
) -> Result<Vec<Mailbox>, sqlx::Error> {
    sqlx::query_as!(
        Mailbox,
        r#"
        SELECT
            m.id, m.organization_id, m.domain_id, m.email,
            m.status as "status: HealthState",
            m.recovery_phase as "recovery_phase: RecoveryPhase",
            m.consecutive_pauses, m.resilience_score, m.cooldown_until, m.phase_entered_at,
            m.clean_sends_since_phase, m.warning_count, m.last_pause_at, m.last_activity_at,
            m.rehab_origin, m.window_sent_count, m.window_bounce_count, m.window_start_at,
            m.hard_bounce_count, m.total_sent_count, m.provider_restrictions,
            m.smtp_status, m.imap_status, m.created_at
        FROM mailboxes m
        JOIN campaign_mailboxes cm ON cm.mailbox_id = m.id
        JOIN domains d ON d.id = m.domain_id
        WHERE cm.campaign_id = $1
          AND m.status = 'healthy'
          AND (m.cooldown_until IS NULL OR m.cooldown_until <= now())
          AND d.status = 'healthy'
        "#,
        campaign_id
    )
    .fetch_all(pool)
    .await
}

/// Atomic per-send increment (§4.7 step 2). Never read-modify-write.
pub async fn record_sent(pool: &PgPool, mailbox_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE mailboxes SET
            window_sent_count = window_sent_count + 1,
            total_sent_count = total_sent_count + 1,
            clean_sends_since_phase = clean_sends_since_phase + 1,
            last_activity_at = now()
        WHERE id = $1
        "#,
        mailbox_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomic per-bounce increment (§4.7 step 3).
pub async fn record_bounce(pool: &PgPool, mailbox_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE mailboxes SET
            window_bounce_count = window_bounce_count + 1,
            hard_bounce_count = hard_bounce_count + 1,
            last_activity_at = now()
        WHERE id = $1
        "#,
        mailbox_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn reset_clean_sends(pool: &PgPool, mailbox_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE mailboxes SET clean_sends_since_phase = 0 WHERE id = $1",
        mailbox_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Slide the 100-send rolling window (§4.7 step 3): keep 50% of both
/// counters and reset `window_start_at` (Open Question 2, resolved in
/// DESIGN.md — this halves the immediately preceding window only).
pub async fn slide_window(pool: &PgPool, mailbox_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE mailboxes SET
            window_sent_count = window_sent_count / 2,
            window_bounce_count = window_bounce_count / 2,
            window_start_at = now()
        WHERE id = $1
        "#,
        mailbox_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn apply_state(
    tx: &mut Transaction<'_, Postgres>,
    mailbox_id: Uuid,
    status: HealthState,
    recovery_phase: RecoveryPhase,
    cooldown_until: Option<DateTime<Utc>>,
    consecutive_pauses: i32,
    resilience_score: i32,
    clean_sends_since_phase: i32,
    phase_entered_at: Option<DateTime<Utc>>,
    last_pause_at: Option<DateTime<Utc>>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE mailboxes SET
            status = $2,
            recovery_phase = $3,
            cooldown_until = $4,
            consecutive_pauses = $5,
            resilience_score = $6,
            clean_sends_since_phase = $7,
            phase_entered_at = $8,
            last_pause_at = COALESCE($9, last_pause_at)
        WHERE id = $1
        "#,
        mailbox_id,
        status.as_str(),
        recovery_phase.as_str(),
        cooldown_until,
        consecutive_pauses,
        resilience_score,
        clean_sends_since_phase,
        phase_entered_at,
        last_pause_at,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn increment_warning_count(pool: &PgPool, mailbox_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE mailboxes SET warning_count = warning_count + 1 WHERE id = $1",
        mailbox_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn add_provider_restriction(
    pool: &PgPool,
    mailbox_id: Uuid,
    provider: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE mailboxes SET
            provider_restrictions = array_append(provider_restrictions, $2)
        WHERE id = $1 AND NOT ($2 = ANY(provider_restrictions))
        "#,
        mailbox_id,
        provider
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Refresh resilience bookkeeping without a state transition — the 7-days-
/// stable bonus (§4.8) touches `resilience_score` and re-stamps
/// `phase_entered_at` as the new stability clock, but `status` never moves.
pub async fn bump_resilience(
    pool: &PgPool,
    mailbox_id: Uuid,
    resilience_score: i32,
    phase_entered_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE mailboxes SET
            resilience_score = $2,
            phase_entered_at = $3
        WHERE id = $1
        "#,
        mailbox_id,
        resilience_score,
        phase_entered_at,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn any_recovering_in_org(pool: &PgPool, organization_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query!(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM mailboxes
            WHERE organization_id = $1
              AND status IN ('quarantine', 'restricted_send', 'warm_recovery')
        ) as "exists!"
        "#,
        organization_id
    )
    .fetch_one(pool)
    .await?;
    Ok(row.exists)
}

pub async fn expired_cooldowns(pool: &PgPool) -> Result<Vec<Mailbox>, sqlx::Error> {
    sqlx::query_as!(
        Mailbox,
        r#"
        SELECT
            id, organization_id, domain_id, email,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, last_activity_at,
            rehab_origin, window_sent_count, window_bounce_count, window_start_at,
            hard_bounce_count, total_sent_count, provider_restrictions,
            smtp_status, imap_status, created_at
        FROM mailboxes
        WHERE status = 'paused' AND cooldown_until <= now()
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Batch of up to `limit` mailboxes eligible for the metrics worker's
/// risk-recompute sub-step (a): `healthy`/`warning`, plus anything already
/// mid-recovery, whose external assessment signal is clean. Paused
/// mailboxes are excluded — they are handled by sub-step (b) instead.
pub async fn sweep_candidates(
    pool: &PgPool,
    organization_id: Uuid,
    limit: i64,
) -> Result<Vec<Mailbox>, sqlx::Error> {
    sqlx::query_as!(
        Mailbox,
        r#"
        SELECT
            id, organization_id, domain_id, email,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, last_activity_at,
            rehab_origin, window_sent_count, window_bounce_count, window_start_at,
            hard_bounce_count, total_sent_count, provider_restrictions,
            smtp_status, imap_status, created_at
        FROM mailboxes
        WHERE organization_id = $1
          AND status != 'paused'
          AND smtp_status AND imap_status
        ORDER BY last_activity_at ASC NULLS FIRST
        LIMIT $2
        "#,
        organization_id,
        limit,
    )
    .fetch_all(pool)
    .await
}

/// Mailboxes already mid phase-graduation (quarantine through warm
/// recovery), regardless of cooldown — `healing::try_graduate` is
/// idempotent per phase and decides internally whether each is ready.
pub async fn in_recovery(
    pool: &PgPool,
    organization_id: Uuid,
    limit: i64,
) -> Result<Vec<Mailbox>, sqlx::Error> {
    sqlx::query_as!(
        Mailbox,
        r#"
        SELECT
            id, organization_id, domain_id, email,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, last_activity_at,
            rehab_origin, window_sent_count, window_bounce_count, window_start_at,
            hard_bounce_count, total_sent_count, provider_restrictions,
            smtp_status, imap_status, created_at
        FROM mailboxes
        WHERE organization_id = $1
          AND status IN ('quarantine', 'restricted_send', 'warm_recovery')
        ORDER BY phase_entered_at ASC NULLS FIRST
        LIMIT $2
        "#,
        organization_id,
        limit,
    )
    .fetch_all(pool)
    .await
}
