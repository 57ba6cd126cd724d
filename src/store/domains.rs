use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Transaction;
use uuid::Uuid;

use crate::domain::HealthState;
use crate::domain::RecoveryPhase;
use crate::model::Domain;

pub async fn get(pool: &PgPool, domain_id: Uuid) -> Result<Option<Domain>, sqlx::Error> {
    sqlx::query_as!(
        Domain,
        r#"
        SELECT
            id, organization_id, name,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, rehab_origin,
            lifetime_sent, lifetime_bounce, created_at
        FROM domains
        WHERE id = $1
        "#,
        domain_id
    )
    .fetch_optional(pool)
    .await
}

pub async fn siblings(
    pool: &PgPool,
    domain_id: Uuid,
) -> Result<Vec<crate::model::Mailbox>, sqlx::Error> {
    super::mailboxes::by_domain(pool, domain_id).await
}

/// `Mailbox` and `Domain` increment the same way; kept separate functions
/// (rather than generic over entity kind) since the two live in different
/// tables and §3 does not otherwise unify them.
pub async fn apply_state(
    tx: &mut Transaction<'_, Postgres>,
    domain_id: Uuid,
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
        UPDATE domains SET
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
        domain_id,
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

pub async fn increment_warning_count(
    pool: &PgPool,
    domain_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE domains SET warning_count = warning_count + 1 WHERE id = $1",
        domain_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn increment_lifetime(
    pool: &PgPool,
    domain_id: Uuid,
    sent: i64,
    bounce: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE domains SET
            lifetime_sent = lifetime_sent + $2,
            lifetime_bounce = lifetime_bounce + $3
        WHERE id = $1
        "#,
        domain_id,
        sent,
        bounce,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Companion to `mailboxes::bump_resilience` for the domain-level stability
/// bonus.
pub async fn bump_resilience(
    pool: &PgPool,
    domain_id: Uuid,
    resilience_score: i32,
    phase_entered_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        UPDATE domains SET
            resilience_score = $2,
            phase_entered_at = $3
        WHERE id = $1
        "#,
        domain_id,
        resilience_score,
        phase_entered_at,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn expired_cooldowns(pool: &PgPool) -> Result<Vec<Domain>, sqlx::Error> {
    sqlx::query_as!(
        Domain,
        r#"
        SELECT
            id, organization_id, name,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, rehab_origin,
            lifetime_sent, lifetime_bounce, created_at
        FROM domains
        WHERE status = 'paused' AND cooldown_until <= now()
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn by_organization(
    pool: &PgPool,
    organization_id: Uuid,
) -> Result<Vec<Domain>, sqlx::Error> {
    sqlx::query_as!(
        Domain,
        r#"
        SELECT
            id, organization_id, name,
            status as "status: HealthState",
            recovery_phase as "recovery_phase: RecoveryPhase",
            consecutive_pauses, resilience_score, cooldown_until, phase_entered_at,
            clean_sends_since_phase, warning_count, last_pause_at, rehab_origin,
            lifetime_sent, lifetime_bounce, created_at
        FROM domains
        WHERE organization_id = $1
        "#,
        organization_id
    )
    .fetch_all(pool)
    .await
}
