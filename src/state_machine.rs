//! State Machine (component F). Transitions are table-driven; attempting
//! one outside the table is a hard error with no partial side effects.

use chrono::DateTime;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Transaction;
use uuid::Uuid;

use crate::configuration::Thresholds;
use crate::domain::EntityKind;
use crate::domain::HealthState;
use crate::domain::LeadState;
use crate::domain::RecoveryPhase;
use crate::store;

/// A transition outside the table in §4.6 is "a hard error (the caller
/// receives `{success:false}` and no state changes)" — `NotAllowed` is that
/// error; the `Db` variant just forwards a transaction failure.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("{entity_type:?} transition {from} -> {to} is not permitted")]
    NotAllowed {
        entity_type: EntityKind,
        from: String,
        to: String,
    },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Mailbox and Domain share this adjacency list (§4.6); `Recovering` is kept
/// only as a legacy inbound edge for replaying historical transitions, per
/// Open Question 1 — no transition below ever produces it.
const HEALTH_TRANSITIONS: &[(HealthState, &[HealthState])] = &[
    (HealthState::Healthy, &[HealthState::Warning, HealthState::Paused]),
    (HealthState::Warning, &[HealthState::Healthy, HealthState::Paused]),
    (HealthState::Paused, &[HealthState::Quarantine, HealthState::Recovering]),
    (HealthState::Quarantine, &[HealthState::RestrictedSend, HealthState::Paused]),
    (
        HealthState::RestrictedSend,
        &[HealthState::WarmRecovery, HealthState::Paused, HealthState::Quarantine],
    ),
    (
        HealthState::WarmRecovery,
        &[HealthState::Healthy, HealthState::Paused, HealthState::Quarantine],
    ),
    (
        HealthState::Recovering,
        &[HealthState::Healthy, HealthState::Warning, HealthState::Quarantine],
    ),
];

const LEAD_TRANSITIONS: &[(LeadState, &[LeadState])] = &[
    (LeadState::Held, &[LeadState::Active, LeadState::Paused]),
    (LeadState::Active, &[LeadState::Paused, LeadState::Completed]),
    (LeadState::Paused, &[LeadState::Active, LeadState::Completed]),
    (LeadState::Completed, &[]),
];

pub fn health_transition_allowed(from: HealthState, to: HealthState) -> bool {
    HEALTH_TRANSITIONS
        .iter()
        .find(|(state, _)| *state == from)
        .map(|(_, allowed)| allowed.contains(&to))
        .unwrap_or(false)
}

pub fn lead_transition_allowed(from: LeadState, to: LeadState) -> bool {
    LEAD_TRANSITIONS
        .iter()
        .find(|(state, _)| *state == from)
        .map(|(_, allowed)| allowed.contains(&to))
        .unwrap_or(false)
}

/// `cooldown_ms = min(MAX, MIN × MULTIPLIER^min(consecutive_pauses, 5))`.
pub fn cooldown_duration(thresholds: &Thresholds, consecutive_pauses: i32) -> chrono::Duration {
    let exponent = consecutive_pauses.min(5) as i32;
    let secs =
        thresholds.cooldown_min_secs as f64 * thresholds.cooldown_multiplier.powi(exponent);
    let capped = secs.min(thresholds.cooldown_max_secs as f64);
    chrono::Duration::seconds(capped as i64)
}

/// Resilience score deltas (§4.8), all clamped by the caller to `[0, 100]`.
pub const PAUSE_RESILIENCE_PENALTY: i32 = 15;
pub const GRADUATION_RESILIENCE_BONUS: i32 = 10;
pub const RELAPSE_RESILIENCE_PENALTY: i32 = 25;
pub const STABILITY_RESILIENCE_BONUS: i32 = 5;

pub struct MailboxTransitionOutcome {
    pub cooldown_until: Option<chrono::DateTime<chrono::Utc>>,
    pub consecutive_pauses: i32,
    pub resilience_score: i32,
}

/// Apply the `paused`-entry bookkeeping from §4.6: bump `consecutive_pauses`,
/// recompute `cooldown_until`, clamp `resilience_score`, and (by the
/// caller's separate `store` call) zero `clean_sends_since_phase` and stamp
/// `phase_entered_at`/`last_pause_at`.
pub fn entering_paused(
    thresholds: &Thresholds,
    current_consecutive_pauses: i32,
    current_resilience_score: i32,
) -> MailboxTransitionOutcome {
    let consecutive_pauses = current_consecutive_pauses + 1;
    let cooldown = cooldown_duration(thresholds, consecutive_pauses);
    MailboxTransitionOutcome {
        cooldown_until: Some(chrono::Utc::now() + cooldown),
        consecutive_pauses,
        resilience_score: (current_resilience_score - PAUSE_RESILIENCE_PENALTY).max(0),
    }
}

/// On entering `healthy`: clear `cooldown_until`, reset `consecutive_pauses`.
pub fn entering_healthy() -> (Option<chrono::DateTime<chrono::Utc>>, i32) {
    (None, 0)
}

/// Write the entity's new state, a `StateTransition` row, and an `AuditLog`
/// entry in one transaction (§4.6: "same transaction"). Callers still run
/// their own `store::mailboxes::apply_state`/`store::domains::apply_state`
/// inside the returned transaction before committing — this only logs.
#[allow(clippy::too_many_arguments)]
pub async fn log_transition(
    tx: &mut Transaction<'_, Postgres>,
    organization_id: Uuid,
    entity_type: EntityKind,
    entity_id: Uuid,
    from_state: &str,
    to_state: &str,
    reason: &str,
    triggered_by: &str,
) -> Result<(), sqlx::Error> {
    store::transitions::insert(
        tx,
        organization_id,
        entity_type,
        entity_id,
        from_state,
        to_state,
        reason,
        triggered_by,
    )
    .await?;
    store::audit::insert(
        tx,
        organization_id,
        entity_type,
        entity_id,
        "state_transition",
        json!({ "from": from_state, "to": to_state, "reason": reason }),
    )
    .await
}

/// Convenience wrapper for call sites that don't otherwise need an open
/// transaction (e.g. a worker sweeping many mailboxes independently).
pub async fn log_transition_standalone(
    pool: &PgPool,
    organization_id: Uuid,
    entity_type: EntityKind,
    entity_id: Uuid,
    from_state: &str,
    to_state: &str,
    reason: &str,
    triggered_by: &str,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    log_transition(
        &mut tx,
        organization_id,
        entity_type,
        entity_id,
        from_state,
        to_state,
        reason,
        triggered_by,
    )
    .await?;
    tx.commit().await
}

/// Validate, write the entity row, a `StateTransition`, and an `AuditLog`
/// entry in one transaction — the single path every mailbox transition in
/// `monitor`/`healing`/the metrics worker goes through, so the table can
/// never be bypassed (§4.6, §5's "StateTransition and entity update in a
/// single transaction" rule).
#[allow(clippy::too_many_arguments)]
pub async fn commit_mailbox_transition(
    pool: &PgPool,
    organization_id: Uuid,
    mailbox_id: Uuid,
    from: HealthState,
    to: HealthState,
    recovery_phase: RecoveryPhase,
    cooldown_until: Option<DateTime<Utc>>,
    consecutive_pauses: i32,
    resilience_score: i32,
    clean_sends_since_phase: i32,
    phase_entered_at: Option<DateTime<Utc>>,
    last_pause_at: Option<DateTime<Utc>>,
    reason: &str,
    triggered_by: &str,
) -> Result<(), TransitionError> {
    if !health_transition_allowed(from, to) {
        return Err(TransitionError::NotAllowed {
            entity_type: EntityKind::Mailbox,
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }
    let mut tx = pool.begin().await?;
    store::mailboxes::apply_state(
        &mut tx,
        mailbox_id,
        to,
        recovery_phase,
        cooldown_until,
        consecutive_pauses,
        resilience_score,
        clean_sends_since_phase,
        phase_entered_at,
        last_pause_at,
    )
    .await?;
    log_transition(
        &mut tx,
        organization_id,
        EntityKind::Mailbox,
        mailbox_id,
        from.as_str(),
        to.as_str(),
        reason,
        triggered_by,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Domain identical to `commit_mailbox_transition` — same table (§4.6: "Domain
/// identical"), different store module.
#[allow(clippy::too_many_arguments)]
pub async fn commit_domain_transition(
    pool: &PgPool,
    organization_id: Uuid,
    domain_id: Uuid,
    from: HealthState,
    to: HealthState,
    recovery_phase: RecoveryPhase,
    cooldown_until: Option<DateTime<Utc>>,
    consecutive_pauses: i32,
    resilience_score: i32,
    clean_sends_since_phase: i32,
    phase_entered_at: Option<DateTime<Utc>>,
    last_pause_at: Option<DateTime<Utc>>,
    reason: &str,
    triggered_by: &str,
) -> Result<(), TransitionError> {
    if !health_transition_allowed(from, to) {
        return Err(TransitionError::NotAllowed {
            entity_type: EntityKind::Domain,
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }
    let mut tx = pool.begin().await?;
    store::domains::apply_state(
        &mut tx,
        domain_id,
        to,
        recovery_phase,
        cooldown_until,
        consecutive_pauses,
        resilience_score,
        clean_sends_since_phase,
        phase_entered_at,
        last_pause_at,
    )
    .await?;
    log_transition(
        &mut tx,
        organization_id,
        EntityKind::Domain,
        domain_id,
        from.as_str(),
        to.as_str(),
        reason,
        triggered_by,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn commit_lead_transition(
    pool: &PgPool,
    organization_id: Uuid,
    lead_id: Uuid,
    from: LeadState,
    to: LeadState,
    reason: &str,
    triggered_by: &str,
) -> Result<(), TransitionError> {
    if !lead_transition_allowed(from, to) {
        return Err(TransitionError::NotAllowed {
            entity_type: EntityKind::Lead,
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }
    let mut tx = pool.begin().await?;
    store::leads::set_status(&mut tx, lead_id, to).await?;
    log_transition(
        &mut tx,
        organization_id,
        EntityKind::Lead,
        lead_id,
        from.as_str(),
        to.as_str(),
        reason,
        triggered_by,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Relapse cooldown recompute (§4.8): same formula as `entering_paused`'s
/// cooldown, driven by the already-incremented pause counter, but relapse
/// handling itself owns the resilience-score delta (-25, not -15) so it
/// isn't folded into this helper.
pub fn relapse_cooldown(
    thresholds: &Thresholds,
    raised_consecutive_pauses: i32,
) -> Option<DateTime<Utc>> {
    Some(Utc::now() + cooldown_duration(thresholds, raised_consecutive_pauses))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_can_warn_or_pause_only() {
        assert!(health_transition_allowed(HealthState::Healthy, HealthState::Warning));
        assert!(health_transition_allowed(HealthState::Healthy, HealthState::Paused));
        assert!(!health_transition_allowed(HealthState::Healthy, HealthState::Quarantine));
    }

    #[test]
    fn quarantine_is_canonical_recovery_entry_from_paused() {
        assert!(health_transition_allowed(HealthState::Paused, HealthState::Quarantine));
    }

    #[test]
    fn recovering_is_a_legacy_inbound_edge_only() {
        assert!(health_transition_allowed(HealthState::Recovering, HealthState::Healthy));
        assert!(!health_transition_allowed(HealthState::Healthy, HealthState::Recovering));
    }

    #[test]
    fn completed_lead_is_terminal() {
        assert!(!lead_transition_allowed(LeadState::Completed, LeadState::Active));
    }

    #[test]
    fn cooldown_caps_at_sixteen_hours() {
        let thresholds = Thresholds::default();
        let d = cooldown_duration(&thresholds, 10);
        assert_eq!(d, chrono::Duration::seconds(thresholds.cooldown_max_secs));
    }

    #[test]
    fn cooldown_doubles_per_pause_below_cap() {
        let thresholds = Thresholds::default();
        let first = cooldown_duration(&thresholds, 1);
        let second = cooldown_duration(&thresholds, 2);
        assert_eq!(second, first * 2);
    }
}
