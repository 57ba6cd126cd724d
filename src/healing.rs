//! Healing Service (component H). Owns phase graduation after a pause,
//! resilience score bookkeeping, the healing-speed multiplier, phase volume
//! limits, the domain/org aggregate throttle while anything is recovering,
//! and relapse handling. Graduation and relapse both go through
//! `state_machine::commit_mailbox_transition` so every phase change is still
//! one atomic entity-update + `StateTransition` + `AuditLog` write.

use chrono::Duration;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::HealthState;
use crate::domain::RecoveryPhase;
use crate::model::Domain;
use crate::model::Mailbox;
use crate::policy;
use crate::policy::IntendedAction;
use crate::policy::PolicyOutcome;
use crate::services::Services;
use crate::state_machine;
use crate::store;

/// `score ≤ 30 → 2.0×, 31–70 → 1.0×, ≥ 71 → 0.75×` (§4.8). Applied to
/// required-day thresholds (divided in, since a low-resilience mailbox
/// needs *more* time, not less) and to the per-day volume limit (divided
/// out for the same reason — a fragile mailbox earns a smaller daily cap,
/// not a larger one).
pub fn healing_speed_multiplier(resilience_score: i32) -> f64 {
    if resilience_score <= 30 {
        2.0
    } else if resilience_score <= 70 {
        1.0
    } else {
        0.75
    }
}

fn required_days(base_days: i64, resilience_score: i32) -> Duration {
    let scaled = base_days as f64 * healing_speed_multiplier(resilience_score);
    Duration::seconds((scaled * 86_400.0) as i64)
}

/// Clean sends required to graduate `restricted_send` → `warm_recovery`:
/// 15 on a first offense, 25 on a repeat, doubled for rehab-origin mailboxes
/// (§4.8) — rehab mailboxes inherited damage from onboarding and graduate
/// more slowly, not less.
fn required_clean_sends(mailbox: &Mailbox) -> i32 {
    let base = if mailbox.consecutive_pauses <= 1 { 15 } else { 25 };
    if mailbox.rehab_origin { base * 2 } else { base }
}

/// Per-mailbox-day volume limit (§4.8), scaled down for low-resilience
/// mailboxes by the healing speed multiplier. `None` means unlimited.
pub fn phase_volume_limit(mailbox: &Mailbox) -> Option<i32> {
    let base = match mailbox.status {
        HealthState::Paused => return Some(0),
        HealthState::Warning => 50,
        _ => match mailbox.recovery_phase {
            RecoveryPhase::Paused => 0,
            RecoveryPhase::Quarantine => 5,
            RecoveryPhase::RestrictedSend => 15,
            RecoveryPhase::WarmRecovery => 30,
            RecoveryPhase::Healthy => return None,
        },
    };
    let multiplier = healing_speed_multiplier(mailbox.resilience_score);
    Some(((base as f64) / multiplier).floor().max(0.0) as i32)
}

/// §4.8's phase graduation table, one mailbox at a time. Called by the
/// metrics worker's sweep. Every branch that decides to graduate routes
/// through `apply_policy` before mutating — `observe` only logs what would
/// have graduated, `suggest` only notifies, and only `enforce` calls
/// `graduate` (§4.10: "both workers honor the system mode").
pub async fn try_graduate(services: &Services, mailbox: &Mailbox) -> Result<bool, anyhow::Error> {
    let now = Utc::now();
    match mailbox.status {
        HealthState::Paused => {
            let Some(cooldown_until) = mailbox.cooldown_until else {
                return Ok(false);
            };
            if cooldown_until > now {
                return Ok(false);
            }
            gated_graduate(services, mailbox, HealthState::Quarantine, RecoveryPhase::Quarantine).await
        }
        HealthState::Quarantine => {
            // DNS assessment and root-cause analysis are explicitly out of
            // this crate's scope (§1); `smtp_status`/`imap_status` are the
            // externally-maintained signal an assessment pipeline writes,
            // and stand in for "DNS re-check passes AND root cause resolved".
            if !(mailbox.smtp_status && mailbox.imap_status) {
                return Ok(false);
            }
            gated_graduate(
                services,
                mailbox,
                HealthState::RestrictedSend,
                RecoveryPhase::RestrictedSend,
            )
            .await
        }
        HealthState::RestrictedSend => {
            if mailbox.clean_sends_since_phase < required_clean_sends(mailbox) {
                return Ok(false);
            }
            gated_graduate(services, mailbox, HealthState::WarmRecovery, RecoveryPhase::WarmRecovery).await
        }
        HealthState::WarmRecovery => {
            let Some(phase_entered_at) = mailbox.phase_entered_at else {
                return Ok(false);
            };
            let min_duration = required_days(3, mailbox.resilience_score);
            if now - phase_entered_at < min_duration || mailbox.clean_sends_since_phase < 50 {
                return Ok(false);
            }
            let metrics = store::mailbox_metrics::get_or_init(&services.pool, mailbox.id).await?;
            let bounce_rate = metrics.bounce_7d as f64 / metrics.sent_7d.max(1) as f64;
            if bounce_rate >= 0.02 {
                return Ok(false);
            }
            gated_graduate(services, mailbox, HealthState::Healthy, RecoveryPhase::Healthy).await
        }
        _ => Ok(false),
    }
}

/// Fetch the owning org's mode, route the intended graduation through
/// `apply_policy`, and only call `graduate` when the outcome is `Enforced`.
async fn gated_graduate(
    services: &Services,
    mailbox: &Mailbox,
    to_status: HealthState,
    to_phase: RecoveryPhase,
) -> Result<bool, anyhow::Error> {
    let org = store::organizations::get(&services.pool, mailbox.organization_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("organization {} not found", mailbox.organization_id))?;
    let outcome = policy::apply_policy(
        &services.pool,
        org.system_mode,
        IntendedAction {
            organization_id: mailbox.organization_id,
            campaign_id: None,
            description: &format!(
                "graduate mailbox {} {} -> {}",
                mailbox.email,
                mailbox.status.as_str(),
                to_status.as_str()
            ),
            dedup_key: Some(&format!("graduate:mailbox:{}", mailbox.id)),
        },
    )
    .await?;
    if outcome != PolicyOutcome::Enforced {
        return Ok(false);
    }
    graduate(services, mailbox, to_status, to_phase).await?;
    Ok(true)
}

async fn graduate(
    services: &Services,
    mailbox: &Mailbox,
    to_status: HealthState,
    to_phase: RecoveryPhase,
) -> Result<(), anyhow::Error> {
    let now = Utc::now();
    let resilience_score =
        (mailbox.resilience_score + state_machine::GRADUATION_RESILIENCE_BONUS).min(100);
    state_machine::commit_mailbox_transition(
        &services.pool,
        mailbox.organization_id,
        mailbox.id,
        mailbox.status,
        to_status,
        to_phase,
        if to_status == HealthState::Healthy { None } else { mailbox.cooldown_until },
        mailbox.consecutive_pauses,
        resilience_score,
        0,
        Some(now),
        mailbox.last_pause_at,
        &format!("graduated {} -> {}", mailbox.status.as_str(), to_status.as_str()),
        "healing",
    )
    .await?;
    if to_status == HealthState::Healthy {
        crate::monitor::check_domain_health(
            services,
            &store::domains::get(&services.pool, mailbox.domain_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("domain {} not found", mailbox.domain_id))?,
        )
        .await?;
    }
    Ok(())
}

/// One health-degrading bounce during a recovery phase (§4.8): step the
/// phase back, reset `clean_sends_since_phase`, apply the relapse penalty,
/// and recompute cooldown with the raised pause counter. Called both from
/// `monitor::record_bounce` and from the metrics worker's sweep should it
/// ever observe the same condition first.
pub async fn handle_relapse(services: &Services, mailbox: &Mailbox) -> Result<(), anyhow::Error> {
    let new_phase = mailbox.recovery_phase.step_back();
    let new_status = match new_phase {
        RecoveryPhase::Paused => HealthState::Paused,
        RecoveryPhase::Quarantine => HealthState::Quarantine,
        RecoveryPhase::RestrictedSend => HealthState::RestrictedSend,
        RecoveryPhase::WarmRecovery => HealthState::WarmRecovery,
        RecoveryPhase::Healthy => HealthState::Healthy,
    };
    let consecutive_pauses = mailbox.consecutive_pauses + 1;
    let cooldown_until = state_machine::relapse_cooldown(&services.thresholds, consecutive_pauses);
    let resilience_score =
        (mailbox.resilience_score - state_machine::RELAPSE_RESILIENCE_PENALTY).max(0);
    let now = Utc::now();
    state_machine::commit_mailbox_transition(
        &services.pool,
        mailbox.organization_id,
        mailbox.id,
        mailbox.status,
        new_status,
        new_phase,
        cooldown_until,
        consecutive_pauses,
        resilience_score,
        0,
        Some(now),
        Some(now),
        "relapse: health-degrading bounce during recovery",
        "healing",
    )
    .await?;
    Ok(())
}

/// Seven-consecutive-days-stable bonus (§4.8): `+5` resilience, clamped,
/// with `phase_entered_at` re-stamped as the new stability clock so the
/// bonus can't re-trigger every worker tick. Bypasses the transition table
/// since `status` never moves.
pub async fn apply_stability_bonus_if_due(
    services: &Services,
    mailbox: &Mailbox,
) -> Result<bool, anyhow::Error> {
    if mailbox.status != HealthState::Healthy {
        return Ok(false);
    }
    let Some(phase_entered_at) = mailbox.phase_entered_at else {
        return Ok(false);
    };
    if Utc::now() - phase_entered_at < Duration::days(7) {
        return Ok(false);
    }
    let new_score = (mailbox.resilience_score + state_machine::STABILITY_RESILIENCE_BONUS).min(100);
    store::mailboxes::bump_resilience(&services.pool, mailbox.id, new_score, Utc::now()).await?;
    Ok(true)
}

/// §4.8: "while any entity in a domain is recovering, the domain's daily
/// cap is 30 sends; the org cap is 100." `true` means sending may proceed.
pub async fn recovering_cap_ok(
    services: &Services,
    domain: &Domain,
) -> Result<bool, anyhow::Error> {
    let any_recovering = matches!(
        domain.status,
        HealthState::Quarantine | HealthState::RestrictedSend | HealthState::WarmRecovery
    ) || store::mailboxes::any_recovering_in_org(&services.pool, domain.organization_id).await?;

    if !any_recovering {
        return Ok(true);
    }

    let domain_sent = store::mailbox_metrics::sum_sent_24h_for_domain(&services.pool, domain.id).await?;
    if domain_sent >= services.thresholds.domain_daily_cap as i64 {
        return Ok(false);
    }
    let org_sent =
        store::mailbox_metrics::sum_sent_24h_for_org(&services.pool, domain.organization_id).await?;
    Ok(org_sent < services.thresholds.org_daily_cap as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_bands_match_spec() {
        assert_eq!(healing_speed_multiplier(10), 2.0);
        assert_eq!(healing_speed_multiplier(30), 2.0);
        assert_eq!(healing_speed_multiplier(31), 1.0);
        assert_eq!(healing_speed_multiplier(70), 1.0);
        assert_eq!(healing_speed_multiplier(71), 0.75);
        assert_eq!(healing_speed_multiplier(100), 0.75);
    }

    #[test]
    fn rehab_origin_doubles_required_clean_sends() {
        let mailbox = blank_mailbox();
        let mut first_offense = mailbox.clone();
        first_offense.consecutive_pauses = 1;
        assert_eq!(required_clean_sends(&first_offense), 15);

        let mut repeat = mailbox.clone();
        repeat.consecutive_pauses = 2;
        assert_eq!(required_clean_sends(&repeat), 25);

        let mut rehab = mailbox;
        rehab.consecutive_pauses = 1;
        rehab.rehab_origin = true;
        assert_eq!(required_clean_sends(&rehab), 30);
    }

    #[test]
    fn paused_volume_limit_is_always_zero() {
        let mut mailbox = blank_mailbox();
        mailbox.status = HealthState::Paused;
        assert_eq!(phase_volume_limit(&mailbox), Some(0));
    }

    #[test]
    fn healthy_volume_limit_is_unbounded() {
        let mut mailbox = blank_mailbox();
        mailbox.status = HealthState::Healthy;
        mailbox.recovery_phase = RecoveryPhase::Healthy;
        assert_eq!(phase_volume_limit(&mailbox), None);
    }

    #[test]
    fn step_back_from_warm_recovery_lands_on_an_allowed_edge() {
        assert!(crate::state_machine::health_transition_allowed(
            HealthState::WarmRecovery,
            match RecoveryPhase::WarmRecovery.step_back() {
                RecoveryPhase::Paused => HealthState::Paused,
                RecoveryPhase::Quarantine => HealthState::Quarantine,
                RecoveryPhase::RestrictedSend => HealthState::RestrictedSend,
                RecoveryPhase::WarmRecovery => HealthState::WarmRecovery,
                RecoveryPhase::Healthy => HealthState::Healthy,
            }
        ));
    }

    fn blank_mailbox() -> Mailbox {
        Mailbox {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            domain_id: Uuid::new_v4(),
            email: "a@example.com".into(),
            status: HealthState::RestrictedSend,
            recovery_phase: RecoveryPhase::RestrictedSend,
            consecutive_pauses: 1,
            resilience_score: 50,
            cooldown_until: None,
            phase_entered_at: None,
            clean_sends_since_phase: 0,
            warning_count: 0,
            last_pause_at: None,
            last_activity_at: None,
            rehab_origin: false,
            window_sent_count: 0,
            window_bounce_count: 0,
            window_start_at: Utc::now(),
            hard_bounce_count: 0,
            total_sent_count: 0,
            provider_restrictions: vec![],
            smtp_status: true,
            imap_status: true,
            created_at: Utc::now(),
        }
    }
}
