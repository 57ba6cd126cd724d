//! One metrics worker cycle (§4.10): batched per organization, 50
//! mailboxes per org per sub-step, honoring system mode throughout (no
//! state change while `observe`, since `monitor::warn_mailbox`/
//! `pause_mailbox`, `healing::try_graduate`, and this module's own
//! domain-cooldown-expiry step all route their mutation through
//! `policy::apply_policy` before committing).

use crate::metrics;
use crate::model::Mailbox;
use crate::policy;
use crate::policy::IntendedAction;
use crate::policy::PolicyOutcome;
use crate::services::Services;
use crate::store;

const BATCH_SIZE: i64 = 50;

pub async fn run_cycle(services: &Services) -> Result<(), anyhow::Error> {
    let orgs = store::organizations::list_all(&services.pool).await?;
    for org in orgs {
        step_a_recompute_risk(services, org.id).await?;
        step_b_graduate(services, org.id).await?;
        step_c_domain_health(services, org.id).await?;
    }
    Ok(())
}

/// (a) For each healthy/warning/recovering mailbox with a clean assessment
/// signal, recompute risk and re-check the bounce thresholds — a safety
/// net for mailboxes whose last relevant event happened between ticks.
async fn step_a_recompute_risk(services: &Services, organization_id: uuid::Uuid) -> Result<(), anyhow::Error> {
    let mailboxes = store::mailboxes::sweep_candidates(&services.pool, organization_id, BATCH_SIZE).await?;
    for mailbox in &mailboxes {
        recompute_one(services, mailbox).await?;
    }
    Ok(())
}

async fn recompute_one(services: &Services, mailbox: &Mailbox) -> Result<(), anyhow::Error> {
    let row = store::mailbox_metrics::get_or_init(&services.pool, mailbox.id).await?;
    let assessment = metrics::risk_score(&row, mailbox.consecutive_pauses);

    let bounce_rate_24h = if row.sent_24h == 0 { 0.0 } else { row.bounce_24h as f64 / row.sent_24h as f64 };
    let failure_rate_24h = if row.sent_24h == 0 { 0.0 } else { row.failure_24h as f64 / row.sent_24h as f64 };
    let velocity = metrics::velocity(bounce_rate_24h - row.prev_bounce_rate, failure_rate_24h - row.prev_failure_rate);

    store::mailbox_metrics::update_risk(
        &services.pool,
        mailbox.id,
        assessment.score,
        velocity,
        bounce_rate_24h,
        failure_rate_24h,
    )
    .await?;

    if mailbox.status == crate::domain::HealthState::Healthy {
        if mailbox.window_bounce_count >= services.thresholds.mailbox_pause_bounces {
            crate::monitor::pause_mailbox(services, mailbox, None, "bounce threshold reached (metrics sweep)").await?;
        } else if mailbox.window_bounce_count >= services.thresholds.mailbox_warning_bounces
            && mailbox.window_sent_count <= services.thresholds.mailbox_warning_window
        {
            crate::monitor::warn_mailbox(services, mailbox).await?;
        }
    }

    crate::healing::apply_stability_bonus_if_due(services, mailbox).await?;
    Ok(())
}

/// (b) Paused mailboxes/domains whose cooldown has expired move to
/// `quarantine`; anything already mid-recovery gets another graduation
/// attempt regardless of cooldown.
async fn step_b_graduate(services: &Services, organization_id: uuid::Uuid) -> Result<(), anyhow::Error> {
    let expired = store::mailboxes::expired_cooldowns(&services.pool).await?;
    for mailbox in expired.into_iter().filter(|m| m.organization_id == organization_id) {
        crate::healing::try_graduate(services, &mailbox).await?;
    }

    let recovering = store::mailboxes::in_recovery(&services.pool, organization_id, BATCH_SIZE).await?;
    for mailbox in &recovering {
        crate::healing::try_graduate(services, mailbox).await?;
    }

    for domain in store::domains::expired_cooldowns(&services.pool).await? {
        if domain.organization_id != organization_id {
            continue;
        }
        let org = store::organizations::get(&services.pool, domain.organization_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("organization {} not found", domain.organization_id))?;
        let outcome = policy::apply_policy(
            &services.pool,
            org.system_mode,
            IntendedAction {
                organization_id: domain.organization_id,
                campaign_id: None,
                description: &format!("graduate domain {} out of cooldown into quarantine", domain.name),
                dedup_key: Some(&format!("graduate:domain:{}", domain.id)),
            },
        )
        .await?;
        if outcome != PolicyOutcome::Enforced {
            continue;
        }
        let now = chrono::Utc::now();
        crate::state_machine::commit_domain_transition(
            &services.pool,
            domain.organization_id,
            domain.id,
            domain.status,
            crate::domain::HealthState::Quarantine,
            crate::domain::RecoveryPhase::Quarantine,
            None,
            domain.consecutive_pauses,
            (domain.resilience_score + crate::state_machine::GRADUATION_RESILIENCE_BONUS).min(100),
            0,
            Some(now),
            domain.last_pause_at,
            "domain cooldown expired",
            "metrics_worker",
        )
        .await?;
    }
    Ok(())
}

/// (c) Re-derive aggregated domain health from the current mailbox mix,
/// reusing the ratio-vs-absolute-count rule the bounce path already
/// implements (§4.7).
async fn step_c_domain_health(services: &Services, organization_id: uuid::Uuid) -> Result<(), anyhow::Error> {
    for domain in store::domains::by_organization(&services.pool, organization_id).await? {
        crate::monitor::check_domain_health(services, &domain).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_matches_the_spec_constant() {
        assert_eq!(BATCH_SIZE, 50);
    }
}
