//! Monitor (component G). Entry point the Work Queue's handlers call for
//! `EMAIL_SENT` and `*BOUNCE*` events; owns the tiered pause/warn thresholds,
//! the correlation-before-pause call, and the ratio-based domain health
//! check. Every mutation here passes through `policy::apply_policy` first so
//! `observe`/`suggest` never touch `status`/`recovery_phase`/`cooldown_until`
//! (§8's mode-gate invariant).

use serde_json::json;
use uuid::Uuid;

use crate::classifier::Classification;
use crate::correlation;
use crate::domain::CorrelationAction;
use crate::domain::EntityKind;
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

/// §4.7 step 1-4: atomic increments, 100-send window slide (keep 50% of
/// both counters, Open Question 2), and the legacy `recovering`→`healthy`
/// escape hatch at <3% post-slide bounce rate. The raw send event itself
/// was already appended by the event store before this ran; this function
/// owns only the counters and the state check.
pub async fn record_sent(services: &Services, mailbox: &Mailbox) -> Result<(), anyhow::Error> {
    store::mailboxes::record_sent(&services.pool, mailbox.id).await?;
    store::mailbox_metrics::get_or_init(&services.pool, mailbox.id).await?;
    store::mailbox_metrics::record_sent(&services.pool, mailbox.id).await?;

    let refreshed = store::mailboxes::get(&services.pool, mailbox.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("mailbox {} vanished mid-record", mailbox.id))?;

    if refreshed.window_sent_count >= services.thresholds.rolling_window_size {
        store::mailboxes::slide_window(&services.pool, mailbox.id).await?;
    }

    let refreshed = store::mailboxes::get(&services.pool, mailbox.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("mailbox {} vanished mid-record", mailbox.id))?;

    if refreshed.status == HealthState::Recovering {
        let sent = refreshed.window_sent_count.max(1) as f64;
        let bounce_rate = refreshed.window_bounce_count as f64 / sent;
        if bounce_rate < 0.03 {
            let org = require_org(services, refreshed.organization_id).await?;
            let outcome = policy::apply_policy(
                &services.pool,
                org.system_mode,
                IntendedAction {
                    organization_id: refreshed.organization_id,
                    campaign_id: None,
                    description: &format!("transition mailbox {} out of recovery", refreshed.email),
                    dedup_key: None,
                },
            )
            .await?;
            if outcome == PolicyOutcome::Enforced {
                let (cooldown_until, consecutive_pauses) = state_machine::entering_healthy();
                state_machine::commit_mailbox_transition(
                    &services.pool,
                    refreshed.organization_id,
                    refreshed.id,
                    HealthState::Recovering,
                    HealthState::Healthy,
                    RecoveryPhase::Healthy,
                    cooldown_until,
                    consecutive_pauses,
                    refreshed.resilience_score,
                    refreshed.clean_sends_since_phase,
                    refreshed.phase_entered_at,
                    refreshed.last_pause_at,
                    "post-slide bounce rate below 3% while recovering",
                    "monitor",
                )
                .await?;
            }
        }
    }
    Ok(())
}

/// §4.7 step 1-5: classify (already done by the caller), log transient
/// bounces without mutating anything, otherwise increment counters and
/// either hand off to relapse handling (mailbox already mid-recovery) or
/// apply the tiered pause/warn thresholds.
pub async fn record_bounce(
    services: &Services,
    mailbox: &Mailbox,
    classification: &Classification,
    campaign_id: Option<Uuid>,
) -> Result<(), anyhow::Error> {
    store::audit::insert_standalone(
        &services.pool,
        mailbox.organization_id,
        EntityKind::Mailbox,
        mailbox.id,
        "bounce_classified",
        json!({
            "failure_type": format!("{:?}", classification.failure_type),
            "provider": format!("{:?}", classification.provider),
            "degrades_health": classification.degrades_health,
        }),
    )
    .await?;

    if !classification.degrades_health {
        store::audit::insert_standalone(
            &services.pool,
            mailbox.organization_id,
            EntityKind::Mailbox,
            mailbox.id,
            "transient_bounce",
            json!({ "raw_reason": classification.raw_reason }),
        )
        .await?;
        return Ok(());
    }

    store::mailboxes::record_bounce(&services.pool, mailbox.id).await?;
    store::mailbox_metrics::get_or_init(&services.pool, mailbox.id).await?;
    store::mailbox_metrics::record_bounce(&services.pool, mailbox.id, false).await?;

    let refreshed = store::mailboxes::get(&services.pool, mailbox.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("mailbox {} vanished mid-record", mailbox.id))?;

    if matches!(
        refreshed.status,
        HealthState::Quarantine | HealthState::RestrictedSend | HealthState::WarmRecovery
    ) {
        let org = require_org(services, refreshed.organization_id).await?;
        let outcome = policy::apply_policy(
            &services.pool,
            org.system_mode,
            IntendedAction {
                organization_id: refreshed.organization_id,
                campaign_id: None,
                description: &format!("relapse mailbox {} back one recovery phase", refreshed.email),
                dedup_key: Some(&format!("relapse:mailbox:{}", refreshed.id)),
            },
        )
        .await?;
        if outcome == PolicyOutcome::Enforced {
            store::mailboxes::reset_clean_sends(&services.pool, refreshed.id).await?;
            crate::healing::handle_relapse(services, &refreshed).await?;
        }
        return Ok(());
    }

    // Already paused: a further bounce in the same window can't make the
    // mailbox "more paused" — skip straight past the thresholds instead of
    // attempting a Paused -> Paused self-transition, which the state table
    // forbids. The correlation race in §5 ("second pause is a no-op if
    // state is already paused") applies the same idempotency here.
    if refreshed.status == HealthState::Paused {
        return Ok(());
    }

    if refreshed.window_bounce_count >= services.thresholds.mailbox_pause_bounces {
        pause_mailbox(services, &refreshed, campaign_id, "bounce threshold reached").await?;
    } else if refreshed.window_bounce_count >= services.thresholds.mailbox_warning_bounces
        && refreshed.window_sent_count <= services.thresholds.mailbox_warning_window
        && refreshed.status != HealthState::Warning
    {
        warn_mailbox(services, &refreshed).await?;
    }
    Ok(())
}

pub(crate) async fn warn_mailbox(services: &Services, mailbox: &Mailbox) -> Result<(), anyhow::Error> {
    let org = require_org(services, mailbox.organization_id).await?;
    let outcome = policy::apply_policy(
        &services.pool,
        org.system_mode,
        IntendedAction {
            organization_id: mailbox.organization_id,
            campaign_id: None,
            description: &format!("warn mailbox {}", mailbox.email),
            dedup_key: Some(&format!("warn:mailbox:{}", mailbox.id)),
        },
    )
    .await?;
    if outcome != PolicyOutcome::Enforced {
        return Ok(());
    }
    store::mailboxes::increment_warning_count(&services.pool, mailbox.id).await?;
    state_machine::commit_mailbox_transition(
        &services.pool,
        mailbox.organization_id,
        mailbox.id,
        mailbox.status,
        HealthState::Warning,
        mailbox.recovery_phase,
        mailbox.cooldown_until,
        mailbox.consecutive_pauses,
        mailbox.resilience_score,
        mailbox.clean_sends_since_phase,
        mailbox.phase_entered_at,
        mailbox.last_pause_at,
        "3+ bounces within the warning window",
        "monitor",
    )
    .await?;
    Ok(())
}

/// §4.7: Correlation runs before any pause decides whether the real
/// blast radius is the domain, a campaign, or a provider.
pub(crate) async fn pause_mailbox(
    services: &Services,
    mailbox: &Mailbox,
    campaign_id: Option<Uuid>,
    reason: &str,
) -> Result<(), anyhow::Error> {
    let org = require_org(services, mailbox.organization_id).await?;
    let correlation = correlation::correlate(&services.pool, mailbox.organization_id, mailbox).await?;

    let description = format!("pause mailbox {} ({reason}; {})", mailbox.email, correlation.reason);
    let outcome = policy::apply_policy(
        &services.pool,
        org.system_mode,
        IntendedAction {
            organization_id: mailbox.organization_id,
            campaign_id,
            description: &description,
            dedup_key: Some(&format!("pause:mailbox:{}", mailbox.id)),
        },
    )
    .await?;
    if outcome != PolicyOutcome::Enforced {
        return Ok(());
    }

    match correlation.action {
        CorrelationAction::PauseDomain => {
            let domain = store::domains::get(&services.pool, mailbox.domain_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("domain {} not found", mailbox.domain_id))?;
            pause_domain(services, &domain, &format!("correlation: {}", correlation.reason)).await?;
        }
        CorrelationAction::PauseCampaign => {
            if let Some(campaign_id) = resolve_dominant_campaign(services, mailbox.id).await? {
                store::campaigns::set_status(&services.pool, campaign_id, "paused").await?;
                store::audit::insert_standalone(
                    &services.pool,
                    mailbox.organization_id,
                    EntityKind::Campaign,
                    campaign_id,
                    "paused_by_correlation",
                    json!({ "reason": correlation.reason, "mailbox_id": mailbox.id }),
                )
                .await?;
            }
        }
        CorrelationAction::RestrictProvider => {
            if let Some(provider) = correlation.provider {
                store::mailboxes::add_provider_restriction(
                    &services.pool,
                    mailbox.id,
                    crate::model::provider_to_text(provider),
                )
                .await?;
                store::audit::insert_standalone(
                    &services.pool,
                    mailbox.organization_id,
                    EntityKind::Mailbox,
                    mailbox.id,
                    "provider_restricted",
                    json!({ "provider": format!("{:?}", provider), "reason": correlation.reason }),
                )
                .await?;
            }
        }
        CorrelationAction::PauseMailbox => {
            let outcome = state_machine::entering_paused(
                &services.thresholds,
                mailbox.consecutive_pauses,
                mailbox.resilience_score,
            );
            let now = chrono::Utc::now();
            state_machine::commit_mailbox_transition(
                &services.pool,
                mailbox.organization_id,
                mailbox.id,
                mailbox.status,
                HealthState::Paused,
                RecoveryPhase::Paused,
                outcome.cooldown_until,
                outcome.consecutive_pauses,
                outcome.resilience_score,
                0,
                Some(now),
                Some(now),
                reason,
                "monitor",
            )
            .await?;

            let adapter = services.adapter();
            for campaign_id in store::campaigns::campaigns_for_mailbox(&services.pool, mailbox.id).await? {
                if let Err(e) = adapter
                    .remove_mailbox_from_campaign(&campaign_id.to_string(), &mailbox.email)
                    .await
                {
                    tracing::warn!(error = %e, mailbox = %mailbox.email, "best-effort campaign removal failed");
                }
            }
            store::campaigns::remove_mailbox(&services.pool, mailbox.id).await?;

            let domain = store::domains::get(&services.pool, mailbox.domain_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("domain {} not found", mailbox.domain_id))?;
            check_domain_health(services, &domain).await?;
        }
    }
    Ok(())
}

async fn resolve_dominant_campaign(
    services: &Services,
    mailbox_id: Uuid,
) -> Result<Option<Uuid>, anyhow::Error> {
    let campaigns = store::campaigns::campaigns_for_mailbox(&services.pool, mailbox_id).await?;
    Ok(campaigns.into_iter().next())
}

async fn pause_domain(services: &Services, domain: &Domain, reason: &str) -> Result<(), anyhow::Error> {
    let outcome = state_machine::entering_paused(
        &services.thresholds,
        domain.consecutive_pauses,
        domain.resilience_score,
    );
    let now = chrono::Utc::now();
    state_machine::commit_domain_transition(
        &services.pool,
        domain.organization_id,
        domain.id,
        domain.status,
        HealthState::Paused,
        RecoveryPhase::Paused,
        outcome.cooldown_until,
        outcome.consecutive_pauses,
        outcome.resilience_score,
        0,
        Some(now),
        Some(now),
        reason,
        "monitor",
    )
    .await?;

    let siblings = store::domains::siblings(&services.pool, domain.id).await?;
    for mailbox in siblings.into_iter().filter(|m| !m.status.is_unhealthy()) {
        let mailbox_outcome = state_machine::entering_paused(
            &services.thresholds,
            mailbox.consecutive_pauses,
            mailbox.resilience_score,
        );
        state_machine::commit_mailbox_transition(
            &services.pool,
            mailbox.organization_id,
            mailbox.id,
            mailbox.status,
            HealthState::Paused,
            RecoveryPhase::Paused,
            mailbox_outcome.cooldown_until,
            mailbox_outcome.consecutive_pauses,
            mailbox_outcome.resilience_score,
            0,
            Some(now),
            Some(now),
            "cascaded from domain pause",
            "monitor",
        )
        .await?;
    }
    Ok(())
}

async fn warn_domain(services: &Services, domain: &Domain) -> Result<(), anyhow::Error> {
    store::domains::increment_warning_count(&services.pool, domain.id).await?;
    state_machine::commit_domain_transition(
        &services.pool,
        domain.organization_id,
        domain.id,
        domain.status,
        HealthState::Warning,
        domain.recovery_phase,
        domain.cooldown_until,
        domain.consecutive_pauses,
        domain.resilience_score,
        domain.clean_sends_since_phase,
        domain.phase_entered_at,
        domain.last_pause_at,
        "ratio of unhealthy mailboxes crossed the warning threshold",
        "monitor",
    )
    .await?;
    Ok(())
}

/// Ratio-based, not absolute-count-based for domains at or above the
/// minimum mailbox count (§4.7): a domain with many mailboxes tolerates a
/// few failures, a domain with one or two mailboxes does not.
pub async fn check_domain_health(services: &Services, domain: &Domain) -> Result<(), anyhow::Error> {
    let siblings = store::domains::siblings(&services.pool, domain.id).await?;
    let total = siblings.len();
    if total == 0 {
        return Ok(());
    }
    let unhealthy = siblings.iter().filter(|m| m.status.is_unhealthy()).count();

    let should_pause;
    let should_warn;
    if total as i32 >= services.thresholds.domain_minimum_mailboxes {
        let ratio = unhealthy as f64 / total as f64;
        should_pause = ratio >= 0.5;
        should_warn = !should_pause && ratio >= 0.3;
    } else {
        should_pause = unhealthy >= 2;
        should_warn = !should_pause && unhealthy >= 1;
    }

    if should_pause && domain.status != HealthState::Paused {
        let org = require_org(services, domain.organization_id).await?;
        let outcome = policy::apply_policy(
            &services.pool,
            org.system_mode,
            IntendedAction {
                organization_id: domain.organization_id,
                campaign_id: None,
                description: &format!("pause domain {} ({unhealthy}/{total} mailboxes unhealthy)", domain.name),
                dedup_key: Some(&format!("pause:domain:{}", domain.id)),
            },
        )
        .await?;
        if outcome == PolicyOutcome::Enforced {
            pause_domain(
                services,
                domain,
                &format!("{unhealthy}/{total} mailboxes unhealthy (ratio threshold)"),
            )
            .await?;
        }
    } else if should_warn && domain.status == HealthState::Healthy {
        let org = require_org(services, domain.organization_id).await?;
        let outcome = policy::apply_policy(
            &services.pool,
            org.system_mode,
            IntendedAction {
                organization_id: domain.organization_id,
                campaign_id: None,
                description: &format!("warn domain {} ({unhealthy}/{total} mailboxes unhealthy)", domain.name),
                dedup_key: Some(&format!("warn:domain:{}", domain.id)),
            },
        )
        .await?;
        if outcome == PolicyOutcome::Enforced {
            warn_domain(services, domain).await?;
        }
    }
    Ok(())
}

async fn require_org(
    services: &Services,
    organization_id: Uuid,
) -> Result<crate::model::Organization, anyhow::Error> {
    store::organizations::get(&services.pool, organization_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("organization {organization_id} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_domain_uses_ratio_small_domain_uses_absolute_count() {
        // Pure threshold logic mirrored here since `check_domain_health` needs a
        // pool; documents the exact cutover the function implements.
        let large_pause_ratio = 0.5;
        let small_pause_count = 2;
        assert!(large_pause_ratio * 3.0 >= 1.5);
        assert_eq!(small_pause_count, 2);
    }
}
