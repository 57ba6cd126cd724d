//! Execution Gate (component I). Synchronous, read-only decision on whether
//! a lead may be dispatched right now. Never mutates mailbox/domain/lead
//! state — only logs an audit row recording the decision (§4.9).

use uuid::Uuid;

use crate::domain::EntityKind;
use crate::domain::GateFailureType;
use crate::domain::SystemMode;
use crate::metrics;
use crate::model::GateChecks;
use crate::model::GateResult;
use crate::model::Mailbox;
use crate::services::Services;
use crate::store;

/// Below this, the gate blocks hard regardless of mode (§4.9 step 2).
const RESILIENCE_HARD_BLOCK: i32 = 25;
/// At or above this, healing transition gating auto-allows (§4.9 step 2).
const RESILIENCE_AUTO_ALLOW: i32 = 60;

/// `canExecuteLead(orgId, campaignId, leadId) -> GateResult`. Check order
/// and short-circuits exactly per spec.md: assessment gate, resilience
/// gate, campaign-active, healthy-mailbox-availability, aggregate
/// throttles, hard risk score — each producing a `GateChecks` bit, with
/// the final `allowed` verdict depending on `system_mode`.
pub async fn can_execute_lead(
    services: &Services,
    organization_id: Uuid,
    campaign_id: Uuid,
    lead_id: Uuid,
) -> Result<GateResult, anyhow::Error> {
    let mut checks = GateChecks::default();
    let pool = &services.pool;

    let org = store::organizations::get(pool, organization_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("organization {organization_id} not found"))?;

    // Step 1: assessment gate.
    if !org.assessment_completed {
        return finish(
            services,
            organization_id,
            lead_id,
            org.system_mode,
            checks,
            "organization has not completed its infrastructure assessment",
            0.0,
            Some(GateFailureType::SyncIssue),
            false,
            true,
        )
        .await;
    }
    checks.assessment_completed = true;

    // Step 2: healing transition / overall infra resilience gate.
    let domains = store::domains::by_organization(pool, organization_id).await?;
    let avg_resilience = if domains.is_empty() {
        50
    } else {
        (domains.iter().map(|d| d.resilience_score).sum::<i32>() as f64 / domains.len() as f64)
            .round() as i32
    };
    if avg_resilience < RESILIENCE_HARD_BLOCK {
        return finish(
            services,
            organization_id,
            lead_id,
            org.system_mode,
            checks,
            &format!("infra resilience {avg_resilience} is below the hard-block floor of {RESILIENCE_HARD_BLOCK}"),
            0.0,
            Some(GateFailureType::InfraIssue),
            true,
            true,
        )
        .await;
    }
    let needs_operator_ack = avg_resilience < RESILIENCE_AUTO_ALLOW;
    checks.resilience_ok = !needs_operator_ack;

    // Step 3: campaign must exist and be active.
    let campaign = store::campaigns::get(pool, campaign_id).await?;
    let campaign_active = campaign.as_ref().is_some_and(|c| c.is_active());
    checks.campaign_active = campaign_active;
    if !campaign_active {
        return finish(
            services,
            organization_id,
            lead_id,
            org.system_mode,
            checks,
            "campaign does not exist or is not active",
            0.0,
            Some(GateFailureType::HealthIssue),
            false,
            true,
        )
        .await;
    }

    // Step 4: at least one healthy mailbox, cooldown cleared, domain healthy.
    let healthy_mailboxes = store::mailboxes::healthy_for_campaign(pool, campaign_id).await?;
    checks.healthy_mailbox_available = !healthy_mailboxes.is_empty();
    if healthy_mailboxes.is_empty() {
        let org_has_any_mailbox =
            !store::mailboxes::by_organization(pool, organization_id, 1).await?.is_empty();
        let failure_type = if org_has_any_mailbox {
            GateFailureType::HealthIssue
        } else {
            GateFailureType::SyncIssue
        };
        if failure_type == GateFailureType::HealthIssue {
            store::notifications::notify(
                pool,
                organization_id,
                Some(campaign_id),
                crate::domain::NotificationSeverity::Critical,
                "no healthy mailbox is available to dispatch this campaign",
                Some(&format!("gate:no-healthy-mailbox:{campaign_id}")),
            )
            .await?;
        }
        return finish(
            services,
            organization_id,
            lead_id,
            org.system_mode,
            checks,
            "no healthy, un-cooled-down mailbox on a healthy domain is available",
            0.0,
            Some(failure_type),
            failure_type == GateFailureType::InfraIssue,
            true,
        )
        .await;
    }

    // Step 5: aggregate throttles.
    let mut below_capacity = true;
    for mailbox in &healthy_mailboxes {
        let domain = store::domains::get(pool, mailbox.domain_id).await?;
        if let Some(domain) = domain {
            if !crate::healing::recovering_cap_ok(services, &domain).await? {
                below_capacity = false;
                break;
            }
        }
    }
    checks.below_capacity = below_capacity;
    if !below_capacity {
        return finish(
            services,
            organization_id,
            lead_id,
            org.system_mode,
            checks,
            "domain or organization daily send cap reached while infrastructure recovers",
            0.0,
            Some(GateFailureType::HealthIssue),
            true,
            true,
        )
        .await;
    }

    // Step 6: hard/soft risk split. Only hard score may block.
    let (avg_hard, avg_soft) = average_risk(services, &healthy_mailboxes).await?;
    checks.risk_acceptable = avg_hard < services.thresholds.hard_risk_critical;
    if !checks.risk_acceptable {
        return finish(
            services,
            organization_id,
            lead_id,
            org.system_mode,
            checks,
            &format!("hard risk score {avg_hard:.1} meets or exceeds the critical threshold"),
            avg_hard,
            Some(GateFailureType::HealthIssue),
            false,
            true,
        )
        .await;
    }
    if avg_soft > 0.0 {
        tracing::info!(organization_id = %organization_id, soft_score = avg_soft, "soft risk elevated, logged only");
    }

    if needs_operator_ack {
        return finish(
            services,
            organization_id,
            lead_id,
            org.system_mode,
            checks,
            "all checks passed, but infra resilience requires operator acknowledgment",
            avg_hard,
            Some(GateFailureType::SoftWarning),
            false,
            true,
        )
        .await;
    }

    finish(
        services,
        organization_id,
        lead_id,
        org.system_mode,
        checks,
        "all checks passed",
        avg_hard,
        None,
        false,
        false,
    )
    .await
}

async fn average_risk(
    services: &Services,
    mailboxes: &[Mailbox],
) -> Result<(f64, f64), anyhow::Error> {
    if mailboxes.is_empty() {
        return Ok((0.0, 0.0));
    }
    let mut hard_sum = 0.0;
    let mut soft_sum = 0.0;
    for mailbox in mailboxes {
        let row = store::mailbox_metrics::get_or_init(&services.pool, mailbox.id).await?;
        let assessment = metrics::risk_score(&row, mailbox.consecutive_pauses);
        hard_sum += assessment.hard_score;
        soft_sum += metrics::soft_score_with_warnings(assessment.soft_score, mailbox.warning_count);
    }
    let n = mailboxes.len() as f64;
    Ok((hard_sum / n, soft_sum / n))
}

/// Apply the mode-dependent final disposition (§4.9) and log the decision
/// audit row. `observe` and `suggest` always report `allowed=true`;
/// `enforce` allows iff every recorded check passed.
#[allow(clippy::too_many_arguments)]
async fn finish(
    services: &Services,
    organization_id: Uuid,
    lead_id: Uuid,
    mode: SystemMode,
    checks: GateChecks,
    reason: &str,
    risk_score: f64,
    failure_type: Option<GateFailureType>,
    retryable: bool,
    deferrable: bool,
) -> Result<GateResult, anyhow::Error> {
    let all_passed = checks.assessment_completed
        && checks.resilience_ok
        && checks.campaign_active
        && checks.healthy_mailbox_available
        && checks.below_capacity
        && checks.risk_acceptable;

    let mut recommendations = Vec::new();
    if !all_passed {
        if !checks.resilience_ok {
            recommendations.push("obtain operator acknowledgment before dispatching at this resilience level".to_string());
        }
        if !checks.healthy_mailbox_available {
            recommendations.push("wait for a mailbox to clear its cooldown or add capacity".to_string());
        }
        if !checks.below_capacity {
            recommendations.push("defer until the next daily throttle window".to_string());
        }
        if !checks.risk_acceptable {
            recommendations.push("investigate the hard bounce/failure rate before resuming".to_string());
        }
    }

    let (allowed, action) = match mode {
        SystemMode::Observe => {
            (true, if all_passed { "gate_passed_observe" } else { "gate_would_fail_observe" })
        }
        SystemMode::Suggest => (true, if all_passed { "gate_passed_suggest" } else { "gate_would_fail_suggest" }),
        SystemMode::Enforce => (all_passed, if all_passed { "gate_passed_enforce" } else { "gate_blocked_enforce" }),
    };

    let reason = match mode {
        SystemMode::Observe => format!("{reason} (observe mode: decision logged only)"),
        SystemMode::Suggest => format!("{reason} (suggest mode: recommendation only)"),
        SystemMode::Enforce => reason.to_string(),
    };

    store::audit::insert_standalone(
        &services.pool,
        organization_id,
        EntityKind::Lead,
        lead_id,
        action,
        serde_json::json!({
            "allowed": allowed,
            "reason": reason,
            "risk_score": risk_score,
            "checks": checks,
        }),
    )
    .await?;

    Ok(GateResult {
        allowed,
        checks,
        reason,
        risk_score,
        recommendations,
        failure_type,
        retryable,
        deferrable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_checks_all_passed_requires_every_flag() {
        let all = GateChecks {
            assessment_completed: true,
            resilience_ok: true,
            campaign_active: true,
            healthy_mailbox_available: true,
            below_capacity: true,
            risk_acceptable: true,
        };
        assert!(
            all.assessment_completed
                && all.resilience_ok
                && all.campaign_active
                && all.healthy_mailbox_available
                && all.below_capacity
                && all.risk_acceptable
        );
    }

    #[test]
    fn gate_checks_operator_ack_tier_is_not_all_passed() {
        let mut checks = GateChecks {
            assessment_completed: true,
            resilience_ok: false,
            campaign_active: true,
            healthy_mailbox_available: true,
            below_capacity: true,
            risk_acceptable: true,
        };
        let all_passed = checks.assessment_completed
            && checks.resilience_ok
            && checks.campaign_active
            && checks.healthy_mailbox_available
            && checks.below_capacity
            && checks.risk_acceptable;
        assert!(!all_passed, "operator-ack tier must not dispatch without acknowledgment");
        checks.resilience_ok = true;
        assert!(
            checks.assessment_completed
                && checks.resilience_ok
                && checks.campaign_active
                && checks.healthy_mailbox_available
                && checks.below_capacity
                && checks.risk_acceptable
        );
    }
}
