//! Correlation Service (component E). Called before any mailbox pause to
//! decide whether the blast radius is actually the domain, the campaign, or
//! a single provider, so the monitor doesn't pause mailboxes one at a time
//! when the real cause is shared infrastructure.

use std::collections::HashMap;

use chrono::Duration;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::CorrelationAction;
use crate::domain::EmailProvider;
use crate::domain::HealthState;
use crate::model::Mailbox;
use crate::store;

#[derive(Debug, Clone)]
pub struct CorrelationResult {
    pub action: CorrelationAction,
    pub reason: String,
    /// Only populated for `RestrictProvider`.
    pub provider: Option<EmailProvider>,
}

fn mailbox_is_failing(mailbox: &Mailbox) -> bool {
    if matches!(mailbox.status, HealthState::Paused | HealthState::Warning) {
        return true;
    }
    let sent = mailbox.window_sent_count.max(1) as f64;
    let bounce_rate = mailbox.window_bounce_count as f64 / sent;
    bounce_rate > 0.05
}

/// `mailboxId, orgId` → one of the four branches, tried in the fixed order
/// spec.md gives (§4.5). Each branch carries a human-readable reason that
/// callers log verbatim into the state-transition trail.
pub async fn correlate(
    pool: &PgPool,
    organization_id: Uuid,
    mailbox: &Mailbox,
) -> Result<CorrelationResult, sqlx::Error> {
    let since = Utc::now() - Duration::hours(24);

    let siblings = store::domains::siblings(pool, mailbox.domain_id).await?;
    let sibling_count = siblings.len().saturating_sub(1);
    if sibling_count >= 2 {
        let failing = siblings
            .iter()
            .filter(|m| m.id != mailbox.id)
            .filter(|m| mailbox_is_failing(m))
            .count();
        if failing as f64 >= sibling_count as f64 * 0.5 {
            return Ok(CorrelationResult {
                action: CorrelationAction::PauseDomain,
                reason: format!(
                    "{failing}/{sibling_count} sibling mailboxes on this domain are failing or warning"
                ),
                provider: None,
            });
        }
    }

    let recent = store::raw_events::recent_bounces_for_mailbox(pool, mailbox.id, since).await?;
    let total = recent.len();

    if total > 0 {
        let mut by_campaign: HashMap<Uuid, usize> = HashMap::new();
        for event in &recent {
            if let Some(campaign_id) = event
                .payload
                .get("campaign_id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                *by_campaign.entry(campaign_id).or_insert(0) += 1;
            }
        }
        if by_campaign.len() >= 2 {
            if let Some((&_campaign_id, &count)) = by_campaign.iter().max_by_key(|(_, c)| **c) {
                if count as f64 >= total as f64 * 0.8 {
                    return Ok(CorrelationResult {
                        action: CorrelationAction::PauseCampaign,
                        reason: format!(
                            "{count}/{total} recent bounces for this mailbox share a single campaign"
                        ),
                        provider: None,
                    });
                }
            }
        }

        let mut by_provider: HashMap<EmailProvider, usize> = HashMap::new();
        for event in &recent {
            let provider = event
                .payload
                .get("provider")
                .and_then(|v| v.as_str())
                .map(|s| match s {
                    "gmail" => EmailProvider::Gmail,
                    "microsoft" => EmailProvider::Microsoft,
                    "yahoo" => EmailProvider::Yahoo,
                    _ => EmailProvider::Other,
                })
                .unwrap_or(EmailProvider::Other);
            *by_provider.entry(provider).or_insert(0) += 1;
        }
        if let Some((&provider, &count)) = by_provider
            .iter()
            .filter(|(p, _)| **p != EmailProvider::Other)
            .max_by_key(|(_, c)| **c)
        {
            if count as f64 >= total as f64 * 0.8 {
                return Ok(CorrelationResult {
                    action: CorrelationAction::RestrictProvider,
                    reason: format!(
                        "{count}/{total} recent bounces concentrate on a single provider"
                    ),
                    provider: Some(provider),
                });
            }
        }
    }

    let _ = organization_id;
    Ok(CorrelationResult {
        action: CorrelationAction::PauseMailbox,
        reason: "no domain-wide, campaign-wide, or provider-wide pattern found".to_string(),
        provider: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_detection_covers_state_and_rate() {
        let mut m = blank_mailbox();
        m.status = HealthState::Warning;
        assert!(mailbox_is_failing(&m));

        m.status = HealthState::Healthy;
        m.window_sent_count = 100;
        m.window_bounce_count = 10;
        assert!(mailbox_is_failing(&m));

        m.window_bounce_count = 1;
        assert!(!mailbox_is_failing(&m));
    }

    fn blank_mailbox() -> Mailbox {
        Mailbox {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            domain_id: Uuid::new_v4(),
            email: "a@example.com".into(),
            status: HealthState::Healthy,
            recovery_phase: crate::domain::RecoveryPhase::Healthy,
            consecutive_pauses: 0,
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
