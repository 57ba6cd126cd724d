//! Centralizes the `observe`/`suggest`/`enforce` gating every mutating
//! decision in `monitor`, `healing`, and `gate` passes through, rather than
//! re-implementing the three-way match at each call site (redesign flag,
//! §9 of the specification).

use uuid::Uuid;

use crate::domain::NotificationSeverity;
use crate::domain::SystemMode;
use crate::store;

/// What `apply_policy` decided to do, so callers can log/test it without
/// re-deriving the mode match themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// `observe`: nothing happened, caller should only log.
    Observed,
    /// `suggest`: a notification was created, no mutation happened.
    Suggested,
    /// `enforce`: the caller should proceed to mutate state.
    Enforced,
}

/// Intent describing a mutating action the monitor/healing/gate considered
/// taking, used to build the notification message in `suggest` mode and the
/// log line in `observe` mode.
pub struct IntendedAction<'a> {
    pub organization_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub description: &'a str,
    pub dedup_key: Option<&'a str>,
}

/// Apply system-mode gating to one intended mutation. Returns the outcome
/// so the caller knows whether to go on and actually mutate state
/// (`Enforced`) or stop here (`Observed`/`Suggested`).
pub async fn apply_policy(
    pool: &sqlx::PgPool,
    mode: SystemMode,
    action: IntendedAction<'_>,
) -> Result<PolicyOutcome, sqlx::Error> {
    match mode {
        SystemMode::Observe => {
            tracing::info!(
                organization_id = %action.organization_id,
                "observe mode: would {}",
                action.description
            );
            Ok(PolicyOutcome::Observed)
        }
        SystemMode::Suggest => {
            store::notifications::notify(
                pool,
                action.organization_id,
                action.campaign_id,
                NotificationSeverity::Warning,
                action.description,
                action.dedup_key,
            )
            .await?;
            Ok(PolicyOutcome::Suggested)
        }
        SystemMode::Enforce => Ok(PolicyOutcome::Enforced),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_variants_are_distinct() {
        assert_ne!(PolicyOutcome::Observed, PolicyOutcome::Enforced);
        assert_ne!(PolicyOutcome::Suggested, PolicyOutcome::Enforced);
    }
}
