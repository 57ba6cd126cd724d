use serde::Deserialize;
use serde::Serialize;

/// Organization-wide control mode. Gates every mutating decision in
/// `monitor`, `healing`, and `gate` through `crate::policy::apply_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SystemMode {
    Observe,
    Suggest,
    Enforce,
}

/// Shared mailbox/domain health state. `Recovering` is kept only so that
/// historical `StateTransition` rows replay correctly (see DESIGN.md, Open
/// Question 1) — no live enforce-mode code path produces it anymore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Warning,
    Paused,
    Quarantine,
    RestrictedSend,
    WarmRecovery,
    Recovering,
}

impl HealthState {
    pub fn is_unhealthy(self) -> bool {
        !matches!(self, HealthState::Healthy | HealthState::Warning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Warning => "warning",
            HealthState::Paused => "paused",
            HealthState::Quarantine => "quarantine",
            HealthState::RestrictedSend => "restricted_send",
            HealthState::WarmRecovery => "warm_recovery",
            HealthState::Recovering => "recovering",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    Paused,
    Quarantine,
    RestrictedSend,
    WarmRecovery,
    Healthy,
}

impl RecoveryPhase {
    /// The phase one notch back from `self`, used by relapse handling.
    /// `Paused` has no predecessor and is returned unchanged. `WarmRecovery`
    /// steps back to `Quarantine` rather than `RestrictedSend` — the only
    /// backward edge the state machine's transition table allows from
    /// `warm_recovery` is `quarantine` (see DESIGN.md).
    pub fn step_back(self) -> RecoveryPhase {
        match self {
            RecoveryPhase::Paused => RecoveryPhase::Paused,
            RecoveryPhase::Quarantine => RecoveryPhase::Paused,
            RecoveryPhase::RestrictedSend => RecoveryPhase::Quarantine,
            RecoveryPhase::WarmRecovery => RecoveryPhase::Quarantine,
            RecoveryPhase::Healthy => RecoveryPhase::WarmRecovery,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryPhase::Paused => "paused",
            RecoveryPhase::Quarantine => "quarantine",
            RecoveryPhase::RestrictedSend => "restricted_send",
            RecoveryPhase::WarmRecovery => "warm_recovery",
            RecoveryPhase::Healthy => "healthy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadState {
    Held,
    Active,
    Paused,
    Completed,
}

impl LeadState {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadState::Held => "held",
            LeadState::Active => "active",
            LeadState::Paused => "paused",
            LeadState::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFailureType {
    HealthIssue,
    InfraIssue,
    SyncIssue,
    SoftWarning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationAction {
    PauseDomain,
    PauseCampaign,
    RestrictProvider,
    PauseMailbox,
}
