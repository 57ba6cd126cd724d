use serde::Deserialize;
use serde::Serialize;

/// Bounce failure kind, in the fixed first-match-wins order the classifier
/// tests them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    HardInvalid,
    HardDomain,
    ProviderSpamRejection,
    ProviderThrottle,
    AuthFailure,
    TemporaryNetwork,
    Unknown,
}

impl FailureType {
    /// Whether this classification should count toward mailbox/domain
    /// health at all. `false` means: log only, no counters, no state change.
    pub fn degrades_health(self) -> bool {
        matches!(
            self,
            FailureType::HardInvalid
                | FailureType::HardDomain
                | FailureType::ProviderSpamRejection
                | FailureType::AuthFailure
        )
    }

    pub fn severity(self) -> u8 {
        match self {
            FailureType::HardInvalid | FailureType::HardDomain => 10,
            FailureType::ProviderSpamRejection => 8,
            FailureType::AuthFailure => 6,
            FailureType::ProviderThrottle | FailureType::TemporaryNetwork => 2,
            FailureType::Unknown => 1,
        }
    }

    /// Whether the recipient is expected to become deliverable again without
    /// operator intervention (transient provider-side conditions).
    pub fn recovery_expectation(self) -> RecoveryExpectation {
        match self {
            FailureType::ProviderThrottle | FailureType::TemporaryNetwork => {
                RecoveryExpectation::SelfHeals
            }
            FailureType::HardInvalid | FailureType::HardDomain => RecoveryExpectation::Permanent,
            FailureType::ProviderSpamRejection | FailureType::AuthFailure => {
                RecoveryExpectation::RequiresRemediation
            }
            FailureType::Unknown => RecoveryExpectation::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryExpectation {
    SelfHeals,
    Permanent,
    RequiresRemediation,
    Unknown,
}
