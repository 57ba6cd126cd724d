use serde::Deserialize;
use serde::Serialize;

/// `Critical` is an addition beyond spec.md's `{ERROR,WARNING,SUCCESS}`
/// triple: §4.7 (domain escalation) and §4.9 (gate health-issue) both call
/// for a dedicated critical notification, so the enum names what the rest
/// of the spec already assumes exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Error,
    Warning,
    Success,
    Critical,
}

impl NotificationSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationSeverity::Error => "error",
            NotificationSeverity::Warning => "warning",
            NotificationSeverity::Success => "success",
            NotificationSeverity::Critical => "critical",
        }
    }
}
