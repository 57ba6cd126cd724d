use serde::Deserialize;
use serde::Serialize;

/// Tags a `RawEvent`, `StateTransition`, or `AuditLog` row to the entity
/// kind it concerns, so the same audit trail can cover mailboxes, domains,
/// and leads without a separate table per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Mailbox,
    Domain,
    Lead,
    Campaign,
    Organization,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Mailbox => "mailbox",
            EntityKind::Domain => "domain",
            EntityKind::Lead => "lead",
            EntityKind::Campaign => "campaign",
            EntityKind::Organization => "organization",
        }
    }
}
