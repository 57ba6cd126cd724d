//! Entity rows for every table in `migrations/`. Kept as a flat module
//! (rather than one file per entity) since the structs themselves carry no
//! behavior — the component modules (`monitor`, `healing`, `gate`, ...) own
//! the logic that acts on them, per the teacher's own split between
//! `domain::NewSubscriber` (data) and `routes::subscriptions` (behavior).

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;
use uuid::Uuid;

use crate::domain::EntityKind;
use crate::domain::GateFailureType;
use crate::domain::HealthState;
use crate::domain::LeadState;
use crate::domain::NotificationSeverity;
use crate::domain::RecoveryPhase;
use crate::domain::SystemMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub system_mode: SystemMode,
    pub assessment_completed: bool,
    pub webhook_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields shared by `Domain` and `Mailbox` (§3's "same state and resilience
/// fields" note). Not a supertrait — the two entities are stored in separate
/// tables and transitioned by separate (but table-identical) state machines —
/// just a documentation grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub status: HealthState,
    pub recovery_phase: RecoveryPhase,
    pub consecutive_pauses: i32,
    pub resilience_score: i32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub phase_entered_at: Option<DateTime<Utc>>,
    pub clean_sends_since_phase: i32,
    pub warning_count: i32,
    pub last_pause_at: Option<DateTime<Utc>>,
    pub rehab_origin: bool,
    pub lifetime_sent: i64,
    pub lifetime_bounce: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub domain_id: Uuid,
    pub email: String,
    pub status: HealthState,
    pub recovery_phase: RecoveryPhase,
    pub consecutive_pauses: i32,
    pub resilience_score: i32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub phase_entered_at: Option<DateTime<Utc>>,
    pub clean_sends_since_phase: i32,
    pub warning_count: i32,
    pub last_pause_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub rehab_origin: bool,
    pub window_sent_count: i32,
    pub window_bounce_count: i32,
    pub window_start_at: DateTime<Utc>,
    pub hard_bounce_count: i64,
    pub total_sent_count: i64,
    /// Persisted as `text[]`; each entry is an `EmailProvider`'s
    /// `snake_case` rendering, decoded at the storage boundary
    /// (`crate::domain::EmailProvider`'s `sqlx::Type` impl covers scalars
    /// only, not arrays, so the set is kept as raw strings here).
    pub provider_restrictions: Vec<String>,
    pub smtp_status: bool,
    pub imap_status: bool,
    pub created_at: DateTime<Utc>,
}

impl Mailbox {
    pub fn has_provider_restriction(&self, provider: crate::domain::EmailProvider) -> bool {
        let needle = provider_to_text(provider);
        self.provider_restrictions.iter().any(|p| p == needle)
    }
}

pub fn provider_to_text(provider: crate::domain::EmailProvider) -> &'static str {
    use crate::domain::EmailProvider;
    match provider {
        EmailProvider::Gmail => "gmail",
        EmailProvider::Microsoft => "microsoft",
        EmailProvider::Yahoo => "yahoo",
        EmailProvider::Other => "other",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxMetrics {
    pub mailbox_id: Uuid,
    pub sent_1h: i32,
    pub bounce_1h: i32,
    pub failure_1h: i32,
    pub window_1h_start: DateTime<Utc>,
    pub sent_24h: i32,
    pub bounce_24h: i32,
    pub failure_24h: i32,
    pub window_24h_start: DateTime<Utc>,
    pub sent_7d: i32,
    pub bounce_7d: i32,
    pub failure_7d: i32,
    pub window_7d_start: DateTime<Utc>,
    pub risk_score: f64,
    pub velocity: f64,
    pub prev_bounce_rate: f64,
    pub prev_failure_rate: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub status: String,
    pub routing_rules: Json,
    pub sent_count: i64,
    pub bounce_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn is_active(&self) -> bool { self.status == "active" }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub persona: Option<String>,
    pub lead_score: i32,
    pub status: LeadState,
    pub assigned_campaign_id: Option<Uuid>,
    pub opens: i32,
    pub replies: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub event_type: String,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub payload: Json,
    pub idempotency_key: Option<String>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WorkQueueJob {
    pub id: Uuid,
    pub job_key: String,
    pub event_id: Uuid,
    pub attempts: i32,
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterJob {
    pub id: Uuid,
    pub event_id: Uuid,
    pub job_key: String,
    pub last_error: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransitionRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub from_state: String,
    pub to_state: String,
    pub reason: String,
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub action: String,
    pub detail: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub severity: NotificationSeverity,
    pub message: String,
    pub dedup_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_name: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
}

/// Non-persisted payload carried through the execution gate (§4.9).
#[derive(Debug, Clone, Serialize)]
pub struct GateResult {
    pub allowed: bool,
    pub checks: GateChecks,
    pub reason: String,
    pub risk_score: f64,
    pub recommendations: Vec<String>,
    pub failure_type: Option<GateFailureType>,
    pub retryable: bool,
    pub deferrable: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GateChecks {
    pub assessment_completed: bool,
    pub resilience_ok: bool,
    pub campaign_active: bool,
    pub healthy_mailbox_available: bool,
    pub below_capacity: bool,
    pub risk_acceptable: bool,
}
