//! Operational RPCs (§6): "the core exposes operational RPCs, not a CLI
//! itself." Plain async functions, each wrapped by a thin `/admin/*` POST
//! route in `routes::admin` — the split mirrors the teacher's own
//! separation between a route handler and the logic it calls into.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::EntityKind;
use crate::event_store;
use crate::event_store::ProjectedAction;
use crate::event_store::Projection;
use crate::model::DeadLetterJob;
use crate::services::Services;
use crate::sync::ProgressEvent;
use crate::sync::SessionId;

pub async fn dlq_list(services: &Services) -> Result<Vec<DeadLetterJob>, anyhow::Error> {
    Ok(crate::store::dead_letter::list(&services.pool).await?)
}

/// Re-enqueue one dead-lettered job for another attempt, resetting its
/// retry counter on `raw_events` back to zero.
pub async fn dlq_retry(services: &Services, dead_letter_id: Uuid) -> Result<bool, anyhow::Error> {
    let Some(job) = crate::store::dead_letter::get(&services.pool, dead_letter_id).await? else {
        return Ok(false);
    };
    crate::store::queue::enqueue(&services.pool, &job.job_key, job.event_id, chrono::Utc::now()).await?;
    crate::store::raw_events::reset_retry(&services.pool, job.event_id).await?;
    crate::store::dead_letter::remove(&services.pool, dead_letter_id).await?;
    Ok(true)
}

pub async fn dlq_retry_all(services: &Services) -> Result<u32, anyhow::Error> {
    let jobs = dlq_list(services).await?;
    let mut retried = 0;
    for job in jobs {
        if dlq_retry(services, job.id).await? {
            retried += 1;
        }
    }
    Ok(retried)
}

struct NoOpProjection;

#[async_trait::async_trait]
impl Projection for NoOpProjection {
    async fn apply_sent(&mut self, _mailbox_id: Uuid) {}
    async fn apply_bounce(&mut self, _mailbox_id: Uuid, _raw_reason: &str) {}
}

/// Replay the stored events for one entity without touching production
/// state — the dry-run half of §8's replay-equivalence property, exposed
/// as an RPC for operator tooling.
pub async fn replay_dry_run(
    services: &Services,
    entity_type: EntityKind,
    entity_id: Uuid,
    from: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Vec<ProjectedAction>, anyhow::Error> {
    let mut projection = NoOpProjection;
    Ok(event_store::replay_into_projection(&services.pool, entity_type, entity_id, from, &mut projection).await?)
}

/// Re-dispatch an entity's stored event log against the real store.
/// Mailbox-only: `record_sent`/`record_bounce` are the only live handlers
/// this engine's replay can meaningfully re-run, per §4.1.
pub async fn replay_live(
    services: &Services,
    entity_id: Uuid,
    from: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<u32, anyhow::Error> {
    let events = crate::store::raw_events::for_replay(&services.pool, EntityKind::Mailbox, entity_id, from).await?;
    let mailbox = crate::store::mailboxes::get(&services.pool, entity_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("mailbox {entity_id} not found"))?;

    let mut replayed = 0;
    for event in events {
        match crate::domain::EventType::parse(&event.event_type) {
            crate::domain::EventType::Known(crate::domain::KnownEventType::EmailSent) => {
                crate::monitor::record_sent(services, &mailbox).await?;
                replayed += 1;
            }
            crate::domain::EventType::Known(
                crate::domain::KnownEventType::HardBounce | crate::domain::KnownEventType::Bounce,
            ) => {
                let smtp_response = event.payload.get("smtp_response").and_then(|v| v.as_str()).unwrap_or("");
                let recipient = event.payload.get("recipient").and_then(|v| v.as_str());
                let classification = crate::classifier::classify(smtp_response, recipient);
                let campaign_id = event
                    .payload
                    .get("campaign_id")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok());
                crate::monitor::record_bounce(services, &mailbox, &classification, campaign_id).await?;
                replayed += 1;
            }
            _ => {}
        }
    }
    Ok(replayed)
}

/// Kick off an on-demand platform sync for one organization and return a
/// session id the caller can watch via `routes::sse::sync_progress`. The
/// periodic driver in `workers::sync_worker` runs independently of this —
/// this is the operator-triggered, progress-observable counterpart (§6).
pub fn trigger_sync_with_progress(services: Arc<Services>, organization_id: Uuid) -> SessionId {
    let session_id = Uuid::new_v4();
    services.sync_progress.register(session_id);
    tokio::spawn(async move {
        for adapter in &services.adapters {
            let outcome = adapter.sync(organization_id).await;
            let event = match outcome {
                Ok(report) => ProgressEvent {
                    organization_id,
                    adapter: adapter.name().to_string(),
                    leads_synced: report.leads_synced,
                    bounces_ingested: report.bounces_ingested,
                    done: false,
                },
                Err(e) => {
                    tracing::warn!(adapter = adapter.name(), error = %e, "on-demand sync failed");
                    ProgressEvent {
                        organization_id,
                        adapter: adapter.name().to_string(),
                        leads_synced: 0,
                        bounces_ingested: 0,
                        done: false,
                    }
                }
            };
            services.sync_progress.publish(session_id, event);
        }
        services.sync_progress.publish(
            session_id,
            ProgressEvent {
                organization_id,
                adapter: "*".to_string(),
                leads_synced: 0,
                bounces_ingested: 0,
                done: true,
            },
        );
    });
    session_id
}

/// `assessment.run`: marks an organization's infrastructure assessment
/// complete, unlocking the execution gate's first check (§4.9 step 1).
pub async fn assessment_run(services: &Services, organization_id: Uuid) -> Result<(), anyhow::Error> {
    crate::store::organizations::set_assessment_completed(&services.pool, organization_id, true).await?;
    crate::store::audit::insert_standalone(
        &services.pool,
        organization_id,
        EntityKind::Organization,
        organization_id,
        "assessment_completed",
        serde_json::json!({}),
    )
    .await?;
    Ok(())
}
