//! Work Queue dispatch (component B). `store::queue` owns the durable
//! table; this module owns the backoff schedule, the event-type routing
//! table, and the bounded-concurrency worker loop, generalizing
//! `delivery::worker_loop`'s shape to a generic job envelope.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::classifier;
use crate::domain::EventType;
use crate::domain::KnownEventType;
use crate::monitor;
use crate::services::Services;
use crate::store;

pub const BACKOFF_SCHEDULE: [u64; 3] = [5, 30, 120];

/// Delay before attempt `attempt` (1-indexed) is retried. Attempts beyond the
/// schedule's length reuse the last entry rather than panicking.
pub fn backoff_for(attempt: i32) -> Duration {
    let idx = (attempt.max(1) as usize - 1).min(BACKOFF_SCHEDULE.len() - 1);
    Duration::from_secs(BACKOFF_SCHEDULE[idx])
}

/// Enqueue the work item for a just-stored event. If the pool can't be
/// acquired right now (connection exhaustion), the handler runs inline on
/// the calling task instead of being queued — the sync fallback named in §6.
pub async fn enqueue(services: &Services, event_id: Uuid) -> Result<(), anyhow::Error> {
    let job_key = format!("event:{event_id}");
    match services.pool.acquire().await {
        Ok(_conn) => {
            store::queue::enqueue(&services.pool, &job_key, event_id, Utc::now()).await?;
            Ok(())
        }
        Err(_) => {
            tracing::warn!(%event_id, "pool unavailable, running handler inline");
            dispatch(services, event_id).await
        }
    }
}

/// Route one stored event to its handler by `event_type` (§4.2). Unknown
/// event types are logged and treated as a no-op success — they are not a
/// processing failure, just nothing this engine models.
pub async fn dispatch(services: &Services, event_id: Uuid) -> Result<(), anyhow::Error> {
    let event = store::raw_events::get(&services.pool, event_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("event {event_id} not found"))?;

    match EventType::parse(&event.event_type) {
        EventType::Known(KnownEventType::EmailSent) => {
            handle_sent(services, event.entity_id).await
        }
        EventType::Known(KnownEventType::HardBounce | KnownEventType::Bounce) => {
            let smtp_response = event
                .payload
                .get("smtp_response")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let recipient = event
                .payload
                .get("recipient")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let campaign_id = event
                .payload
                .get("campaign_id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok());
            handle_bounce(
                services,
                event.entity_id,
                &smtp_response,
                recipient.as_deref(),
                campaign_id,
            )
            .await
        }
        EventType::Known(KnownEventType::SpamComplaint) => {
            tracing::warn!(entity_id = %event.entity_id, "spam complaint recorded, no automatic action");
            Ok(())
        }
        EventType::Other(raw) => {
            tracing::info!(event_type = %raw, "unrecognized event type, ignored");
            Ok(())
        }
    }
}

async fn handle_sent(services: &Services, mailbox_id: Uuid) -> Result<(), anyhow::Error> {
    let mailbox = store::mailboxes::get(&services.pool, mailbox_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("mailbox {mailbox_id} not found"))?;
    monitor::record_sent(services, &mailbox).await?;
    Ok(())
}

async fn handle_bounce(
    services: &Services,
    mailbox_id: Uuid,
    smtp_response: &str,
    recipient: Option<&str>,
    campaign_id: Option<Uuid>,
) -> Result<(), anyhow::Error> {
    let mailbox = store::mailboxes::get(&services.pool, mailbox_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("mailbox {mailbox_id} not found"))?;
    let classification = classifier::classify(smtp_response, recipient);
    monitor::record_bounce(services, &mailbox, &classification, campaign_id).await?;
    Ok(())
}

/// Dequeue, dispatch, and settle one job: delete on success, reschedule with
/// backoff on failure below `queue_max_attempts`, otherwise move to the dead
/// letter queue and notify (§4.2).
pub async fn process_one(services: &Services) -> Result<bool, anyhow::Error> {
    let pool = &services.pool;
    let Some((tx, job)) = store::queue::dequeue(pool).await? else {
        return Ok(false);
    };

    match dispatch(services, job.event_id).await {
        Ok(()) => {
            store::raw_events::mark_processed(pool, job.event_id).await?;
            store::queue::delete(tx, job.id).await?;
        }
        Err(e) => {
            let next_attempt = job.attempts + 1;
            store::raw_events::mark_failed(pool, job.event_id, &e.to_string()).await?;
            if next_attempt >= services.thresholds.queue_max_attempts {
                store::queue::delete(tx, job.id).await?;
                store::dead_letter::insert(
                    pool,
                    job.event_id,
                    &job.job_key,
                    &e.to_string(),
                    next_attempt,
                )
                .await?;
                if let Some(event) = store::raw_events::get(pool, job.event_id).await? {
                    store::notifications::notify(
                        pool,
                        event.organization_id,
                        None,
                        crate::domain::NotificationSeverity::Error,
                        &format!("job {} exhausted retries: {e}", job.job_key),
                        Some(&format!("dlq:{}", job.job_key)),
                    )
                    .await?;
                }
            } else {
                let next_available_at = Utc::now() + chrono::Duration::from_std(backoff_for(next_attempt)).unwrap();
                store::queue::reschedule(tx, job.id, next_available_at).await?;
            }
        }
    }
    Ok(true)
}

/// Runs the bounded-concurrency queue loop until cancelled, mirroring
/// `delivery::worker_loop`'s tick-and-sleep shape. `concurrency` bounds
/// in-flight `process_one` calls via a semaphore; `rate_limiter` additionally
/// caps the total dequeue rate under the key `"queue"`.
pub async fn run_queue_worker(services: Arc<Services>) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(services.thresholds.queue_concurrency));
    loop {
        if !services.rate_limiter.try_acquire("queue") {
            tokio::time::sleep(Duration::from_millis(100)).await;
            continue;
        }
        let permit = semaphore.clone().acquire_owned().await;
        let Ok(permit) = permit else { break };
        let services = services.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match process_one(&services).await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(Duration::from_millis(250)).await,
                Err(e) => tracing::error!(error = %e, "queue job failed outside retry accounting"),
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_is_5_30_120() {
        assert_eq!(backoff_for(1), Duration::from_secs(5));
        assert_eq!(backoff_for(2), Duration::from_secs(30));
        assert_eq!(backoff_for(3), Duration::from_secs(120));
    }

    #[test]
    fn backoff_beyond_schedule_holds_at_last_entry() {
        assert_eq!(backoff_for(99), Duration::from_secs(120));
    }
}
