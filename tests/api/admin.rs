//! Covers the `/admin/*` operational RPCs (§6) and, since the execution
//! gate is a synchronous library call rather than a route of its own
//! (§4.9), scenario 5 of §8 by calling `gate::can_execute_lead` directly
//! against the same `Services` the spawned app uses.

use uuid::Uuid;

use deliverability_engine::domain::SystemMode;
use deliverability_engine::gate;
use deliverability_engine::store;

use crate::helpers::spawn_app;

/// Scenario 5: in `observe` mode, with no healthy mailbox available, the
/// gate still reports `allowed=true`, the reason mentions observe mode, and
/// no mailbox/domain/lead state changes.
#[tokio::test]
async fn gate_under_observe_always_allows_and_never_mutates() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;
    app.complete_assessment(org_id).await;
    app.set_system_mode(org_id, "observe").await;

    let domain_id = app.create_domain(org_id).await;
    let mailbox_id = app.create_mailbox(org_id, domain_id, "sole@example.com").await;
    // Force the mailbox unhealthy so the "no healthy mailbox" branch fires.
    sqlx::query!("UPDATE mailboxes SET status = 'paused' WHERE id = $1", mailbox_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let campaign_id = app.create_campaign(org_id).await;
    app.attach_mailbox_to_campaign(campaign_id, mailbox_id).await;
    let lead_id = app.create_lead(org_id, "lead@example.com").await;

    let before = store::mailboxes::get(&app.pool, mailbox_id).await.unwrap().unwrap();

    let result = gate::can_execute_lead(&app.services, org_id, campaign_id, lead_id).await.unwrap();
    assert!(result.allowed);
    assert!(result.reason.contains("observe"));

    let after = store::mailboxes::get(&app.pool, mailbox_id).await.unwrap().unwrap();
    assert_eq!(before.status, after.status);

    let audit_rows = sqlx::query!(
        "SELECT action FROM audit_log WHERE entity_id = $1 AND (action = 'gate_passed_observe' OR action = 'gate_would_fail_observe')",
        lead_id
    )
    .fetch_all(&app.pool)
    .await
    .unwrap();
    assert_eq!(audit_rows.len(), 1);
}

/// Gate blocked under enforce with no healthy mailbox, distinguishing
/// `HEALTH_ISSUE` (mailboxes exist but none are usable) from `SYNC_ISSUE`
/// (assessment not yet complete).
#[tokio::test]
async fn gate_blocks_under_enforce_with_no_healthy_mailbox() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;
    app.complete_assessment(org_id).await;
    app.set_system_mode(org_id, "enforce").await;

    let domain_id = app.create_domain(org_id).await;
    let mailbox_id = app.create_mailbox(org_id, domain_id, "lonely@example.com").await;
    sqlx::query!("UPDATE mailboxes SET status = 'paused' WHERE id = $1", mailbox_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let campaign_id = app.create_campaign(org_id).await;
    app.attach_mailbox_to_campaign(campaign_id, mailbox_id).await;
    let lead_id = app.create_lead(org_id, "lead2@example.com").await;

    let result = gate::can_execute_lead(&app.services, org_id, campaign_id, lead_id).await.unwrap();
    assert!(!result.allowed);
    assert!(!result.checks.healthy_mailbox_available);
}

#[tokio::test]
async fn gate_blocks_before_assessment_completes() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;
    app.set_system_mode(org_id, "enforce").await;
    let campaign_id = app.create_campaign(org_id).await;
    let lead_id = app.create_lead(org_id, "lead3@example.com").await;

    let result = gate::can_execute_lead(&app.services, org_id, campaign_id, lead_id).await.unwrap();
    assert!(!result.allowed);
    assert_eq!(
        result.failure_type,
        Some(deliverability_engine::domain::GateFailureType::SyncIssue)
    );
}

#[tokio::test]
async fn assessment_run_unlocks_sync_issue_gate() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;

    let resp = app.post_admin("assessment/run", serde_json::json!({ "organization_id": org_id })).await;
    assert!(resp.status().is_success());

    let org = store::organizations::get(&app.pool, org_id).await.unwrap().unwrap();
    assert!(org.assessment_completed);
    assert_eq!(org.system_mode, SystemMode::Observe);
}

/// DLQ round-trip: a job that exhausts its retries lands in the dead
/// letter queue and can be retried back into the live queue via the admin
/// RPC (§4.2).
#[tokio::test]
async fn dlq_list_is_empty_until_a_job_exhausts_retries() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;

    let resp = app.post_admin("dlq/list", serde_json::json!({})).await;
    assert!(resp.status().is_success());
    let jobs: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(jobs.is_empty());

    // Force a failure: store an event referencing a mailbox that doesn't
    // exist, so every dispatch attempt errors, then drain past the max
    // attempt count.
    let ingested = deliverability_engine::event_store::store_event(
        &app.pool,
        org_id,
        "EMAIL_SENT",
        deliverability_engine::domain::EntityKind::Mailbox,
        Uuid::new_v4(),
        serde_json::json!({}),
        None,
    )
    .await
    .unwrap();
    deliverability_engine::queue::enqueue(&app.services, ingested.event_id).await.unwrap();

    for _ in 0..deliverability_engine::queue::BACKOFF_SCHEDULE.len() + 1 {
        sqlx::query!("UPDATE work_queue SET available_at = now() - interval '1 hour'")
            .execute(&app.pool)
            .await
            .unwrap();
        app.drain_queue().await;
    }

    let resp = app.post_admin("dlq/list", serde_json::json!({})).await;
    let jobs: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(jobs.len(), 1);
    let dead_letter_id = jobs[0]["id"].as_str().unwrap();

    let resp = app
        .post_admin("dlq/retry", serde_json::json!({ "dead_letter_id": dead_letter_id }))
        .await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["retried"], true);

    let resp = app.post_admin("dlq/list", serde_json::json!({})).await;
    let jobs: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn replay_dry_run_projects_without_mutating() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;
    let domain_id = app.create_domain(org_id).await;
    let mailbox_id = app.create_mailbox(org_id, domain_id, "replay@example.com").await;
    app.complete_assessment(org_id).await;

    app.post_webhook(
        org_id,
        serde_json::json!({ "event_type": "EMAIL_SENT", "email_account_id": "replay@example.com" }),
        None,
    )
    .await;
    app.drain_queue().await;

    let before = store::mailboxes::get(&app.pool, mailbox_id).await.unwrap().unwrap();

    let resp = app
        .post_admin(
            "replay/dryRun",
            serde_json::json!({ "entity_type": "mailbox", "entity_id": mailbox_id, "from": null }),
        )
        .await;
    assert!(resp.status().is_success());
    let actions: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(actions.len(), 1);

    let after = store::mailboxes::get(&app.pool, mailbox_id).await.unwrap().unwrap();
    assert_eq!(before.window_sent_count, after.window_sent_count);
}
