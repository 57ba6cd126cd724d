//! Black-box coverage of §8's concrete scenarios, driven entirely through
//! `POST /webhooks/ingest` plus `TestApp::drain_queue` (the queue is durable
//! and processed by a background worker in production; tests drive it
//! synchronously instead of racing a spawned task).

use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use uuid::Uuid;

use deliverability_engine::domain::HealthState;

use crate::helpers::spawn_app;

fn bounce_event(email_account_id: &str, bounce_reason: &str) -> serde_json::Value {
    serde_json::json!({
        "id": Uuid::new_v4().to_string(),
        "event_type": "HARD_BOUNCE",
        "email_account_id": email_account_id,
        "smtp_response": bounce_reason,
    })
}

fn sent_event(email_account_id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": Uuid::new_v4().to_string(),
        "event_type": "EMAIL_SENT",
        "email_account_id": email_account_id,
    })
}

/// Scenario 1: 5 hard bounces pause the mailbox, stamp a ~1h cooldown,
/// bump `consecutive_pauses` to 1, drop resilience to 35, and leave exactly
/// one `healthy -> paused` transition row.
#[tokio::test]
async fn five_hard_bounces_pause_the_mailbox() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;
    let domain_id = app.create_domain(org_id).await;
    let email = "m1@example.com";
    let mailbox_id = app.create_mailbox(org_id, domain_id, email).await;
    app.complete_assessment(org_id).await;

    for _ in 0..5 {
        let resp = app
            .post_webhook(org_id, bounce_event(email, "550 5.1.1 user unknown"), None)
            .await;
        assert!(resp.status().is_success());
    }
    app.drain_queue().await;

    let mailbox = deliverability_engine::store::mailboxes::get(&app.pool, mailbox_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mailbox.status, HealthState::Paused);
    assert_eq!(mailbox.consecutive_pauses, 1);
    assert_eq!(mailbox.resilience_score, 35);
    let cooldown = mailbox.cooldown_until.expect("cooldown must be set on pause");
    let expected = chrono::Utc::now() + chrono::Duration::hours(1);
    assert!((cooldown - expected).num_seconds().abs() < 30);

    let transitions = sqlx::query!(
        "SELECT from_state, to_state FROM state_transitions WHERE entity_id = $1 ORDER BY created_at",
        mailbox_id
    )
    .fetch_all(&app.pool)
    .await
    .unwrap();
    let pause_rows: Vec<_> = transitions
        .iter()
        .filter(|r| r.from_state == "healthy" && r.to_state == "paused")
        .collect();
    assert_eq!(pause_rows.len(), 1);
}

/// Scenario 2: 60 sends with 3 bounces interleaved produce a `warning`,
/// never a pause, and no cooldown or resilience penalty.
#[tokio::test]
async fn three_bounces_in_sixty_sends_only_warn() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;
    let domain_id = app.create_domain(org_id).await;
    let email = "m2@example.com";
    let mailbox_id = app.create_mailbox(org_id, domain_id, email).await;
    app.complete_assessment(org_id).await;

    for i in 0..60 {
        if i == 10 || i == 20 || i == 30 {
            app.post_webhook(org_id, bounce_event(email, "550 5.1.1 user unknown"), None).await;
        } else {
            app.post_webhook(org_id, sent_event(email), None).await;
        }
    }
    app.drain_queue().await;

    let mailbox = deliverability_engine::store::mailboxes::get(&app.pool, mailbox_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mailbox.status, HealthState::Warning);
    assert!(mailbox.cooldown_until.is_none());
    assert_eq!(mailbox.resilience_score, 50);
}

/// Scenario 3: a transient throttle bounce never touches counters or
/// status, and is logged as `transient_bounce`.
#[tokio::test]
async fn throttle_bounce_is_transient_and_logged_only() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;
    let domain_id = app.create_domain(org_id).await;
    let email = "m3@example.com";
    let mailbox_id = app.create_mailbox(org_id, domain_id, email).await;
    app.complete_assessment(org_id).await;

    app.post_webhook(org_id, bounce_event(email, "421 4.7.0 try again later"), None).await;
    app.drain_queue().await;

    let mailbox = deliverability_engine::store::mailboxes::get(&app.pool, mailbox_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mailbox.status, HealthState::Healthy);
    assert_eq!(mailbox.window_bounce_count, 0);

    let audit_rows = sqlx::query!(
        "SELECT action FROM audit_log WHERE entity_id = $1 AND action = 'transient_bounce'",
        mailbox_id
    )
    .fetch_all(&app.pool)
    .await
    .unwrap();
    assert_eq!(audit_rows.len(), 1);
}

/// §6: the envelope may be `{events:[...]}`, a bare array, or a single
/// object, and ingestion always answers 200 with a processed count.
#[tokio::test]
async fn accepts_all_three_envelope_shapes() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;
    let domain_id = app.create_domain(org_id).await;
    let email = "m4@example.com";
    app.create_mailbox(org_id, domain_id, email).await;

    let single = sent_event(email);
    let resp = app.post_webhook(org_id, single, None).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["processed"], 1);

    let bare_array = serde_json::json!([sent_event(email), sent_event(email)]);
    let resp = app.post_webhook(org_id, bare_array, None).await;
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["processed"], 2);

    let enveloped = serde_json::json!({ "events": [sent_event(email)] });
    let resp = app.post_webhook(org_id, enveloped, None).await;
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["processed"], 1);
}

/// A malformed or unrecognized-mailbox event is logged and dropped, not
/// rejected — the endpoint still answers 200 (§6, §7).
#[tokio::test]
async fn unknown_mailbox_is_dropped_not_rejected() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;

    let resp = app.post_webhook(org_id, sent_event("ghost@example.com"), None).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["processed"], 0);
}

/// §6: when an organization has a `webhook_secret`, an HMAC-SHA256 mismatch
/// is rejected with 401 — the one case that isn't a silent drop.
#[tokio::test]
async fn mismatched_signature_is_rejected() {
    let app = spawn_app().await;
    let org_id = app.create_organization(Some("top-secret")).await;

    let resp = app
        .post_webhook(org_id, sent_event("whoever@example.com"), Some("deadbeef".to_string()))
        .await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn matching_signature_is_accepted() {
    let app = spawn_app().await;
    let org_id = app.create_organization(Some("top-secret")).await;
    let domain_id = app.create_domain(org_id).await;
    let email = "m5@example.com";
    app.create_mailbox(org_id, domain_id, email).await;

    let body = sent_event(email);
    let raw = serde_json::to_vec(&body).unwrap();
    let mut mac = Hmac::<Sha256>::new_from_slice(b"top-secret").unwrap();
    mac.update(&raw);
    let signature = hex::encode(mac.finalize().into_bytes());

    let resp = app.post_webhook(org_id, body, Some(signature)).await;
    assert!(resp.status().is_success());
}

/// Idempotency (§4.1, §8): re-ingesting the same external id is a no-op —
/// the second post does not double-increment the mailbox's send counter.
#[tokio::test]
async fn duplicate_idempotency_key_is_not_double_applied() {
    let app = spawn_app().await;
    let org_id = app.create_organization(None).await;
    let domain_id = app.create_domain(org_id).await;
    let email = "m6@example.com";
    let mailbox_id = app.create_mailbox(org_id, domain_id, email).await;
    app.complete_assessment(org_id).await;

    let event = sent_event(email);
    app.post_webhook(org_id, event.clone(), None).await;
    app.post_webhook(org_id, event, None).await;
    app.drain_queue().await;

    let mailbox = deliverability_engine::store::mailboxes::get(&app.pool, mailbox_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mailbox.window_sent_count, 1);
}
