//! Inbound webhook ingestion (§6's **[ADD]**), generalizing the teacher's
//! `routes::subscriptions::subscribe` shape — extract, validate, persist,
//! always answer — to a dynamic multi-event payload instead of a single
//! form body.

use actix_web::web;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::EntityKind;
use crate::event_store;
use crate::queue;
use crate::services::Services;
use crate::store;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize)]
struct IngestResponse {
    success: bool,
    processed: u32,
}

/// One inbound event, in whatever shape the sending platform used. Every
/// field is optional at the wire level — a malformed event is logged and
/// dropped, never rejected (§6).
#[derive(Debug, Deserialize)]
struct InboundEvent {
    id: Option<String>,
    event_type: Option<String>,
    email_account_id: Option<String>,
    campaign_id: Option<String>,
    recipient_email: Option<String>,
    smtp_response: Option<String>,
    bounce_reason: Option<String>,
}

/// Accepts `{events: [...]}`, a bare array, or a single object — exactly
/// the three shapes named in §6.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InboundPayload {
    Enveloped { events: Vec<InboundEvent> },
    Many(Vec<InboundEvent>),
    One(InboundEvent),
}

impl InboundPayload {
    fn into_events(self) -> Vec<InboundEvent> {
        match self {
            InboundPayload::Enveloped { events } => events,
            InboundPayload::Many(events) => events,
            InboundPayload::One(event) => vec![event],
        }
    }
}

/// `POST /webhooks/ingest`. Always 200 OK except for a signature mismatch,
/// which is the one case the specification calls out as a genuine
/// rejection rather than a silent drop.
pub async fn ingest(req: HttpRequest, body: web::Bytes, services: web::Data<Services>) -> HttpResponse {
    let Some(organization_id) = organization_id_header(&req) else {
        tracing::warn!("webhook received with missing or invalid X-Organization-ID header, dropping");
        return HttpResponse::Ok().json(IngestResponse { success: true, processed: 0 });
    };

    let organization = match store::organizations::get(&services.pool, organization_id).await {
        Ok(Some(org)) => org,
        Ok(None) => {
            tracing::warn!(%organization_id, "webhook for unknown organization, dropping");
            return HttpResponse::Ok().json(IngestResponse { success: true, processed: 0 });
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to look up organization for webhook");
            return HttpResponse::Ok().json(IngestResponse { success: true, processed: 0 });
        }
    };

    if let Some(secret) = &organization.webhook_secret {
        if !signature_matches(&req, &body, secret) {
            tracing::warn!(%organization_id, "webhook signature mismatch");
            return HttpResponse::Unauthorized().finish();
        }
    }

    let payload: InboundPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "malformed webhook payload, dropping");
            return HttpResponse::Ok().json(IngestResponse { success: true, processed: 0 });
        }
    };

    let mut processed = 0;
    for event in payload.into_events() {
        if ingest_one(&services, organization_id, event).await {
            processed += 1;
        }
    }

    HttpResponse::Ok().json(IngestResponse { success: true, processed })
}

async fn ingest_one(services: &Services, organization_id: Uuid, event: InboundEvent) -> bool {
    let (Some(event_type), Some(email_account_id)) = (event.event_type.clone(), event.email_account_id.clone())
    else {
        tracing::debug!("webhook event missing event_type or email_account_id, dropping");
        return false;
    };

    let mailbox = match store::mailboxes::by_email(&services.pool, organization_id, &email_account_id).await {
        Ok(Some(mailbox)) => mailbox,
        Ok(None) => {
            tracing::debug!(email_account_id, "webhook event for unrecognized mailbox, dropping");
            return false;
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to resolve mailbox for webhook event");
            return false;
        }
    };

    let campaign_id = event.campaign_id.as_deref().and_then(|s| Uuid::parse_str(s).ok());
    let idempotency_key = event.id.as_deref().map(|id| format!("eb-{id}"));

    let payload: Json = serde_json::json!({
        "smtp_response": event.smtp_response.or(event.bounce_reason).unwrap_or_default(),
        "recipient": event.recipient_email,
        "campaign_id": campaign_id.map(|id| id.to_string()),
    });

    let ingested = match event_store::store_event(
        &services.pool,
        organization_id,
        &event_type,
        EntityKind::Mailbox,
        mailbox.id,
        payload,
        idempotency_key,
    )
    .await
    {
        Ok(ingested) => ingested,
        Err(e) => {
            tracing::error!(error = %e, "failed to store webhook event");
            return false;
        }
    };

    if ingested.is_new {
        if let Err(e) = queue::enqueue(services, ingested.event_id).await {
            tracing::error!(error = %e, "failed to enqueue webhook event");
            return false;
        }
    }
    true
}

fn organization_id_header(req: &HttpRequest) -> Option<Uuid> {
    req.headers()
        .get("X-Organization-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
}

/// HMAC-SHA256 of the raw body, hex-encoded, compared against
/// `X-Webhook-Signature`. Only invoked when the organization has a
/// `webhook_secret` configured — most sending-platform webhooks trust the
/// body and rely on `X-Organization-ID` alone (§6).
fn signature_matches(req: &HttpRequest, body: &[u8], secret: &str) -> bool {
    let Some(signature) = req
        .headers()
        .get("X-Webhook-Signature")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // `verify_slice` is constant-time; a plain string comparison would leak
    // the matching prefix length through timing.
    mac.verify_slice(&signature_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_and_enveloped_payloads_both_parse() {
        let enveloped: InboundPayload =
            serde_json::from_str(r#"{"events":[{"event_type":"EMAIL_SENT"}]}"#).unwrap();
        assert_eq!(enveloped.into_events().len(), 1);

        let bare_array: InboundPayload = serde_json::from_str(r#"[{"event_type":"EMAIL_SENT"}]"#).unwrap();
        assert_eq!(bare_array.into_events().len(), 1);

        let single: InboundPayload = serde_json::from_str(r#"{"event_type":"EMAIL_SENT"}"#).unwrap();
        assert_eq!(single.into_events().len(), 1);
    }
}
