//! Thin `/admin/*` POST wrappers over the operational RPCs in `crate::ops`
//! (§6: "the core exposes operational RPCs, not a CLI itself"). Each
//! handler does nothing but extract, call, and serialize — the logic lives
//! in `ops`.

use std::sync::Arc;

use actix_web::web;
use actix_web::HttpResponse;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::EntityKind;
use crate::ops;
use crate::services::Services;
use crate::utils::error_500;

pub async fn dlq_list(services: web::Data<Services>) -> Result<HttpResponse, actix_web::Error> {
    let jobs = ops::dlq_list(&services).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().json(jobs))
}

#[derive(Debug, Deserialize)]
pub struct DlqRetryRequest {
    pub dead_letter_id: Uuid,
}

#[derive(Debug, Serialize)]
struct DlqRetryResponse {
    retried: bool,
}

pub async fn dlq_retry(
    services: web::Data<Services>,
    request: web::Json<DlqRetryRequest>,
) -> Result<HttpResponse, actix_web::Error> {
    let retried = ops::dlq_retry(&services, request.dead_letter_id).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().json(DlqRetryResponse { retried }))
}

#[derive(Debug, Serialize)]
struct DlqRetryAllResponse {
    retried: u32,
}

pub async fn dlq_retry_all(services: web::Data<Services>) -> Result<HttpResponse, actix_web::Error> {
    let retried = ops::dlq_retry_all(&services).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().json(DlqRetryAllResponse { retried }))
}

#[derive(Debug, Deserialize)]
pub struct ReplayDryRunRequest {
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub from: Option<DateTime<Utc>>,
}

pub async fn replay_dry_run(
    services: web::Data<Services>,
    request: web::Json<ReplayDryRunRequest>,
) -> Result<HttpResponse, actix_web::Error> {
    let request = request.into_inner();
    let actions = ops::replay_dry_run(&services, request.entity_type, request.entity_id, request.from)
        .await
        .map_err(error_500)?;
    Ok(HttpResponse::Ok().json(actions))
}

#[derive(Debug, Deserialize)]
pub struct ReplayLiveRequest {
    pub entity_id: Uuid,
    pub from: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ReplayLiveResponse {
    replayed: u32,
}

pub async fn replay_live(
    services: web::Data<Services>,
    request: web::Json<ReplayLiveRequest>,
) -> Result<HttpResponse, actix_web::Error> {
    let request = request.into_inner();
    let replayed = ops::replay_live(&services, request.entity_id, request.from).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().json(ReplayLiveResponse { replayed }))
}

#[derive(Debug, Deserialize)]
pub struct AssessmentRunRequest {
    pub organization_id: Uuid,
}

pub async fn assessment_run(
    services: web::Data<Services>,
    request: web::Json<AssessmentRunRequest>,
) -> Result<HttpResponse, actix_web::Error> {
    ops::assessment_run(&services, request.organization_id).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().finish())
}

#[derive(Debug, Deserialize)]
pub struct SyncTriggerRequest {
    pub organization_id: Uuid,
}

#[derive(Debug, Serialize)]
struct SyncTriggerResponse {
    session_id: Uuid,
}

/// Kicks off an on-demand sync and hands back a session id the caller
/// watches at `GET /sync-progress/{sessionId}`.
pub async fn sync_trigger(
    services: web::Data<Services>,
    request: web::Json<SyncTriggerRequest>,
) -> HttpResponse {
    let services: Arc<Services> = services.into_inner();
    let session_id = ops::trigger_sync_with_progress(services, request.organization_id);
    HttpResponse::Ok().json(SyncTriggerResponse { session_id })
}
