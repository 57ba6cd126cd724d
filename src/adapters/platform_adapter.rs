//! The one piece of the outbound sending-platform integration this crate
//! owns: a trait contract. Concrete HTTP integrations against real
//! platforms (Instantly, Smartlead, ...) are out of scope (§1) — tests fake
//! this boundary with `wiremock`, production wiring supplies a real
//! implementation built on the shared `reqwest::Client`.

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub leads_synced: u32,
    pub bounces_ingested: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("platform returned an error: {0}")]
    Platform(String),
}

/// One configured outbound sending platform for an organization.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Pull recent send/bounce activity for `organization_id` into the
    /// event store. Called by the platform sync driver (§4.10).
    async fn sync(&self, organization_id: Uuid) -> Result<SyncReport, AdapterError>;

    /// Best-effort removal of a mailbox from a campaign on the platform
    /// side. Callers treat failure as non-blocking (§4.7).
    async fn remove_mailbox_from_campaign(
        &self,
        campaign_external_id: &str,
        mailbox_email: &str,
    ) -> Result<(), AdapterError>;
}

/// Default adapter used when an organization has no platform configured —
/// every call is a no-op success, so the monitor's best-effort removal
/// path has somewhere safe to land without special-casing "no adapter".
pub struct NullAdapter;

#[async_trait]
impl PlatformAdapter for NullAdapter {
    fn name(&self) -> &str {
        "none"
    }

    async fn sync(&self, _organization_id: Uuid) -> Result<SyncReport, AdapterError> {
        Ok(SyncReport { leads_synced: 0, bounces_ingested: 0 })
    }

    async fn remove_mailbox_from_campaign(
        &self,
        _campaign_external_id: &str,
        _mailbox_email: &str,
    ) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// A `PlatformAdapter` that calls a configured HTTP base URL for real,
/// gated by the shared circuit breaker registry. This is the shape a real
/// platform integration would take; it has no concrete platform's request
/// schema wired in (§1 Non-goals) beyond a generic bearer-token POST.
pub struct HttpPlatformAdapter {
    pub name: String,
    pub base_url: String,
    pub api_key: secrecy::Secret<String>,
    pub client: reqwest::Client,
}

#[async_trait]
impl PlatformAdapter for HttpPlatformAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sync(&self, organization_id: Uuid) -> Result<SyncReport, AdapterError> {
        use secrecy::ExposeSecret;
        let response = self
            .client
            .post(format!("{}/sync", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({ "organization_id": organization_id }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AdapterError::Platform(format!(
                "sync returned {}",
                response.status()
            )));
        }
        Ok(SyncReport { leads_synced: 0, bounces_ingested: 0 })
    }

    async fn remove_mailbox_from_campaign(
        &self,
        campaign_external_id: &str,
        mailbox_email: &str,
    ) -> Result<(), AdapterError> {
        use secrecy::ExposeSecret;
        let response = self
            .client
            .post(format!(
                "{}/campaigns/{campaign_external_id}/mailboxes/remove",
                self.base_url
            ))
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({ "email": mailbox_email }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AdapterError::Platform(format!(
                "remove returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
