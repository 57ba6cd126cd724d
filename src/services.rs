//! The "global singletons, but explicit" redesign flag from §9: every route
//! handler and worker receives one `Services` value rather than reaching for
//! ambient statics. Built once in `startup::build` and handed to `actix-web`
//! as `web::Data<Services>`, and constructed directly (without an HTTP
//! server around it) by worker init functions and tests.

use std::sync::Arc;

use sqlx::PgPool;

use crate::adapters::CircuitBreakerRegistry;
use crate::adapters::PlatformAdapter;
use crate::adapters::RateLimiter;
use crate::configuration::Settings;
use crate::configuration::Thresholds;
use crate::sync::ProgressRegistry;

pub struct Services {
    pub pool: PgPool,
    pub thresholds: Thresholds,
    /// Resolved platform adapters, keyed by `PlatformSettings::name`. Empty
    /// in any deployment that hasn't configured a sending platform yet —
    /// callers fall back to `NullAdapter` rather than special-casing "no
    /// adapter configured" at every call site (§4.7's best-effort removal,
    /// §4.10's sync driver).
    pub adapters: Vec<Arc<dyn PlatformAdapter>>,
    pub circuit_breakers: Arc<CircuitBreakerRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub http_client: reqwest::Client,
    pub sync_progress: Arc<ProgressRegistry>,
}

impl Services {
    pub fn new(pool: PgPool, cfg: &Settings, http_client: reqwest::Client) -> Self {
        let adapters: Vec<Arc<dyn PlatformAdapter>> = cfg
            .platforms
            .iter()
            .map(|p| {
                Arc::new(crate::adapters::platform_adapter::HttpPlatformAdapter {
                    name: p.name.clone(),
                    base_url: p.base_url.clone(),
                    api_key: p.api_key.clone(),
                    client: http_client.clone(),
                }) as Arc<dyn PlatformAdapter>
            })
            .collect();

        Self {
            pool,
            thresholds: cfg.thresholds,
            adapters,
            circuit_breakers: Arc::new(CircuitBreakerRegistry::new()),
            rate_limiter: Arc::new(RateLimiter::new(cfg.thresholds.queue_rate_per_sec)),
            http_client,
            sync_progress: Arc::new(ProgressRegistry::new()),
        }
    }

    /// The adapter best-effort calls go through. Picks the first configured
    /// platform; a deployment with more than one concurrently active
    /// sending platform is out of this crate's scope (§1 — concrete
    /// adapters are a contract, not a router between them).
    pub fn adapter(&self) -> Arc<dyn PlatformAdapter> {
        self.adapters
            .first()
            .cloned()
            .unwrap_or_else(|| Arc::new(crate::adapters::NullAdapter))
    }
}
