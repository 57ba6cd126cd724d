use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::App;
use actix_web::HttpServer;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_actix_web::TracingLogger;

use crate::configuration::DatabaseSettings;
use crate::configuration::Settings;
use crate::routes;
use crate::services::Services;

/// Wrapper for actix's `Server` with access to the bound port and the
/// `Services` context handed to every route and background worker.
pub struct Application {
    port: u16,
    server: Server,
    services: Arc<Services>,
}

impl Application {
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        let port = listener.local_addr()?.port();

        let pool = get_connection_pool(&cfg.database);
        let http_client = reqwest::Client::new();
        let services = Arc::new(Services::new(pool, &cfg, http_client));

        let server = run(listener, services.clone())?;

        Ok(Self { port, server, services })
    }

    pub fn get_port(&self) -> u16 { self.port }

    pub fn services(&self) -> Arc<Services> { self.services.clone() }

    /// Because this consumes `self`, this should be the final function call
    /// (or passed to `tokio::spawn`).
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

pub fn get_connection_pool(db_cfg: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new().connect_lazy_with(db_cfg.connection())
}

/// Declares the engine's external interface (§6): health check, inbound
/// webhook ingestion, the SSE sync-progress feed, and the `/admin/*`
/// operational RPCs. No session/auth/template machinery — the end-user
/// REST surface those would support is explicitly out of this core's scope.
pub fn run(listener: TcpListener, services: Arc<Services>) -> Result<Server, anyhow::Error> {
    let services = web::Data::from(services);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(routes::health_check))
            .route("/webhooks/ingest", web::post().to(routes::webhook_ingest))
            .route("/sync-progress/{session_id}", web::get().to(routes::sync_progress))
            .service(
                web::scope("/admin")
                    .route("/dlq/list", web::post().to(routes::dlq_list))
                    .route("/dlq/retry", web::post().to(routes::dlq_retry))
                    .route("/dlq/retryAll", web::post().to(routes::dlq_retry_all))
                    .route("/replay/dryRun", web::post().to(routes::replay_dry_run))
                    .route("/replay/live", web::post().to(routes::replay_live))
                    .route("/assessment/run", web::post().to(routes::assessment_run))
                    .route("/sync/trigger", web::post().to(routes::sync_trigger)),
            )
            .app_data(services.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
