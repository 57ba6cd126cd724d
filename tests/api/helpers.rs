use std::sync::Arc;

use once_cell::sync::Lazy;
use sqlx::Connection;
use sqlx::Executor;
use sqlx::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

use deliverability_engine::configuration::get_configuration;
use deliverability_engine::configuration::DatabaseSettings;
use deliverability_engine::queue;
use deliverability_engine::services::Services;
use deliverability_engine::startup::get_connection_pool;
use deliverability_engine::startup::Application;
use deliverability_engine::telemetry::get_subscriber;
use deliverability_engine::telemetry::init_subscriber;

/// Init a static subscriber using the `once_cell` crate; alternatives include
/// `std::cell:OnceCell` and `lazy_static` (crate).
///
/// To opt in to verbose logging, use the env var `TEST_LOG`:
///
/// ```sh
///      TEST_LOG=true cargo test [test_name] | bunyan
/// ```
static TRACING: Lazy<()> = Lazy::new(|| {
    match std::env::var("TEST_LOG") {
        Ok(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::stdout);
            init_subscriber(subscriber);
        }
        Err(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::sink);
            init_subscriber(subscriber);
        }
    };
});

pub struct TestApp {
    pub addr: String,
    pub port: u16,
    pub pool: PgPool,
    pub services: Arc<Services>,
}

impl TestApp {
    pub async fn post_webhook(
        &self,
        organization_id: Uuid,
        body: serde_json::Value,
        signature: Option<String>,
    ) -> reqwest::Response {
        let mut request = reqwest::Client::new()
            .post(format!("{}/webhooks/ingest", self.addr))
            .header("X-Organization-ID", organization_id.to_string())
            .json(&body);
        if let Some(signature) = signature {
            request = request.header("X-Webhook-Signature", signature);
        }
        request.send().await.unwrap()
    }

    pub async fn get_sync_progress(&self, session_id: Uuid) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("{}/sync-progress/{}", self.addr, session_id))
            .send()
            .await
            .unwrap()
    }

    pub async fn post_admin(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/admin/{}", self.addr, path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Seeds an organization with a random name, returning its id. Passing a
    /// `webhook_secret` exercises the signed-webhook path; `None` exercises
    /// the default unsigned one (§6).
    pub async fn create_organization(&self, webhook_secret: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query!(
            "INSERT INTO organizations (id, name, webhook_secret) VALUES ($1, $2, $3)",
            id,
            Uuid::new_v4().to_string(),
            webhook_secret,
        )
        .execute(&self.pool)
        .await
        .unwrap();
        id
    }

    pub async fn create_domain(&self, organization_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query!(
            "INSERT INTO domains (id, organization_id, name) VALUES ($1, $2, $3)",
            id,
            organization_id,
            format!("{}.test", Uuid::new_v4()),
        )
        .execute(&self.pool)
        .await
        .unwrap();
        id
    }

    pub async fn create_mailbox(&self, organization_id: Uuid, domain_id: Uuid, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query!(
            "INSERT INTO mailboxes (id, organization_id, domain_id, email) VALUES ($1, $2, $3, $4)",
            id,
            organization_id,
            domain_id,
            email,
        )
        .execute(&self.pool)
        .await
        .unwrap();
        id
    }

    pub async fn create_campaign(&self, organization_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query!(
            "INSERT INTO campaigns (id, organization_id, name) VALUES ($1, $2, $3)",
            id,
            organization_id,
            format!("campaign-{id}"),
        )
        .execute(&self.pool)
        .await
        .unwrap();
        id
    }

    pub async fn attach_mailbox_to_campaign(&self, campaign_id: Uuid, mailbox_id: Uuid) {
        sqlx::query!(
            "INSERT INTO campaign_mailboxes (campaign_id, mailbox_id) VALUES ($1, $2)",
            campaign_id,
            mailbox_id,
        )
        .execute(&self.pool)
        .await
        .unwrap();
    }

    pub async fn create_lead(&self, organization_id: Uuid, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query!(
            "INSERT INTO leads (id, organization_id, email) VALUES ($1, $2, $3)",
            id,
            organization_id,
            email,
        )
        .execute(&self.pool)
        .await
        .unwrap();
        id
    }

    pub async fn set_system_mode(&self, organization_id: Uuid, mode: &str) {
        sqlx::query!(
            "UPDATE organizations SET system_mode = $2 WHERE id = $1",
            organization_id,
            mode,
        )
        .execute(&self.pool)
        .await
        .unwrap();
    }

    pub async fn complete_assessment(&self, organization_id: Uuid) {
        sqlx::query!(
            "UPDATE organizations SET assessment_completed = true WHERE id = $1",
            organization_id,
        )
        .execute(&self.pool)
        .await
        .unwrap();
    }

    /// Drives the durable work queue to empty synchronously, standing in for
    /// `queue::run_queue_worker`'s background loop (§4.2) so integration
    /// tests can assert on post-processing state without a race against a
    /// spawned worker task.
    pub async fn drain_queue(&self) {
        while queue::process_one(&self.services).await.unwrap() {}
    }
}

/// Read `DatabaseSettings` and create a db with a randomised name (but with the
/// same migrations/tables, specified in the `migrations` directory). The
/// connection to this db can then be used to run a single test.
async fn configure_database(cfg: &DatabaseSettings) -> PgPool {
    let mut conn = PgConnection::connect_with(&cfg.connection_without_db())
        .await
        .expect("postgres must be running; run scripts/init_db.sh");

    conn.execute(format!(r#"CREATE DATABASE "{}";"#, cfg.database_name).as_str())
        .await
        .unwrap();

    let pool = PgPool::connect_with(cfg.connection()).await.unwrap();
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("failed to migrate");
    pool
}

// must not be async! https://github.com/LukeMathWalker/zero-to-production/issues/242#issuecomment-1915933810
/// Spawn a `TestApp` containing default config, which can be used for testing;
/// part of the setup is handled by `startup::build`.
///
/// Returns the address to which the server was bound, in the form
/// `http://localhost:{port}`, plus a handle to the (randomised) postgres
/// database.
pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let cfg = {
        let mut rand_cfg = get_configuration().unwrap();
        rand_cfg.database.database_name = Uuid::new_v4().to_string();
        rand_cfg.application.port = 0;
        rand_cfg
    };

    let _pool = configure_database(&cfg.database).await;

    let app = Application::build(cfg.clone()).await.unwrap();
    let addr = format!("http://localhost:{}", app.get_port());
    let port = app.get_port();
    let services = app.services();

    let pool = get_connection_pool(&cfg.database);
    tokio::spawn(app.run_until_stopped());

    TestApp { addr, port, pool, services }
}
