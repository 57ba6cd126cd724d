use config::Config;
use config::ConfigError;
use config::File;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::postgres::PgConnectOptions;
use sqlx::postgres::PgSslMode;
use sqlx::ConnectOptions;

/// Top-level server configuration. Loaded from `configuration/base.yaml`,
/// layered with `configuration/{environment}.yaml`, and finally overridden
/// by `APP__`-prefixed environment variables (e.g.
/// `APP__THRESHOLDS__MAILBOX_PAUSE_BOUNCES=7`).
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    /// Absent means the queue falls back to inline execution and the rate
    /// limiter falls back to an in-process token bucket (§6).
    pub redis_uri: Option<Secret<String>>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub platforms: Vec<PlatformSettings>,
}

#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub base_url: String,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default)]
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn connection(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        self.connection_without_db()
            .database(&self.database_name)
            .log_statements(tracing::log::LevelFilter::Trace)
            .ssl_mode(ssl_mode)
    }

    pub fn connection_without_db(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
    }
}

/// Named thresholds from §4/§7 of the specification. Every field carries
/// the literal default given there; all are overridable so an operator can
/// tune a tenant's aggressiveness without a redeploy.
#[derive(Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Thresholds {
    pub mailbox_pause_bounces: i32,
    pub mailbox_warning_bounces: i32,
    pub mailbox_warning_window: i32,
    pub domain_minimum_mailboxes: i32,
    pub rolling_window_size: i32,
    pub cooldown_min_secs: i64,
    pub cooldown_max_secs: i64,
    pub cooldown_multiplier: f64,
    pub hard_risk_critical: f64,
    pub domain_daily_cap: i64,
    pub org_daily_cap: i64,
    pub queue_max_attempts: i32,
    pub queue_concurrency: usize,
    pub queue_rate_per_sec: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            mailbox_pause_bounces: 5,
            mailbox_warning_bounces: 3,
            mailbox_warning_window: 60,
            domain_minimum_mailboxes: 3,
            rolling_window_size: 100,
            cooldown_min_secs: 3600,
            cooldown_max_secs: 16 * 3600,
            cooldown_multiplier: 2.0,
            hard_risk_critical: 60.0,
            domain_daily_cap: 30,
            org_daily_cap: 100,
            queue_max_attempts: 3,
            queue_concurrency: 5,
            queue_rate_per_sec: 50,
        }
    }
}

/// Contract-only reference to an outbound sending platform; the concrete
/// HTTP integration is out of scope (§1) — only enough configuration to
/// identify and rate-limit it lives here.
#[derive(Deserialize, Clone)]
pub struct PlatformSettings {
    pub name: String,
    pub base_url: String,
    pub api_key: Secret<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Local,
    Production,
}

impl AppEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnvironment::Local => "local",
            AppEnvironment::Production => "production",
        }
    }
}

impl TryFrom<String> for AppEnvironment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local` or `production`."
            )),
        }
    }
}

/// Load layered configuration: `base.yaml` (mandatory defaults), an
/// environment-specific overlay, then `APP__`-prefixed env vars, in that
/// order of increasing precedence.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let base_path = std::env::current_dir().expect("failed to determine current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: AppEnvironment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("failed to parse APP_ENVIRONMENT");
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = Config::builder()
        .add_source(File::from(configuration_directory.join("base.yaml")))
        .add_source(File::from(configuration_directory.join(environment_filename)))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}
