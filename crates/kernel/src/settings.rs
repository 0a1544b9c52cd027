use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde::Deserialize;

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "SHELF_ENV";
const CONFIG_DIR_ENV: &str = "SHELF_CONFIG_DIR";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!(
                "unsupported environment '{}'; expected local/staging/production",
                other
            )),
        }
    }
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub events: EventSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, and environment overlay.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            // Default to repo root `config` directory.
            Err(_) => std::env::current_dir()
                .with_context(|| "unable to resolve current directory")?
                .join("config"),
        };

        Self::load_from(config_dir)
    }

    /// Load configuration from an explicit config directory.
    pub fn load_from(config_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let config_dir = config_dir.into();
        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let parsed_environment: Environment = environment.parse()?;

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix("SHELF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // The environment variable wins over whatever the files declare.
        settings.environment = parsed_environment;

        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }

    /// `host:port` pair the listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "DatabaseSettings::default_url")]
    pub url: String,
    #[serde(default = "DatabaseSettings::default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    fn default_url() -> String {
        "sqlite://shelf.db?mode=rwc".to_string()
    }

    fn default_max_connections() -> u32 {
        5
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            max_connections: Self::default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub prometheus_bind: Option<String>,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "TelemetrySettings::default_log_level")]
    pub log_level: String,
}

impl TelemetrySettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            prometheus_bind: Some("127.0.0.1:9000".to_string()),
            log_format: LogFormat::Pretty,
            log_level: Self::default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Single in-memory user guarding every non-public route.
#[derive(Clone, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "AuthSettings::default_enabled")]
    pub enabled: bool,
    #[serde(default = "AuthSettings::default_username")]
    pub username: String,
    #[serde(default = "AuthSettings::default_password")]
    pub password: String,
}

impl AuthSettings {
    fn default_enabled() -> bool {
        true
    }

    fn default_username() -> String {
        "librarian".to_string()
    }

    fn default_password() -> String {
        "changeme".to_string()
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            username: Self::default_username(),
            password: Self::default_password(),
        }
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("enabled", &self.enabled)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSettings {
    #[serde(default = "EventSettings::default_enabled")]
    pub enabled: bool,
    #[serde(default = "EventSettings::default_topic")]
    pub topic: String,
    #[serde(default = "EventSettings::default_capacity")]
    pub capacity: usize,
}

impl EventSettings {
    fn default_enabled() -> bool {
        true
    }

    fn default_topic() -> String {
        "book-notification".to_string()
    }

    fn default_capacity() -> usize {
        256
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            topic: Self::default_topic(),
            capacity: Self::default_capacity(),
        }
    }
}

/// External book-metadata API and the resilience policy wrapped around it.
#[derive(Clone, Deserialize)]
pub struct CatalogSettings {
    #[serde(default = "CatalogSettings::default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout of the HTTP client
    #[serde(default = "CatalogSettings::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Budget for a whole catalog call, retries and backoff included; kept
    /// below `server.request_timeout_ms` so the fallback still answers
    #[serde(default = "CatalogSettings::default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub breaker: BreakerSettings,
}

impl CatalogSettings {
    fn default_base_url() -> String {
        "https://www.googleapis.com/books/v1/volumes".to_string()
    }

    fn default_timeout_ms() -> u64 {
        5000
    }

    fn default_deadline_ms() -> u64 {
        8000
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: None,
            timeout_ms: Self::default_timeout_ms(),
            deadline_ms: Self::default_deadline_ms(),
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
        }
    }
}

impl std::fmt::Debug for CatalogSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .field("deadline_ms", &self.deadline_ms)
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "RetrySettings::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "RetrySettings::default_wait_ms")]
    pub wait_ms: u64,
    #[serde(default = "RetrySettings::default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "RetrySettings::default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl RetrySettings {
    fn default_max_attempts() -> u32 {
        3
    }

    fn default_wait_ms() -> u64 {
        500
    }

    fn default_multiplier() -> f64 {
        2.0
    }

    fn default_max_wait_ms() -> u64 {
        5000
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            wait_ms: Self::default_wait_ms(),
            multiplier: Self::default_multiplier(),
            max_wait_ms: Self::default_max_wait_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "BreakerSettings::default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "BreakerSettings::default_open_ms")]
    pub open_ms: u64,
}

impl BreakerSettings {
    fn default_failure_threshold() -> u32 {
        5
    }

    fn default_open_ms() -> u64 {
        30_000
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            open_ms: Self::default_open_ms(),
        }
    }
}
