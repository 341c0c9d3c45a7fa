use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
/// Probability the simulated payment processor approves a settlement.
const DEFAULT_PAYMENT_SUCCESS_RATE: f64 = 0.7;
const DEFAULT_PAYMENT_INTENT_TTL_SECS: u64 = 900;
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret used to validate bearer tokens issued by the auth service
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Maximum number of database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum number of database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Comma-separated allow-list of CORS origins; permissive when unset
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Base URL of the storefront client, target of payment redirects
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// Success probability of the simulated payment draw
    #[serde(default = "default_payment_success_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub payment_success_rate: f64,

    /// TTL for payment intents held in the ephemeral store
    #[serde(default = "default_payment_intent_ttl_secs")]
    pub payment_intent_ttl_secs: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_frontend_url() -> String {
    DEFAULT_FRONTEND_URL.to_string()
}
fn default_payment_success_rate() -> f64 {
    DEFAULT_PAYMENT_SUCCESS_RATE
}
fn default_payment_intent_ttl_secs() -> u64 {
    DEFAULT_PAYMENT_INTENT_TTL_SECS
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling; production code goes
    /// through [`load_config`].
    pub fn new(database_url: String, jwt_secret: String, environment: String) -> Self {
        Self {
            database_url,
            jwt_secret,
            host: default_host(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            cors_allowed_origins: None,
            frontend_url: default_frontend_url(),
            payment_success_rate: default_payment_success_rate(),
            payment_intent_ttl_secs: default_payment_intent_ttl_secs(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from optional files under `config/` overridden by
/// environment variables (e.g. `DATABASE_URL`, `PAYMENT_SUCCESS_RATE`).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let environment =
        std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{environment}")).required(false))
        .add_source(Environment::default())
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config.validate()?;

    info!(
        environment = %app_config.environment,
        host = %app_config.host,
        port = app_config.port,
        "configuration loaded"
    );
    Ok(app_config)
}

/// Initializes the tracing subscriber. `level` seeds the env-filter unless
/// `RUST_LOG` is set; `json` switches to structured output.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("storefront_api={level},tower_http=info")));

    if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "a_test_secret_key_that_is_long_enough_for_validation".to_string(),
            "test".to_string(),
        )
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = base_config();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.frontend_url, DEFAULT_FRONTEND_URL);
        assert_eq!(cfg.payment_success_rate, DEFAULT_PAYMENT_SUCCESS_RATE);
        assert!(!cfg.is_production());
    }

    #[test]
    fn validation_rejects_short_jwt_secret() {
        let mut cfg = base_config();
        cfg.jwt_secret = "short".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_out_of_range_success_rate() {
        let mut cfg = base_config();
        cfg.payment_success_rate = 1.5;
        assert!(cfg.validate().is_err());
    }
}
