use std::env;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_EXTERNAL_ID_FIELD: &str = "CA_IdExterno__c";
const DEFAULT_SOURCE_QUERY: &str = "CALL SP_ITENSPEDIDO_SF()";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_QUERY_RETRY_ATTEMPTS: u32 = 2;
const DEFAULT_TOKEN_TTL_SECS: u64 = 1800;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// ERP source database connection URL
    #[validate(length(min = 1))]
    pub source_database_url: String,

    /// Query executed against the source store each cycle
    #[serde(default = "default_source_query")]
    #[validate(length(min = 1))]
    pub source_query: String,

    /// OAuth token endpoint of the CRM
    #[validate(url)]
    pub auth_url: String,

    /// OAuth client credentials
    #[validate(length(min = 1))]
    pub client_id: String,
    #[validate(length(min = 1))]
    pub client_secret: String,

    /// Integration user credentials (password grant)
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,

    /// Base URL of the upsert target object, e.g.
    /// `https://org.my.crm.example/services/data/v60.0/sobjects/OrderItem`
    #[validate(url, custom = "validate_sobject_base")]
    pub sobject_base_url: String,

    /// External id field used for upsert keys and lookups
    #[serde(default = "default_external_id_field")]
    #[validate(length(min = 1))]
    pub external_id_field: String,

    /// Explicit REST base (`…/services/data/vXX.X`); derived from
    /// `sobject_base_url` when unset
    #[serde(default)]
    pub rest_base_url: Option<String>,

    /// Pricebook preferred by external id when an order has none
    #[serde(default)]
    pub default_pricebook_external_id: Option<String>,

    /// Automatically assign a pricebook to orders missing one
    #[serde(default = "default_true_bool")]
    pub auto_assign_pricebook: bool,

    /// Seconds between sync cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-call HTTP timeout (seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Additional attempts for idempotent CRM reads; writes never retry
    #[serde(default = "default_query_retry_attempts")]
    pub query_retry_attempts: u32,

    /// Seconds a cached bearer token is reused before re-authenticating
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,
}

impl AppConfig {
    /// Derives the REST base (`…/services/data/vXX.X`) from the sobject
    /// base when no explicit override is configured.
    pub fn rest_base(&self) -> Result<String, AppConfigError> {
        if let Some(explicit) = &self.rest_base_url {
            return Ok(explicit.trim_end_matches('/').to_string());
        }
        let lower = self.sobject_base_url.to_ascii_lowercase();
        match lower.find("/sobjects/") {
            Some(idx) if idx > 0 => Ok(self.sobject_base_url[..idx].to_string()),
            _ => Err(AppConfigError::InvalidSobjectBase(
                self.sobject_base_url.clone(),
            )),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("sobject_base_url does not contain /sobjects/: {0}")]
    InvalidSobjectBase(String),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_external_id_field() -> String {
    DEFAULT_EXTERNAL_ID_FIELD.to_string()
}

fn default_source_query() -> String {
    DEFAULT_SOURCE_QUERY.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_query_retry_attempts() -> u32 {
    DEFAULT_QUERY_RETRY_ATTEMPTS
}

fn default_token_ttl_secs() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_true_bool() -> bool {
    true
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_sobject_base(url: &str) -> Result<(), ValidationError> {
    if url.to_ascii_lowercase().contains("/sobjects/") {
        Ok(())
    } else {
        let mut err = ValidationError::new("sobject_base_url");
        err.message = Some("Must contain /sobjects/<ObjectType>".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("erp_order_sync={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    // Fail fast on a base URL the REST derivation cannot work with.
    app_config.rest_base()?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
