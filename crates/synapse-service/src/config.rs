//! Service configuration.

use std::str::FromStr;

use synapse_core::{
    Allowances, WatermarkMode, DEFAULT_CHAT_ALLOWANCE, DEFAULT_IMAGE_ALLOWANCE,
    DEFAULT_PREMIUM_PERIOD_DAYS, MAX_PREMIUM_PERIOD_DAYS,
};

/// Which storage backend the service runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Process-local maps. Nothing survives a restart.
    #[default]
    Memory,
    /// `RocksDB` under `data_dir` (needs the `rocksdb-backend` feature).
    Rocksdb,
    /// `PostgreSQL` at `database_url`.
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" | "rocks" => Ok(Self::Rocksdb),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// What a status read does for a user who has no ledger yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerMissingPolicy {
    /// Create the default ledger, as deduction does.
    #[default]
    LazyCreate,
    /// Fail with `NotFound`.
    NotFound,
}

impl FromStr for LedgerMissingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lazy_create" | "create" => Ok(Self::LazyCreate),
            "not_found" | "error" => Ok(Self::NotFound),
            other => Err(format!("unknown missing-ledger policy: {other}")),
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Storage backend (default: memory).
    pub store_backend: StoreBackend,

    /// Path to the `RocksDB` data directory (default: "/data/synapse").
    pub data_dir: String,

    /// `PostgreSQL` connection string, required for the postgres backend.
    pub database_url: Option<String>,

    /// HS256 secret for user access tokens. Without it only test tokens work.
    pub auth_secret: Option<String>,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// Stripe webhook secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// Groq API key for chat completions.
    pub groq_api_key: Option<String>,

    /// ClipDrop API key for image generation.
    pub clipdrop_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Allowance quantities a replenishment restores.
    pub allowances: Allowances,

    /// When the reset watermark moves.
    pub watermark_mode: WatermarkMode,

    /// Status read behavior for users without a ledger.
    pub status_missing_ledger: LedgerMissingPolicy,

    /// Days of premium granted per successful payment.
    pub premium_period_days: i64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to their defaults with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            store_backend: parsed_var("STORE_BACKEND").unwrap_or(defaults.store_backend),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            database_url: std::env::var("DATABASE_URL").ok(),
            auth_secret: std::env::var("AUTH_SECRET").ok(),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
            groq_api_key: std::env::var("GROQ_API_KEY").ok(),
            clipdrop_api_key: std::env::var("CLIPDROP_API_KEY").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: parsed_var("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: parsed_var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            allowances: Allowances {
                chat: parsed_var("DEFAULT_CHAT_CREDITS").unwrap_or(defaults.allowances.chat),
                image: parsed_var("DEFAULT_IMAGE_CREDITS").unwrap_or(defaults.allowances.image),
            },
            watermark_mode: parsed_var("WATERMARK_MODE").unwrap_or(defaults.watermark_mode),
            status_missing_ledger: parsed_var("STATUS_MISSING_LEDGER")
                .unwrap_or(defaults.status_missing_ledger),
            premium_period_days: parsed_var("PREMIUM_PERIOD_DAYS")
                .and_then(premium_period)
                .unwrap_or(defaults.premium_period_days),
        }
    }
}

/// Read and parse an environment variable, warning when it is set but invalid.
fn parsed_var<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(var = name, value = %raw, error = %e, "Ignoring invalid setting");
            None
        }
    }
}

/// Accept a premium period only within `1..=MAX_PREMIUM_PERIOD_DAYS`.
fn premium_period(days: i64) -> Option<i64> {
    if (1..=MAX_PREMIUM_PERIOD_DAYS).contains(&days) {
        Some(days)
    } else {
        tracing::warn!(
            var = "PREMIUM_PERIOD_DAYS",
            value = days,
            max = MAX_PREMIUM_PERIOD_DAYS,
            "Ignoring out-of-range premium period"
        );
        None
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            store_backend: StoreBackend::Memory,
            data_dir: "/data/synapse".into(),
            database_url: None,
            auth_secret: None,
            service_api_key: None,
            admin_api_key: None,
            stripe_webhook_secret: None,
            groq_api_key: None,
            clipdrop_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            allowances: Allowances {
                chat: DEFAULT_CHAT_ALLOWANCE,
                image: DEFAULT_IMAGE_ALLOWANCE,
            },
            watermark_mode: WatermarkMode::AdvanceOnCheck,
            status_missing_ledger: LedgerMissingPolicy::LazyCreate,
            premium_period_days: DEFAULT_PREMIUM_PERIOD_DAYS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_free_plan() {
        let config = ServiceConfig::default();
        assert_eq!(config.allowances, Allowances::default());
        assert_eq!(config.premium_period_days, 30);
        assert_eq!(config.status_missing_ledger, LedgerMissingPolicy::LazyCreate);
        assert_eq!(config.watermark_mode, WatermarkMode::AdvanceOnCheck);
    }

    #[test]
    fn premium_period_must_be_positive_and_bounded() {
        assert_eq!(premium_period(30), Some(30));
        assert_eq!(premium_period(MAX_PREMIUM_PERIOD_DAYS), Some(MAX_PREMIUM_PERIOD_DAYS));
        assert_eq!(premium_period(0), None);
        assert_eq!(premium_period(-7), None);
        assert_eq!(premium_period(i64::MAX), None);
    }

    #[test]
    fn parses_store_backend() {
        assert_eq!("Postgres".parse(), Ok(StoreBackend::Postgres));
        assert_eq!("rocksdb".parse(), Ok(StoreBackend::Rocksdb));
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn parses_missing_ledger_policy() {
        assert_eq!("not_found".parse(), Ok(LedgerMissingPolicy::NotFound));
        assert_eq!("lazy_create".parse(), Ok(LedgerMissingPolicy::LazyCreate));
        assert!("maybe".parse::<LedgerMissingPolicy>().is_err());
    }
}
