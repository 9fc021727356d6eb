//! Platform configuration, read from the environment.

use crate::error::{PlatformError, Result};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_required(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(PlatformError::Configuration {
            message: format!("{} must be set", key),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone)]
pub struct PlatformConfig {
    pub api_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: String,
    pub notes_cache_ttl_secs: u64,
    pub cookie_secure: bool,
    pub init_schema: bool,
    pub jwt_secret: String,
    pub refresh_jwt_secret: String,
    pub log_format: LogFormat,
    /// Initial account, created at startup when both are set
    pub bootstrap_email: Option<String>,
    pub bootstrap_password: Option<String>,
}

impl PlatformConfig {
    pub fn from_env() -> Result<Self> {
        let log_format = match env_or("NB_LOG_FORMAT", "text").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let bootstrap_email = env_optional("NB_BOOTSTRAP_EMAIL");
        let bootstrap_password = env_optional("NB_BOOTSTRAP_PASSWORD");
        if bootstrap_email.is_some() != bootstrap_password.is_some() {
            return Err(PlatformError::Configuration {
                message: "NB_BOOTSTRAP_EMAIL and NB_BOOTSTRAP_PASSWORD must be set together".into(),
            });
        }

        Ok(Self {
            api_port: env_or_parse("NB_API_PORT", 8080),
            database_url: env_or("NB_DATABASE_URL", "mysql://root@localhost:3306/notebase"),
            db_max_connections: env_or_parse("NB_DB_MAX_CONNECTIONS", 10),
            redis_url: env_or("NB_REDIS_URL", "redis://127.0.0.1:6379"),
            notes_cache_ttl_secs: env_or_parse("NB_NOTES_CACHE_TTL_SECS", 3600),
            cookie_secure: env_flag("NB_COOKIE_SECURE", false),
            init_schema: env_flag("NB_INIT_SCHEMA", true),
            jwt_secret: env_required("JWT_SECRET")?,
            refresh_jwt_secret: env_required("REFRESH_JWT_SECRET")?,
            log_format,
            bootstrap_email,
            bootstrap_password,
        })
    }
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_port", &self.api_port)
            .field("db_max_connections", &self.db_max_connections)
            .field("redis_url", &self.redis_url)
            .field("notes_cache_ttl_secs", &self.notes_cache_ttl_secs)
            .field("cookie_secure", &self.cookie_secure)
            .field("init_schema", &self.init_schema)
            .field("log_format", &self.log_format)
            .field("bootstrap_email", &self.bootstrap_email)
            .finish_non_exhaustive()
    }
}
