use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

pub const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is not valid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

// Top-level container for every setting
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub identity: IdentityConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Postgres { url: String, pool_size: u32 },
    Memory,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub project_id: String,
    pub jwks_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

// Only the field we need out of the Firebase service-account JSON
#[derive(Deserialize)]
struct ServiceAccountKey {
    project_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("expected pretty or json, got {other}"),
                })
            }
        };

        Ok(Config {
            app: AppConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_var(&lookup, "PORT", 5000)?,
                environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
                rust_log: lookup("RUST_LOG")
                    .unwrap_or_else(|| "sports_club=debug,tower_http=debug".to_string()),
                log_format,
            },
            store: store_config(&lookup)?,
            identity: IdentityConfig {
                project_id: project_id(&lookup)?,
                jwks_url: lookup("IDENTITY_JWKS_URL").unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()),
                timeout_seconds: parse_var(&lookup, "IDENTITY_TIMEOUT_SECONDS", 10)?,
            },
            cors: CorsConfig {
                allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                    .map(|raw| {
                        raw.split(',')
                            .map(str::trim)
                            .filter(|origin| !origin.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn store_config<F>(lookup: &F) -> Result<StoreConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("STORE").as_deref() {
        Some("memory") => return Ok(StoreConfig::Memory),
        None | Some("postgres") => {}
        Some(other) => {
            return Err(ConfigError::Invalid {
                name: "STORE",
                reason: format!("expected postgres or memory, got {other}"),
            })
        }
    }

    let url = match lookup("DATABASE_URL") {
        Some(url) => url,
        None => {
            let user = lookup("DB_USER").ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let pass = lookup("DB_PASS").ok_or(ConfigError::Missing("DB_PASS"))?;
            let host = lookup("DB_HOST").ok_or(ConfigError::Missing("DB_HOST"))?;
            let name = lookup("DB_NAME").unwrap_or_else(|| "sports_club".to_string());
            format!("postgres://{user}:{pass}@{host}/{name}")
        }
    };

    Ok(StoreConfig::Postgres {
        url,
        pool_size: parse_var(lookup, "DB_POOL_SIZE", 20)?,
    })
}

fn project_id<F>(lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(id) = lookup("FIREBASE_PROJECT_ID") {
        return Ok(id);
    }
    let encoded = lookup("FB_SERVICE_KEY").ok_or(ConfigError::Missing("FIREBASE_PROJECT_ID"))?;
    project_id_from_service_key(&encoded)
}

/// Reads `project_id` out of a base64-encoded service-account key.
pub fn project_id_from_service_key(encoded: &str) -> Result<String, ConfigError> {
    let raw = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ConfigError::Invalid {
            name: "FB_SERVICE_KEY",
            reason: e.to_string(),
        })?;
    let key: ServiceAccountKey = serde_json::from_slice(&raw).map_err(|e| ConfigError::Invalid {
        name: "FB_SERVICE_KEY",
        reason: e.to_string(),
    })?;
    Ok(key.project_id)
}
