use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::rate_limit::RateLimitConfig;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Public origin for objects; `None` means files are proxied through `/media`.
    pub public_url: Option<String>,
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub frontend_url: String,
    pub media_base_url: String,
    pub enable_hsts: bool,
    pub rate_limits: Option<RateLimitConfig>,
    pub s3: Option<S3Config>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{0} must be at least 32 characters long")]
    WeakSecret(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() }),
        None => Ok(default),
    }
}

pub fn flag(key: &str) -> bool {
    var(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if secret.len() < 32 {
            return Err(ConfigError::WeakSecret("JWT_SECRET"));
        }

        let port = parse_or("PORT", 8080u16)?;
        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".into());
        let media_base_url =
            var("MEDIA_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}/media"));

        let s3 = var("S3_ENDPOINT").map(|endpoint| S3Config {
            endpoint,
            bucket: var("S3_BUCKET").unwrap_or_else(|| "pixerra-designs".into()),
            region: var("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
            access_key: var("S3_ACCESS_KEY").unwrap_or_default(),
            secret_key: var("S3_SECRET_KEY").unwrap_or_default(),
            public_url: var("S3_PUBLIC_URL"),
        });

        let rate_limits = if flag("RL_DISABLED") { None } else { Some(RateLimitConfig::from_env()) };

        let cfg = Self {
            bind_addr,
            port,
            database_url: var("DATABASE_URL"),
            data_dir: var("PIXERRA_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            frontend_url: var("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            media_base_url,
            enable_hsts: flag("ENABLE_HSTS"),
            rate_limits,
            s3,
        };
        cfg.log_summary();
        Ok(cfg)
    }

    // Non-sensitive values only.
    fn log_summary(&self) {
        info!("Frontend URL: {}", self.frontend_url);
        info!("Media base URL: {}", self.media_base_url);
        info!("Database: {}", if self.database_url.is_some() { "postgres" } else { "in-memory" });
        info!("Object store: {}", if self.s3.is_some() { "s3" } else { "filesystem" });
        if self.rate_limits.is_none() {
            warn!("rate limiting disabled (RL_DISABLED)");
        }
    }
}
