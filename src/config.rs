use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // Web Server
    pub web_host: String,
    pub web_port: u16,
    pub client_url: Option<String>,

    // Tokens
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,

    // Image storage
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_prefix: String,
    pub image_max_bytes: usize,

    // Trending
    pub trending_interval: Duration,
    pub clock_offset_hours: i64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/social.sqlite")),

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 3201)?,
            client_url: optional_env("CLIENT_URL"),

            // Tokens
            access_token_secret: required_env("ACCESS_TOKEN_SECRET")?,
            refresh_token_secret: required_env("REFRESH_TOKEN_SECRET")?,
            access_token_ttl: Duration::from_secs(parse_env_u64("ACCESS_TOKEN_TTL_SECS", 600)?),
            refresh_token_ttl: Duration::from_secs(parse_env_u64(
                "REFRESH_TOKEN_TTL_SECS",
                172_800,
            )?),

            // Image storage
            s3_bucket: optional_env("S3_BUCKET"),
            s3_region: env_or_default("S3_REGION", "us-east-1"),
            s3_endpoint: optional_env("S3_ENDPOINT"),
            s3_prefix: env_or_default("S3_PREFIX", ""),
            image_max_bytes: parse_env_usize("IMAGE_MAX_BYTES", 5 * 1024 * 1024)?,

            // Trending
            trending_interval: Duration::from_secs(parse_env_u64("TRENDING_INTERVAL_SECS", 300)?),
            clock_offset_hours: parse_env_i64("CLOCK_OFFSET_HOURS", 1)?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ACCESS_TOKEN_SECRET".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.refresh_token_secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "REFRESH_TOKEN_SECRET".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.access_token_ttl.is_zero() || self.refresh_token_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "ACCESS_TOKEN_TTL_SECS/REFRESH_TOKEN_TTL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.trending_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "TRENDING_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.image_max_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                name: "IMAGE_MAX_BYTES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
