//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FUNNELKIT_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//! - `APP_URL` - Public URL this app is served from (its origin is always
//!   accepted by the signing origin allow-list)
//!
//! ## Optional
//! - `FUNNELKIT_HOST` - Bind address (default: 127.0.0.1)
//! - `FUNNELKIT_PORT` - Listen port (default: 3000)
//! - `SHOPIFY_API_VERSION` - Admin API version (default: 2024-07)
//! - `FUNNELKIT_ALLOWED_ORIGINS` - Comma-separated extra origins allowed to
//!   call the signing endpoint
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Application configuration, constructed once at process start and passed
/// into each component constructor. Business logic never reads the ambient
/// environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for this app
    pub app_url: String,
    /// Shopify Admin API version label (e.g., 2024-07)
    pub api_version: String,
    /// Extra origins accepted by the signing endpoint allow-list
    pub allowed_origins: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("FUNNELKIT_DATABASE_URL")?;
        let host = get_env_or_default("FUNNELKIT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("FUNNELKIT_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("FUNNELKIT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("FUNNELKIT_PORT".to_string(), e.to_string()))?;
        let app_url = get_required_env("APP_URL")?;
        let api_version = get_env_or_default("SHOPIFY_API_VERSION", "2024-07");
        let allowed_origins =
            parse_origin_list(get_optional_env("FUNNELKIT_ALLOWED_ORIGINS").as_deref());
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            database_url,
            host,
            port,
            app_url,
            api_version,
            allowed_origins,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Split a comma-separated origin list, dropping empty entries and trailing
/// slashes so entries compare cleanly against `Origin` header values.
fn parse_origin_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin_list() {
        let origins = parse_origin_list(Some(
            "https://extensions.shopifycdn.com, https://partner.example/ ,",
        ));
        assert_eq!(
            origins,
            vec![
                "https://extensions.shopifycdn.com".to_string(),
                "https://partner.example".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_origin_list_empty() {
        assert!(parse_origin_list(None).is_empty());
        assert!(parse_origin_list(Some("  ")).is_empty());
    }

    #[test]
    fn test_socket_addr() {
        let config = AppConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().expect("valid ip"),
            port: 3000,
            app_url: "http://localhost:3000".to_string(),
            api_version: "2024-07".to_string(),
            allowed_origins: vec![],
            sentry_dsn: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }
}
