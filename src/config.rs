//! Analytics Configuration
//!
//! All configuration values are loaded from environment variables, each with a
//! default except `JWT_SECRET`, which the dashboard needs to verify vendors.

use std::env;
use std::str::FromStr;

/// Upper bound for ANALYTICS_MAX_DATE_RANGE, roughly a century.
pub const MAX_DATE_RANGE_LIMIT: u32 = 36_500;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration for the analytics service
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Listen address (from BIND_ADDR env var)
    pub bind_addr: String,

    /// Postgres connection string; in-memory storage when unset (from DATABASE_URL env var)
    pub database_url: Option<String>,

    /// Pool size (from DATABASE_MAX_CONNECTIONS env var)
    pub database_max_connections: u32,

    /// Accept and record events at all (from ANALYTICS_TRACKING_ENABLED env var)
    pub tracking_enabled: bool,

    /// Zero the host part of stored IP addresses (from ANALYTICS_ANONYMIZE_IP env var)
    pub anonymize_ip: bool,

    /// Dashboard window in days when none is requested (from ANALYTICS_DEFAULT_DATE_RANGE env var)
    pub default_date_range: u32,

    /// Largest window a dashboard request may ask for (from ANALYTICS_MAX_DATE_RANGE env var)
    pub max_date_range: u32,

    /// HS256 secret for vendor bearer tokens (from JWT_SECRET env var)
    pub jwt_secret: Option<String>,

    /// Expected token issuer (from JWT_ISSUER env var)
    pub jwt_issuer: String,

    /// Expected token audience (from JWT_AUDIENCE env var)
    pub jwt_audience: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            database_url: None,
            database_max_connections: 10,
            tracking_enabled: true,
            anonymize_ip: false,
            default_date_range: 30,
            max_date_range: 365,
            jwt_secret: None,
            jwt_issuer: "storefront".into(),
            jwt_audience: "storefront-analytics".into(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag_env(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl AnalyticsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            database_max_connections: parse_env(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            tracking_enabled: flag_env("ANALYTICS_TRACKING_ENABLED", defaults.tracking_enabled),
            anonymize_ip: flag_env("ANALYTICS_ANONYMIZE_IP", defaults.anonymize_ip),
            default_date_range: parse_env("ANALYTICS_DEFAULT_DATE_RANGE", defaults.default_date_range),
            max_date_range: parse_env("ANALYTICS_MAX_DATE_RANGE", defaults.max_date_range),
            jwt_secret: env::var("JWT_SECRET").ok().filter(|v| !v.is_empty()),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            jwt_audience: env::var("JWT_AUDIENCE").unwrap_or(defaults.jwt_audience),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_date_range == 0 || self.max_date_range > MAX_DATE_RANGE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "ANALYTICS_MAX_DATE_RANGE must be between 1 and {}",
                MAX_DATE_RANGE_LIMIT
            )));
        }

        if self.default_date_range == 0 || self.default_date_range > self.max_date_range {
            return Err(ConfigError::Invalid(
                "ANALYTICS_DEFAULT_DATE_RANGE must be between 1 and ANALYTICS_MAX_DATE_RANGE"
                    .to_string(),
            ));
        }

        if self.database_max_connections == 0 {
            return Err(ConfigError::Invalid(
                "DATABASE_MAX_CONNECTIONS must be positive".to_string(),
            ));
        }

        if let Some(secret) = &self.jwt_secret {
            if secret.len() < 32 {
                return Err(ConfigError::Invalid(
                    "JWT_SECRET must be at least 32 characters".to_string(),
                ));
            }
        }

        Ok(())
    }
}
