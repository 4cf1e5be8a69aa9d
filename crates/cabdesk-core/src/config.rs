//! ============================================================================
//! Configuration - Environment-supplied CRM and sync settings
//! ============================================================================
//! Credentials are consumed only by the session manager and RPC client.
//! ============================================================================

use std::fmt;
use std::time::Duration;

/// Default fleet sync interval (30 minutes)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30 * 60;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Connection settings for the CRM JSON-RPC endpoint
#[derive(Clone)]
pub struct CrmConfig {
    /// Base URL of the CRM, e.g. `https://erp.example.com`
    pub base_url: String,
    pub database: String,
    pub login: String,
    /// Password or API token
    pub password: String,
    /// Per-request timeout. `None` leaves the transport default in place.
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmConfig")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl CrmConfig {
    pub fn new(
        base_url: impl Into<String>,
        database: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            login: login.into(),
            password: password.into(),
            request_timeout: None,
        }
    }

    /// Read ODOO_BASE_URL, ODOO_DATABASE, ODOO_LOGIN, ODOO_PASSWORD and the
    /// optional CRM_TIMEOUT_SECS from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(
            required(&lookup, "ODOO_BASE_URL")?,
            required(&lookup, "ODOO_DATABASE")?,
            required(&lookup, "ODOO_LOGIN")?,
            required(&lookup, "ODOO_PASSWORD")?,
        );
        config.request_timeout = optional_secs(&lookup, "CRM_TIMEOUT_SECS")?.map(Duration::from_secs);
        Ok(config)
    }

    /// Join an endpoint path onto the base URL, tolerating a trailing slash
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Fleet sync settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        }
    }
}

impl SyncConfig {
    /// Read FLEET_SYNC_INTERVAL_SECS, falling back to 30 minutes
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match optional_secs(&lookup, "FLEET_SYNC_INTERVAL_SECS")? {
            Some(0) => Err(ConfigError::Invalid {
                key: "FLEET_SYNC_INTERVAL_SECS",
                value: "0".to_string(),
            }),
            Some(secs) => Ok(Self {
                interval: Duration::from_secs(secs),
            }),
            None => Ok(Self::default()),
        }
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn optional_secs<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_lookup_reads_all_fields() {
        let vars = env(&[
            ("ODOO_BASE_URL", "https://erp.example.com/"),
            ("ODOO_DATABASE", "yourcar"),
            ("ODOO_LOGIN", "ops@example.com"),
            ("ODOO_PASSWORD", "secret"),
            ("CRM_TIMEOUT_SECS", "15"),
        ]);
        let config = CrmConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.database, "yourcar");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(15)));
        assert_eq!(
            config.endpoint("/web/session/authenticate"),
            "https://erp.example.com/web/session/authenticate"
        );
    }

    #[test]
    fn test_missing_password_is_reported() {
        let vars = env(&[
            ("ODOO_BASE_URL", "https://erp.example.com"),
            ("ODOO_DATABASE", "yourcar"),
            ("ODOO_LOGIN", "ops@example.com"),
            ("ODOO_PASSWORD", "  "),
        ]);
        let err = CrmConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("ODOO_PASSWORD"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = CrmConfig::new("http://localhost", "db", "user", "hunter2");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_sync_interval() {
        let default = SyncConfig::from_lookup(|_| None).unwrap();
        assert_eq!(default.interval, Duration::from_secs(1800));

        let custom = SyncConfig::from_lookup(|_| Some("60".to_string())).unwrap();
        assert_eq!(custom.interval, Duration::from_secs(60));

        assert!(SyncConfig::from_lookup(|_| Some("soon".to_string())).is_err());
        assert!(SyncConfig::from_lookup(|_| Some("0".to_string())).is_err());
    }
}
