//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::personalize::DEFAULT_GREETINGS;

/// Default inter-send delay.
pub const DEFAULT_PACING: Duration = Duration::from_secs(2);

/// Campaign dispatch configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Delay inserted between consecutive sends.
    pub pacing: Duration,
    /// Pool that `[GREETING]` draws from.
    pub greetings: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            greetings: DEFAULT_GREETINGS.iter().map(|g| g.to_string()).collect(),
        }
    }
}

/// Connection settings for the HTTP messaging gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL, without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Reported by `/health`.
    pub service_name: String,
    /// Multipart body limit for `/send-bulk`.
    pub max_upload_bytes: usize,
    pub dispatch: DispatchConfig,
    pub gateway: GatewayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            service_name: "WhatsApp Bulk Messaging System".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            dispatch: DispatchConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `BULK_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind = lookup("BULK_BIND").unwrap_or(defaults.bind);
        let port = parse_var(&lookup, "BULK_PORT")?.unwrap_or(defaults.port);
        let service_name = lookup("BULK_SERVICE_NAME").unwrap_or(defaults.service_name);
        let max_upload_bytes =
            parse_var(&lookup, "BULK_MAX_UPLOAD_BYTES")?.unwrap_or(defaults.max_upload_bytes);

        let pacing = parse_var::<u64, _>(&lookup, "BULK_PACING_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.dispatch.pacing);

        let base_url = lookup("BULK_GATEWAY_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.gateway.base_url);
        let timeout = parse_var::<u64, _>(&lookup, "BULK_GATEWAY_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.gateway.timeout);

        Ok(Self {
            bind,
            port,
            service_name,
            max_upload_bytes,
            dispatch: DispatchConfig {
                pacing,
                ..defaults.dispatch
            },
            gateway: GatewayConfig { base_url, timeout },
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}
