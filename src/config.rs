//! Configuration management for Mission Control.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` (or `SERVER_PORT`) - Optional. Server port. Defaults to `4000`.
//! - `GATEWAY_URL` - Optional. Base URL of the agent gateway. When unset, requests
//!   are served by the simulated gateway and no upstream sync runs.
//! - `GATEWAY_SYNC` - Optional. Poll the gateway for its agent set. Defaults to `true`.
//! - `GATEWAY_SYNC_INTERVAL_MS` - Optional. Poll interval. Defaults to `5000`.
//! - `GATEWAY_TIMEOUT_MS` - Optional. Per-request gateway timeout. Defaults to `30000`.
//! - `BROADCAST_CAPACITY` - Optional. Events buffered per observer before it lags. Defaults to `1024`.
//! - `SNAPSHOT_TRACE_LIMIT` - Optional. Traces included in an `INIT` snapshot. Defaults to `1000`.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::notifier::DEFAULT_CAPACITY;
use crate::store::DEFAULT_TRACE_LIMIT;
use crate::util::parse_bool;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Upstream gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `None` selects the simulated gateway.
    pub url: Option<Url>,
    pub sync_enabled: bool,
    pub sync_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            sync_enabled: true,
            sync_interval: Duration::from_millis(5000),
            request_timeout: Duration::from_millis(30_000),
        }
    }
}

impl GatewayConfig {
    pub fn sync_active(&self) -> bool {
        self.url.is_some() && self.sync_enabled
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub gateway: GatewayConfig,
    pub broadcast_capacity: usize,
    pub snapshot_trace_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            gateway: GatewayConfig::default(),
            broadcast_capacity: DEFAULT_CAPACITY,
            snapshot_trace_limit: DEFAULT_TRACE_LIMIT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);

        let port = match lookup("PORT").or_else(|| lookup("SERVER_PORT")) {
            Some(raw) => parse_var("PORT", &raw)?,
            None => defaults.port,
        };

        let url = lookup("GATEWAY_URL")
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                Url::parse(raw.trim())
                    .map_err(|e| ConfigError::InvalidValue("GATEWAY_URL".to_string(), e.to_string()))
            })
            .transpose()?;

        let sync_enabled = match lookup("GATEWAY_SYNC") {
            Some(raw) => parse_bool(&raw),
            None => defaults.gateway.sync_enabled,
        };

        let sync_interval = duration_var(
            &lookup,
            "GATEWAY_SYNC_INTERVAL_MS",
            defaults.gateway.sync_interval,
        )?;
        let request_timeout = duration_var(
            &lookup,
            "GATEWAY_TIMEOUT_MS",
            defaults.gateway.request_timeout,
        )?;

        let broadcast_capacity = match lookup("BROADCAST_CAPACITY") {
            Some(raw) => parse_var::<usize>("BROADCAST_CAPACITY", &raw)?,
            None => defaults.broadcast_capacity,
        };
        if broadcast_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "BROADCAST_CAPACITY".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let snapshot_trace_limit = match lookup("SNAPSHOT_TRACE_LIMIT") {
            Some(raw) => parse_var("SNAPSHOT_TRACE_LIMIT", &raw)?,
            None => defaults.snapshot_trace_limit,
        };

        Ok(Self {
            host,
            port,
            gateway: GatewayConfig {
                url,
                sync_enabled,
                sync_interval,
                request_timeout,
            },
            broadcast_capacity,
            snapshot_trace_limit,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn duration_var<F>(lookup: &F, name: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => parse_var::<u64>(name, &raw).map(Duration::from_millis),
        None => Ok(default),
    }
}
