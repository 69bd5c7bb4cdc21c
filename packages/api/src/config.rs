//! Server configuration loaded from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use broadcast::BroadcastConfig;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Status server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Registry and dispatcher tuning.
    pub broadcast: BroadcastConfig,
    /// Interval between keep-alive comments on idle streams.
    pub keep_alive: Duration,
    /// Whether streams open with a `connected` update.
    pub send_greeting: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            broadcast: BroadcastConfig::default(),
            keep_alive: Duration::from_secs(15),
            send_greeting: true,
        }
    }
}

impl ServerConfig {
    /// Read `STATUS_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = non_empty(lookup("STATUS_BIND_ADDR")) {
            config = config.with_bind_addr(parse("STATUS_BIND_ADDR", addr)?);
        }
        if let Some(capacity) = non_empty(lookup("STATUS_QUEUE_CAPACITY")) {
            let capacity: usize = parse("STATUS_QUEUE_CAPACITY", capacity)?;
            if capacity == 0 {
                return Err(ConfigError::Invalid {
                    key: "STATUS_QUEUE_CAPACITY",
                    value: capacity.to_string(),
                });
            }
            config = config.with_queue_capacity(capacity);
        }
        if let Some(secs) = non_empty(lookup("STATUS_KEEPALIVE_SECS")) {
            let secs: u64 = parse("STATUS_KEEPALIVE_SECS", secs)?;
            config = config.with_keep_alive(Duration::from_secs(secs.max(1)));
        }
        if let Some(flag) = non_empty(lookup("STATUS_SEND_GREETING")) {
            config = config.with_greeting(parse_bool("STATUS_SEND_GREETING", flag)?);
        }
        if let Some(secs) = non_empty(lookup("STATUS_STATS_TIMEOUT_SECS")) {
            let secs: u64 = parse("STATUS_STATS_TIMEOUT_SECS", secs)?;
            config = config.with_stats_timeout(Duration::from_secs(secs.max(1)));
        }

        Ok(config)
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the per-subscription queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.broadcast = self.broadcast.with_queue_capacity(capacity);
        self
    }

    /// Set the keep-alive interval.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set how long the stats endpoint waits for the dispatcher.
    pub fn with_stats_timeout(mut self, timeout: Duration) -> Self {
        self.broadcast = self.broadcast.with_rpc_timeout(timeout);
        self
    }

    /// Enable or disable the `connected` greeting.
    pub fn with_greeting(mut self, send_greeting: bool) -> Self {
        self.send_greeting = send_greeting;
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}
