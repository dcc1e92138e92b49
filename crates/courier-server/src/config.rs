//! Server configuration loaded from environment variables.
//!
//! Every setting has a default, so the relay starts with zero configuration.
//! Unparsable values are logged and replaced by the default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use courier_gateway::SupervisorConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `COURIER_HOST`, default `0.0.0.0`
    pub host: String,

    /// Env: `COURIER_PORT`, default `13013`
    pub port: u16,

    /// SQLite database file.
    /// Env: `COURIER_DB_PATH`, default `courier.db`
    pub db_path: PathBuf,

    /// Time between store probes.
    /// Env: `COURIER_PROBE_INTERVAL_SECS`, default `5`
    pub probe_interval: Duration,

    /// Re-probes after a failed probe before the store counts as down.
    /// Env: `COURIER_PROBE_RETRIES`, default `3`
    pub probe_retries: u32,

    /// Registry poll period while draining.
    /// Env: `COURIER_DRAIN_POLL_MS`, default `10`
    pub drain_poll: Duration,

    /// Ring the terminal bell on notices instead of logging them.
    /// Env: `COURIER_BELL` (true/false), default `false`
    pub bell: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let supervisor = SupervisorConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 13013,
            db_path: PathBuf::from("courier.db"),
            probe_interval: supervisor.probe_interval,
            probe_retries: supervisor.probe_retries,
            drain_poll: supervisor.drain_poll,
            bell: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("COURIER_HOST") {
            config.host = host;
        }
        if let Some(port) = parsed(&lookup, "COURIER_PORT") {
            config.port = port;
        }
        if let Some(path) = lookup("COURIER_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(secs) = parsed(&lookup, "COURIER_PROBE_INTERVAL_SECS") {
            if secs == 0 {
                tracing::warn!("COURIER_PROBE_INTERVAL_SECS must be positive, using default");
            } else {
                config.probe_interval = Duration::from_secs(secs);
            }
        }
        if let Some(retries) = parsed(&lookup, "COURIER_PROBE_RETRIES") {
            config.probe_retries = retries;
        }
        if let Some(ms) = parsed(&lookup, "COURIER_DRAIN_POLL_MS") {
            if ms == 0 {
                tracing::warn!("COURIER_DRAIN_POLL_MS must be positive, using default");
            } else {
                config.drain_poll = Duration::from_millis(ms);
            }
        }
        if let Some(val) = lookup("COURIER_BELL") {
            config.bell = val == "true" || val == "1";
        }

        config
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            probe_interval: self.probe_interval,
            probe_retries: self.probe_retries,
            drain_poll: self.drain_poll,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(value = %raw, "Invalid {}, using default", key);
            None
        }
    }
}
