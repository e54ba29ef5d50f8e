//! Configuration for the relayer.

use std::time::Duration;

use crate::relay::{connection, DEFAULT_SEND_QUEUE};

const DEFAULT_PING_SECS: u64 = 30;

/// Startup configuration errors. Fatal: nothing is bound when these occur.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid address {0:?}: expected HOST:PORT")]
    MissingPort(String),
    #[error("invalid port {port:?} in address {addr:?}")]
    InvalidPort { addr: String, port: String },
}

/// Relayer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub send_queue: usize,
    pub ping_interval_secs: u64,
}

impl Config {
    /// Parse the listen address and read optional tuning from the environment.
    ///
    /// Optional: RELAY_SEND_QUEUE, RELAY_PING_SECS
    pub fn load(addr: &str) -> Result<Self, ConfigError> {
        let (host, port) = parse_addr(addr)?;
        let send_queue = std::env::var("RELAY_SEND_QUEUE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_SEND_QUEUE);
        let ping_interval_secs = std::env::var("RELAY_PING_SECS")
            .unwrap_or_else(|_| DEFAULT_PING_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_PING_SECS);

        Ok(Self {
            host,
            port,
            send_queue,
            ping_interval_secs,
        })
    }

    /// Address tuple suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }

    pub fn connection_settings(&self) -> connection::Settings {
        connection::Settings {
            ping_interval: (self.ping_interval_secs > 0)
                .then(|| Duration::from_secs(self.ping_interval_secs)),
            ..Default::default()
        }
    }
}

/// Split `HOST:PORT` on its last colon. An empty host binds every interface.
pub fn parse_addr(addr: &str) -> Result<(String, u16), ConfigError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::MissingPort(addr.to_string()))?;
    let port = port.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
        addr: addr.to_string(),
        port: port.to_string(),
    })?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    Ok((host.to_string(), port))
}
