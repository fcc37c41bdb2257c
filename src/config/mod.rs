//! Server configuration.
//!
//! [`ServerConfig`] can be built in code, deserialized from JSON, or loaded from
//! the environment with [`ServerConfig::from_env`]:
//!
//! | Variable                   | Field                 |
//! |----------------------------|-----------------------|
//! | `POLLHTTP_CONFIG`          | path of a JSON file loaded first |
//! | `POLLHTTP_HOST`            | `host`                |
//! | `POLLHTTP_PORT`            | `port`                |
//! | `POLLHTTP_READ_BUFFER`     | `read_buffer_size`    |
//! | `POLLHTTP_WORKERS`         | `worker_threads`      |
//! | `POLLHTTP_HANDLER_THREADS` | `max_handler_threads` |
//!
//! Socket options of accepted connections are fixed and not part of the config.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::http::response::DEFAULT_SERVER_NAME;

/// Errors produced while loading or validating a [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("environment variable {var} has invalid value {value:?}")]
    Env { var: &'static str, value: String },

    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },

    #[error("could not resolve listen address {0}")]
    Resolve(String),
}

/// Settings for a [`Server`](crate::server::Server).
///
/// # Examples
///
/// ```
/// use pollhttp::config::ServerConfig;
///
/// let config = ServerConfig::from_json_str(r#"{ "port": 8080 }"#).unwrap();
/// assert_eq!(config.port, 8080);
/// assert_eq!(config.read_buffer_size, 2048);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub host: String,
    /// Port the listener binds to. `0` picks an ephemeral port.
    pub port: u16,
    /// Capacity of the single read performed per connection.
    pub read_buffer_size: usize,
    /// Async worker threads of the dispatch runtime.
    pub worker_threads: usize,
    /// Upper bound on handlers executing at the same time.
    pub max_handler_threads: usize,
    /// Value of the `Server` response header.
    pub server_name: String,
    /// Readiness events drained per wait.
    pub max_events: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 9999,
            read_buffer_size: 2048,
            worker_threads: 2,
            max_handler_threads: 64,
            server_name: DEFAULT_SERVER_NAME.to_owned(),
            max_events: 1024,
        }
    }
}

impl ServerConfig {
    /// Parses a JSON document. Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Loads the config file named by `POLLHTTP_CONFIG` (or the defaults), then
    /// applies the individual `POLLHTTP_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("POLLHTTP_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(host) = std::env::var("POLLHTTP_HOST") {
            config.host = host;
        }
        override_from_env("POLLHTTP_PORT", &mut config.port)?;
        override_from_env("POLLHTTP_READ_BUFFER", &mut config.read_buffer_size)?;
        override_from_env("POLLHTTP_WORKERS", &mut config.worker_threads)?;
        override_from_env("POLLHTTP_HANDLER_THREADS", &mut config.max_handler_threads)?;

        config.validate()?;
        Ok(config)
    }

    /// Checks that every sizing field is non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("read_buffer_size", self.read_buffer_size),
            ("worker_threads", self.worker_threads),
            ("max_handler_threads", self.max_handler_threads),
            ("max_events", self.max_events),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero",
                });
            }
        }
        Ok(())
    }

    /// Resolves `host:port` to the first matching socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(ConfigError::Resolve(addr))
    }
}

fn override_from_env<T: FromStr>(var: &'static str, slot: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(var) {
        *slot = value
            .parse()
            .map_err(|_| ConfigError::Env { var, value })?;
    }
    Ok(())
}
