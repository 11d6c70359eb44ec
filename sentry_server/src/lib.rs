// THEORY:
// `sentry_server` is the network half of the sentry. It accepts WebSocket
// connections from actuators, fans every motion command out to all of them,
// and turns what they report back into `ServerEvent`s for whoever is watching.
//
// All of it runs on one dedicated OS thread with a single-threaded tokio
// runtime:
// - the `NetworkActor` owns the client registry and the correlation table;
//   nothing else touches them, so no locks are needed
// - each connection is its own task, talking to the actor over channels
// - the capture loop reaches in only through `CommandSender`, a bounded queue
//   whose blocking path is capped by a timeout
//
// Shutdown is a `watch` flag: the actor, the accept loop and every connection
// task stop when it flips, and `ServerHandle` joins the thread.

pub mod connection;
pub mod correlation;
pub mod error;
pub mod events;
pub mod network;
pub mod registry;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sentry_vision::ConfigError;

pub use error::ServerError;
pub use events::{DisconnectReason, EventBus, ServerEvent};
pub use network::{CommandSender, ServerHandle, spawn};
pub use registry::ClientId;

/// Network server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port; 0 picks a free port
    pub port: u16,
    /// Interval between keep-alive pings
    pub ping_interval_ms: u64,
    /// How long a client may take to answer a ping
    pub pong_timeout_ms: u64,
    /// Outbound messages buffered per client before it counts as too slow
    pub client_queue: usize,
    /// Commands buffered between the capture loop and the network loop
    pub command_queue: usize,
    /// Commands remembered for ACK/STATUS correlation
    pub correlation_capacity: usize,
    /// Events buffered per subscriber
    pub event_capacity: usize,
    /// Longest `CommandSender::submit` may wait on a full queue
    pub handoff_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ping_interval_ms: 5000,
            pong_timeout_ms: 2000,
            client_queue: 32,
            command_queue: 64,
            correlation_capacity: 256,
            event_capacity: 256,
            handoff_timeout_ms: 100,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("server.ping_interval_ms", self.ping_interval_ms as usize),
            ("server.pong_timeout_ms", self.pong_timeout_ms as usize),
            ("server.client_queue", self.client_queue),
            ("server.command_queue", self.command_queue),
            ("server.correlation_capacity", self.correlation_capacity),
            ("server.event_capacity", self.event_capacity),
            ("server.handoff_timeout_ms", self.handoff_timeout_ms as usize),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "Value must be greater than 0".to_string(),
                });
            }
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server.host".to_string(),
                message: "Host must not be empty".to_string(),
            });
        }

        if self.pong_timeout_ms >= self.ping_interval_ms {
            return Err(ConfigError::InvalidValue {
                field: "server.pong_timeout_ms".to_string(),
                message: "Pong timeout must be shorter than the ping interval".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.ping_interval(), Duration::from_secs(5));
        assert_eq!(config.pong_timeout(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_server_config() {
        let config = ServerConfig {
            client_queue: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "server.client_queue"
        ));

        let config = ServerConfig {
            pong_timeout_ms: 6000,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
