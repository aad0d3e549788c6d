//! Server Configuration
//!
//! Bind address, write semantics, persistence and session limits. Loaded
//! from an optional JSON file; every field has a default.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::server::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: "127.0.0.1")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 8800)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Merge full-document writes into the stored document
    #[serde(default)]
    pub force_patch: bool,

    /// Journal directory; `None` keeps everything in memory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Outbound queue capacity per session (default: 256)
    #[serde(default = "default_session_queue_capacity")]
    pub session_queue_capacity: usize,

    /// Subscription cap per session (default: 100)
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_session: usize,

    /// Clock stream interval in milliseconds (default: 1000)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// CORS allowed origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8800
}

fn default_session_queue_capacity() -> usize {
    256
}

fn default_max_subscriptions() -> usize {
    100
}

fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            force_patch: false,
            data_dir: None,
            session_queue_capacity: default_session_queue_capacity(),
            max_subscriptions_per_session: default_max_subscriptions(),
            tick_interval_ms: default_tick_interval_ms(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            ServerError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> ServerResult<()> {
        if self.session_queue_capacity == 0 {
            return Err(ServerError::Config(
                "session_queue_capacity must be at least 1".into(),
            ));
        }
        if self.max_subscriptions_per_session == 0 {
            return Err(ServerError::Config(
                "max_subscriptions_per_session must be at least 1".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ServerError::Config(
                "tick_interval_ms must be at least 1".into(),
            ));
        }
        self.socket_addr().map(|_| ())
    }

    /// Apply a `host:port` override.
    pub fn set_addr(&mut self, addr: &str) -> ServerResult<()> {
        let parsed: SocketAddr = addr
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid address '{}': {}", addr, e)))?;
        self.host = parsed.ip().to_string();
        self.port = parsed.port();
        Ok(())
    }

    /// Get the socket address. `host` is a bare IP, v4 or v6.
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|e| {
            ServerError::Config(format!("Invalid host '{}': {}", self.host, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
