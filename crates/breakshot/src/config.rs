//! Server-wide configuration.

use std::time::Duration;

use breakshot_match::{MatchConfig, SpectatorConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Everything needed to stand up one match server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind: String,
    pub match_config: MatchConfig,
    pub spectators: SpectatorConfig,
    /// How long a new connection has to send its handshake.
    pub handshake_timeout: Duration,
    /// Closes connections that send nothing for this long. `None` keeps
    /// quiet connections open; the turn clock already bounds players.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            match_config: MatchConfig::default(),
            spectators: SpectatorConfig::default(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Fixes any out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.handshake_timeout.is_zero() {
            warn!("handshake_timeout of 0 would reject every client, using 5s");
            self.handshake_timeout = Duration::from_secs(5);
        }
        if self.idle_timeout.is_some_and(|d| d.is_zero()) {
            warn!("idle_timeout of 0 disables idle detection");
            self.idle_timeout = None;
        }
        self.match_config = self.match_config.validated();
        self
    }
}
