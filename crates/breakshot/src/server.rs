//! `BreakshotServer` builder and server loop.
//!
//! This is the entry point for running a match. It ties together all the
//! layers: transport → protocol → session → match.

use std::sync::Arc;
use std::time::{Duration, Instant};

use breakshot_match::{
    BroadcastHub, MatchConfig, MatchHandle, MatchSummary, SpectatorConfig, spawn_match,
};
use breakshot_protocol::{Codec, JsonCodec};
use breakshot_session::SessionRegistry;
use breakshot_table::PhysicsAdapter;
use breakshot_transport::{Transport, WebSocketTransport};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::handler::handle_connection;
use crate::{BreakshotError, ServerConfig};

/// How long connections get to wind down once the match is over.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) hub: Arc<BroadcastHub>,
    pub(crate) matches: MatchHandle,
    pub(crate) codec: C,
    started: Instant,
}

impl<C: Codec> ServerState<C> {
    /// Milliseconds since the server started, for envelope timestamps.
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Builder for configuring and starting a Breakshot server.
///
/// # Example
///
/// ```rust,ignore
/// use breakshot::prelude::*;
///
/// let server = BreakshotServer::builder()
///     .bind("0.0.0.0:9000")
///     .match_config(MatchConfig { race_to: 7, ..MatchConfig::default() })
///     .build(RandomPhysics::new(42))
///     .await?;
/// let summary = server.run().await?;
/// ```
pub struct BreakshotServerBuilder {
    config: ServerConfig,
}

impl BreakshotServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    pub fn match_config(mut self, config: MatchConfig) -> Self {
        self.config.match_config = config;
        self
    }

    pub fn spectators(mut self, config: SpectatorConfig) -> Self {
        self.config.spectators = config;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Binds the listener and starts the match actor with `physics`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(
        self,
        physics: impl PhysicsAdapter,
    ) -> Result<BreakshotServer<JsonCodec>, BreakshotError> {
        let config = self.config.validated();
        let transport = WebSocketTransport::bind(&config.bind).await?;

        let registry = Arc::new(SessionRegistry::new(config.match_config.seats));
        let hub = Arc::new(BroadcastHub::new(config.spectators.clone()));
        let physics: Arc<dyn PhysicsAdapter> = Arc::new(physics);
        let (matches, match_task) = spawn_match(
            config.match_config.clone(),
            physics,
            Arc::clone(&registry),
            Arc::clone(&hub),
        );

        let state = Arc::new(ServerState {
            config,
            registry,
            hub,
            matches,
            codec: JsonCodec,
            started: Instant::now(),
        });

        Ok(BreakshotServer {
            transport,
            state,
            match_task,
        })
    }
}

impl Default for BreakshotServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Breakshot server hosting exactly one match.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BreakshotServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
    match_task: JoinHandle<MatchSummary>,
}

impl<C: Codec> BreakshotServer<C> {
    /// Creates a new builder.
    pub fn builder() -> BreakshotServerBuilder {
        BreakshotServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the match, e.g. to shut it down from a signal handler.
    pub fn match_handle(&self) -> MatchHandle {
        self.state.matches.clone()
    }

    /// Runs the accept loop until the match ends.
    ///
    /// Each accepted socket gets its own handler task. Once the match
    /// reaches a terminal phase the listener stops, open connections are
    /// given a moment to receive their final events and close, and the
    /// match summary is returned.
    pub async fn run(self) -> Result<MatchSummary, BreakshotError> {
        let Self {
            mut transport,
            state,
            mut match_task,
        } = self;
        let mut connections = JoinSet::new();
        info!(
            race_to = state.config.match_config.race_to,
            seats = state.config.match_config.seats,
            "Breakshot server running"
        );

        let summary = loop {
            tokio::select! {
                summary = &mut match_task => break summary?,
                accepted = transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&state);
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
            }
            // Reap finished handlers so the set does not grow without bound.
            while connections.try_join_next().is_some() {}
        };

        info!(phase = %summary.phase, open = connections.len(), "match over, draining connections");
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(open = connections.len(), "connections still open after drain timeout, aborting");
            connections.abort_all();
        }

        Ok(summary)
    }
}
