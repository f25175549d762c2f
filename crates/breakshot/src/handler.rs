//! Per-connection handler: handshake, admission, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Player: register or resume a seat → send Welcome → bind the seat
//!      Spectator: subscribe → send SpectatorWelcome with a snapshot
//!   3. Loop: inbound frames, outbound match traffic, sever signal

use std::sync::Arc;
use std::time::Duration;

use breakshot_match::{MatchHandle, Spectation, SpectatorReceiver};
use breakshot_protocol::{
    ClientMessage, Codec, Envelope, ErrorCode, MatchSnapshot, PROTOCOL_VERSION, PlayerId,
    ProtocolError, Role, Seat, Secret, ServerMessage, SpectatorId,
};
use breakshot_session::{Admission, SessionRegistry};
use breakshot_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::BreakshotError;
use crate::server::ServerState;

/// Drop guard that unbinds a player's connection when the handler exits.
///
/// Runs even if the handler panics. Since `Drop` is synchronous, it
/// spawns a fire-and-forget task for the async work. Both the registry
/// and the match ignore the call if `conn` has already been superseded.
struct SeatGuard {
    player_id: PlayerId,
    seat: Seat,
    conn: ConnectionId,
    registry: Arc<SessionRegistry>,
    matches: MatchHandle,
}

impl Drop for SeatGuard {
    fn drop(&mut self) {
        let (player_id, seat, conn) = (self.player_id, self.seat, self.conn);
        let registry = Arc::clone(&self.registry);
        let matches = self.matches.clone();
        tokio::spawn(async move {
            registry.detach(player_id, conn).await;
            let _ = matches.seat_disconnected(seat, conn).await;
        });
    }
}

/// The validated first frame.
struct Hello {
    role: Role,
    name: String,
    secret: Option<Secret>,
}

/// What the handler loop should do after a frame.
enum Flow {
    Continue,
    Close,
}

/// Writes sequenced server envelopes to one connection.
struct Outbox<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    state: &'a ServerState<C>,
    seq: u64,
}

impl<'a, C: Codec> Outbox<'a, C> {
    fn new(conn: &'a WebSocketConnection, state: &'a ServerState<C>) -> Self {
        Self { conn, state, seq: 0 }
    }

    async fn send(&mut self, message: ServerMessage) -> Result<(), BreakshotError> {
        let envelope = Envelope::new(self.seq, self.state.elapsed_ms(), message);
        self.seq += 1;
        let bytes = self.state.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn error(&mut self, code: ErrorCode, message: &str) -> Result<(), BreakshotError> {
        self.send(ServerMessage::Error {
            code,
            message: message.to_string(),
        })
        .await
    }

    /// Tells the client why it is being dropped. Best effort.
    async fn disconnect(&mut self, reason: &str) {
        let _ = self
            .send(ServerMessage::Disconnect {
                reason: reason.to_string(),
            })
            .await;
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), BreakshotError> {
    let conn_id = conn.id();
    debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let mut out = Outbox::new(&conn, &state);
    let result = match perform_handshake(&mut out).await {
        Ok(hello) => match hello.role {
            Role::Player => run_player(&mut out, hello).await,
            Role::Spectator => run_spectator(&mut out, hello).await,
        },
        Err(e) => Err(e),
    };

    let _ = conn.close().await;
    debug!(%conn_id, "connection closed");
    result
}

/// Receives and validates the Handshake frame.
async fn perform_handshake<C: Codec>(out: &mut Outbox<'_, C>) -> Result<Hello, BreakshotError> {
    let timeout = out.state.config.handshake_timeout;
    let data = match tokio::time::timeout(timeout, out.conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            out.error(ErrorCode::Malformed, "handshake timed out").await?;
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope<ClientMessage> = match out.state.codec.decode(&data) {
        Ok(envelope) => envelope,
        Err(e) => {
            out.error(ErrorCode::Malformed, &e.to_string()).await?;
            return Err(e.into());
        }
    };

    let ClientMessage::Handshake {
        version,
        role,
        name,
        secret,
    } = envelope.message
    else {
        out.error(ErrorCode::Malformed, "expected Handshake").await?;
        return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
    };

    if version != PROTOCOL_VERSION {
        out.error(
            ErrorCode::VersionMismatch,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    Ok(Hello { role, name, secret })
}

/// Admits a player and runs its message loop.
async fn run_player<C: Codec>(out: &mut Outbox<'_, C>, hello: Hello) -> Result<(), BreakshotError> {
    let state = out.state;
    let conn_id = out.conn.id();

    let admission = match &hello.secret {
        Some(secret) => state.registry.resume(secret, conn_id).await,
        None => state.registry.register(&hello.name, conn_id).await,
    };
    let Admission {
        player,
        secret,
        mut severed,
    } = match admission {
        Ok(admission) => admission,
        Err(e) => {
            info!(%conn_id, name = %hello.name, error = %e, "player rejected");
            out.error(e.code(), &e.to_string()).await?;
            return Err(e.into());
        }
    };

    let _guard = SeatGuard {
        player_id: player.id,
        seat: player.seat,
        conn: conn_id,
        registry: Arc::clone(&state.registry),
        matches: state.matches.clone(),
    };

    let match_config = &state.config.match_config;
    out.send(ServerMessage::Welcome {
        player_id: player.id,
        secret,
        seat: player.seat,
        seats: match_config.seats,
        race_to: match_config.race_to,
    })
    .await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Err(e) = state
        .matches
        .seat_connected(player.seat, player.id, &player.name, conn_id, tx)
        .await
    {
        out.error(e.code(), &e.to_string()).await?;
        return Err(e.into());
    }
    info!(%conn_id, player_id = %player.id, seat = %player.seat, "player connected");

    let idle = state.config.idle_timeout;
    let mut last_seen = Instant::now();
    let mut sever_pending = true;

    loop {
        tokio::select! {
            inbound = out.conn.recv() => {
                let data = match inbound {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        info!(player_id = %player.id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        debug!(player_id = %player.id, error = %e, "recv error");
                        break;
                    }
                };
                last_seen = Instant::now();
                if let Flow::Close = handle_player_frame(out, player.seat, &data).await? {
                    break;
                }
            }
            outbound = rx.recv() => match outbound {
                Some(message) => out.send(message).await?,
                None => {
                    let reason = if state.registry.match_ended().await {
                        "match over"
                    } else {
                        "superseded"
                    };
                    out.disconnect(reason).await;
                    break;
                }
            },
            result = &mut severed, if sever_pending => {
                sever_pending = false;
                if result.is_ok() {
                    info!(player_id = %player.id, %conn_id, "connection superseded by a resume");
                    out.disconnect("superseded").await;
                    break;
                }
            }
            () = idle_expired(last_seen, idle) => {
                info!(player_id = %player.id, "connection idle, closing");
                out.disconnect("idle timeout").await;
                break;
            }
        }
    }

    // _guard drops here → detach and notify the match.
    Ok(())
}

async fn handle_player_frame<C: Codec>(
    out: &mut Outbox<'_, C>,
    seat: Seat,
    data: &[u8],
) -> Result<Flow, BreakshotError> {
    let envelope: Envelope<ClientMessage> = match out.state.codec.decode(data) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(%seat, error = %e, "failed to decode envelope");
            out.error(ErrorCode::Malformed, &e.to_string()).await?;
            return Ok(Flow::Continue);
        }
    };

    match envelope.message {
        ClientMessage::Shot { request_id, shot } => {
            let conn_id = out.conn.id();
            match out.state.matches.submit_shot(seat, conn_id, request_id, shot).await {
                Ok(summary) => out.send(ServerMessage::ShotAck { request_id, summary }).await?,
                Err(e) => out.error(e.code(), &e.to_string()).await?,
            }
        }
        ClientMessage::Heartbeat { client_time } => heartbeat(out, client_time).await?,
        ClientMessage::Disconnect { reason } => {
            info!(%seat, %reason, "client disconnected");
            return Ok(Flow::Close);
        }
        ClientMessage::Handshake { .. } => {
            out.error(ErrorCode::Malformed, "already handshaken").await?;
        }
    }
    Ok(Flow::Continue)
}

/// Subscribes a spectator and streams events to it until the match ends,
/// the spectator falls behind, or it leaves. Its hub slot is released on
/// every exit path.
async fn run_spectator<C: Codec>(out: &mut Outbox<'_, C>, hello: Hello) -> Result<(), BreakshotError> {
    let state = out.state;
    let conn_id = out.conn.id();

    let Spectation {
        spectator_id,
        snapshot,
        events,
    } = match state.matches.spectate().await {
        Ok(spectation) => spectation,
        Err(e) => {
            info!(%conn_id, error = %e, "spectator rejected");
            out.error(e.code(), &e.to_string()).await?;
            return Err(e.into());
        }
    };
    info!(%conn_id, %spectator_id, name = %hello.name, "spectator connected");

    let result = stream_to_spectator(out, spectator_id, snapshot, events).await;
    state.hub.unsubscribe(spectator_id).await;
    info!(%spectator_id, "spectator left");
    result
}

async fn stream_to_spectator<C: Codec>(
    out: &mut Outbox<'_, C>,
    spectator_id: SpectatorId,
    snapshot: MatchSnapshot,
    mut events: SpectatorReceiver,
) -> Result<(), BreakshotError> {
    let state = out.state;
    out.send(ServerMessage::SpectatorWelcome {
        spectator_id,
        snapshot,
    })
    .await?;

    let idle = state.config.idle_timeout;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            inbound = out.conn.recv() => {
                let data = match inbound {
                    Ok(Some(data)) => data,
                    Ok(None) | Err(_) => break,
                };
                last_seen = Instant::now();
                let message = match state.codec.decode::<Envelope<ClientMessage>>(&data) {
                    Ok(envelope) => envelope.message,
                    Err(e) => {
                        out.error(ErrorCode::Malformed, &e.to_string()).await?;
                        continue;
                    }
                };
                match message {
                    ClientMessage::Heartbeat { client_time } => heartbeat(out, client_time).await?,
                    ClientMessage::Shot { .. } => {
                        out.error(ErrorCode::OutOfTurn, "spectators cannot shoot").await?;
                    }
                    ClientMessage::Disconnect { .. } => break,
                    ClientMessage::Handshake { .. } => {
                        out.error(ErrorCode::Malformed, "already handshaken").await?;
                    }
                }
            }
            event = events.recv() => match event {
                Some(event) => out.send(ServerMessage::Event((*event).clone())).await?,
                None => {
                    let reason = if state.registry.match_ended().await {
                        "match over"
                    } else {
                        "too slow"
                    };
                    out.disconnect(reason).await;
                    break;
                }
            },
            () = idle_expired(last_seen, idle) => {
                out.disconnect("idle timeout").await;
                break;
            }
        }
    }
    Ok(())
}

async fn heartbeat<C: Codec>(out: &mut Outbox<'_, C>, client_time: u64) -> Result<(), BreakshotError> {
    let server_time = out.state.elapsed_ms();
    out.send(ServerMessage::HeartbeatAck {
        client_time,
        server_time,
    })
    .await
}

/// Resolves once nothing has arrived for `idle`. Pends forever without
/// an idle timeout.
async fn idle_expired(last_seen: Instant, idle: Option<Duration>) {
    match idle {
        Some(idle) => tokio::time::sleep_until(last_seen + idle).await,
        None => std::future::pending().await,
    }
}
