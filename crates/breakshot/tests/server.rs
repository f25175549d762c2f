//! End-to-end tests: a real server on a random port, driven by
//! `tokio-tungstenite` clients.

use std::time::Duration;

use breakshot::prelude::*;
use breakshot_protocol::{PlayerId, SpectatorId};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

type ServerTask = JoinHandle<Result<MatchSummary, BreakshotError>>;

fn match_config() -> MatchConfig {
    MatchConfig {
        race_to: 1,
        first_break: FirstBreak::Seat(Seat(0)),
        turn_timeout: None,
        ..MatchConfig::default()
    }
}

/// Starts a server on a random port and returns the address and its task.
async fn start_server(config: MatchConfig, spectators: SpectatorConfig, scripts: Vec<Script>) -> (String, ServerTask) {
    let server = BreakshotServer::<breakshot_protocol::JsonCodec>::builder()
        .bind("127.0.0.1:0")
        .match_config(config)
        .spectators(spectators)
        .build(ScriptedPhysics::with_scripts(scripts))
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr").to_string();
    let task = tokio::spawn(server.run());

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, task)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, message: ClientMessage) {
    let bytes = serde_json::to_vec(&Envelope::new(0, 0, message)).expect("encode");
    ws.send(Message::Binary(bytes.into())).await.expect("send");
}

/// Next server message, skipping control frames.
async fn recv(ws: &mut ClientWs) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a server message")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Binary(_) | Message::Text(_) => {
                let envelope: Envelope<ServerMessage> =
                    serde_json::from_slice(&frame.into_data()).expect("decode");
                return envelope.message;
            }
            Message::Close(_) => panic!("server closed the connection"),
            _ => continue,
        }
    }
}

/// Skips messages until `pick` accepts one.
async fn recv_until<T>(ws: &mut ClientWs, mut pick: impl FnMut(ServerMessage) -> Option<T>) -> T {
    loop {
        if let Some(found) = pick(recv(ws).await) {
            return found;
        }
    }
}

/// Waits for the server to close the socket.
async fn closed(ws: &mut ClientWs) {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close");
        match frame {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(_)) => continue,
        }
    }
}

async fn shot_request(ws: &mut ClientWs) -> u64 {
    recv_until(ws, |m| match m {
        ServerMessage::ShotRequest { request_id, .. } => Some(request_id),
        _ => None,
    })
    .await
}

async fn error_code(ws: &mut ClientWs) -> ErrorCode {
    recv_until(ws, |m| match m {
        ServerMessage::Error { code, .. } => Some(code),
        _ => None,
    })
    .await
}

fn handshake(role: Role, name: &str, secret: Option<Secret>) -> ClientMessage {
    ClientMessage::Handshake {
        version: PROTOCOL_VERSION,
        role,
        name: name.to_string(),
        secret,
    }
}

fn shot(request_id: u64) -> ClientMessage {
    ClientMessage::Shot {
        request_id,
        shot: ShotDescriptor {
            speed: 3.0,
            phi: 90.0,
            theta: 0.0,
            a: 0.0,
            b: 0.0,
            cue_ball_position: None,
        },
    }
}

struct Joined {
    ws: ClientWs,
    player_id: PlayerId,
    secret: Secret,
    seat: Seat,
}

async fn join(addr: &str, name: &str) -> Joined {
    let mut ws = connect(addr).await;
    send(&mut ws, handshake(Role::Player, name, None)).await;
    match recv(&mut ws).await {
        ServerMessage::Welcome {
            player_id,
            secret,
            seat,
            ..
        } => Joined {
            ws,
            player_id,
            secret,
            seat,
        },
        other => panic!("expected Welcome, got {other:?}"),
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_assigns_seats_in_order() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;

    let a = join(&addr, "efren").await;
    let b = join(&addr, "earl").await;

    assert_eq!(a.seat, Seat(0));
    assert_eq!(b.seat, Seat(1));
    assert_ne!(a.player_id, b.player_id);
    assert_ne!(a.secret, b.secret);
}

#[tokio::test]
async fn test_handshake_version_mismatch_rejected() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;

    let mut ws = connect(&addr).await;
    send(
        &mut ws,
        ClientMessage::Handshake {
            version: PROTOCOL_VERSION + 1,
            role: Role::Player,
            name: "efren".into(),
            secret: None,
        },
    )
    .await;

    assert_eq!(error_code(&mut ws).await, ErrorCode::VersionMismatch);
}

#[tokio::test]
async fn test_handshake_must_come_first() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;

    let mut ws = connect(&addr).await;
    send(&mut ws, ClientMessage::Heartbeat { client_time: 1 }).await;

    assert_eq!(error_code(&mut ws).await, ErrorCode::Malformed);
}

#[tokio::test]
async fn test_handshake_garbage_rejected() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;

    let mut ws = connect(&addr).await;
    ws.send(Message::Text("not json".into())).await.unwrap();

    assert_eq!(error_code(&mut ws).await, ErrorCode::Malformed);
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;
    let _a = join(&addr, "efren").await;

    let mut ws = connect(&addr).await;
    send(&mut ws, handshake(Role::Player, "efren", None)).await;
    assert_eq!(error_code(&mut ws).await, ErrorCode::DuplicateName);
}

#[tokio::test]
async fn test_unknown_secret_rejected() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;

    let mut ws = connect(&addr).await;
    send(&mut ws, handshake(Role::Player, "efren", Some(Secret::new("0123abcd")))).await;
    assert_eq!(error_code(&mut ws).await, ErrorCode::UnknownSecret);
}

#[tokio::test]
async fn test_third_player_rejected_when_seats_full() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;
    let _a = join(&addr, "efren").await;
    let _b = join(&addr, "earl").await;

    let mut ws = connect(&addr).await;
    send(&mut ws, handshake(Role::Player, "shane", None)).await;
    assert_eq!(error_code(&mut ws).await, ErrorCode::SeatsFull);
}

#[tokio::test]
async fn test_heartbeat_answered() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;
    let mut a = join(&addr, "efren").await;

    send(&mut a.ws, ClientMessage::Heartbeat { client_time: 1234 }).await;
    let echoed = recv_until(&mut a.ws, |m| match m {
        ServerMessage::HeartbeatAck { client_time, .. } => Some(client_time),
        _ => None,
    })
    .await;
    assert_eq!(echoed, 1234);
}

// =========================================================================
// Match flow
// =========================================================================

#[tokio::test]
async fn test_full_match_over_websocket() {
    let (addr, server) = start_server(match_config(), SpectatorConfig::default(), vec![Script::pot([9])]).await;
    let mut a = join(&addr, "efren").await;
    let mut b = join(&addr, "earl").await;

    let request_id = shot_request(&mut a.ws).await;
    send(&mut a.ws, shot(request_id)).await;

    let summary = recv_until(&mut a.ws, |m| match m {
        ServerMessage::ShotAck { request_id: id, summary } if id == request_id => Some(summary),
        _ => None,
    })
    .await;
    assert_eq!(summary.shooter, Seat(0));
    assert_eq!(summary.foul, None);

    // The other player sees the match end, then gets dropped.
    let phase = recv_until(&mut b.ws, |m| match m {
        ServerMessage::Event(StateEvent {
            event: MatchEvent::MatchOver { phase, .. },
            ..
        }) => Some(phase),
        _ => None,
    })
    .await;
    assert_eq!(phase, MatchPhase::Completed { winner: Seat(0) });

    let reason = recv_until(&mut b.ws, |m| match m {
        ServerMessage::Disconnect { reason } => Some(reason),
        _ => None,
    })
    .await;
    assert_eq!(reason, "match over");

    let result = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("server should stop after the match")
        .unwrap()
        .unwrap();
    assert_eq!(result.phase, MatchPhase::Completed { winner: Seat(0) });
    assert_eq!(result.games_played, 1);
}

#[tokio::test]
async fn test_out_of_turn_shot_rejected_over_wire() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;
    let mut a = join(&addr, "efren").await;
    let mut b = join(&addr, "earl").await;

    let request_id = shot_request(&mut a.ws).await;
    send(&mut b.ws, shot(request_id)).await;
    assert_eq!(error_code(&mut b.ws).await, ErrorCode::OutOfTurn);

    // The rightful shooter is unaffected.
    send(&mut a.ws, shot(request_id)).await;
    let acked = recv_until(&mut a.ws, |m| match m {
        ServerMessage::ShotAck { request_id, .. } => Some(request_id),
        _ => None,
    })
    .await;
    assert_eq!(acked, request_id);
}

#[tokio::test]
async fn test_resume_supersedes_old_connection() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;
    let mut a = join(&addr, "efren").await;
    let _b = join(&addr, "earl").await;
    let request_id = shot_request(&mut a.ws).await;

    let mut resumed = connect(&addr).await;
    send(&mut resumed, handshake(Role::Player, "efren", Some(a.secret.clone()))).await;
    match recv(&mut resumed).await {
        ServerMessage::Welcome { player_id, seat, .. } => {
            assert_eq!(player_id, a.player_id);
            assert_eq!(seat, a.seat);
        }
        other => panic!("expected Welcome, got {other:?}"),
    }

    let reason = recv_until(&mut a.ws, |m| match m {
        ServerMessage::Disconnect { reason } => Some(reason),
        _ => None,
    })
    .await;
    assert_eq!(reason, "superseded");

    // The pending request is re-sent, same id.
    assert_eq!(shot_request(&mut resumed).await, request_id);
    send(&mut resumed, shot(request_id)).await;
    let acked = recv_until(&mut resumed, |m| match m {
        ServerMessage::ShotAck { request_id, .. } => Some(request_id),
        _ => None,
    })
    .await;
    assert_eq!(acked, request_id);
}

#[tokio::test]
async fn test_rejoining_player_gets_match_state() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;
    let mut a = join(&addr, "efren").await;
    let b = join(&addr, "earl").await;
    shot_request(&mut a.ws).await;

    let mut resumed = connect(&addr).await;
    send(&mut resumed, handshake(Role::Player, "earl", Some(b.secret.clone()))).await;
    assert!(matches!(recv(&mut resumed).await, ServerMessage::Welcome { .. }));

    match recv(&mut resumed).await {
        ServerMessage::MatchState { snapshot } => {
            assert_eq!(snapshot.phase, MatchPhase::InProgress);
            assert_eq!(snapshot.table.map(|t| t.turn), Some(a.seat));
        }
        other => panic!("expected MatchState, got {other:?}"),
    }
}

// =========================================================================
// Spectators
// =========================================================================

#[tokio::test]
async fn test_spectator_gets_snapshot_then_events() {
    let (addr, _server) = start_server(match_config(), SpectatorConfig::default(), vec![]).await;
    let mut a = join(&addr, "efren").await;
    let _b = join(&addr, "earl").await;
    let request_id = shot_request(&mut a.ws).await;

    let mut spectator = connect(&addr).await;
    send(&mut spectator, handshake(Role::Spectator, "rail", None)).await;
    let (spectator_id, snapshot) = match recv(&mut spectator).await {
        ServerMessage::SpectatorWelcome {
            spectator_id,
            snapshot,
        } => (spectator_id, snapshot),
        other => panic!("expected SpectatorWelcome, got {other:?}"),
    };
    assert_ne!(spectator_id, SpectatorId(0));
    assert_eq!(snapshot.phase, MatchPhase::InProgress);
    assert!(snapshot.table.is_some());

    send(&mut a.ws, shot(request_id)).await;
    let event = recv_until(&mut spectator, |m| match m {
        ServerMessage::Event(event) => Some(event),
        _ => None,
    })
    .await;
    assert_eq!(event.seq, snapshot.last_event_seq + 1);
    assert!(matches!(event.event, MatchEvent::ShotResult { .. }));

    send(&mut spectator, shot(request_id + 1)).await;
    assert_eq!(error_code(&mut spectator).await, ErrorCode::OutOfTurn);
}

#[tokio::test]
async fn test_spectator_rejected_when_disabled() {
    let spectators = SpectatorConfig {
        enabled: false,
        ..SpectatorConfig::default()
    };
    let (addr, _server) = start_server(match_config(), spectators, vec![]).await;

    let mut ws = connect(&addr).await;
    send(&mut ws, handshake(Role::Spectator, "rail", None)).await;
    assert_eq!(error_code(&mut ws).await, ErrorCode::SpectatingDisabled);
}

#[tokio::test]
async fn test_departed_spectator_frees_its_slot() {
    let spectators = SpectatorConfig {
        max_spectators: 1,
        ..SpectatorConfig::default()
    };
    let (addr, _server) = start_server(match_config(), spectators, vec![]).await;

    let mut first = connect(&addr).await;
    send(&mut first, handshake(Role::Spectator, "rail", None)).await;
    assert!(matches!(recv(&mut first).await, ServerMessage::SpectatorWelcome { .. }));

    let mut turned_away = connect(&addr).await;
    send(&mut turned_away, handshake(Role::Spectator, "rail-2", None)).await;
    assert_eq!(error_code(&mut turned_away).await, ErrorCode::SpectatorsFull);

    send(&mut first, ClientMessage::Disconnect { reason: "bye".into() }).await;
    closed(&mut first).await;

    let mut second = connect(&addr).await;
    send(&mut second, handshake(Role::Spectator, "rail-3", None)).await;
    assert!(matches!(recv(&mut second).await, ServerMessage::SpectatorWelcome { .. }));
}
