//! Integration tests for the match actor.
//!
//! Every test drives a real actor through its [`MatchHandle`] with a
//! [`ScriptedPhysics`] engine and paused Tokio time, so clocks fire
//! exactly when the test says they should.

use std::sync::Arc;
use std::time::Duration;

use breakshot_match::{
    BroadcastHub, FirstBreak, ForfeitPolicy, HubError, MatchConfig, MatchError, MatchHandle,
    MatchSummary, SpectatorConfig, TurnError, spawn_match,
};
use breakshot_protocol::{
    BallId, ErrorCode, Foul, MatchEvent, MatchPhase, PlayerId, Seat, Secret, ServerMessage,
    ShotDescriptor, StateEvent,
};
use breakshot_session::SessionRegistry;
use breakshot_table::{Script, ScriptedPhysics};
use breakshot_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    handle: MatchHandle,
    task: JoinHandle<MatchSummary>,
    registry: Arc<SessionRegistry>,
    players: Vec<mpsc::UnboundedReceiver<ServerMessage>>,
    secrets: Vec<Secret>,
}

impl Harness {
    /// Drops `seat`'s connection the way a connection task does on exit.
    async fn disconnect(&self, seat: usize, conn: ConnectionId) {
        self.registry.detach(PlayerId(seat as u64 + 1), conn).await;
        self.handle.seat_disconnected(Seat(seat), conn).await.unwrap();
    }

    /// Resumes `seat` on `conn` in the registry and binds it in the match.
    async fn resume(&self, seat: usize, conn: ConnectionId) -> mpsc::UnboundedReceiver<ServerMessage> {
        self.registry.resume(&self.secrets[seat], conn).await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        self.handle
            .seat_connected(Seat(seat), PlayerId(seat as u64 + 1), &format!("p{seat}"), conn, tx)
            .await
            .unwrap();
        rx
    }
}

fn config() -> MatchConfig {
    MatchConfig {
        race_to: 2,
        first_break: FirstBreak::Seat(Seat(0)),
        turn_timeout: None,
        reconnect_grace: Duration::from_secs(30),
        ..MatchConfig::default()
    }
}

fn conn(seat: usize) -> ConnectionId {
    ConnectionId::new(seat as u64)
}

fn shot() -> ShotDescriptor {
    ShotDescriptor {
        speed: 3.0,
        phi: 90.0,
        theta: 0.0,
        a: 0.0,
        b: 0.0,
        cue_ball_position: None,
    }
}

/// Spawns a match, registers a player per seat, and connects them all,
/// which starts it.
async fn start(config: MatchConfig, scripts: Vec<Script>) -> Harness {
    start_with(config, SpectatorConfig::default(), scripts).await
}

async fn start_with(config: MatchConfig, spectators: SpectatorConfig, scripts: Vec<Script>) -> Harness {
    let seats = config.seats;
    let physics = ScriptedPhysics::with_scripts(scripts);
    let registry = Arc::new(SessionRegistry::new(seats));
    let hub = Arc::new(BroadcastHub::new(spectators));
    let (handle, task) = spawn_match(config, Arc::new(physics), Arc::clone(&registry), hub);

    let mut players = Vec::new();
    let mut secrets = Vec::new();
    for seat in 0..seats {
        let admission = registry.register(&format!("p{seat}"), conn(seat)).await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        handle
            .seat_connected(Seat(seat), admission.player.id, &admission.player.name, conn(seat), tx)
            .await
            .unwrap();
        players.push(rx);
        secrets.push(admission.secret);
    }

    Harness {
        handle,
        task,
        registry,
        players,
        secrets,
    }
}

/// Skips events until a shot request arrives.
async fn expect_request(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> (u64, Option<u64>) {
    loop {
        match rx.recv().await {
            Some(ServerMessage::ShotRequest {
                request_id,
                time_remaining_ms,
                ..
            }) => return (request_id, time_remaining_ms),
            Some(_) => continue,
            None => panic!("player channel closed before a shot request"),
        }
    }
}

/// Everything already queued for a player, events only.
fn drain_events(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<StateEvent> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let ServerMessage::Event(event) = msg {
            events.push(event);
        }
    }
    events
}

// =========================================================================
// Full match
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_match_race_to_two_completes() {
    let mut h = start(config(), vec![Script::pot([9]), Script::pot([9])]).await;

    let (id, _) = expect_request(&mut h.players[0]).await;
    let summary = h.handle.submit_shot(Seat(0), conn(0), id, shot()).await.unwrap();
    assert_eq!(summary.potted, vec![BallId::NINE]);
    assert_eq!(summary.foul, None);

    // The winner breaks the next game.
    let (id, _) = expect_request(&mut h.players[0]).await;
    h.handle.submit_shot(Seat(0), conn(0), id, shot()).await.unwrap();

    let result = h.task.await.unwrap();
    assert_eq!(result.phase, MatchPhase::Completed { winner: Seat(0) });
    assert_eq!(result.games_played, 2);
    assert_eq!(result.standings[0].games_won, 2);
    assert_eq!(result.standings[1].games_won, 0);
    assert!(h.registry.match_ended().await);

    let events = drain_events(&mut h.players[1]);
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=8).collect::<Vec<_>>());
    assert!(matches!(events[0].event, MatchEvent::MatchStarted { race_to: 2, .. }));
    assert!(matches!(events[4].event, MatchEvent::GameStarted { game: 2, breaker: Seat(0), .. }));
    assert!(matches!(events[7].event, MatchEvent::MatchOver { games_played: 2, .. }));

    // Channels close once the match is over.
    assert!(h.players[1].recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_turn_passes_after_miss() {
    let mut h = start(config(), vec![Script::miss()]).await;

    let (id, _) = expect_request(&mut h.players[0]).await;
    let summary = h.handle.submit_shot(Seat(0), conn(0), id, shot()).await.unwrap();
    assert_eq!(summary.next_turn, Seat(1));

    let (next_id, _) = expect_request(&mut h.players[1]).await;
    assert_eq!(next_id, id + 1);
}

// =========================================================================
// Turn enforcement
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_submit_shot_out_of_turn_rejected_without_mutation() {
    let mut h = start(config(), vec![]).await;
    let (id, _) = expect_request(&mut h.players[0]).await;
    let before = h.handle.snapshot().await.unwrap();

    let err = h.handle.submit_shot(Seat(1), conn(1), id, shot()).await.unwrap_err();
    assert_eq!(err, MatchError::Turn(TurnError::OutOfTurn { seat: Seat(1) }));

    // Right seat, wrong connection.
    let err = h
        .handle
        .submit_shot(Seat(0), ConnectionId::new(99), id, shot())
        .await
        .unwrap_err();
    assert_eq!(err, MatchError::Turn(TurnError::OutOfTurn { seat: Seat(0) }));

    let err = h.handle.submit_shot(Seat(0), conn(0), id + 7, shot()).await.unwrap_err();
    assert_eq!(
        err,
        MatchError::Turn(TurnError::StaleRequest {
            expected: Some(id),
            got: id + 7,
        })
    );

    let after = h.handle.snapshot().await.unwrap();
    assert_eq!(before, after);

    h.handle.submit_shot(Seat(0), conn(0), id, shot()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_shot_scored_as_foul() {
    let mut h = start(config(), vec![]).await;
    let (id, _) = expect_request(&mut h.players[0]).await;

    let bad = ShotDescriptor {
        speed: 0.0,
        ..shot()
    };
    let summary = h.handle.submit_shot(Seat(0), conn(0), id, bad).await.unwrap();
    assert!(matches!(summary.foul, Some(Foul::Simulation { .. })));
    assert_eq!(summary.next_turn, Seat(1));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_engine_scored_as_foul() {
    let mut h = start(config(), vec![Script::Panic("engine exploded".into())]).await;
    let (id, _) = expect_request(&mut h.players[0]).await;

    let summary = h.handle.submit_shot(Seat(0), conn(0), id, shot()).await.unwrap();
    match summary.foul {
        Some(Foul::Simulation { reason }) => assert!(reason.contains("engine exploded")),
        other => panic!("expected a simulation foul, got {other:?}"),
    }

    // The match carries on.
    expect_request(&mut h.players[1]).await;
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, MatchPhase::InProgress);
}

// =========================================================================
// Clocks
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_turn_timeout_fires_at_deadline() {
    let config = MatchConfig {
        turn_timeout: Some(Duration::from_secs(10)),
        turn_timeout_policy: ForfeitPolicy::ForfeitTurn,
        ..config()
    };
    let mut h = start(config, vec![]).await;
    let (id, remaining) = expect_request(&mut h.players[0]).await;
    assert_eq!(remaining, Some(10_000));

    tokio::time::sleep(Duration::from_millis(9_999)).await;
    let table = h.handle.snapshot().await.unwrap().table.unwrap();
    assert_eq!(table.turn, Seat(0));
    assert_eq!(table.shot_number, 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    let table = h.handle.snapshot().await.unwrap().table.unwrap();
    assert_eq!(table.turn, Seat(1));
    assert_eq!(table.shot_number, 1);

    let timed_out = loop {
        match h.players[0].recv().await {
            Some(ServerMessage::Error { code, .. }) => break code,
            Some(_) => continue,
            None => panic!("channel closed"),
        }
    };
    assert_eq!(timed_out, ErrorCode::TimeoutForfeit);

    let err = h.handle.submit_shot(Seat(0), conn(0), id, shot()).await.unwrap_err();
    assert_eq!(err, MatchError::Turn(TurnError::TimeoutForfeit { request_id: id }));

    let (next, _) = expect_request(&mut h.players[1]).await;
    assert_eq!(next, id + 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_pauses_clock_and_reconnect_resends_request() {
    let config = MatchConfig {
        turn_timeout: Some(Duration::from_secs(10)),
        reconnect_grace: Duration::from_secs(30),
        ..config()
    };
    let mut h = start(config, vec![]).await;
    let (id, _) = expect_request(&mut h.players[0]).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    h.disconnect(0, conn(0)).await;

    // Well past the turn deadline, inside the grace window.
    tokio::time::sleep(Duration::from_secs(20)).await;
    let table = h.handle.snapshot().await.unwrap().table.unwrap();
    assert_eq!(table.turn, Seat(0));
    assert_eq!(table.shot_number, 0);

    let resumed = ConnectionId::new(10);
    let mut rx = h.resume(0, resumed).await;

    let (again, remaining) = expect_request(&mut rx).await;
    assert_eq!(again, id);
    assert_eq!(remaining, Some(6_000));

    let err = h.handle.submit_shot(Seat(0), conn(0), id, shot()).await.unwrap_err();
    assert_eq!(err, MatchError::Turn(TurnError::OutOfTurn { seat: Seat(0) }));
    h.handle.submit_shot(Seat(0), resumed, id, shot()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stale_disconnect_is_ignored() {
    let mut h = start(config(), vec![]).await;
    let (id, _) = expect_request(&mut h.players[0]).await;

    let resumed = ConnectionId::new(10);
    let mut rx = h.resume(0, resumed).await;
    expect_request(&mut rx).await;

    // The superseded socket closing must not unbind the new one.
    h.handle.seat_disconnected(Seat(0), conn(0)).await.unwrap();
    h.handle.submit_shot(Seat(0), resumed, id, shot()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shot_from_severed_connection_rejected() {
    let mut h = start(config(), vec![Script::miss()]).await;
    let (id, _) = expect_request(&mut h.players[0]).await;
    let before = h.handle.snapshot().await.unwrap();

    // The registry has moved seat 0 to a new socket, but that socket's
    // task has not reached the match yet.
    let resumed = ConnectionId::new(10);
    h.registry.resume(&h.secrets[0], resumed).await.unwrap();

    let err = h.handle.submit_shot(Seat(0), conn(0), id, shot()).await.unwrap_err();
    assert_eq!(err, MatchError::Superseded { seat: Seat(0), conn: conn(0) });
    assert_eq!(err.code(), ErrorCode::Superseded);
    assert_eq!(h.handle.snapshot().await.unwrap(), before);

    let (tx, mut rx) = mpsc::unbounded_channel();
    h.handle
        .seat_connected(Seat(0), PlayerId(1), "p0", resumed, tx)
        .await
        .unwrap();
    let (again, _) = expect_request(&mut rx).await;
    assert_eq!(again, id);
    h.handle.submit_shot(Seat(0), resumed, id, shot()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_seat_connected_out_of_order_keeps_latest_binding() {
    let mut h = start(config(), vec![Script::miss()]).await;
    let (id, _) = expect_request(&mut h.players[0]).await;

    let (older, newer) = (ConnectionId::new(10), ConnectionId::new(11));
    h.registry.resume(&h.secrets[0], older).await.unwrap();
    h.registry.resume(&h.secrets[0], newer).await.unwrap();

    // The newer connection reaches the match first.
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.handle
        .seat_connected(Seat(0), PlayerId(1), "p0", newer, tx)
        .await
        .unwrap();
    let (stale_tx, _stale_rx) = mpsc::unbounded_channel();
    let err = h
        .handle
        .seat_connected(Seat(0), PlayerId(1), "p0", older, stale_tx)
        .await
        .unwrap_err();
    assert_eq!(err, MatchError::Superseded { seat: Seat(0), conn: older });

    // The older connection's task exits.
    h.disconnect(0, older).await;
    assert_eq!(h.registry.connection(Seat(0)).await, Some(newer));

    let (again, _) = expect_request(&mut rx).await;
    assert_eq!(again, id);
    let summary = h.handle.submit_shot(Seat(0), newer, id, shot()).await.unwrap();
    assert_eq!(summary.next_turn, Seat(1));
}

#[tokio::test(start_paused = true)]
async fn test_rejoining_player_gets_match_state() {
    let mut h = start(config(), vec![]).await;
    expect_request(&mut h.players[0]).await;

    h.disconnect(1, conn(1)).await;
    let mut rx = h.resume(1, ConnectionId::new(10)).await;

    match rx.recv().await {
        Some(ServerMessage::MatchState { snapshot }) => {
            assert_eq!(snapshot.phase, MatchPhase::InProgress);
            assert_eq!(snapshot.last_event_seq, 2);
            assert_eq!(snapshot.table.map(|t| t.turn), Some(Seat(0)));
        }
        other => panic!("expected MatchState, got {other:?}"),
    }
    // Not this seat's turn, so no request follows.
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_grace_expiry_forfeits_match() {
    let config = MatchConfig {
        turn_timeout: Some(Duration::from_secs(60)),
        reconnect_grace: Duration::from_secs(5),
        abandon_policy: ForfeitPolicy::ForfeitMatch,
        ..config()
    };
    let mut h = start(config, vec![]).await;
    expect_request(&mut h.players[0]).await;

    h.disconnect(0, conn(0)).await;

    let result = h.task.await.unwrap();
    assert_eq!(
        result.phase,
        MatchPhase::Forfeited {
            winner: Seat(1),
            forfeited_by: Seat(0),
        }
    );
    assert!(h.registry.match_ended().await);

    let events = drain_events(&mut h.players[1]);
    assert!(matches!(
        events.last().map(|e| &e.event),
        Some(MatchEvent::MatchOver { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_grace_expiry_forfeit_game_racks_next() {
    let config = MatchConfig {
        reconnect_grace: Duration::from_secs(5),
        abandon_policy: ForfeitPolicy::ForfeitGame,
        ..config()
    };
    let mut h = start(config, vec![]).await;
    expect_request(&mut h.players[0]).await;

    h.disconnect(0, conn(0)).await;
    tokio::time::sleep(Duration::from_secs(6)).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, MatchPhase::InProgress);
    assert_eq!(snapshot.game, 2);
    assert_eq!(snapshot.standings[1].games_won, 1);

    // Seat 1 won the forfeited game, so it breaks.
    let (_, _) = expect_request(&mut h.players[1]).await;
}

// =========================================================================
// Spectators and shutdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_spectator_sees_gap_free_events_after_snapshot() {
    let config = MatchConfig {
        race_to: 1,
        ..config()
    };
    let mut h = start(config, vec![Script::miss(), Script::pot([9])]).await;

    let (id, _) = expect_request(&mut h.players[0]).await;
    h.handle.submit_shot(Seat(0), conn(0), id, shot()).await.unwrap();

    let mut spectation = h.handle.spectate().await.unwrap();
    assert_eq!(spectation.snapshot.last_event_seq, 3);
    assert_eq!(spectation.snapshot.table.as_ref().unwrap().turn, Seat(1));

    let (id, _) = expect_request(&mut h.players[1]).await;
    h.handle.submit_shot(Seat(1), conn(1), id, shot()).await.unwrap();

    let mut seqs = Vec::new();
    while let Some(event) = spectation.events.recv().await {
        seqs.push(event.seq);
    }
    assert_eq!(seqs, vec![4, 5, 6]);

    let result = h.task.await.unwrap();
    assert_eq!(result.phase, MatchPhase::Completed { winner: Seat(1) });
}

#[tokio::test(start_paused = true)]
async fn test_spectator_slot_freed_when_spectator_leaves() {
    let spectators = SpectatorConfig {
        max_spectators: 1,
        ..SpectatorConfig::default()
    };
    let mut h = start_with(config(), spectators, vec![]).await;
    expect_request(&mut h.players[0]).await;

    let first = h.handle.spectate().await.unwrap();
    assert_eq!(
        h.handle.spectate().await.unwrap_err(),
        MatchError::Spectating(HubError::Full(1))
    );

    drop(first);
    h.handle.spectate().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_match() {
    let mut h = start(config(), vec![]).await;
    expect_request(&mut h.players[0]).await;

    h.handle.shutdown("maintenance").await.unwrap();

    let result = h.task.await.unwrap();
    assert_eq!(
        result.phase,
        MatchPhase::Aborted {
            reason: "maintenance".into()
        }
    );
    assert!(matches!(
        drain_events(&mut h.players[0]).last().map(|e| &e.event),
        Some(MatchEvent::MatchAborted { .. })
    ));
    assert_eq!(h.handle.snapshot().await.unwrap_err(), MatchError::Unavailable);
}
