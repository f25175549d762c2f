//! Match actor: the one task that owns a match's state.
//!
//! Connection tasks never touch the table or the scores. They send
//! [`MatchCommand`]s through a [`MatchHandle`], and the actor applies
//! them one at a time. A shot is simulated, scored, and broadcast before
//! the next command is even read, so two shots can never interleave and
//! a reconnection always lands strictly before or after a shot.

use std::any::Any;
use std::sync::Arc;

use breakshot_clock::Countdown;
use breakshot_protocol::{
    ErrorCode, MatchEvent, MatchPhase, MatchSnapshot, PlayerId, Seat, ServerMessage,
    ShotDescriptor, ShotSummary, SpectatorId, Standing, StateEvent,
};
use breakshot_session::SessionRegistry;
use breakshot_table::{PhysicsAdapter, SimulationError, geometry};
use breakshot_transport::ConnectionId;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hub::{BroadcastHub, SpectatorReceiver};
use crate::rules::ShotOutcome;
use crate::state::Match;
use crate::{FirstBreak, ForfeitPolicy, MatchConfig, MatchError, TurnError};

/// Channel for delivering outbound messages to a player's connection task.
pub type PlayerSender = mpsc::UnboundedSender<ServerMessage>;

/// Commands sent to the match actor through its channel.
pub(crate) enum MatchCommand {
    /// A connection was admitted for `seat` (fresh or resumed).
    SeatConnected {
        seat: Seat,
        player_id: PlayerId,
        name: String,
        conn: ConnectionId,
        outbound: PlayerSender,
        reply: oneshot::Sender<Result<(), MatchError>>,
    },

    /// The connection for `seat` went away.
    SeatDisconnected { seat: Seat, conn: ConnectionId },

    /// A player answered a shot request.
    Shot {
        seat: Seat,
        conn: ConnectionId,
        request_id: u64,
        shot: ShotDescriptor,
        reply: oneshot::Sender<Result<ShotSummary, MatchError>>,
    },

    /// Subscribe a spectator and hand it a consistent snapshot.
    Spectate {
        reply: oneshot::Sender<Result<Spectation, MatchError>>,
    },

    Snapshot {
        reply: oneshot::Sender<MatchSnapshot>,
    },

    /// Abort the match and stop.
    Shutdown { reason: String },
}

/// A new spectator's starting point.
///
/// Every event in `events` has a `seq` greater than
/// `snapshot.last_event_seq`, and none is missing.
#[derive(Debug)]
pub struct Spectation {
    pub spectator_id: SpectatorId,
    pub snapshot: MatchSnapshot,
    pub events: SpectatorReceiver,
}

/// How a match ended, returned when the actor stops.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSummary {
    pub phase: MatchPhase,
    pub standings: Vec<Standing>,
    pub games_played: u32,
}

/// Handle to a running match actor.
///
/// Cheap to clone: it is an `mpsc::Sender` wrapper. Every connection
/// task holds one.
#[derive(Clone)]
pub struct MatchHandle {
    sender: mpsc::Sender<MatchCommand>,
}

impl MatchHandle {
    /// Binds `outbound` as `seat`'s delivery channel.
    ///
    /// `conn` must be the connection the session registry currently binds
    /// to `seat`, or [`MatchError::Superseded`] is returned. Once every
    /// seat is connected the match starts. A seat rejoining a running
    /// match gets a [`ServerMessage::MatchState`], and if it owes a shot,
    /// its pending request again with the same id.
    pub async fn seat_connected(
        &self,
        seat: Seat,
        player_id: PlayerId,
        name: &str,
        conn: ConnectionId,
        outbound: PlayerSender,
    ) -> Result<(), MatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(MatchCommand::SeatConnected {
                seat,
                player_id,
                name: name.to_string(),
                conn,
                outbound,
                reply: reply_tx,
            })
            .await
            .map_err(|_| MatchError::Unavailable)?;
        reply_rx.await.map_err(|_| MatchError::Unavailable)?
    }

    /// Reports that `conn` for `seat` has closed (fire-and-forget).
    pub async fn seat_disconnected(&self, seat: Seat, conn: ConnectionId) -> Result<(), MatchError> {
        self.sender
            .send(MatchCommand::SeatDisconnected { seat, conn })
            .await
            .map_err(|_| MatchError::Unavailable)
    }

    /// Submits a shot and waits until it has been simulated, scored, and
    /// broadcast.
    pub async fn submit_shot(
        &self,
        seat: Seat,
        conn: ConnectionId,
        request_id: u64,
        shot: ShotDescriptor,
    ) -> Result<ShotSummary, MatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(MatchCommand::Shot {
                seat,
                conn,
                request_id,
                shot,
                reply: reply_tx,
            })
            .await
            .map_err(|_| MatchError::Unavailable)?;
        reply_rx.await.map_err(|_| MatchError::Unavailable)?
    }

    pub async fn spectate(&self) -> Result<Spectation, MatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(MatchCommand::Spectate { reply: reply_tx })
            .await
            .map_err(|_| MatchError::Unavailable)?;
        reply_rx.await.map_err(|_| MatchError::Unavailable)?
    }

    pub async fn snapshot(&self) -> Result<MatchSnapshot, MatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(MatchCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| MatchError::Unavailable)?;
        reply_rx.await.map_err(|_| MatchError::Unavailable)
    }

    /// Aborts the match with `reason`.
    pub async fn shutdown(&self, reason: &str) -> Result<(), MatchError> {
        self.sender
            .send(MatchCommand::Shutdown {
                reason: reason.to_string(),
            })
            .await
            .map_err(|_| MatchError::Unavailable)
    }
}

/// The live connection for one seat.
struct SeatLink {
    player_id: PlayerId,
    conn: ConnectionId,
    outbound: PlayerSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRequest {
    seat: Seat,
    request_id: u64,
}

/// The internal actor state. Runs inside a Tokio task.
struct MatchActor {
    state: Match,
    physics: Arc<dyn PhysicsAdapter>,
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
    /// Indexed by seat.
    links: Vec<Option<SeatLink>>,
    /// The one shot request currently owed.
    pending: Option<PendingRequest>,
    /// The last request lost to a timeout, so a late answer can be told so.
    timed_out: Option<PendingRequest>,
    next_request_id: u64,
    /// `seq` of the last published event.
    event_seq: u64,
    turn_clock: Countdown,
    grace_clock: Countdown,
    receiver: mpsc::Receiver<MatchCommand>,
}

impl MatchActor {
    /// Runs the actor loop until the match reaches a terminal phase.
    async fn run(mut self) -> MatchSummary {
        info!(
            seats = self.state.config().seats,
            race_to = self.state.config().race_to,
            "match actor started"
        );

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => self.abort("every match handle was dropped").await,
                },
                () = self.turn_clock.expired() => self.on_turn_expired().await,
                () = self.grace_clock.expired() => self.on_grace_expired().await,
            }

            if self.state.phase().is_terminal() {
                break;
            }
            self.advance();
        }

        self.finish().await
    }

    async fn handle(&mut self, cmd: MatchCommand) {
        match cmd {
            MatchCommand::SeatConnected {
                seat,
                player_id,
                name,
                conn,
                outbound,
                reply,
            } => {
                let result = self
                    .handle_seat_connected(seat, player_id, &name, conn, outbound)
                    .await;
                let ok = result.is_ok();
                let _ = reply.send(result);
                if ok {
                    self.after_seat_connected(seat).await;
                }
            }
            MatchCommand::SeatDisconnected { seat, conn } => {
                self.handle_seat_disconnected(seat, conn);
            }
            MatchCommand::Shot {
                seat,
                conn,
                request_id,
                shot,
                reply,
            } => {
                let result = self.handle_shot(seat, conn, request_id, shot).await;
                if let Err(e) = &result {
                    debug!(%seat, %conn, request_id, error = %e, "shot rejected");
                }
                let _ = reply.send(result);
            }
            MatchCommand::Spectate { reply } => {
                let result = match self.hub.subscribe().await {
                    Ok((spectator_id, events)) => Ok(Spectation {
                        spectator_id,
                        snapshot: self.state.snapshot(self.event_seq),
                        events,
                    }),
                    Err(e) => Err(e.into()),
                };
                let _ = reply.send(result);
            }
            MatchCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot(self.event_seq));
            }
            MatchCommand::Shutdown { reason } => self.abort(&reason).await,
        }
    }

    /// Binds `conn` to `seat`, provided the session registry still binds
    /// it there. A connection that lost a resume race is refused, whatever
    /// order the commands arrive in.
    async fn handle_seat_connected(
        &mut self,
        seat: Seat,
        player_id: PlayerId,
        name: &str,
        conn: ConnectionId,
        outbound: PlayerSender,
    ) -> Result<(), MatchError> {
        if self.state.phase().is_terminal() {
            return Err(MatchError::NotInProgress(self.state.phase().clone()));
        }
        if self.registry.connection(seat).await != Some(conn) {
            debug!(%seat, %conn, "stale seat connection refused");
            return Err(MatchError::Superseded { seat, conn });
        }
        let slot = self
            .links
            .get_mut(seat.0)
            .ok_or_else(|| MatchError::InvariantViolated(format!("no such seat {seat}")))?;

        let replaced = slot.replace(SeatLink {
            player_id,
            conn,
            outbound,
        });
        self.state.set_name(seat, name);
        info!(%seat, %player_id, %conn, replaced = ?replaced.map(|l| l.conn), "seat connected");
        Ok(())
    }

    async fn after_seat_connected(&mut self, seat: Seat) {
        match self.state.phase() {
            MatchPhase::WaitingForPlayers if self.links.iter().all(Option::is_some) => {
                match self.state.start() {
                    Ok(events) => self.publish(events).await,
                    Err(e) => warn!(error = %e, "match failed to start"),
                }
            }
            MatchPhase::InProgress => {
                if let Some(link) = self.links.get(seat.0).and_then(Option::as_ref) {
                    let _ = link.outbound.send(ServerMessage::MatchState {
                        snapshot: self.state.snapshot(self.event_seq),
                    });
                }
                if self.pending.is_some_and(|p| p.seat == seat) {
                    self.turn_clock.resume();
                    self.grace_clock.disarm();
                    self.send_request();
                }
            }
            _ => {}
        }
    }

    fn handle_seat_disconnected(&mut self, seat: Seat, conn: ConnectionId) {
        let Some(slot) = self.links.get_mut(seat.0) else {
            return;
        };
        if slot.as_ref().map(|l| l.conn) != Some(conn) {
            debug!(%seat, %conn, "disconnect from superseded connection ignored");
            return;
        }
        if let Some(link) = slot.take() {
            info!(%seat, player_id = %link.player_id, %conn, "seat disconnected");
        }

        if self.pending.is_some_and(|p| p.seat == seat) {
            self.turn_clock.pause();
            self.grace_clock.arm(self.state.config().reconnect_grace);
            info!(
                %seat,
                grace = ?self.state.config().reconnect_grace,
                "active player disconnected, turn clock paused"
            );
        }
    }

    async fn handle_shot(
        &mut self,
        seat: Seat,
        conn: ConnectionId,
        request_id: u64,
        shot: ShotDescriptor,
    ) -> Result<ShotSummary, MatchError> {
        if *self.state.phase() != MatchPhase::InProgress {
            return Err(MatchError::NotInProgress(self.state.phase().clone()));
        }
        let bound = self
            .links
            .get(seat.0)
            .and_then(Option::as_ref)
            .is_some_and(|l| l.conn == conn);
        if !bound {
            return Err(TurnError::OutOfTurn { seat }.into());
        }
        if self.registry.connection(seat).await != Some(conn) {
            return Err(MatchError::Superseded { seat, conn });
        }
        match self.pending {
            Some(p) if p.seat == seat => {
                if p.request_id != request_id {
                    return Err(TurnError::StaleRequest {
                        expected: Some(p.request_id),
                        got: request_id,
                    }
                    .into());
                }
            }
            _ => {
                let late = self.timed_out == Some(PendingRequest { seat, request_id });
                return Err(if late {
                    TurnError::TimeoutForfeit { request_id }
                } else {
                    TurnError::OutOfTurn { seat }
                }
                .into());
            }
        }

        self.pending = None;
        self.turn_clock.disarm();
        debug!(%seat, request_id, speed = shot.speed, phi = shot.phi, "shot accepted");

        let outcome = self.simulate(shot).await;
        match self.state.record_shot(seat, outcome) {
            Ok(record) => {
                self.publish(record.events).await;
                Ok(record.summary)
            }
            Err(MatchError::InvariantViolated(reason)) => {
                self.abort(&reason).await;
                Err(MatchError::InvariantViolated(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Runs the physics engine on a blocking thread.
    async fn simulate(&self, shot: ShotDescriptor) -> ShotOutcome {
        let Some(staged) = self.state.stage(&shot) else {
            return ShotOutcome::Failed(SimulationError::Engine("no table in play".into()));
        };
        if let Err(e) = geometry::validate_shot(&shot) {
            return ShotOutcome::Failed(e);
        }

        let physics = Arc::clone(&self.physics);
        let table = staged.clone();
        match tokio::task::spawn_blocking(move || physics.simulate(&table, &shot)).await {
            Ok(Ok(simulation)) => ShotOutcome::Simulated { staged, simulation },
            Ok(Err(e)) => ShotOutcome::Failed(e),
            Err(join) => {
                let reason = if join.is_panic() {
                    panic_message(join.into_panic())
                } else {
                    "simulation task cancelled".to_string()
                };
                warn!(%reason, "physics engine panicked");
                ShotOutcome::Failed(SimulationError::Panicked(reason))
            }
        }
    }

    async fn on_turn_expired(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        warn!(seat = %pending.seat, request_id = pending.request_id, "turn timed out");
        self.timed_out = Some(pending);
        if let Some(link) = self.links.get(pending.seat.0).and_then(Option::as_ref) {
            let _ = link.outbound.send(ServerMessage::Error {
                code: ErrorCode::TimeoutForfeit,
                message: format!("no shot for request {} in time", pending.request_id),
            });
        }
        let policy = self.state.config().turn_timeout_policy;
        self.apply_forfeit(pending.seat, policy).await;
    }

    async fn on_grace_expired(&mut self) {
        let Some(pending) = self.pending else {
            return;
        };
        if self.links.get(pending.seat.0).is_some_and(Option::is_some) {
            return;
        }
        warn!(seat = %pending.seat, "reconnection grace expired");
        self.pending = None;
        self.timed_out = Some(pending);
        self.turn_clock.disarm();
        let policy = self.state.config().abandon_policy;
        self.apply_forfeit(pending.seat, policy).await;
    }

    async fn apply_forfeit(&mut self, seat: Seat, policy: ForfeitPolicy) {
        let result = match policy {
            ForfeitPolicy::ForfeitTurn => self
                .state
                .record_shot(seat, ShotOutcome::TimedOut)
                .map(|record| record.events),
            ForfeitPolicy::ForfeitGame => self.state.forfeit_game(seat),
            ForfeitPolicy::ForfeitMatch => self.state.forfeit_match(seat),
        };
        match result {
            Ok(events) => self.publish(events).await,
            Err(MatchError::InvariantViolated(reason)) => self.abort(&reason).await,
            Err(e) => warn!(%seat, ?policy, error = %e, "forfeit not applied"),
        }
    }

    /// Issues the next shot request if one is owed and none is pending.
    fn advance(&mut self) {
        if self.pending.is_some() {
            return;
        }
        let Some(seat) = self.state.active_seat() else {
            return;
        };

        self.next_request_id += 1;
        self.pending = Some(PendingRequest {
            seat,
            request_id: self.next_request_id,
        });
        match self.state.config().turn_timeout {
            Some(timeout) => self.turn_clock.arm(timeout),
            None => self.turn_clock.disarm(),
        }

        if self.links.get(seat.0).is_some_and(Option::is_some) {
            self.grace_clock.disarm();
            self.send_request();
        } else {
            self.turn_clock.pause();
            self.grace_clock.arm(self.state.config().reconnect_grace);
            info!(%seat, "active player is disconnected, waiting for reconnection");
        }
    }

    /// Sends the pending request to its seat, if that seat is connected.
    fn send_request(&self) {
        let Some(pending) = self.pending else {
            return;
        };
        let (Some(link), Some(table)) = (
            self.links.get(pending.seat.0).and_then(Option::as_ref),
            self.state.table(),
        ) else {
            return;
        };

        let time_remaining_ms = self.turn_clock.remaining().map(|d| d.as_millis() as u64);
        debug!(seat = %pending.seat, request_id = pending.request_id, ?time_remaining_ms, "shot requested");
        let _ = link.outbound.send(ServerMessage::ShotRequest {
            request_id: pending.request_id,
            table: table.clone(),
            legal_targets: table.constraints.clone(),
            time_remaining_ms,
        });
    }

    /// Sequences `events` and delivers them to players and spectators.
    async fn publish(&mut self, events: Vec<MatchEvent>) {
        for event in events {
            self.event_seq += 1;
            let event = Arc::new(StateEvent {
                seq: self.event_seq,
                event,
            });
            for link in self.links.iter().flatten() {
                let _ = link.outbound.send(ServerMessage::Event((*event).clone()));
            }
            self.hub.publish(event).await;
        }
    }

    async fn abort(&mut self, reason: &str) {
        if self.state.phase().is_terminal() {
            return;
        }
        let events = self.state.abort(reason);
        self.pending = None;
        self.turn_clock.disarm();
        self.grace_clock.disarm();
        self.publish(events).await;
    }

    /// Closes the registry and the hub and drops every player channel,
    /// which ends the connection tasks.
    async fn finish(mut self) -> MatchSummary {
        self.turn_clock.disarm();
        self.grace_clock.disarm();
        self.registry.end_match().await;
        self.hub.close().await;
        self.links.iter_mut().for_each(|l| *l = None);

        let summary = MatchSummary {
            phase: self.state.phase().clone(),
            standings: self.state.standings(),
            games_played: self.state.games_played(),
        };
        info!(phase = %summary.phase, games = summary.games_played, "match actor stopped");
        summary
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawns a match actor and returns a handle to it plus the task that
/// resolves to the [`MatchSummary`] when the match ends.
pub fn spawn_match(
    config: MatchConfig,
    physics: Arc<dyn PhysicsAdapter>,
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
) -> (MatchHandle, JoinHandle<MatchSummary>) {
    let config = config.validated();
    let (tx, rx) = mpsc::channel(config.channel_size);

    let first_breaker = match config.first_break {
        FirstBreak::Seat(seat) => seat,
        FirstBreak::Random => Seat(rand::rng().random_range(0..config.seats)),
    };
    debug!(%first_breaker, "first breaker chosen");

    let seats = config.seats;
    let actor = MatchActor {
        state: Match::new(config, first_breaker),
        physics,
        registry,
        hub,
        links: (0..seats).map(|_| None).collect(),
        pending: None,
        timed_out: None,
        next_request_id: 0,
        event_seq: 0,
        turn_clock: Countdown::new("turn"),
        grace_clock: Countdown::new("reconnect-grace"),
        receiver: rx,
    };

    let task = tokio::spawn(actor.run());
    (MatchHandle { sender: tx }, task)
}
