//! Practice bot for Breakshot.
//!
//! Joins a match as a player, answers every shot request with a roughly
//! aimed shot at the ball on, and keeps the connection alive with
//! heartbeats. Run two of these against `breakshot-server` to watch a
//! whole match play out.

use std::time::Duration;

use breakshot_protocol::{
    BallInHand, ClientMessage, Envelope, MatchEvent, PROTOCOL_VERSION, Position, Role, Secret,
    ServerMessage, ShotConstraints, ShotDescriptor, StateEvent, TableState,
};
use breakshot_table::geometry::{self, BALL_RADIUS, HEAD_STRING_Y, TABLE_LENGTH, TABLE_WIDTH};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:9000")]
    server: String,

    /// Player name
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Secret from an earlier Welcome, to resume a seat
    #[arg(long)]
    secret: Option<String>,

    /// Seconds between heartbeats
    #[arg(long, default_value = "10")]
    heartbeat_secs: u64,

    /// Seed for shot selection (random if omitted)
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed.unwrap_or_else(rand::random));

    let url = format!("ws://{}", args.server);
    info!(%url, name = %args.name, "connecting");
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut write, mut read) = ws.split();

    let mut seq = 0;
    let mut envelope = |message: ClientMessage| -> Result<Message, serde_json::Error> {
        let bytes = serde_json::to_vec(&Envelope::new(seq, 0, message))?;
        seq += 1;
        Ok(Message::Binary(bytes.into()))
    };

    write
        .send(envelope(ClientMessage::Handshake {
            version: PROTOCOL_VERSION,
            role: Role::Player,
            name: args.name.clone(),
            secret: args.secret.map(Secret::new),
        })?)
        .await?;

    let mut heartbeat = tokio::time::interval(Duration::from_secs(args.heartbeat_secs.max(1)));
    let started = tokio::time::Instant::now();

    loop {
        tokio::select! {
            frame = read.next() => {
                let data = match frame {
                    Some(Ok(Message::Binary(data))) => data.to_vec(),
                    Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                    Some(Ok(Message::Close(_))) | None => {
                        info!("server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };
                let message = match serde_json::from_slice::<Envelope<ServerMessage>>(&data) {
                    Ok(envelope) => envelope.message,
                    Err(e) => {
                        warn!(error = %e, "undecodable frame");
                        continue;
                    }
                };

                match message {
                    ServerMessage::Welcome { player_id, secret, seat, seats, race_to } => {
                        info!(%player_id, %seat, seats, race_to, secret = secret.as_str(), "joined match");
                    }
                    ServerMessage::ShotRequest { request_id, table, legal_targets, time_remaining_ms } => {
                        let shot = choose_shot(&mut rng, &table, &legal_targets);
                        info!(request_id, ?time_remaining_ms, speed = shot.speed, phi = shot.phi, "shooting");
                        write.send(envelope(ClientMessage::Shot { request_id, shot })?).await?;
                    }
                    ServerMessage::ShotAck { request_id, summary } => {
                        info!(request_id, potted = ?summary.potted, foul = ?summary.foul, next = %summary.next_turn, "shot scored");
                    }
                    ServerMessage::MatchState { snapshot } => {
                        let score: Vec<u32> = snapshot.standings.iter().map(|s| s.games_won).collect();
                        info!(phase = %snapshot.phase, game = snapshot.game, ?score, "rejoined match");
                    }
                    ServerMessage::Event(StateEvent { seq, event }) => log_event(seq, &event),
                    ServerMessage::HeartbeatAck { client_time, server_time } => {
                        debug!(client_time, server_time, "heartbeat acknowledged");
                    }
                    ServerMessage::Error { code, message } => warn!(?code, %message, "server error"),
                    ServerMessage::Disconnect { reason } => {
                        info!(%reason, "disconnected by server");
                        break;
                    }
                    ServerMessage::SpectatorWelcome { .. } => {}
                }
            }
            _ = heartbeat.tick() => {
                let client_time = started.elapsed().as_millis() as u64;
                write.send(envelope(ClientMessage::Heartbeat { client_time })?).await?;
            }
        }
    }

    Ok(())
}

fn log_event(seq: u64, event: &MatchEvent) {
    match event {
        MatchEvent::GameStarted { game, breaker, .. } => info!(seq, game, %breaker, "game started"),
        MatchEvent::GameOver { game, winner, reason, .. } => {
            info!(seq, game, %winner, ?reason, "game over");
        }
        MatchEvent::MatchOver { phase, standings, .. } => {
            let score: Vec<u32> = standings.iter().map(|s| s.games_won).collect();
            info!(seq, %phase, ?score, "match over");
        }
        MatchEvent::MatchAborted { reason } => warn!(seq, %reason, "match aborted"),
        MatchEvent::MatchStarted { race_to, .. } => info!(seq, race_to, "match started"),
        MatchEvent::ShotResult { .. } => debug!(seq, "shot result"),
    }
}

/// Aims at the ball on with a random speed and a little noise.
fn choose_shot(rng: &mut impl Rng, table: &TableState, constraints: &ShotConstraints) -> ShotDescriptor {
    let placement = constraints
        .ball_in_hand
        .and_then(|zone| place_cue_ball(rng, table, zone));

    let cue = placement.or_else(|| table.balls.iter().find(|b| b.id.is_cue()).map(|b| b.position));
    let target = constraints
        .on_ball
        .and_then(|id| table.ball(id))
        .map(|b| b.position);

    let phi = match (cue, target) {
        (Some(from), Some(to)) => (to.y - from.y).atan2(to.x - from.x).to_degrees() + rng.random_range(-2.0..2.0),
        _ => rng.random_range(0.0..360.0),
    };

    ShotDescriptor {
        speed: rng.random_range(1.0..6.0),
        phi: phi.rem_euclid(360.0),
        theta: 0.0,
        a: rng.random_range(-0.3..0.3),
        b: rng.random_range(-0.3..0.3),
        cue_ball_position: placement,
    }
}

/// A free spot in `zone`, if a few random tries find one.
fn place_cue_ball(rng: &mut impl Rng, table: &TableState, zone: BallInHand) -> Option<Position> {
    let max_y = match zone {
        BallInHand::Kitchen => HEAD_STRING_Y,
        BallInHand::Anywhere => TABLE_LENGTH - BALL_RADIUS,
    };
    (0..20)
        .map(|_| {
            Position::new(
                rng.random_range(BALL_RADIUS..TABLE_WIDTH - BALL_RADIUS),
                rng.random_range(BALL_RADIUS..max_y),
            )
        })
        .find(|&pos| geometry::placement_allowed(pos, zone) && geometry::placement_clear(pos, &table.balls))
}
