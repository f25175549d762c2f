//! Core data types that travel on the wire.
//!
//! These describe WHO is playing (identities, seats, secrets), WHAT the
//! table looks like (balls and shot constraints), WHAT a player asks for
//! (a [`ShotDescriptor`]), and WHAT happened (shot events, match events).
//! Behavior lives in the crates above; this module is only data.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Durable identity of a player for the lifetime of a match.
///
/// Assigned on first registration and kept across reconnects. It is
/// serialized as a plain number (`#[serde(transparent)]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A player's position in the turn order, `0..seats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seat(pub usize);

impl Seat {
    /// The seat that plays after this one in a match of `seats` players.
    pub fn next(self, seats: usize) -> Seat {
        Seat((self.0 + 1) % seats.max(1))
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seat-{}", self.0)
    }
}

/// Identity of a spectator connection. Not durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpectatorId(pub u64);

impl fmt::Display for SpectatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// An opaque reconnection secret bound to exactly one player.
///
/// `Debug` is redacted so secrets never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps an already-generated secret string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// What a connection wants to be, declared in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Player,
    Spectator,
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Identifies a ball: `0` is the cue ball, `1..=9` are object balls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallId(pub u8);

impl BallId {
    pub const CUE: BallId = BallId(0);
    /// The game-winning ball.
    pub const NINE: BallId = BallId(9);

    pub fn is_cue(self) -> bool {
        self == Self::CUE
    }
}

impl fmt::Display for BallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cue() {
            f.write_str("cue")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A point on the playing surface, in metres from the bottom-left corner.
/// `y` runs along the table length; the head string is near `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One ball and where it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub id: BallId,
    /// Last resting position. Meaningless once `pocketed` is set.
    pub position: Position,
    pub pocketed: bool,
}

/// Where the incoming player may place the cue ball.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallInHand {
    /// Anywhere on the table.
    Anywhere,
    /// Behind the head string only.
    Kitchen,
}

/// Legal-target policy data for the player about to shoot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotConstraints {
    /// Lowest-numbered object ball still on the table, if any.
    pub on_ball: Option<BallId>,
    /// Balls that may legally be struck first.
    pub legal_targets: Vec<BallId>,
    /// Set when the shooter may reposition the cue ball.
    pub ball_in_hand: Option<BallInHand>,
    /// `true` for the first shot of a game.
    pub break_shot: bool,
}

/// Authoritative description of the game in progress.
///
/// Only the rules engine writes this. Clients receive copies inside
/// `ShotRequest`s and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    /// Every ball of the rack, sorted by id. Pocketed balls stay listed.
    pub balls: Vec<Ball>,
    /// Whose turn it is.
    pub turn: Seat,
    pub constraints: ShotConstraints,
    /// Shots taken in this game so far.
    pub shot_number: u32,
}

impl TableState {
    pub fn ball(&self, id: BallId) -> Option<&Ball> {
        self.balls.iter().find(|b| b.id == id)
    }

    pub fn ball_mut(&mut self, id: BallId) -> Option<&mut Ball> {
        self.balls.iter_mut().find(|b| b.id == id)
    }

    /// Lowest-numbered object ball that is not pocketed.
    pub fn lowest_on_table(&self) -> Option<BallId> {
        self.balls
            .iter()
            .filter(|b| !b.id.is_cue() && !b.pocketed)
            .map(|b| b.id)
            .min()
    }

    /// Number of balls currently on the cloth (cue ball included).
    pub fn on_table_count(&self) -> usize {
        self.balls.iter().filter(|b| !b.pocketed).count()
    }
}

// ---------------------------------------------------------------------------
// Shots
// ---------------------------------------------------------------------------

/// Parameters a player submits to take a shot.
///
/// Field names follow the usual cue parametrisation: `speed` is the cue
/// stick speed in m/s, `phi` the aiming angle in degrees, `theta` the cue
/// elevation in degrees, `a`/`b` the horizontal/vertical tip offset as a
/// fraction of the ball radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotDescriptor {
    pub speed: f64,
    pub phi: f64,
    #[serde(default)]
    pub theta: f64,
    #[serde(default)]
    pub a: f64,
    #[serde(default)]
    pub b: f64,
    /// Cue ball placement, honoured only with ball in hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_ball_position: Option<Position>,
}

/// One entry of the ordered event log a physics simulation produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShotEvent {
    /// The first object ball the cue ball touched.
    FirstContact { ball: BallId },
    /// An object ball dropped into a pocket.
    BallPotted { ball: BallId },
    /// The cue ball dropped into a pocket (or left the table).
    CueBallScratch,
    /// The simulation itself flagged a foul (e.g. no rail after contact).
    Foul { reason: String },
}

/// Why a shot was ruled a foul.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Foul {
    Scratch,
    WrongBallFirst { expected: BallId, actual: BallId },
    NoContact,
    /// Reported by the physics adapter.
    Reported { reason: String },
    /// The shot could not be simulated (bad descriptor, engine failure).
    Simulation { reason: String },
    TurnTimeout,
}

/// What the rules engine decided about one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotSummary {
    pub shooter: Seat,
    pub shot_number: u32,
    pub potted: Vec<BallId>,
    pub foul: Option<Foul>,
    pub next_turn: Seat,
    pub ball_in_hand: Option<BallInHand>,
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// Lifecycle of a match.
///
/// ```text
/// WaitingForPlayers → InProgress → Completed | Forfeited | Aborted
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum MatchPhase {
    WaitingForPlayers,
    InProgress,
    /// Some seat reached the race-to score.
    Completed { winner: Seat },
    /// A seat forfeited the whole match (timeout or abandonment policy).
    Forfeited { winner: Seat, forfeited_by: Seat },
    /// An internal consistency check failed.
    Aborted { reason: String },
}

impl MatchPhase {
    /// `true` once no further shots will ever be accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Forfeited { .. } | Self::Aborted { .. }
        )
    }

    pub fn winner(&self) -> Option<Seat> {
        match self {
            Self::Completed { winner } | Self::Forfeited { winner, .. } => Some(*winner),
            _ => None,
        }
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForPlayers => write!(f, "WaitingForPlayers"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed { winner } => write!(f, "Completed({winner})"),
            Self::Forfeited { winner, .. } => write!(f, "Forfeited({winner})"),
            Self::Aborted { .. } => write!(f, "Aborted"),
        }
    }
}

/// One row of the scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub seat: Seat,
    pub name: String,
    pub games_won: u32,
}

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOverReason {
    /// The 9 went down on a legal shot.
    NineBallPotted,
    /// The 9 went down on a foul and the rule set decided the winner.
    NineBallOnFoul,
    /// The loser reached the consecutive-foul limit.
    FoulLimit,
    /// A seat forfeited the game (timeout or abandonment policy).
    Forfeit,
}

/// A state change worth telling observers about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatchEvent {
    MatchStarted {
        race_to: u32,
        standings: Vec<Standing>,
    },
    GameStarted {
        game: u32,
        breaker: Seat,
        table: TableState,
    },
    ShotResult {
        game: u32,
        summary: ShotSummary,
        events: Vec<ShotEvent>,
        table: TableState,
    },
    GameOver {
        game: u32,
        winner: Seat,
        reason: GameOverReason,
        standings: Vec<Standing>,
    },
    MatchOver {
        phase: MatchPhase,
        standings: Vec<Standing>,
        games_played: u32,
    },
    MatchAborted {
        reason: String,
    },
}

/// An immutable, sequenced [`MatchEvent`]. `seq` is gap-free per match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    pub seq: u64,
    pub event: MatchEvent,
}

/// Point-in-time view of the match handed to late joiners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub phase: MatchPhase,
    pub race_to: u32,
    pub standings: Vec<Standing>,
    /// Number of the game in progress (1-based), 0 before the first rack.
    pub game: u32,
    pub table: Option<TableState>,
    /// Events with `seq <= last_event_seq` are already reflected here.
    pub last_event_seq: u64,
}
