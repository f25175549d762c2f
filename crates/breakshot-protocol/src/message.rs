//! Messages exchanged between clients and the match server.
//!
//! Every frame on the wire is one [`Envelope`] wrapping either a
//! [`ClientMessage`] (client → server) or a [`ServerMessage`]
//! (server → client). Both enums are internally tagged, so a shot looks
//! like:
//!
//! ```text
//! { "seq": 7, "timestamp": 15000,
//!   "message": { "type": "Shot", "request_id": 3, "shot": { ... } } }
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{
    MatchSnapshot, PlayerId, Role, Seat, Secret, ShotConstraints, ShotDescriptor, ShotSummary,
    SpectatorId, StateEvent, TableState,
};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// The top-level wrapper around every message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    /// Per-sender sequence number, starting at 0 for the handshake.
    pub seq: u64,
    /// Milliseconds since the server started (server frames) or client
    /// local time (client frames).
    pub timestamp: u64,
    pub message: M,
}

impl<M> Envelope<M> {
    pub fn new(seq: u64, timestamp: u64, message: M) -> Self {
        Self {
            seq,
            timestamp,
            message,
        }
    }
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Must be the first frame on every connection.
    ///
    /// A player without a `secret` registers a new seat; a player with a
    /// `secret` resumes the seat it was issued for. Spectators send no
    /// secret.
    Handshake {
        version: u32,
        role: Role,
        name: String,
        #[serde(default)]
        secret: Option<Secret>,
    },

    /// Reply to a [`ServerMessage::ShotRequest`].
    Shot {
        request_id: u64,
        shot: ShotDescriptor,
    },

    /// Keep-alive. Answered with [`ServerMessage::HeartbeatAck`].
    Heartbeat { client_time: u64 },

    /// The client is leaving on purpose.
    Disconnect { reason: String },
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// A player was registered or resumed.
    Welcome {
        player_id: PlayerId,
        /// Keep this: presenting it in a later handshake resumes the seat.
        secret: Secret,
        seat: Seat,
        seats: usize,
        race_to: u32,
    },

    /// A spectator was admitted.
    SpectatorWelcome {
        spectator_id: SpectatorId,
        snapshot: MatchSnapshot,
    },

    /// Where the match stands, sent to a player that rejoins a match in
    /// progress. Events with `seq <= snapshot.last_event_seq` are already
    /// reflected in it.
    MatchState { snapshot: MatchSnapshot },

    /// It is your turn. Reply with a `Shot` carrying the same `request_id`.
    ShotRequest {
        request_id: u64,
        table: TableState,
        legal_targets: ShotConstraints,
        /// Time left before the turn is forfeited, if a turn timeout is set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_remaining_ms: Option<u64>,
    },

    /// Your shot went through the full pipeline.
    ShotAck {
        request_id: u64,
        summary: ShotSummary,
    },

    /// A broadcast state change.
    Event(StateEvent),

    HeartbeatAck { client_time: u64, server_time: u64 },

    /// The server is closing this connection.
    Disconnect { reason: String },

    Error { code: ErrorCode, message: String },
}

/// Machine-readable reason attached to [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The frame could not be decoded or broke protocol rules.
    Malformed,
    VersionMismatch,
    /// Another player in this match already uses the name.
    DuplicateName,
    InvalidName,
    /// No player holds the presented secret.
    UnknownSecret,
    /// The match the secret belonged to is over.
    MatchEnded,
    /// Every seat is taken.
    SeatsFull,
    SpectatingDisabled,
    SpectatorsFull,
    /// The shot did not come from the active player's bound connection,
    /// or answered a request that is no longer pending.
    OutOfTurn,
    /// The turn clock ran out before the shot arrived.
    TimeoutForfeit,
    /// A newer connection has taken over this player.
    Superseded,
    MatchAborted,
    Internal,
}

impl ErrorCode {
    /// HTTP-style status, handy for logs and dashboards.
    pub fn status(self) -> u16 {
        match self {
            Self::Malformed | Self::VersionMismatch | Self::InvalidName => 400,
            Self::UnknownSecret => 401,
            Self::SpectatingDisabled => 403,
            Self::DuplicateName | Self::OutOfTurn | Self::Superseded => 409,
            Self::MatchEnded | Self::MatchAborted => 410,
            Self::TimeoutForfeit => 408,
            Self::SeatsFull | Self::SpectatorsFull => 503,
            Self::Internal => 500,
        }
    }
}
