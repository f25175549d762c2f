//! Wire protocol for Breakshot.
//!
//! This crate defines the "language" that players, spectators, and the
//! match server speak:
//!
//! - **Types** ([`TableState`], [`ShotDescriptor`], [`StateEvent`], ...):
//!   the data that travels on the wire.
//! - **Messages** ([`Envelope`], [`ClientMessage`], [`ServerMessage`]):
//!   the frames built from that data.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session / Match
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{ClientMessage, Envelope, ErrorCode, PROTOCOL_VERSION, ServerMessage};
pub use types::{
    Ball, BallId, BallInHand, Foul, GameOverReason, MatchEvent, MatchPhase, MatchSnapshot,
    PlayerId, Position, Role, Seat, Secret, ShotConstraints, ShotDescriptor, ShotEvent,
    ShotSummary, SpectatorId, Standing, StateEvent, TableState,
};
