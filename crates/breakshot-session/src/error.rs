//! Error types for the session layer.

use breakshot_protocol::{ErrorCode, PlayerId};

/// Why a connection could not be admitted as a player.
///
/// None of these mutate registry state: a rejected handshake leaves the
/// registry exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Another player in this match already uses the name.
    #[error("name already in use: {0}")]
    DuplicateName(String),

    /// The name is empty or too long.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// No player holds the presented secret.
    #[error("unknown secret")]
    UnknownSecret,

    /// The match is over; secrets no longer resume and no one new may join.
    #[error("match has ended")]
    MatchEnded,

    /// Every seat is already taken.
    #[error("all {0} seats are taken")]
    SeatsFull(usize),

    #[error("no player {0}")]
    NotFound(PlayerId),
}

impl SessionError {
    /// The wire code sent to the rejected client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateName(_) => ErrorCode::DuplicateName,
            Self::InvalidName(_) => ErrorCode::InvalidName,
            Self::UnknownSecret | Self::NotFound(_) => ErrorCode::UnknownSecret,
            Self::MatchEnded => ErrorCode::MatchEnded,
            Self::SeatsFull(_) => ErrorCode::SeatsFull,
        }
    }
}
