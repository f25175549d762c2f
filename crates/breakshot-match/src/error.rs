//! Error types for the match layer.

use breakshot_protocol::{ErrorCode, MatchPhase, Seat};
use breakshot_transport::ConnectionId;

/// A shot that arrived at the wrong time. Never fatal to the match.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    /// The sender is not the active seat, or not its bound connection.
    #[error("{seat} is not the active player")]
    OutOfTurn { seat: Seat },

    /// The shot answers a request that is not the pending one.
    #[error("request {got} is not pending (pending: {expected:?})")]
    StaleRequest { expected: Option<u64>, got: u64 },

    /// The shot answers a request whose turn already timed out.
    #[error("turn for request {request_id} was forfeited on timeout")]
    TimeoutForfeit { request_id: u64 },
}

/// Why a spectator could not subscribe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("spectating is disabled")]
    Disabled,

    #[error("spectator limit of {0} reached")]
    Full(usize),

    #[error("broadcast hub is closed")]
    Closed,
}

/// Errors from the match layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    Spectating(#[from] HubError),

    /// An internal consistency check failed. Fatal to the match.
    #[error("match state invariant violated: {0}")]
    InvariantViolated(String),

    /// `conn` is no longer the connection the session registry binds to
    /// `seat`.
    #[error("connection {conn} no longer holds {seat}")]
    Superseded { seat: Seat, conn: ConnectionId },

    /// The operation needs a running match.
    #[error("match is not in progress ({0})")]
    NotInProgress(MatchPhase),

    /// The match task has stopped.
    #[error("match task is unavailable")]
    Unavailable,
}

impl TurnError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OutOfTurn { .. } | Self::StaleRequest { .. } => ErrorCode::OutOfTurn,
            Self::TimeoutForfeit { .. } => ErrorCode::TimeoutForfeit,
        }
    }
}

impl HubError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Disabled => ErrorCode::SpectatingDisabled,
            Self::Full(_) => ErrorCode::SpectatorsFull,
            Self::Closed => ErrorCode::MatchEnded,
        }
    }
}

impl MatchError {
    /// The wire code reported to the client that triggered the error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Turn(e) => e.code(),
            Self::Spectating(e) => e.code(),
            Self::Superseded { .. } => ErrorCode::Superseded,
            Self::InvariantViolated(_) => ErrorCode::Internal,
            Self::NotInProgress(MatchPhase::Aborted { .. }) => ErrorCode::MatchAborted,
            Self::NotInProgress(phase) if phase.is_terminal() => ErrorCode::MatchEnded,
            Self::NotInProgress(_) => ErrorCode::OutOfTurn,
            Self::Unavailable => ErrorCode::MatchEnded,
        }
    }
}
