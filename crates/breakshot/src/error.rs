//! Unified error type for the Breakshot server.

use breakshot_match::MatchError;
use breakshot_protocol::ProtocolError;
use breakshot_session::SessionError;
use breakshot_table::SimulationError;
use breakshot_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BreakshotError {
    /// Binding, accepting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded, or broke protocol rules.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Registration or resumption was refused.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// The match task panicked or was cancelled.
    #[error("match task failed: {0}")]
    MatchTask(#[from] tokio::task::JoinError),
}
