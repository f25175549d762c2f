//! Error types for the physics seam.

use crate::ConservationError;

/// Why a shot could not be turned into a trustworthy simulation.
///
/// The match never treats these as fatal: every variant is penalized as
/// a foul against the shooter and play continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    /// The shot descriptor failed structural validation.
    #[error("invalid shot: {0}")]
    InvalidShot(String),

    /// The engine reported a failure of its own.
    #[error("physics engine failed: {0}")]
    Engine(String),

    /// The engine panicked while simulating.
    #[error("physics engine panicked: {0}")]
    Panicked(String),

    /// The engine returned a table that breaks ball conservation.
    #[error("simulation rejected: {0}")]
    Conservation(#[from] ConservationError),
}
