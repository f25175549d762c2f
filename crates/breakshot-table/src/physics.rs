//! The physics adapter seam.

use std::sync::Arc;

use breakshot_protocol::{Ball, BallId, ShotDescriptor, ShotEvent, TableState};

use crate::SimulationError;

/// What a physics engine reports after simulating one shot.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    /// Every ball, same ids as the input table, at rest.
    pub balls: Vec<Ball>,
    /// What happened, in the order it happened.
    pub events: Vec<ShotEvent>,
}

impl Simulation {
    /// The first object ball the cue ball touched, if any.
    pub fn first_contact(&self) -> Option<BallId> {
        self.events.iter().find_map(|e| match e {
            ShotEvent::FirstContact { ball } => Some(*ball),
            _ => None,
        })
    }

    /// Object balls potted by this shot, in event order.
    pub fn potted(&self) -> Vec<BallId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ShotEvent::BallPotted { ball } if !ball.is_cue() => Some(*ball),
                _ => None,
            })
            .collect()
    }

    /// `true` if the cue ball went down, reported either as a
    /// `CueBallScratch` or as the cue being potted.
    pub fn scratched(&self) -> bool {
        self.events.iter().any(|e| match e {
            ShotEvent::CueBallScratch => true,
            ShotEvent::BallPotted { ball } => ball.is_cue(),
            _ => false,
        })
    }

    /// The first foul the engine itself reported.
    pub fn reported_foul(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match e {
            ShotEvent::Foul { reason } => Some(reason.as_str()),
            _ => None,
        })
    }
}

/// An external simulation engine.
///
/// Given the table as it stands and the shot a player asked for, return
/// where the balls came to rest and what happened along the way. The
/// match only reads `balls` and `events`; turn order and constraints in
/// the input table are the rules engine's business and are ignored.
///
/// Implementations run on a blocking thread, so they may be slow and
/// CPU-bound. A panic is caught and treated as a failed shot.
///
/// If the test suite needs determinism, implementations must be
/// deterministic for identical inputs (seed any randomness).
pub trait PhysicsAdapter: Send + Sync + 'static {
    /// # Errors
    /// Returns [`SimulationError`] if the shot cannot be simulated.
    fn simulate(&self, table: &TableState, shot: &ShotDescriptor) -> Result<Simulation, SimulationError>;
}

impl<P: PhysicsAdapter + ?Sized> PhysicsAdapter for Arc<P> {
    fn simulate(&self, table: &TableState, shot: &ShotDescriptor) -> Result<Simulation, SimulationError> {
        (**self).simulate(table, shot)
    }
}

impl<P: PhysicsAdapter + ?Sized> PhysicsAdapter for Box<P> {
    fn simulate(&self, table: &TableState, shot: &ShotDescriptor) -> Result<Simulation, SimulationError> {
        (**self).simulate(table, shot)
    }
}
