//! Table model and physics seam for Breakshot.
//!
//! The match server never computes ball trajectories itself. It hands
//! the current [`TableState`](breakshot_protocol::TableState) and a
//! player's [`ShotDescriptor`](breakshot_protocol::ShotDescriptor) to a
//! [`PhysicsAdapter`] and gets back where the balls ended up plus an
//! ordered event log. This crate owns everything around that call:
//!
//! - **Geometry** ([`geometry`]): table dimensions, spots, the kitchen,
//!   and structural validation of shot descriptors.
//! - **Rack** ([`rack`]): the opening 9-ball diamond.
//! - **Conservation** ([`conservation`]): checks that a simulation did
//!   not invent, lose, or silently pocket a ball.
//! - **Adapters**: the [`PhysicsAdapter`] trait, [`ScriptedPhysics`] for
//!   tests, and the seeded [`RandomPhysics`] stand-in engine.
//!
//! ```text
//! Match actor ──simulate()──→ PhysicsAdapter ──→ Simulation
//!      │                                            │
//!      └────────── conservation::verify() ◄─────────┘
//! ```

pub mod conservation;
mod error;
pub mod geometry;
mod physics;
pub mod rack;
mod random;
mod scripted;

pub use conservation::ConservationError;
pub use error::SimulationError;
pub use physics::{PhysicsAdapter, Simulation};
pub use random::RandomPhysics;
pub use scripted::{Contact, Script, ScriptedPhysics};
