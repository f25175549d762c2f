//! Match orchestration for Breakshot.
//!
//! A match runs as a single Tokio task (actor model) that owns the
//! table, the scores, and both clocks. Connection tasks talk to it
//! through a [`MatchHandle`].
//!
//! # Key types
//!
//! - [`Game`]: one rack of 9-ball, with the foul and turn rules
//! - [`Match`]: the race to N games, as a pure state machine
//! - [`MatchHandle`]: send commands to a running match actor
//! - [`BroadcastHub`]: fan-out of state events to spectators
//! - [`MatchConfig`] / [`RuleSet`]: match settings and rule variants

mod actor;
mod config;
mod error;
mod hub;
pub mod rules;
mod state;

pub use actor::{MatchHandle, MatchSummary, PlayerSender, Spectation, spawn_match};
pub use config::{
    ContinueOn, CuePenalty, FirstBreak, FirstContactRule, ForfeitPolicy, MatchConfig, RuleSet,
    SpectatorConfig, WinningBallFoul,
};
pub use error::{HubError, MatchError, TurnError};
pub use hub::{BroadcastHub, SpectatorReceiver};
pub use rules::{Game, GamePhase, ShotOutcome, ShotReport};
pub use state::{Match, ShotRecord};
