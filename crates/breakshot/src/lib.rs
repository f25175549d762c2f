//! # Breakshot
//!
//! Authoritative match server for networked 9-ball.
//!
//! Players connect over WebSockets, take turns answering shot requests,
//! and the server runs every shot through a physics engine, scores it
//! under the 9-ball rules, and broadcasts the result to players and
//! spectators. One server process hosts one match.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use breakshot::prelude::*;
//!
//! # async fn run() -> Result<(), BreakshotError> {
//! let server = BreakshotServer::<breakshot_protocol::JsonCodec>::builder()
//!     .bind("0.0.0.0:9000")
//!     .match_config(MatchConfig { race_to: 5, ..MatchConfig::default() })
//!     .build(RandomPhysics::new(7))
//!     .await?;
//! let summary = server.run().await?;
//! println!("{}", summary.phase);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::BreakshotError;
pub use server::{BreakshotServer, BreakshotServerBuilder};

pub mod prelude {
    pub use crate::{BreakshotError, BreakshotServer, BreakshotServerBuilder, ServerConfig};
    pub use breakshot_match::{
        ContinueOn, CuePenalty, FirstBreak, FirstContactRule, ForfeitPolicy, MatchConfig,
        MatchSummary, RuleSet, SpectatorConfig, WinningBallFoul,
    };
    pub use breakshot_protocol::{
        ClientMessage, Envelope, ErrorCode, MatchEvent, MatchPhase, PROTOCOL_VERSION, Role, Seat,
        Secret, ServerMessage, ShotDescriptor, StateEvent,
    };
    pub use breakshot_table::{PhysicsAdapter, RandomPhysics, Script, ScriptedPhysics};
}
