//! Player identity and reconnection for Breakshot.
//!
//! This crate answers one question for the connection handler: *which
//! player is on the other end of this socket?*
//!
//! 1. **Registration**: a new player picks a name and is given a seat, a
//!    durable [`PlayerId`](breakshot_protocol::PlayerId), and a secret.
//! 2. **Resumption**: presenting the secret later binds a new connection
//!    to the same player and seat, severing any older connection.
//! 3. **Detachment**: when a socket closes, the player stays registered
//!    but has no connection until it resumes.
//!
//! # How it fits in the stack
//!
//! ```text
//! Connection handler (above)  ← admits sockets, forwards to the match
//!     ↕
//! Session Layer (this crate)  ← names, seats, secrets, live bindings
//!     ↕
//! Protocol Layer (below)      ← PlayerId, Seat, Secret
//! ```
//!
//! The registry is shared between every connection task and the match,
//! so it lives behind its own `RwLock`, separate from match state.

mod error;
mod player;
mod registry;

pub use error::SessionError;
pub use player::{Admission, Player};
pub use registry::{MAX_NAME_LEN, SessionRegistry};
