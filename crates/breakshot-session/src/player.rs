//! Player records handed out by the registry.

use breakshot_protocol::{PlayerId, Seat, Secret};
use breakshot_transport::ConnectionId;
use tokio::sync::oneshot;

/// A registered player, as of the moment it was read.
///
/// This is a copy. The registry keeps the authoritative record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub seat: Seat,
    /// The live connection, or `None` while disconnected.
    pub connection: Option<ConnectionId>,
}

/// The result of a successful register or resume.
#[derive(Debug)]
pub struct Admission {
    pub player: Player,
    pub secret: Secret,
    /// Resolves when a newer connection takes this player over.
    ///
    /// The connection task should select on this and close its socket
    /// when it fires. It also resolves (with an error) once the registry
    /// forgets the binding, which the task may ignore.
    pub severed: oneshot::Receiver<()>,
}
