//! The session registry: names, seats, secrets, and live bindings.
//!
//! # Concurrency note
//!
//! Every connection task reads and writes the registry, so all state
//! sits behind one `tokio::sync::RwLock`. Lookups take the read lock;
//! register, resume, and detach take the write lock, which is what makes
//! "sever the old connection, bind the new one" a single atomic step.
//! The lock is never held across anything but in-memory bookkeeping.

use std::collections::HashMap;

use breakshot_protocol::{PlayerId, Seat, Secret};
use breakshot_transport::ConnectionId;
use rand::Rng;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info};

use crate::{Admission, Player, SessionError};

/// Longest accepted player name, in characters, after trimming.
pub const MAX_NAME_LEN: usize = 32;

/// Registry state for one seat.
struct Slot {
    player: Player,
    secret: Secret,
    /// Fires the current connection's `severed` receiver.
    sever: Option<oneshot::Sender<()>>,
}

struct Inner {
    seats: usize,
    /// Indexed by seat number. Seats are handed out in order.
    slots: Vec<Slot>,
    /// Every secret ever issued. Entries are never removed, so a secret
    /// can never be reissued to a different player.
    secrets: HashMap<Secret, PlayerId>,
    match_ended: bool,
    next_id: u64,
}

impl Inner {
    fn slot_mut(&mut self, id: PlayerId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.player.id == id)
    }

    fn fresh_secret(&self) -> Secret {
        loop {
            let secret = Secret::new(generate_secret());
            if !self.secrets.contains_key(&secret) {
                return secret;
            }
        }
    }
}

/// Maps secrets to players and players to their one live connection.
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ [connected] ──detach()──→ [disconnected]
///                    ▲                          │
///                    └─────────resume()─────────┘
///
/// end_match() ──→ every later register/resume fails with MatchEnded
/// ```
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    /// Creates an empty registry for a match with `seats` players.
    pub fn new(seats: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                seats,
                slots: Vec::with_capacity(seats),
                secrets: HashMap::new(),
                match_ended: false,
                next_id: 1,
            }),
        }
    }

    /// Registers a new player under `name`, bound to `conn`.
    ///
    /// The player gets the next free seat and a freshly generated secret.
    ///
    /// # Errors
    /// - [`SessionError::MatchEnded`] once the match is over
    /// - [`SessionError::InvalidName`] for an empty or over-long name
    /// - [`SessionError::DuplicateName`] if a player already uses `name`
    /// - [`SessionError::SeatsFull`] if every seat is taken
    pub async fn register(&self, name: &str, conn: ConnectionId) -> Result<Admission, SessionError> {
        let name = name.trim();
        let mut inner = self.inner.write().await;

        if inner.match_ended {
            return Err(SessionError::MatchEnded);
        }
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(SessionError::InvalidName(name.to_string()));
        }
        if inner.slots.iter().any(|s| s.player.name == name) {
            return Err(SessionError::DuplicateName(name.to_string()));
        }
        if inner.slots.len() >= inner.seats {
            return Err(SessionError::SeatsFull(inner.seats));
        }

        let id = PlayerId(inner.next_id);
        inner.next_id += 1;
        let seat = Seat(inner.slots.len());
        let secret = inner.fresh_secret();
        let (sever, severed) = oneshot::channel();

        let player = Player {
            id,
            name: name.to_string(),
            seat,
            connection: Some(conn),
        };
        inner.secrets.insert(secret.clone(), id);
        inner.slots.push(Slot {
            player: player.clone(),
            secret: secret.clone(),
            sever: Some(sever),
        });

        info!(player_id = %id, %seat, %conn, name, "player registered");

        Ok(Admission {
            player,
            secret,
            severed,
        })
    }

    /// Binds `conn` to the player that owns `secret`.
    ///
    /// If the player already had a live connection, that connection's
    /// `severed` signal fires before the new binding is recorded, all
    /// under one write lock.
    ///
    /// # Errors
    /// - [`SessionError::UnknownSecret`] if no player holds `secret`
    /// - [`SessionError::MatchEnded`] once the match is over
    pub async fn resume(&self, secret: &Secret, conn: ConnectionId) -> Result<Admission, SessionError> {
        let mut inner = self.inner.write().await;

        let id = *inner.secrets.get(secret).ok_or(SessionError::UnknownSecret)?;
        if inner.match_ended {
            return Err(SessionError::MatchEnded);
        }
        let slot = inner.slot_mut(id).ok_or(SessionError::NotFound(id))?;

        let previous = slot.player.connection.take();
        if let Some(sever) = slot.sever.take() {
            // The old task may already be gone; nothing to sever then.
            let _ = sever.send(());
        }

        let (sever, severed) = oneshot::channel();
        slot.player.connection = Some(conn);
        slot.sever = Some(sever);

        info!(
            player_id = %id,
            seat = %slot.player.seat,
            %conn,
            superseded = ?previous,
            "player resumed"
        );

        Ok(Admission {
            player: slot.player.clone(),
            secret: slot.secret.clone(),
            severed,
        })
    }

    /// Clears the player's connection if it is still `conn`.
    ///
    /// Returns `true` if the binding was cleared. A connection that was
    /// already superseded by a resume leaves the newer binding alone and
    /// returns `false`.
    pub async fn detach(&self, id: PlayerId, conn: ConnectionId) -> bool {
        let mut inner = self.inner.write().await;
        let Some(slot) = inner.slot_mut(id) else {
            return false;
        };
        if slot.player.connection != Some(conn) {
            debug!(player_id = %id, %conn, "stale detach ignored");
            return false;
        }
        slot.player.connection = None;
        slot.sever = None;
        info!(player_id = %id, seat = %slot.player.seat, %conn, "player detached");
        true
    }

    /// Marks the match as over. Secrets stop resuming from here on.
    pub async fn end_match(&self) {
        let mut inner = self.inner.write().await;
        if !inner.match_ended {
            inner.match_ended = true;
            info!("session registry closed: match ended");
        }
    }

    pub async fn match_ended(&self) -> bool {
        self.inner.read().await.match_ended
    }

    /// The connection currently bound to `seat`, if any.
    ///
    /// This is the authoritative binding. The match checks it before
    /// accepting a seat's connection or a shot from it, so a connection
    /// severed by [`resume`](Self::resume) is shut out immediately.
    pub async fn connection(&self, seat: Seat) -> Option<ConnectionId> {
        let inner = self.inner.read().await;
        inner.slots.get(seat.0).and_then(|s| s.player.connection)
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
fn generate_secret() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
