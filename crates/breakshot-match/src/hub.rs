//! Spectator fan-out.
//!
//! The hub holds one bounded queue per spectator. Publishing never
//! waits: an event that does not fit in a spectator's queue gets that
//! spectator dropped, and the match carries on.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use breakshot_protocol::{SpectatorId, StateEvent};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

use crate::{HubError, SpectatorConfig};

/// Receiving end handed to a spectator's connection task.
pub type SpectatorReceiver = mpsc::Receiver<Arc<StateEvent>>;

/// Fan-out of state events to spectators.
///
/// Shared between the match actor (the only publisher) and spectator
/// connection tasks (which unsubscribe when they leave). The spectator
/// set sits behind its own `RwLock`: publishing takes the read lock,
/// joins and leaves take the write lock.
pub struct BroadcastHub {
    config: SpectatorConfig,
    next_id: AtomicU64,
    closed: AtomicBool,
    spectators: RwLock<HashMap<SpectatorId, mpsc::Sender<Arc<StateEvent>>>>,
}

impl BroadcastHub {
    pub fn new(config: SpectatorConfig) -> Self {
        Self {
            config: SpectatorConfig {
                buffer: config.buffer.max(1),
                ..config
            },
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            spectators: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Adds a spectator and returns its event queue.
    ///
    /// # Errors
    /// - [`HubError::Disabled`] if spectating is off
    /// - [`HubError::Full`] at the spectator limit
    /// - [`HubError::Closed`] after [`close`](Self::close)
    pub async fn subscribe(&self) -> Result<(SpectatorId, SpectatorReceiver), HubError> {
        if !self.config.enabled {
            return Err(HubError::Disabled);
        }
        let mut spectators = self.spectators.write().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(HubError::Closed);
        }
        // A spectator whose receiver is gone no longer holds a slot.
        spectators.retain(|id, tx| {
            let gone = tx.is_closed();
            if gone {
                debug!(spectator_id = %id, "pruned departed spectator");
            }
            !gone
        });
        let max = self.config.max_spectators;
        if max > 0 && spectators.len() >= max {
            return Err(HubError::Full(max));
        }

        let id = SpectatorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.buffer);
        spectators.insert(id, tx);
        info!(spectator_id = %id, spectators = spectators.len(), "spectator joined");
        Ok((id, rx))
    }

    /// Removes a spectator. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: SpectatorId) {
        if self.spectators.write().await.remove(&id).is_some() {
            info!(spectator_id = %id, "spectator left");
        }
    }

    /// Offers `event` to every spectator without waiting.
    ///
    /// Spectators whose queue is full or whose task has gone are removed;
    /// dropping their sender ends their stream. Returns how many
    /// spectators received the event.
    pub async fn publish(&self, event: Arc<StateEvent>) -> usize {
        let mut failed = Vec::new();
        let mut delivered = 0;
        {
            let spectators = self.spectators.read().await;
            for (id, tx) in spectators.iter() {
                match tx.try_send(Arc::clone(&event)) {
                    Ok(()) => delivered += 1,
                    Err(_) => failed.push(*id),
                }
            }
        }

        if !failed.is_empty() {
            let mut spectators = self.spectators.write().await;
            for id in failed {
                if spectators.remove(&id).is_some() {
                    info!(spectator_id = %id, seq = event.seq, "spectator dropped: too slow or gone");
                }
            }
        }

        debug!(seq = event.seq, delivered, "event published");
        delivered
    }

    /// Drops every spectator and refuses new ones. Their streams end once
    /// they drain what is already queued.
    pub async fn close(&self) {
        let mut spectators = self.spectators.write().await;
        self.closed.store(true, Ordering::Release);
        let count = spectators.len();
        spectators.clear();
        info!(spectators = count, "broadcast hub closed");
    }

    pub async fn len(&self) -> usize {
        self.spectators.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
