//! Pausable deadlines for Breakshot.
//!
//! A match needs two kinds of clock:
//!
//! - the **turn clock**, which forfeits the active player's turn if no
//!   shot arrives in time, and which must stop while that player is
//!   disconnected;
//! - the **grace clock**, which gives a disconnected player a bounded
//!   window to come back.
//!
//! Both are a [`Countdown`]: a single deadline that can be armed,
//! paused (remembering how much time was left), resumed, and disarmed.
//!
//! # Integration
//!
//! A countdown sits inside the match actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         () = turn_clock.expired() => { /* forfeit the turn */ }
//!     }
//! }
//! ```
//!
//! [`Countdown::expired`] pends forever while the countdown is idle or
//! paused, so the branch simply never fires.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Where a [`Countdown`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    /// Not armed.
    Idle,
    /// Counting down towards `deadline`.
    Running { deadline: Instant },
    /// Stopped with `remaining` left on the clock.
    Paused { remaining: Duration },
}

/// A single pausable deadline.
///
/// ```text
/// Idle ──arm()──→ Running ──pause()──→ Paused
///  ▲                │  ▲                  │
///  │            expired() └───resume()────┘
///  └─────disarm()───┘
/// ```
#[derive(Debug)]
pub struct Countdown {
    label: &'static str,
    state: ClockState,
}

impl Countdown {
    /// Creates an idle countdown. `label` only shows up in logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            state: ClockState::Idle,
        }
    }

    /// Starts counting down `duration` from now, replacing any previous
    /// deadline or paused remainder.
    pub fn arm(&mut self, duration: Duration) {
        self.state = ClockState::Running {
            deadline: Instant::now() + duration,
        };
        debug!(clock = self.label, ?duration, "countdown armed");
    }

    /// Stops the clock, keeping the time that was left.
    ///
    /// No-op unless running.
    pub fn pause(&mut self) {
        if let ClockState::Running { deadline } = self.state {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.state = ClockState::Paused { remaining };
            debug!(clock = self.label, ?remaining, "countdown paused");
        }
    }

    /// Restarts a paused clock with the time it had left.
    ///
    /// No-op unless paused.
    pub fn resume(&mut self) {
        if let ClockState::Paused { remaining } = self.state {
            self.state = ClockState::Running {
                deadline: Instant::now() + remaining,
            };
            debug!(clock = self.label, ?remaining, "countdown resumed");
        }
    }

    /// Back to idle. The deadline is forgotten.
    pub fn disarm(&mut self) {
        if self.state != ClockState::Idle {
            trace!(clock = self.label, "countdown disarmed");
        }
        self.state = ClockState::Idle;
    }

    /// Time left, or `None` if idle.
    pub fn remaining(&self) -> Option<Duration> {
        match self.state {
            ClockState::Idle => None,
            ClockState::Running { deadline } => {
                Some(deadline.saturating_duration_since(Instant::now()))
            }
            ClockState::Paused { remaining } => Some(remaining),
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ClockState::Running { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, ClockState::Paused { .. })
    }

    /// Resolves when the deadline passes, then goes idle.
    ///
    /// Pends forever while idle or paused. Cancel-safe: dropping the
    /// future before it resolves leaves the countdown untouched.
    pub async fn expired(&mut self) {
        let ClockState::Running { deadline } = self.state else {
            std::future::pending::<()>().await;
            return;
        };

        time::sleep_until(deadline).await;

        self.state = ClockState::Idle;
        debug!(clock = self.label, "countdown expired");
    }
}
