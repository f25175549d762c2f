//! A physics adapter that replays queued outcomes.
//!
//! Used by tests that need a specific sequence of shots ("A pots the 9
//! on the break, then B scratches...") without a real engine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use breakshot_protocol::{BallId, ShotDescriptor, ShotEvent, TableState};

use crate::{PhysicsAdapter, Simulation, SimulationError};

/// What the cue ball hits first in a scripted outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    /// Whatever the lowest ball on the table is when the shot is taken.
    OnBall,
    Ball(BallId),
    Nothing,
}

/// One queued outcome.
#[derive(Debug, Clone)]
pub enum Script {
    /// Pocket the listed balls (and maybe the cue ball) where they stand.
    Outcome {
        contact: Contact,
        potted: Vec<BallId>,
        scratch: bool,
        foul: Option<String>,
    },
    /// Return this simulation verbatim, whatever the input.
    Raw(Simulation),
    /// Fail with this error.
    Fail(SimulationError),
    /// Panic inside `simulate`.
    Panic(String),
}

impl Script {
    /// Hits the on ball and pots nothing.
    pub fn miss() -> Self {
        Self::Outcome {
            contact: Contact::OnBall,
            potted: Vec::new(),
            scratch: false,
            foul: None,
        }
    }

    /// Hits the on ball first and pots `balls`.
    pub fn pot(balls: impl IntoIterator<Item = u8>) -> Self {
        Self::Outcome {
            contact: Contact::OnBall,
            potted: balls.into_iter().map(BallId).collect(),
            scratch: false,
            foul: None,
        }
    }

    pub fn contact(self, ball: u8) -> Self {
        self.with_contact(Contact::Ball(BallId(ball)))
    }

    pub fn no_contact(self) -> Self {
        self.with_contact(Contact::Nothing)
    }

    /// Also drops the cue ball.
    pub fn scratch(mut self) -> Self {
        if let Self::Outcome { scratch, .. } = &mut self {
            *scratch = true;
        }
        self
    }

    /// Adds an engine-reported foul.
    pub fn foul(mut self, reason: impl Into<String>) -> Self {
        if let Self::Outcome { foul, .. } = &mut self {
            *foul = Some(reason.into());
        }
        self
    }

    fn with_contact(mut self, to: Contact) -> Self {
        if let Self::Outcome { contact, .. } = &mut self {
            *contact = to;
        }
        self
    }

    fn play(self, table: &TableState) -> Result<Simulation, SimulationError> {
        match self {
            Self::Raw(sim) => Ok(sim),
            Self::Fail(err) => Err(err),
            Self::Panic(msg) => panic!("{msg}"),
            Self::Outcome {
                contact,
                potted,
                scratch,
                foul,
            } => {
                let mut balls = table.balls.clone();
                let mut events = Vec::new();

                let first = match contact {
                    Contact::OnBall => table.lowest_on_table(),
                    Contact::Ball(id) => Some(id),
                    Contact::Nothing => None,
                };
                if let Some(ball) = first {
                    events.push(ShotEvent::FirstContact { ball });
                }

                for id in potted {
                    if let Some(ball) = balls.iter_mut().find(|b| b.id == id && !b.pocketed) {
                        ball.pocketed = true;
                        events.push(ShotEvent::BallPotted { ball: id });
                    }
                }
                if scratch {
                    if let Some(cue) = balls.iter_mut().find(|b| b.id.is_cue()) {
                        cue.pocketed = true;
                        events.push(ShotEvent::CueBallScratch);
                    }
                }
                if let Some(reason) = foul {
                    events.push(ShotEvent::Foul { reason });
                }

                Ok(Simulation { balls, events })
            }
        }
    }
}

/// Replays [`Script`]s in order.
///
/// Clones share the queue, so a test can keep a handle and push more
/// outcomes after the adapter has been handed to the server. Once the
/// queue runs dry every shot is a [`Script::miss`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedPhysics {
    queue: Arc<Mutex<VecDeque<Script>>>,
}

impl ScriptedPhysics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scripts(scripts: impl IntoIterator<Item = Script>) -> Self {
        let physics = Self::new();
        for script in scripts {
            physics.push(script);
        }
        physics
    }

    pub fn push(&self, script: Script) {
        self.lock().push_back(script);
    }

    /// Outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Script>> {
        // A scripted panic poisons nothing we care about.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PhysicsAdapter for ScriptedPhysics {
    fn simulate(&self, table: &TableState, _shot: &ShotDescriptor) -> Result<Simulation, SimulationError> {
        let script = self.lock().pop_front().unwrap_or_else(Script::miss);
        script.play(table)
    }
}
