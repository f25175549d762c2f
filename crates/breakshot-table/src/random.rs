//! A seeded stand-in physics engine.
//!
//! `RandomPhysics` does not model trajectories. It rolls dice, weighted
//! by cue speed, to decide what the cue ball hits, what drops, and
//! where the survivors come to rest. Every outcome passes the
//! conservation check, and the same seed with the same sequence of
//! inputs gives the same outcomes, which is all a demo server or a soak
//! run needs.

use std::sync::Mutex;

use breakshot_protocol::{Ball, BallId, Position, ShotDescriptor, ShotEvent, TableState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::geometry::{BALL_RADIUS, MAX_SPEED, TABLE_LENGTH, TABLE_WIDTH, validate_shot};
use crate::{PhysicsAdapter, Simulation, SimulationError};

/// Chance that the cue ball finds the on ball first.
const HIT_ON_BALL: f64 = 0.75;
/// Chance that the cue ball touches nothing at all.
const WHIFF: f64 = 0.05;
/// Per-ball pot chance at full speed.
const POT_AT_FULL_SPEED: f64 = 0.25;
const SCRATCH: f64 = 0.06;

pub struct RandomPhysics {
    seed: u64,
    rng: Mutex<StdRng>,
}

impl RandomPhysics {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl std::fmt::Debug for RandomPhysics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomPhysics").field("seed", &self.seed).finish()
    }
}

impl PhysicsAdapter for RandomPhysics {
    fn simulate(&self, table: &TableState, shot: &ShotDescriptor) -> Result<Simulation, SimulationError> {
        validate_shot(shot)?;

        let mut rng = self
            .rng
            .lock()
            .map_err(|_| SimulationError::Engine("random source poisoned".into()))?;

        let mut balls: Vec<Ball> = table.balls.clone();
        let mut events = Vec::new();

        let on_table: Vec<BallId> = balls
            .iter()
            .filter(|b| !b.pocketed && !b.id.is_cue())
            .map(|b| b.id)
            .collect();

        let roll: f64 = rng.random();
        let first = if on_table.is_empty() || roll < WHIFF {
            None
        } else if roll < WHIFF + HIT_ON_BALL {
            table.lowest_on_table()
        } else {
            Some(on_table[rng.random_range(0..on_table.len())])
        };
        let Some(first) = first else {
            scatter(&mut balls, &mut *rng);
            trace!("random physics: no contact");
            return Ok(Simulation { balls, events });
        };
        events.push(ShotEvent::FirstContact { ball: first });

        // Harder shots spread the rack more and drop more balls.
        let power = (shot.speed / MAX_SPEED).clamp(0.0, 1.0);
        let pot_chance = POT_AT_FULL_SPEED * (0.3 + 0.7 * power);
        for ball in balls.iter_mut().filter(|b| !b.pocketed && !b.id.is_cue()) {
            if rng.random_bool(pot_chance) {
                ball.pocketed = true;
                events.push(ShotEvent::BallPotted { ball: ball.id });
            }
        }
        if rng.random_bool(SCRATCH * (0.5 + power)) {
            if let Some(cue) = balls.iter_mut().find(|b| b.id.is_cue()) {
                cue.pocketed = true;
                events.push(ShotEvent::CueBallScratch);
            }
        }

        scatter(&mut balls, &mut *rng);
        trace!(events = events.len(), "random physics: shot simulated");
        Ok(Simulation { balls, events })
    }
}

/// Moves every ball still on the table to a random resting spot.
fn scatter(balls: &mut [Ball], rng: &mut impl Rng) {
    for ball in balls.iter_mut().filter(|b| !b.pocketed) {
        ball.position = Position::new(
            rng.random_range(BALL_RADIUS..TABLE_WIDTH - BALL_RADIUS),
            rng.random_range(BALL_RADIUS..TABLE_LENGTH - BALL_RADIUS),
        );
    }
}
