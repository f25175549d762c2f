//! The turn and rules engine for one game of 9-ball.
//!
//! A [`Game`] owns the authoritative [`TableState`] for one rack. It is
//! the only thing that ever writes to it, and it only does so in
//! [`Game::apply`], after a shot has been simulated (or has failed, or
//! timed out).
//!
//! ```text
//! AwaitingBreak ──any shot──→ InPlay ──9 potted / foul limit──→ GameOver
//!       │                                                          ▲
//!       └──────────────9 potted on the break───────────────────────┘
//! ```

use breakshot_protocol::{
    Ball, BallId, BallInHand, Foul, GameOverReason, Position, Seat, ShotConstraints,
    ShotDescriptor, ShotEvent, ShotSummary, TableState,
};
use breakshot_table::geometry::{self, BALL_RADIUS, HEAD_SPOT};
use breakshot_table::{Simulation, SimulationError, conservation, rack};
use tracing::{debug, warn};

use crate::{ContinueOn, FirstContactRule, MatchError, RuleSet, TurnError, WinningBallFoul};

/// Where a game is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    AwaitingBreak,
    InPlay,
    GameOver { winner: Seat, reason: GameOverReason },
}

/// What came of a shot request.
#[derive(Debug, Clone)]
pub enum ShotOutcome {
    /// The engine ran. `staged` is the table the engine was given, with
    /// any ball-in-hand placement already applied.
    Simulated { staged: TableState, simulation: Simulation },
    /// The shot could not be simulated.
    Failed(SimulationError),
    /// No shot arrived before the turn clock ran out.
    TimedOut,
}

/// The rules engine's verdict on one shot.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotReport {
    pub summary: ShotSummary,
    /// The engine's event log, empty if the shot never ran or was rejected.
    pub events: Vec<ShotEvent>,
    /// Set if this shot ended the game.
    pub game_over: Option<(Seat, GameOverReason)>,
}

/// One rack of 9-ball.
#[derive(Debug, Clone)]
pub struct Game {
    number: u32,
    seats: usize,
    breaker: Seat,
    rules: RuleSet,
    phase: GamePhase,
    table: TableState,
    /// Consecutive fouls per seat in this game.
    fouls: Vec<u8>,
}

impl Game {
    /// Racks a new game with `breaker` to shoot first.
    ///
    /// The breaker has ball in hand behind the head string.
    pub fn new(number: u32, breaker: Seat, seats: usize, rules: RuleSet) -> Self {
        let table = TableState {
            balls: rack::nine_ball(),
            turn: breaker,
            constraints: ShotConstraints {
                on_ball: Some(BallId(1)),
                legal_targets: vec![BallId(1)],
                ball_in_hand: Some(BallInHand::Kitchen),
                break_shot: true,
            },
            shot_number: 0,
        };
        Self {
            number,
            seats,
            breaker,
            rules,
            phase: GamePhase::AwaitingBreak,
            table,
            fouls: vec![0; seats],
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn breaker(&self) -> Seat {
        self.breaker
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn table(&self) -> &TableState {
        &self.table
    }

    /// The seat expected to shoot next.
    pub fn active(&self) -> Seat {
        self.table.turn
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, GamePhase::GameOver { .. })
    }

    pub fn consecutive_fouls(&self, seat: Seat) -> u8 {
        self.fouls.get(seat.0).copied().unwrap_or(0)
    }

    /// The table the physics engine should see for `shot`.
    ///
    /// With ball in hand, a placement inside the permitted zone that does
    /// not overlap another ball moves the cue ball there. Any other
    /// placement is ignored and the cue ball stays where it is.
    pub fn stage(&self, shot: &ShotDescriptor) -> TableState {
        let mut staged = self.table.clone();
        let Some(pos) = shot.cue_ball_position else {
            return staged;
        };
        let Some(zone) = staged.constraints.ball_in_hand else {
            debug!(x = pos.x, y = pos.y, "cue placement without ball in hand ignored");
            return staged;
        };
        if !geometry::placement_allowed(pos, zone) || !geometry::placement_clear(pos, &staged.balls) {
            debug!(x = pos.x, y = pos.y, ?zone, "cue placement outside permitted zone ignored");
            return staged;
        }
        if let Some(cue) = staged.ball_mut(BallId::CUE) {
            cue.position = pos;
            cue.pocketed = false;
        }
        staged
    }

    /// Applies the outcome of `shooter`'s shot to the table.
    ///
    /// # Errors
    /// - [`TurnError::OutOfTurn`] if `shooter` is not the active seat
    /// - [`MatchError::InvariantViolated`] if the game is already over
    pub fn apply(&mut self, shooter: Seat, outcome: ShotOutcome) -> Result<ShotReport, MatchError> {
        if self.is_over() {
            return Err(MatchError::InvariantViolated(format!(
                "shot applied to finished game {}",
                self.number
            )));
        }
        if shooter != self.table.turn {
            return Err(TurnError::OutOfTurn { seat: shooter }.into());
        }

        let on_ball = self.table.constraints.on_ball;
        let (balls, events, foul) = match outcome {
            ShotOutcome::TimedOut => (self.table.balls.clone(), Vec::new(), Some(Foul::TurnTimeout)),
            ShotOutcome::Failed(err) => {
                debug!(%shooter, error = %err, "shot failed, scored as a foul");
                (
                    self.table.balls.clone(),
                    Vec::new(),
                    Some(Foul::Simulation { reason: err.to_string() }),
                )
            }
            ShotOutcome::Simulated { staged, simulation } => {
                match conservation::verify(&staged.balls, &simulation.balls, &simulation.events) {
                    Ok(()) => {
                        let foul = self.evaluate_foul(on_ball, &simulation);
                        (simulation.balls, simulation.events, foul)
                    }
                    Err(violation) => {
                        warn!(%shooter, %violation, "simulation broke conservation, scored as a foul");
                        let err = SimulationError::from(violation);
                        (
                            self.table.balls.clone(),
                            Vec::new(),
                            Some(Foul::Simulation { reason: err.to_string() }),
                        )
                    }
                }
            }
        };

        let potted: Vec<BallId> = events
            .iter()
            .filter_map(|e| match e {
                ShotEvent::BallPotted { ball } if !ball.is_cue() => Some(*ball),
                _ => None,
            })
            .collect();
        let next = shooter.next(self.seats);

        self.table.balls = balls;
        self.table.shot_number += 1;

        let fouls = &mut self.fouls[shooter.0];
        if foul.is_some() {
            *fouls = fouls.saturating_add(1);
        } else {
            *fouls = 0;
        }
        let foul_count = *fouls;

        let game_over = if potted.contains(&BallId::NINE) {
            let winner = match (&foul, self.rules.winning_ball_foul) {
                (None, _) | (Some(_), WinningBallFoul::Lenient) => shooter,
                (Some(_), WinningBallFoul::Strict) => next,
            };
            let reason = if foul.is_some() {
                GameOverReason::NineBallOnFoul
            } else {
                GameOverReason::NineBallPotted
            };
            Some((winner, reason))
        } else {
            match self.rules.consecutive_foul_limit {
                Some(limit) if foul.is_some() && foul_count >= limit => Some((next, GameOverReason::FoulLimit)),
                _ => None,
            }
        };

        let scratched = self.table.ball(BallId::CUE).is_some_and(|b| b.pocketed);
        if scratched && game_over.is_none() {
            respot_cue(&mut self.table.balls);
        }

        let (next_turn, ball_in_hand) = match (&game_over, &foul) {
            (Some((winner, _)), _) => (*winner, None),
            (None, Some(f)) => {
                let penalty = if matches!(f, Foul::Scratch) || scratched {
                    self.rules.scratch_penalty
                } else {
                    self.rules.foul_penalty
                };
                (next, penalty.ball_in_hand())
            }
            (None, None) => {
                let keeps_table = match self.rules.continue_on {
                    ContinueOn::OnBall => on_ball.is_some_and(|on| potted.contains(&on)),
                    ContinueOn::AnyLegalPot => !potted.is_empty(),
                };
                (if keeps_table { shooter } else { next }, None)
            }
        };

        let lowest = self.table.lowest_on_table();
        self.table.turn = next_turn;
        self.table.constraints = ShotConstraints {
            on_ball: lowest,
            legal_targets: lowest.into_iter().collect(),
            ball_in_hand,
            break_shot: false,
        };

        self.phase = match game_over {
            Some((winner, reason)) => GamePhase::GameOver { winner, reason },
            None => GamePhase::InPlay,
        };

        Ok(ShotReport {
            summary: ShotSummary {
                shooter,
                shot_number: self.table.shot_number,
                potted,
                foul,
                next_turn,
                ball_in_hand,
            },
            events,
            game_over,
        })
    }

    /// Ends the game in favour of `winner` without a shot.
    pub fn concede(&mut self, winner: Seat) {
        self.phase = GamePhase::GameOver {
            winner,
            reason: GameOverReason::Forfeit,
        };
    }

    /// `true` if the table still holds exactly the rack's balls.
    pub fn ball_set_intact(&self) -> bool {
        let mut ids: Vec<BallId> = self.table.balls.iter().map(|b| b.id).collect();
        ids.sort();
        ids == (0..=9).map(BallId).collect::<Vec<_>>()
    }

    fn evaluate_foul(&self, on_ball: Option<BallId>, sim: &Simulation) -> Option<Foul> {
        // However the engine reported it, a cue ball at rest in a pocket
        // is a scratch.
        let cue_pocketed = sim.balls.iter().any(|b| b.id.is_cue() && b.pocketed);
        if sim.scratched() || cue_pocketed {
            return Some(Foul::Scratch);
        }
        if self.rules.first_contact == FirstContactRule::Enforced {
            match (sim.first_contact(), on_ball) {
                (None, Some(_)) => return Some(Foul::NoContact),
                (Some(actual), Some(expected)) if actual != expected => {
                    return Some(Foul::WrongBallFirst { expected, actual });
                }
                _ => {}
            }
        }
        sim.reported_foul().map(|reason| Foul::Reported {
            reason: reason.to_string(),
        })
    }
}

/// Puts a pocketed cue ball back on the head spot, sliding it towards the
/// head rail if an object ball is in the way.
fn respot_cue(balls: &mut [Ball]) {
    let mut spot = HEAD_SPOT;
    while !geometry::placement_clear(spot, balls) && spot.y > 2.0 * BALL_RADIUS {
        spot = Position::new(spot.x, spot.y - 2.0 * BALL_RADIUS);
    }
    if let Some(cue) = balls.iter_mut().find(|b| b.id.is_cue()) {
        cue.pocketed = false;
        cue.position = spot;
    }
}
