//! The match state machine: games, scores, and completion.
//!
//! A [`Match`] strings [`Game`]s together until some seat reaches the
//! race-to score. It produces the [`MatchEvent`]s that describe every
//! transition; the actor sequences and delivers them.

use breakshot_protocol::{
    GameOverReason, MatchEvent, MatchPhase, MatchSnapshot, Seat, ShotDescriptor, ShotSummary,
    Standing, TableState,
};
use tracing::{error, info};

use crate::rules::{Game, ShotOutcome};
use crate::{MatchConfig, MatchError};

/// The result of a recorded shot.
#[derive(Debug, Clone)]
pub struct ShotRecord {
    pub summary: ShotSummary,
    /// Everything observers should hear about, in order.
    pub events: Vec<MatchEvent>,
}

/// The authoritative state of one match.
#[derive(Debug)]
pub struct Match {
    config: MatchConfig,
    phase: MatchPhase,
    names: Vec<String>,
    scores: Vec<u32>,
    games_played: u32,
    game: Option<Game>,
    first_breaker: Seat,
}

impl Match {
    /// Creates a match waiting for its players. `config` should already
    /// be validated.
    pub fn new(config: MatchConfig, first_breaker: Seat) -> Self {
        let seats = config.seats;
        Self {
            config,
            phase: MatchPhase::WaitingForPlayers,
            names: (0..seats).map(|s| format!("seat-{s}")).collect(),
            scores: vec![0; seats],
            games_played: 0,
            game: None,
            first_breaker,
        }
    }

    pub fn phase(&self) -> &MatchPhase {
        &self.phase
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn scores(&self) -> &[u32] {
        &self.scores
    }

    pub fn games_played(&self) -> u32 {
        self.games_played
    }

    pub fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    pub fn table(&self) -> Option<&TableState> {
        self.game.as_ref().map(Game::table)
    }

    /// The seat expected to shoot, while a game is running.
    pub fn active_seat(&self) -> Option<Seat> {
        match (&self.phase, &self.game) {
            (MatchPhase::InProgress, Some(game)) if !game.is_over() => Some(game.active()),
            _ => None,
        }
    }

    pub fn set_name(&mut self, seat: Seat, name: &str) {
        if let Some(slot) = self.names.get_mut(seat.0) {
            *slot = name.to_string();
        }
    }

    pub fn standings(&self) -> Vec<Standing> {
        self.scores
            .iter()
            .enumerate()
            .map(|(i, &games_won)| Standing {
                seat: Seat(i),
                name: self.names[i].clone(),
                games_won,
            })
            .collect()
    }

    pub fn snapshot(&self, last_event_seq: u64) -> MatchSnapshot {
        MatchSnapshot {
            phase: self.phase.clone(),
            race_to: self.config.race_to,
            standings: self.standings(),
            game: self.game.as_ref().map_or(0, Game::number),
            table: self.table().cloned(),
            last_event_seq,
        }
    }

    /// `WaitingForPlayers → InProgress`, racking the first game.
    ///
    /// # Errors
    /// [`MatchError::NotInProgress`] if the match already started.
    pub fn start(&mut self) -> Result<Vec<MatchEvent>, MatchError> {
        if self.phase != MatchPhase::WaitingForPlayers {
            return Err(MatchError::NotInProgress(self.phase.clone()));
        }
        self.phase = MatchPhase::InProgress;
        info!(race_to = self.config.race_to, seats = self.config.seats, "match started");

        let mut events = vec![MatchEvent::MatchStarted {
            race_to: self.config.race_to,
            standings: self.standings(),
        }];
        events.push(self.rack(self.first_breaker));
        Ok(events)
    }

    /// The table the physics engine should see for the active seat's shot.
    pub fn stage(&self, shot: &ShotDescriptor) -> Option<TableState> {
        self.game.as_ref().map(|g| g.stage(shot))
    }

    /// Applies a shot outcome and any game or match transition it causes.
    ///
    /// # Errors
    /// - [`MatchError::NotInProgress`] unless the match is running
    /// - [`TurnError::OutOfTurn`] if `seat` is not the active seat
    /// - [`MatchError::InvariantViolated`] if the resulting state is
    ///   inconsistent; the caller must abort the match
    pub fn record_shot(&mut self, seat: Seat, outcome: ShotOutcome) -> Result<ShotRecord, MatchError> {
        if self.phase != MatchPhase::InProgress {
            return Err(MatchError::NotInProgress(self.phase.clone()));
        }
        let game = self
            .game
            .as_mut()
            .ok_or_else(|| MatchError::InvariantViolated("match in progress without a game".into()))?;

        let report = game.apply(seat, outcome)?;
        let number = game.number();
        let mut events = vec![MatchEvent::ShotResult {
            game: number,
            summary: report.summary.clone(),
            events: report.events,
            table: game.table().clone(),
        }];

        if let Some((winner, reason)) = report.game_over {
            events.extend(self.finish_game(winner, reason));
        }

        self.check_invariants()?;
        Ok(ShotRecord {
            summary: report.summary,
            events,
        })
    }

    /// Scores the current game for the seat after `loser`.
    ///
    /// # Errors
    /// [`MatchError::NotInProgress`] unless the match is running.
    pub fn forfeit_game(&mut self, loser: Seat) -> Result<Vec<MatchEvent>, MatchError> {
        if self.phase != MatchPhase::InProgress {
            return Err(MatchError::NotInProgress(self.phase.clone()));
        }
        let winner = loser.next(self.config.seats);
        if let Some(game) = self.game.as_mut() {
            game.concede(winner);
        }
        info!(%loser, %winner, "game forfeited");
        let events = self.finish_game(winner, GameOverReason::Forfeit);
        self.check_invariants()?;
        Ok(events)
    }

    /// Ends the match against `loser`. The remaining seat with the most
    /// games won takes it; ties go to the seat that plays soonest after
    /// `loser`.
    ///
    /// # Errors
    /// [`MatchError::NotInProgress`] unless the match is running.
    pub fn forfeit_match(&mut self, loser: Seat) -> Result<Vec<MatchEvent>, MatchError> {
        if self.phase != MatchPhase::InProgress {
            return Err(MatchError::NotInProgress(self.phase.clone()));
        }
        let seats = self.config.seats;
        let mut winner = loser.next(seats);
        let mut candidate = winner;
        for _ in 1..seats {
            if candidate != loser && self.scores[candidate.0] > self.scores[winner.0] {
                winner = candidate;
            }
            candidate = candidate.next(seats);
        }

        self.phase = MatchPhase::Forfeited {
            winner,
            forfeited_by: loser,
        };
        info!(%loser, %winner, "match forfeited");
        Ok(vec![self.match_over()])
    }

    /// Moves to `Aborted`. Always succeeds; aborting twice keeps the
    /// first reason.
    pub fn abort(&mut self, reason: &str) -> Vec<MatchEvent> {
        if let MatchPhase::Aborted { reason } = &self.phase {
            return vec![MatchEvent::MatchAborted { reason: reason.clone() }];
        }
        error!(reason, "match aborted");
        self.phase = MatchPhase::Aborted {
            reason: reason.to_string(),
        };
        vec![MatchEvent::MatchAborted {
            reason: reason.to_string(),
        }]
    }

    /// Checks the match-level consistency rules.
    ///
    /// - every game played has exactly one winner: `sum(scores) == games_played`
    /// - no score exceeds `race_to`
    /// - `Completed` exactly when some score equals `race_to`
    /// - the current game still holds the rack's balls
    ///
    /// # Errors
    /// [`MatchError::InvariantViolated`] describing the first failure.
    pub fn check_invariants(&self) -> Result<(), MatchError> {
        let violated = |msg: String| Err(MatchError::InvariantViolated(msg));

        let total: u32 = self.scores.iter().sum();
        if total != self.games_played {
            return violated(format!(
                "scores sum to {total} but {} games were played",
                self.games_played
            ));
        }
        let race_to = self.config.race_to;
        if let Some(s) = self.scores.iter().find(|&&s| s > race_to) {
            return violated(format!("score {s} exceeds race to {race_to}"));
        }
        let reached = self.scores.iter().any(|&s| s == race_to);
        let completed = matches!(self.phase, MatchPhase::Completed { .. });
        if reached != completed && !matches!(self.phase, MatchPhase::Aborted { .. }) {
            return violated(format!(
                "phase {} inconsistent with scores {:?} (race to {race_to})",
                self.phase, self.scores
            ));
        }
        if let Some(game) = &self.game {
            if !game.ball_set_intact() {
                return violated(format!("game {} lost or gained a ball", game.number()));
            }
        }
        Ok(())
    }

    fn finish_game(&mut self, winner: Seat, reason: GameOverReason) -> Vec<MatchEvent> {
        self.scores[winner.0] += 1;
        self.games_played += 1;
        let game = self.game.as_ref().map_or(0, Game::number);
        info!(game, %winner, ?reason, scores = ?self.scores, "game over");

        let mut events = vec![MatchEvent::GameOver {
            game,
            winner,
            reason,
            standings: self.standings(),
        }];

        if self.scores[winner.0] >= self.config.race_to {
            self.phase = MatchPhase::Completed { winner };
            info!(%winner, games = self.games_played, "match completed");
            events.push(self.match_over());
        } else {
            events.push(self.rack(winner));
        }
        events
    }

    fn rack(&mut self, breaker: Seat) -> MatchEvent {
        let number = self.games_played + 1;
        let game = Game::new(number, breaker, self.config.seats, self.config.rules.clone());
        let table = game.table().clone();
        self.game = Some(game);
        MatchEvent::GameStarted {
            game: number,
            breaker,
            table,
        }
    }

    fn match_over(&self) -> MatchEvent {
        MatchEvent::MatchOver {
            phase: self.phase.clone(),
            standings: self.standings(),
            games_played: self.games_played,
        }
    }
}
