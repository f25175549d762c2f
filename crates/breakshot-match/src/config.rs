//! Match configuration and rule options.
//!
//! The exact foul and ball-in-hand rules of 9-ball vary from room to
//! room, so every contested rule is an explicit option on [`RuleSet`]
//! rather than a hardcoded choice.

use std::time::Duration;

use breakshot_protocol::{BallInHand, Seat};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Who wins a game when the 9 drops on a foul.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WinningBallFoul {
    /// The foul takes precedence: the next seat wins.
    #[default]
    Strict,
    /// The pot takes precedence: the shooter still wins.
    Lenient,
}

/// What the incoming player gets after a foul.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CuePenalty {
    /// Cue ball anywhere on the table.
    #[default]
    BallInHandAnywhere,
    /// Cue ball behind the head string.
    BallInHandKitchen,
    /// Loss of turn only; the cue ball is played from where it lies.
    NoBallInHand,
}

impl CuePenalty {
    pub fn ball_in_hand(self) -> Option<BallInHand> {
        match self {
            Self::BallInHandAnywhere => Some(BallInHand::Anywhere),
            Self::BallInHandKitchen => Some(BallInHand::Kitchen),
            Self::NoBallInHand => None,
        }
    }
}

/// Whether the cue ball must strike the on ball first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FirstContactRule {
    #[default]
    Enforced,
    Ignored,
}

/// What lets the shooter stay at the table after a foul-free shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContinueOn {
    /// Only potting the on ball itself.
    #[default]
    OnBall,
    /// Potting any object ball.
    AnyLegalPot,
}

/// The configurable parts of the 9-ball rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub winning_ball_foul: WinningBallFoul,
    /// Penalty after the cue ball is pocketed.
    pub scratch_penalty: CuePenalty,
    /// Penalty after any other foul.
    pub foul_penalty: CuePenalty,
    pub first_contact: FirstContactRule,
    pub continue_on: ContinueOn,
    /// Consecutive fouls by one seat, within one game, that lose the game.
    /// `None` disables the rule.
    pub consecutive_foul_limit: Option<u8>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            winning_ball_foul: WinningBallFoul::default(),
            scratch_penalty: CuePenalty::BallInHandAnywhere,
            foul_penalty: CuePenalty::BallInHandAnywhere,
            first_contact: FirstContactRule::default(),
            continue_on: ContinueOn::default(),
            consecutive_foul_limit: Some(3),
        }
    }
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// What happens to a seat that runs out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForfeitPolicy {
    /// Treated as a foul; the turn passes.
    ForfeitTurn,
    /// The next seat wins the current game.
    ForfeitGame,
    /// The seat loses the whole match.
    ForfeitMatch,
}

/// Who breaks the first game. The winner of each game breaks the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FirstBreak {
    #[default]
    Random,
    Seat(Seat),
}

/// Configuration for one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Number of players. At least 2.
    pub seats: usize,
    /// Games a seat must win to take the match.
    pub race_to: u32,
    /// How long the active player has to answer a shot request.
    /// `None` waits forever.
    pub turn_timeout: Option<Duration>,
    /// How long the active player may stay disconnected.
    pub reconnect_grace: Duration,
    /// Applied when the turn clock runs out.
    pub turn_timeout_policy: ForfeitPolicy,
    /// Applied when the reconnection grace runs out.
    pub abandon_policy: ForfeitPolicy,
    pub rules: RuleSet,
    pub first_break: FirstBreak,
    /// Capacity of the match command channel.
    pub channel_size: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            seats: 2,
            race_to: 10,
            turn_timeout: Some(Duration::from_secs(60)),
            reconnect_grace: Duration::from_secs(30),
            turn_timeout_policy: ForfeitPolicy::ForfeitTurn,
            abandon_policy: ForfeitPolicy::ForfeitMatch,
            rules: RuleSet::default(),
            first_break: FirstBreak::Random,
            channel_size: 64,
        }
    }
}

impl MatchConfig {
    /// Fixes any out-of-range values so the config is safe to use.
    ///
    /// - `seats` raised to 2.
    /// - `race_to` raised to 1.
    /// - A fixed first breaker outside the seat range falls back to random.
    pub fn validated(mut self) -> Self {
        if self.seats < 2 {
            warn!(seats = self.seats, "a match needs at least 2 seats, using 2");
            self.seats = 2;
        }
        if self.race_to == 0 {
            warn!("race_to of 0 would end the match before it starts, using 1");
            self.race_to = 1;
        }
        if let FirstBreak::Seat(seat) = self.first_break {
            if seat.0 >= self.seats {
                warn!(%seat, seats = self.seats, "first breaker out of range, choosing at random");
                self.first_break = FirstBreak::Random;
            }
        }
        self.channel_size = self.channel_size.max(1);
        self
    }
}

/// Spectator admission and buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectatorConfig {
    pub enabled: bool,
    /// 0 means unlimited.
    pub max_spectators: usize,
    /// Events queued per spectator before it is dropped as too slow.
    pub buffer: usize,
}

impl Default for SpectatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_spectators: 0,
            buffer: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_config_default() {
        let config = MatchConfig::default();
        assert_eq!(config.seats, 2);
        assert_eq!(config.race_to, 10);
        assert_eq!(config.rules.winning_ball_foul, WinningBallFoul::Strict);
        assert_eq!(config.rules.consecutive_foul_limit, Some(3));
        assert_eq!(config.first_break, FirstBreak::Random);
    }

    #[test]
    fn test_validated_fixes_out_of_range_values() {
        let config = MatchConfig {
            seats: 1,
            race_to: 0,
            first_break: FirstBreak::Seat(Seat(5)),
            ..Default::default()
        }
        .validated();

        assert_eq!(config.seats, 2);
        assert_eq!(config.race_to, 1);
        assert_eq!(config.first_break, FirstBreak::Random);
    }

    #[test]
    fn test_cue_penalty_maps_to_ball_in_hand() {
        assert_eq!(
            CuePenalty::BallInHandKitchen.ball_in_hand(),
            Some(BallInHand::Kitchen)
        );
        assert_eq!(CuePenalty::NoBallInHand.ball_in_hand(), None);
    }

    #[test]
    fn test_rule_set_deserializes_from_json() {
        let json = r#"{
            "winning_ball_foul": "Lenient",
            "scratch_penalty": "BallInHandKitchen",
            "foul_penalty": "NoBallInHand",
            "first_contact": "Ignored",
            "continue_on": "AnyLegalPot",
            "consecutive_foul_limit": null
        }"#;
        let rules: RuleSet = serde_json::from_str(json).unwrap();
        assert_eq!(rules.winning_ball_foul, WinningBallFoul::Lenient);
        assert_eq!(rules.consecutive_foul_limit, None);
    }
}
