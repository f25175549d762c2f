//! Table dimensions and shot validation.
//!
//! Coordinates are metres from the bottom-left corner of the playing
//! surface. `y` runs along the length; the breaker shoots from the head
//! end (small `y`) towards the rack at the foot end.

use breakshot_protocol::{Ball, BallInHand, Position, ShotDescriptor};

use crate::SimulationError;

/// Playing-surface width of a 9-foot table.
pub const TABLE_WIDTH: f64 = 1.27;
/// Playing-surface length of a 9-foot table.
pub const TABLE_LENGTH: f64 = 2.54;
pub const BALL_RADIUS: f64 = 0.028575;

/// The head string. The kitchen is everything with `y` at or below it.
pub const HEAD_STRING_Y: f64 = TABLE_LENGTH / 4.0;

/// Where the cue ball starts a game and is respotted after a scratch.
pub const HEAD_SPOT: Position = Position {
    x: TABLE_WIDTH / 2.0,
    y: TABLE_LENGTH / 4.0,
};

/// Where the apex ball of the rack sits.
pub const FOOT_SPOT: Position = Position {
    x: TABLE_WIDTH / 2.0,
    y: TABLE_LENGTH * 3.0 / 4.0,
};

/// Fastest cue speed accepted, in m/s.
pub const MAX_SPEED: f64 = 10.0;

/// Highest cue elevation accepted, in degrees.
pub const MAX_THETA: f64 = 90.0;

/// `true` if a ball centred at `pos` lies entirely on the cloth.
pub fn on_table(pos: Position) -> bool {
    pos.x.is_finite()
        && pos.y.is_finite()
        && (BALL_RADIUS..=TABLE_WIDTH - BALL_RADIUS).contains(&pos.x)
        && (BALL_RADIUS..=TABLE_LENGTH - BALL_RADIUS).contains(&pos.y)
}

/// `true` if `pos` is on the table and behind the head string.
pub fn in_kitchen(pos: Position) -> bool {
    on_table(pos) && pos.y <= HEAD_STRING_Y
}

/// `true` if the cue ball may be placed at `pos` under `zone`.
pub fn placement_allowed(pos: Position, zone: BallInHand) -> bool {
    match zone {
        BallInHand::Anywhere => on_table(pos),
        BallInHand::Kitchen => in_kitchen(pos),
    }
}

/// `true` if a ball at `pos` would not overlap any ball still on the table
/// other than the cue ball.
pub fn placement_clear(pos: Position, balls: &[Ball]) -> bool {
    let min_dist = 2.0 * BALL_RADIUS;
    balls
        .iter()
        .filter(|b| !b.pocketed && !b.id.is_cue())
        .all(|b| distance(pos, b.position) >= min_dist)
}

pub fn distance(a: Position, b: Position) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Checks that a shot descriptor is structurally complete and in range.
///
/// This says nothing about whether the shot is legal under the rules;
/// it only guards the physics engine against garbage input.
///
/// # Errors
/// Returns [`SimulationError::InvalidShot`] naming the first bad field.
pub fn validate_shot(shot: &ShotDescriptor) -> Result<(), SimulationError> {
    let invalid = |msg: String| Err(SimulationError::InvalidShot(msg));

    for (name, value) in [
        ("speed", shot.speed),
        ("phi", shot.phi),
        ("theta", shot.theta),
        ("a", shot.a),
        ("b", shot.b),
    ] {
        if !value.is_finite() {
            return invalid(format!("{name} is not a finite number"));
        }
    }

    if shot.speed <= 0.0 || shot.speed > MAX_SPEED {
        return invalid(format!(
            "speed {} outside (0, {MAX_SPEED}]",
            shot.speed
        ));
    }
    if !(0.0..=MAX_THETA).contains(&shot.theta) {
        return invalid(format!("theta {} outside [0, {MAX_THETA}]", shot.theta));
    }
    if shot.a.abs() > 1.0 || shot.b.abs() > 1.0 {
        return invalid(format!("tip offset ({}, {}) off the ball", shot.a, shot.b));
    }
    if let Some(pos) = shot.cue_ball_position {
        if !on_table(pos) {
            return invalid(format!("cue ball placement ({}, {}) off the table", pos.x, pos.y));
        }
    }
    Ok(())
}
