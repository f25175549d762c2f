//! Ball conservation check.
//!
//! A simulation may move balls and drop them into pockets. It may not
//! create a ball, lose one, pull one back out of a pocket, or pocket one
//! without saying so in its event log. [`verify`] enforces exactly that
//! before the rules engine ever looks at the result.

use std::collections::HashSet;

use breakshot_protocol::{Ball, BallId, ShotEvent};

/// A way a simulated table disagrees with the table it started from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConservationError {
    #[error("ball set changed: expected {expected:?}, got {actual:?}")]
    BallSetChanged {
        expected: Vec<BallId>,
        actual: Vec<BallId>,
    },

    #[error("ball {0} came back out of a pocket")]
    Unpocketed(BallId),

    #[error("ball {0} was pocketed without an event")]
    UnrecordedPot(BallId),

    #[error("event reports ball {0} pocketed but it is not")]
    PhantomPot(BallId),

    #[error("ball {0} has a non-finite position")]
    BadPosition(BallId),
}

/// Checks that `after` is a legal successor of `before` given `events`.
///
/// # Errors
/// Returns the first [`ConservationError`] found.
pub fn verify(before: &[Ball], after: &[Ball], events: &[ShotEvent]) -> Result<(), ConservationError> {
    let expected = sorted_ids(before);
    let actual = sorted_ids(after);
    if expected != actual || has_duplicates(&actual) {
        return Err(ConservationError::BallSetChanged { expected, actual });
    }

    let mut reported: HashSet<BallId> = HashSet::new();
    for event in events {
        match event {
            ShotEvent::BallPotted { ball } => {
                reported.insert(*ball);
            }
            ShotEvent::CueBallScratch => {
                reported.insert(BallId::CUE);
            }
            _ => {}
        }
    }

    for ball in after {
        if !ball.pocketed && !(ball.position.x.is_finite() && ball.position.y.is_finite()) {
            return Err(ConservationError::BadPosition(ball.id));
        }
        // `before` has the same id set, checked above.
        let Some(was) = before.iter().find(|b| b.id == ball.id) else {
            continue;
        };
        match (was.pocketed, ball.pocketed) {
            (true, false) => return Err(ConservationError::Unpocketed(ball.id)),
            (false, true) if !reported.contains(&ball.id) => {
                return Err(ConservationError::UnrecordedPot(ball.id));
            }
            _ => {}
        }
    }

    for id in reported {
        let newly_pocketed = after.iter().any(|b| b.id == id && b.pocketed)
            && before.iter().any(|b| b.id == id && !b.pocketed);
        if !newly_pocketed {
            return Err(ConservationError::PhantomPot(id));
        }
    }

    Ok(())
}

fn sorted_ids(balls: &[Ball]) -> Vec<BallId> {
    let mut ids: Vec<BallId> = balls.iter().map(|b| b.id).collect();
    ids.sort();
    ids
}

fn has_duplicates(sorted: &[BallId]) -> bool {
    sorted.windows(2).any(|w| w[0] == w[1])
}
