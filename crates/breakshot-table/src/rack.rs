//! The opening layout of a 9-ball game.

use breakshot_protocol::{Ball, BallId, Position};

use crate::geometry::{BALL_RADIUS, FOOT_SPOT, HEAD_SPOT};

/// Rows of the diamond, apex first.
const ROWS: [usize; 5] = [1, 2, 3, 2, 1];

/// Builds a fresh 9-ball rack plus the cue ball on the head spot.
///
/// The 1 sits on the foot spot at the apex, the 9 in the centre of the
/// diamond, and 2–8 fill the remaining slots row by row. The returned
/// vector is sorted by ball id.
pub fn nine_ball() -> Vec<Ball> {
    // A hair of slack so neighbouring balls start just apart.
    let spacing = 2.0 * BALL_RADIUS * (1.0 + 1e-3);
    let row_step = spacing * 3f64.sqrt() / 2.0;

    let mut balls = vec![Ball {
        id: BallId::CUE,
        position: HEAD_SPOT,
        pocketed: false,
    }];

    let mut next = 1u8;
    for (row, &count) in ROWS.iter().enumerate() {
        let y = FOOT_SPOT.y + row as f64 * row_step;
        for slot in 0..count {
            let x = FOOT_SPOT.x + (slot as f64 - (count as f64 - 1.0) / 2.0) * spacing;
            let centre = row == 2 && slot == 1;
            let id = if centre {
                BallId::NINE
            } else {
                let id = BallId(next);
                next += 1;
                id
            };
            balls.push(Ball {
                id,
                position: Position::new(x, y),
                pocketed: false,
            });
        }
    }

    balls.sort_by_key(|b| b.id);
    balls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{distance, on_table};

    #[test]
    fn test_nine_ball_has_cue_and_nine_object_balls() {
        let balls = nine_ball();
        let ids: Vec<u8> = balls.iter().map(|b| b.id.0).collect();
        assert_eq!(ids, (0..=9).collect::<Vec<_>>());
        assert!(balls.iter().all(|b| !b.pocketed));
    }

    #[test]
    fn test_nine_ball_apex_and_centre() {
        let balls = nine_ball();
        assert_eq!(balls[1].position, FOOT_SPOT);
        assert_eq!(balls[0].position, HEAD_SPOT);

        // The 9 sits on the spot line two rows behind the apex.
        let nine = balls[9].position;
        assert!((nine.x - FOOT_SPOT.x).abs() < 1e-9);
        assert!(nine.y > FOOT_SPOT.y);
    }

    #[test]
    fn test_nine_ball_no_overlaps_and_all_on_table() {
        let balls = nine_ball();
        for (i, a) in balls.iter().enumerate() {
            assert!(on_table(a.position), "ball {} off the table", a.id);
            for b in &balls[i + 1..] {
                assert!(
                    distance(a.position, b.position) >= 2.0 * BALL_RADIUS,
                    "balls {} and {} overlap",
                    a.id,
                    b.id
                );
            }
        }
    }
}
