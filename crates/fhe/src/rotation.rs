// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use concerto_events::Rotation;

/// Reduce a requested rotation to the left-rotation step count the
/// suite understands. A right rotation by `k` is a left rotation by
/// `(period - k mod period) mod period`; a step count of zero is the
/// identity and needs no rotation key.
pub fn normalize_rotation(rotation: Rotation, period: u64) -> u64 {
    debug_assert!(period > 0, "suite period must be positive");
    match rotation {
        Rotation::Left(k) => k % period,
        Rotation::Right(k) => {
            let k = k % period;
            if k == 0 {
                0
            } else {
                period - k
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: u64 = 8;

    #[test]
    fn left_rotations_reduce_modulo_period() {
        assert_eq!(normalize_rotation(Rotation::Left(3), PERIOD), 3);
        assert_eq!(normalize_rotation(Rotation::Left(PERIOD), PERIOD), 0);
        assert_eq!(normalize_rotation(Rotation::Left(PERIOD + 5), PERIOD), 5);
    }

    #[test]
    fn right_rotation_maps_to_complementary_left_rotation() {
        assert_eq!(normalize_rotation(Rotation::Right(3), PERIOD), 5);
        assert_eq!(normalize_rotation(Rotation::Right(1), PERIOD), 7);
    }

    #[test]
    fn right_rotation_boundaries_are_identity() {
        // k = 0, k = period and k = 2 * period all mean "do not move".
        assert_eq!(normalize_rotation(Rotation::Right(0), PERIOD), 0);
        assert_eq!(normalize_rotation(Rotation::Right(PERIOD), PERIOD), 0);
        assert_eq!(normalize_rotation(Rotation::Right(2 * PERIOD), PERIOD), 0);
    }

    #[test]
    fn right_rotation_past_period_wraps() {
        assert_eq!(normalize_rotation(Rotation::Right(PERIOD + 2), PERIOD), 6);
    }
}
