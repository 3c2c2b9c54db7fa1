//! Binary Angle Measurement System
//!
//! Ninja angles are fixed-point: one full turn is `0x10000` units. The
//! 16-bit form wraps every turn; the 32-bit form keeps the same scale and
//! can express multiple turns. Both directions round to the nearest unit so
//! decoded angles re-encode to the same integer.

/// Units per full turn.
pub const BAMS_PER_TURN: f64 = 65536.0;

/// Converts degrees to a 32-bit BAMS angle.
pub fn deg_to_bams(deg: f32) -> i32 {
    (f64::from(deg) * BAMS_PER_TURN / 360.0).round() as i64 as i32
}

/// Converts degrees to a 16-bit BAMS angle, wrapping at a full turn.
pub fn deg_to_bams16(deg: f32) -> i16 {
    (f64::from(deg) * BAMS_PER_TURN / 360.0).round() as i64 as i16
}

/// Converts a BAMS angle (either width, sign-extended) to degrees.
pub fn bams_to_deg(bams: i32) -> f32 {
    (f64::from(bams) * 360.0 / BAMS_PER_TURN) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f32 = 360.0 / 65536.0;

    #[test]
    fn test_right_angle_round_trip() {
        let bams = deg_to_bams16(90.0);
        assert_eq!(bams, 0x4000);
        assert!((bams_to_deg(i32::from(bams)) - 90.0).abs() <= STEP);
    }

    #[test]
    fn test_full_turn_wraps_to_zero() {
        assert_eq!(deg_to_bams16(0.0), 0);
        assert_eq!(deg_to_bams16(360.0), 0);
        assert_eq!(deg_to_bams(360.0), 0x10000);
    }

    #[test]
    fn test_repeated_cycles_are_stable() {
        let mut deg = 33.3;
        let first = deg_to_bams(deg);
        for _ in 0..10 {
            deg = bams_to_deg(deg_to_bams(deg));
        }
        assert_eq!(deg_to_bams(deg), first);
    }

    #[test]
    fn test_negative_angles() {
        assert_eq!(deg_to_bams(-90.0), -0x4000);
        assert_eq!(bams_to_deg(-0x4000), -90.0);
        assert_eq!(deg_to_bams16(270.0), -0x4000);
    }
}
