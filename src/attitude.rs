// attitude.rs — Tilt from the smoothed gravity vector, heading from gyro yaw
//
// Roll and pitch come straight from the direction of the smoothed specific
// force. Heading is the integral of the smoothed yaw rate and is never
// corrected, so it drifts over long sessions.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

pub const ROLL_LIMIT_DEG: f64 = 90.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub heading: f64,
}

pub struct AttitudeEstimator {
    /// Unbounded accumulator, degrees
    yaw: f64,
    yaw_offset: f64,
    last: Attitude,
}

impl AttitudeEstimator {
    /// Seed the estimator so that the first reported heading equals `initial_heading`.
    pub fn new(initial_heading: f64) -> Self {
        Self {
            yaw: 0.0,
            yaw_offset: -initial_heading,
            last: Attitude {
                roll: 0.0,
                pitch: 0.0,
                heading: wrap_heading(initial_heading),
            },
        }
    }

    /// `filtered_accel` in g, `filtered_gyro` in deg/s, `dt` in seconds.
    pub fn estimate(
        &mut self,
        filtered_accel: (f64, f64, f64),
        filtered_gyro: (f64, f64, f64),
        dt: f64,
    ) -> Attitude {
        let (roll, pitch) = tilt_from_gravity(filtered_accel);

        // Clock anomaly: keep the tilt, skip the integration
        if dt > 0.0 {
            self.yaw += filtered_gyro.2 * dt;
        }

        self.last = Attitude {
            roll,
            pitch,
            heading: wrap_heading(self.yaw - self.yaw_offset),
        };
        self.last
    }

    pub fn last(&self) -> Attitude {
        self.last
    }

    /// Raw accumulated yaw since session start, degrees.
    pub fn accumulated_yaw(&self) -> f64 {
        self.yaw
    }
}

/// Roll (clamped to ±90°) and pitch in degrees from an acceleration vector.
pub fn tilt_from_gravity(accel: (f64, f64, f64)) -> (f64, f64) {
    let v = Vector3::new(accel.0, accel.1, accel.2);
    let magnitude = v.norm();
    let n = if magnitude != 0.0 && magnitude.is_finite() {
        v / magnitude
    } else {
        Vector3::z()
    };

    // 0.0 - y keeps the fallback vector at +180 rather than -180
    let roll = (0.0 - n.y).atan2(-n.z).to_degrees();
    let pitch = (-n.x).atan2((n.y * n.y + n.z * n.z).sqrt()).to_degrees();

    (roll.clamp(-ROLL_LIMIT_DEG, ROLL_LIMIT_DEG), pitch)
}

/// Normalize degrees into [0, 360).
pub fn wrap_heading(degrees: f64) -> f64 {
    let h = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negatives
    if h >= 360.0 {
        0.0
    } else {
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_level_gravity() {
        let mut est = AttitudeEstimator::new(0.0);
        let att = est.estimate((0.0, 0.0, -1.0), (0.0, 0.0, 0.0), 0.01);
        assert_abs_diff_eq!(att.roll, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(att.pitch, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_roll_and_pitch_recovered() {
        let phi = 12.0_f64.to_radians();
        let theta = -4.0_f64.to_radians();
        let accel = (
            -theta.sin(),
            -theta.cos() * phi.sin(),
            -theta.cos() * phi.cos(),
        );
        let (roll, pitch) = tilt_from_gravity(accel);
        assert_abs_diff_eq!(roll, 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pitch, -4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_roll_is_clamped() {
        // Upside down: raw roll would be 180
        let (roll, _) = tilt_from_gravity((0.0, -0.01, 1.0));
        assert_eq!(roll, 90.0);
        let (roll, _) = tilt_from_gravity((0.0, 0.01, 1.0));
        assert_eq!(roll, -90.0);
    }

    #[test]
    fn test_zero_vector_is_defined() {
        let mut est = AttitudeEstimator::new(45.0);
        let att = est.estimate((0.0, 0.0, 0.0), (0.0, 0.0, 0.0), 0.01);
        assert_eq!(att.roll, 90.0);
        assert_abs_diff_eq!(att.pitch, 0.0, epsilon = 1e-12);
        assert_eq!(att.heading, 45.0);
    }

    #[test]
    fn test_outputs_bounded_for_arbitrary_input() {
        let mut est = AttitudeEstimator::new(359.0);
        let mut seed = 0.37_f64;
        for i in 0..2000 {
            seed = (seed * 9301.0 + 49297.0) % 233280.0;
            let r = seed / 233280.0 - 0.5;
            let accel = (r * 8.0, (i as f64 * 0.7).sin() * 3.0, r * -5.0 + 0.3);
            let gyro = (0.0, 0.0, r * 400.0);
            let att = est.estimate(accel, gyro, 0.01 + r.abs() * 0.05);
            assert!((-90.0..=90.0).contains(&att.roll));
            assert!((0.0..360.0).contains(&att.heading), "heading {}", att.heading);
        }
    }

    #[test]
    fn test_heading_constant_without_rotation() {
        let mut est = AttitudeEstimator::new(90.0);
        for _ in 0..10_000 {
            let att = est.estimate((0.0, 0.1, -1.0), (0.0, 0.0, 0.0), 0.01);
            assert_eq!(att.heading, 90.0);
        }
    }

    #[test]
    fn test_heading_integrates_and_wraps() {
        let mut est = AttitudeEstimator::new(350.0);
        // 10 deg/s for 2 s
        for _ in 0..200 {
            est.estimate((0.0, 0.0, -1.0), (0.0, 0.0, 10.0), 0.01);
        }
        assert_abs_diff_eq!(est.last().heading, 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(est.accumulated_yaw(), 20.0, epsilon = 1e-6);

        for _ in 0..300 {
            est.estimate((0.0, 0.0, -1.0), (0.0, 0.0, -10.0), 0.01);
        }
        assert_abs_diff_eq!(est.last().heading, 340.0, epsilon = 1e-6);
    }

    #[test]
    fn test_non_positive_dt_skips_yaw_only() {
        let mut est = AttitudeEstimator::new(0.0);
        let phi = 20.0_f64.to_radians();
        let att = est.estimate((0.0, -phi.sin(), -phi.cos()), (0.0, 0.0, 50.0), -0.2);
        assert_eq!(att.heading, 0.0);
        assert_abs_diff_eq!(att.roll, 20.0, epsilon = 1e-9);
        let att = est.estimate((0.0, 0.0, -1.0), (0.0, 0.0, 50.0), 0.0);
        assert_eq!(att.heading, 0.0);
        assert_abs_diff_eq!(att.roll, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_initial_heading_360_wraps_to_zero() {
        let mut est = AttitudeEstimator::new(360.0);
        let att = est.estimate((0.0, 0.0, -1.0), (0.0, 0.0, 0.0), 0.01);
        assert_eq!(att.heading, 0.0);
    }

    #[test]
    fn test_wrap_heading() {
        assert_eq!(wrap_heading(-10.0), 350.0);
        assert_eq!(wrap_heading(725.0), 5.0);
        assert_eq!(wrap_heading(-1e-18), 0.0);
    }
}
