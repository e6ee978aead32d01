use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Vehicle-relative acceleration, normalized g.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    pub surge: f64,
    pub sway: f64,
    pub heave: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SurgeExtremes {
    pub fwd: f64,
    pub aft: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SwayExtremes {
    pub port: f64,
    pub stbd: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaveExtremes {
    pub up: f64,
    pub down: f64,
}

/// Session-wide directional extremes. Only ever widen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationExtremes {
    pub surge: SurgeExtremes,
    pub sway: SwayExtremes,
    pub heave: HeaveExtremes,
}

impl AccelerationExtremes {
    fn widen(&mut self, a: &Acceleration) {
        self.surge.fwd = self.surge.fwd.max(a.surge);
        self.surge.aft = self.surge.aft.min(a.surge);
        self.sway.port = self.sway.port.min(a.sway);
        self.sway.stbd = self.sway.stbd.max(a.sway);
        self.heave.up = self.heave.up.max(a.heave);
        self.heave.down = self.heave.down.min(a.heave);
    }
}

pub struct MotionDynamics {
    stillness_epsilon: f64,
    extremes: AccelerationExtremes,
}

impl MotionDynamics {
    pub fn new(stillness_epsilon: f64) -> Self {
        Self {
            stillness_epsilon,
            extremes: AccelerationExtremes::default(),
        }
    }

    /// Split the raw (unsmoothed) acceleration into surge/sway/heave and
    /// record the directional extremes.
    pub fn decompose(&mut self, raw_accel: (f64, f64, f64)) -> Acceleration {
        let v = Vector3::new(raw_accel.0, raw_accel.1, raw_accel.2);
        let magnitude = v.norm();
        let n = if magnitude != 0.0 {
            v / magnitude
        } else {
            Vector3::zeros()
        };

        let mut a = Acceleration {
            surge: n.x,
            sway: n.y,
            heave: n.z,
        };

        let eps = self.stillness_epsilon;
        if a.surge.abs() < eps && a.sway.abs() < eps && a.heave.abs() < eps {
            a = Acceleration::default();
        }

        self.extremes.widen(&a);
        a
    }

    pub fn extremes(&self) -> &AccelerationExtremes {
        &self.extremes
    }
}
